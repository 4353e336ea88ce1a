//! Deterministic coach summary. Always available, needs no network.

use crate::money::format_with_symbol;
use crate::stats::PotStats;

pub const NO_ACTIVITY: &str = "No activity yet. Invite friends and start saving!";

fn direction(progress: f64) -> &'static str {
    if progress >= 66.0 {
        "on track"
    } else if progress >= 33.0 {
        "making progress"
    } else {
        "just getting started"
    }
}

pub fn local_summary(stats: &PotStats, goal: f64, symbol: &str) -> String {
    if stats.transactions == 0 {
        return NO_ACTIVITY.to_string();
    }
    let progress = stats.progress_percent(goal);
    let top = match stats.top_contributor() {
        Some((who, net)) => format!("Top contributor: {who} ({}).", format_with_symbol(net, symbol)),
        None => "No contributors yet.".to_string(),
    };
    format!(
        "Group saved {}. Goal: {} ({progress:.1}% complete), you're {}. {top}",
        format_with_symbol(stats.balance, symbol),
        format_with_symbol(goal, symbol),
        direction(progress),
    )
}
