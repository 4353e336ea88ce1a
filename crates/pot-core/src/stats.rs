//! Totals and per-participant contributions derived from a chain.

use crate::{round_amount, Action, Block};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PotStats {
    pub transactions: usize,
    pub total_deposited: f64,
    pub total_withdrawn: f64,
    pub balance: f64,
    /// Net contribution per actor: deposits minus withdrawals.
    pub contributions: BTreeMap<String, f64>,
}

/// One slice of the "who put money in" breakdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositShare {
    pub actor: String,
    pub deposited: f64,
    /// Fraction in `0.0..=1.0`.
    pub share: f64,
}

impl PotStats {
    pub fn from_chain(chain: &[Block]) -> Self {
        let mut stats = PotStats::default();
        for block in chain.iter().filter(|b| b.action.is_transaction()) {
            stats.transactions += 1;
            let net = stats.contributions.entry(block.actor.clone()).or_default();
            match block.action {
                Action::Deposit => {
                    stats.total_deposited += block.amount;
                    *net += block.amount;
                }
                Action::Withdraw => {
                    stats.total_withdrawn += block.amount;
                    *net -= block.amount;
                }
                Action::Genesis => {}
            }
        }
        stats.total_deposited = round_amount(stats.total_deposited);
        stats.total_withdrawn = round_amount(stats.total_withdrawn);
        stats.balance = round_amount(stats.total_deposited - stats.total_withdrawn);
        for net in stats.contributions.values_mut() {
            *net = round_amount(*net);
        }
        stats
    }

    /// Progress towards `goal` in percent, one decimal, clamped to `0..=100`.
    /// An overdrawn pot reports 0 rather than a negative percentage, and a
    /// non-positive goal counts as no progress.
    pub fn progress_percent(&self, goal: f64) -> f64 {
        if goal <= 0.0 || !goal.is_finite() {
            return 0.0;
        }
        ((1000.0 * self.balance / goal).round() / 10.0).clamp(0.0, 100.0)
    }

    /// Highest net contribution; ties go to the first name alphabetically.
    pub fn top_contributor(&self) -> Option<(&str, f64)> {
        self.contributions
            .iter()
            .rev()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(actor, net)| (actor.as_str(), *net))
    }

    /// Each actor's share of all positive net contributions. Actors whose
    /// withdrawals cancel out their deposits are left out.
    pub fn deposit_shares(&self) -> Vec<DepositShare> {
        let positive: Vec<(&String, f64)> = self
            .contributions
            .iter()
            .filter(|(_, net)| **net > 0.0)
            .map(|(actor, net)| (actor, *net))
            .collect();
        let total: f64 = positive.iter().map(|(_, net)| net).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        positive
            .into_iter()
            .map(|(actor, deposited)| DepositShare {
                actor: actor.clone(),
                deposited,
                share: deposited / total,
            })
            .collect()
    }
}
