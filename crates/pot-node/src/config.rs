use crate::coach::{CoachConfig, DEFAULT_ENDPOINT};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use pot_core::money::Currency;
use pot_core::PotSettings;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// `ledger.csv` in the data directory
    Csv,
    /// `ledger.sled` database in the data directory
    Sled,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "pot-node")]
#[command(about = "HTTP node owning a savings pot ledger")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "POT_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Data directory for the ledger
    #[arg(long, env = "POT_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Backend::Csv)]
    pub backend: Backend,

    /// Pot name embedded in every canonical message
    #[arg(long, env = "POT_NAME", default_value = "SpringBreakFund")]
    pub pot_name: String,

    /// Savings goal used for progress and summaries
    #[arg(long, default_value_t = 500.0)]
    pub goal: f64,

    #[arg(long, default_value = "USD")]
    pub currency: Currency,

    #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub allow_withdrawals: bool,

    #[command(flatten)]
    pub coach: CoachArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CoachArgs {
    /// Ask Google AI Studio for summaries (falls back to the local summary)
    #[arg(
        long = "ai-coach",
        env = "USE_AI_STUDIO",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enabled: bool,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model override, e.g. gemini-2.5-flash
    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub coach_endpoint: String,

    #[arg(long, default_value_t = 20)]
    pub coach_timeout_secs: u64,
}

impl Args {
    pub fn pot_settings(&self) -> PotSettings {
        PotSettings {
            pot_name: self.pot_name.clone(),
            allow_withdrawals: self.allow_withdrawals,
        }
    }
}

impl CoachArgs {
    pub fn config(&self) -> CoachConfig {
        CoachConfig {
            enabled: self.enabled,
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: self.model.clone().filter(|m| !m.trim().is_empty()),
            endpoint: self.coach_endpoint.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.coach_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["pot-node"]).unwrap();
        assert_eq!(args.backend, Backend::Csv);
        assert_eq!(args.currency, Currency::Usd);
        assert!(args.allow_withdrawals);
        assert_eq!(args.pot_settings().pot_name, "SpringBreakFund");
        assert_eq!(args.coach.config().endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn flags() {
        let args = Args::try_parse_from([
            "pot-node",
            "--backend",
            "sled",
            "--currency",
            "eur",
            "--allow-withdrawals",
            "no",
            "--ai-coach",
            "1",
            "--api-key",
            "  ",
            "--coach-endpoint",
            "http://127.0.0.1:9999/",
        ])
        .unwrap();
        assert_eq!(args.backend, Backend::Sled);
        assert_eq!(args.currency, Currency::Eur);
        assert!(!args.pot_settings().allow_withdrawals);
        let coach = args.coach.config();
        assert!(coach.enabled);
        assert_eq!(coach.api_key, None);
        assert_eq!(coach.endpoint, "http://127.0.0.1:9999");
    }
}
