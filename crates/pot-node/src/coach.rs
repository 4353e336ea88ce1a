//! Natural-language pot summaries.
//!
//! When enabled and configured with an API key, the coach asks Google AI
//! Studio (Gemini) for a short paragraph. Any failure on that path, or an
//! empty answer, falls back to the deterministic local summary; the coach
//! never fails a ledger operation.

use anyhow::{Context, Result};
use pot_core::stats::PotStats;
use pot_core::summary::local_summary;
use pot_core::Block;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const PREFERRED_MODELS: [&str; 3] = ["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash-exp"];
const GENERATE_METHOD: &str = "generateContent";
const MAX_PROMPT_ROWS: usize = 80;
const MAX_SUMMARY_CHARS: usize = 600;

#[derive(Clone, Debug)]
pub struct CoachConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Ai,
    Local,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

pub struct Coach {
    config: CoachConfig,
    http: Client,
}

impl Coach {
    pub fn new(config: CoachConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building coach http client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|_| self.config.enabled)
    }

    pub async fn summarize(&self, chain: &[Block], stats: &PotStats, goal: f64, symbol: &str) -> Summary {
        let local = || Summary {
            text: clean_ai_text(&local_summary(stats, goal, symbol)),
            source: SummarySource::Local,
        };
        let Some(key) = self.api_key() else {
            return local();
        };
        match self.ai_summary(key, chain, goal, symbol).await {
            Ok(text) if !text.trim().is_empty() => Summary {
                text: clean_ai_text(&text.chars().take(MAX_SUMMARY_CHARS).collect::<String>()),
                source: SummarySource::Ai,
            },
            Ok(_) => {
                warn!("coach returned no text, using local summary");
                local()
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "coach request failed, using local summary");
                local()
            }
        }
    }

    /// The configured model, else the first preferred model the endpoint
    /// lists as supporting generation, else the default.
    async fn pick_model(&self, key: &str) -> String {
        if let Some(model) = &self.config.model {
            return model.clone();
        }
        match self.list_models(key).await {
            Ok(models) => PREFERRED_MODELS
                .iter()
                .find(|candidate| {
                    models.iter().any(|m| {
                        let short = m.name.strip_prefix("models/").unwrap_or(&m.name);
                        short == **candidate
                            && m.supported_generation_methods.iter().any(|g| g == GENERATE_METHOD)
                    })
                })
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            Err(err) => {
                debug!(error = %err, "listing models failed");
                DEFAULT_MODEL.to_string()
            }
        }
    }

    async fn list_models(&self, key: &str) -> Result<Vec<ModelInfo>> {
        let list: ModelList = self
            .http
            .get(format!("{}/models", self.config.endpoint))
            .query(&[("key", key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.models)
    }

    async fn ai_summary(&self, key: &str, chain: &[Block], goal: f64, symbol: &str) -> Result<String> {
        let model = self.pick_model(key).await;
        debug!(%model, "requesting coach summary");
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(chain, goal, symbol) }] }]
        });
        let response: GenerateResponse = self
            .http
            .post(format!("{}/models/{model}:{GENERATE_METHOD}", self.config.endpoint))
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding coach response")?;
        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text.trim().to_string())
    }
}

pub fn build_prompt(chain: &[Block], goal: f64, symbol: &str) -> String {
    let transactions: Vec<&Block> = chain.iter().filter(|b| b.action.is_transaction()).collect();
    let start = transactions.len().saturating_sub(MAX_PROMPT_ROWS);
    let rows = transactions[start..]
        .iter()
        .map(|b| format!("{} | {} | {} | {}", b.actor, b.action, b.amount, b.note))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a friendly finance coach.\n\
         Summarize this shared savings pot in ONE short paragraph.\n\
         Be fun and make it engaging!\n\
         Include: net saved, progress vs goal, top contributor, and ONE actionable next step.\n\
         Use the currency symbol {symbol}. Keep it under 90 words.\n\
         \n\
         Goal: {goal}\n\
         Rows: actor | action | amount | note\n\
         {rows}\n"
    )
}

/// Fold compatibility characters (NFKC), strip markdown bold markers and
/// collapse all whitespace runs to a single space.
pub fn clean_ai_text(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .replace("**", "")
        .replace("∗∗", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
