use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use pot_core::money::Currency;
use pot_core::stats::DepositShare;
use pot_core::{Action, Block, ChainFault, PendingTransaction, PotStats};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pot-cli")]
#[command(about = "CLI client for a savings pot node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "POT_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lock a transaction and print the message to sign
    Prepare {
        #[command(flatten)]
        tx: TxArgs,
        /// Also write the pending transaction to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Prepare and commit in one go
    Submit {
        #[command(flatten)]
        tx: TxArgs,
        #[command(flatten)]
        commit: CommitArgs,
    },
    /// Commit a pending transaction saved by `prepare --out`
    Commit {
        /// Pending transaction JSON file
        #[arg(long)]
        pending: PathBuf,
        #[command(flatten)]
        commit: CommitArgs,
    },
    /// Print the ledger as a table
    Show,
    /// Check the chain's integrity
    Verify,
    /// Totals, contributions and goal progress
    Stats {
        #[arg(long)]
        goal: Option<f64>,
    },
    /// Coach summary of the pot
    Summary {
        #[arg(long)]
        goal: Option<f64>,
    },
    /// Download the ledger as CSV
    Export {
        #[arg(long, default_value = "ledger.csv")]
        out: PathBuf,
    },
    /// Drop every block after genesis
    Reset {
        /// Required, the reset cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

#[derive(clap::Args, Debug)]
struct TxArgs {
    #[arg(long)]
    actor: String,
    /// deposit or withdraw
    #[arg(long)]
    action: Action,
    #[arg(long)]
    amount: f64,
}

#[derive(clap::Args, Debug, Default)]
struct CommitArgs {
    #[arg(long, default_value = "")]
    note: String,
    /// Wallet that signed the canonical message
    #[arg(long, default_value = "")]
    wallet: String,
    /// 65-byte personal_sign signature, hex
    #[arg(long, default_value = "")]
    signature: String,
}

#[derive(Serialize)]
struct TxRequest<'a> {
    actor: &'a str,
    action: Action,
    amount: f64,
}

#[derive(Deserialize)]
struct ChainView {
    valid: bool,
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
struct VerifyView {
    valid: bool,
    fault: Option<ChainFault>,
}

#[derive(Deserialize)]
struct StatsView {
    #[serde(flatten)]
    stats: PotStats,
    goal: f64,
    progress_percent: f64,
    currency: Currency,
    top_contributor: Option<String>,
    deposit_shares: Vec<DepositShare>,
}

#[derive(Deserialize)]
struct Summary {
    text: String,
    source: String,
}

struct NodeClient {
    base: String,
    http: Client,
}

impl NodeClient {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {}", self.url(path)))?;
        Ok(checked(res).await?.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let res = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.url(path)))?;
        Ok(checked(res).await?.json().await?)
    }

    async fn prepare(&self, tx: &TxArgs) -> Result<PendingTransaction> {
        let request = TxRequest {
            actor: &tx.actor,
            action: tx.action,
            amount: tx.amount,
        };
        self.post("/tx/prepare", &request).await
    }

    async fn commit(&self, pending: &PendingTransaction, args: &CommitArgs) -> Result<Block> {
        let body = json!({
            "pending": pending,
            "note": args.note,
            "wallet_address": args.wallet,
            "signature": args.signature,
        });
        self.post("/tx", &body).await
    }
}

/// Turn a non-2xx answer into an error carrying the node's message.
async fn checked(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(body);
    bail!("node answered {status}: {message}")
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = NodeClient::new(&cli.node);
    debug!(node = %node.base, "using node");

    match cli.cmd {
        Command::Prepare { tx, out } => {
            let pending = node.prepare(&tx).await?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
            println!("\nsign this message:\n{}", pending.message);
            if let Some(path) = out {
                std::fs::write(&path, serde_json::to_vec_pretty(&pending)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("saved to {}", path.display());
            }
        }
        Command::Submit { tx, commit } => {
            let pending = node.prepare(&tx).await?;
            let block = node.commit(&pending, &commit).await?;
            print_appended(&block);
        }
        Command::Commit { pending, commit } => {
            let text = std::fs::read_to_string(&pending)
                .with_context(|| format!("reading {}", pending.display()))?;
            let pending: PendingTransaction =
                serde_json::from_str(&text).context("parsing pending transaction")?;
            let block = node.commit(&pending, &commit).await?;
            print_appended(&block);
        }
        Command::Show => {
            let view: ChainView = node.get("/chain").await?;
            println!("{}", ledger_table(&view.blocks));
            println!(
                "{} blocks, chain {}",
                view.blocks.len(),
                if view.valid { "valid" } else { "INVALID" }
            );
        }
        Command::Verify => {
            let view: VerifyView = node.get("/chain/verify").await?;
            match view.fault {
                None if view.valid => println!("chain valid"),
                None => println!("chain invalid"),
                Some(fault) => println!("chain invalid: {fault}"),
            }
        }
        Command::Stats { goal } => {
            let view: StatsView = node.get(&with_goal("/stats", goal)).await?;
            print_stats(&view);
        }
        Command::Summary { goal } => {
            let summary: Summary = node.get(&with_goal("/summary", goal)).await?;
            println!("{}\n({})", summary.text, summary.source);
        }
        Command::Export { out } => {
            let res = node
                .http
                .get(node.url("/chain/export"))
                .send()
                .await
                .context("GET /chain/export")?;
            let csv = checked(res).await?.text().await?;
            std::fs::write(&out, csv).with_context(|| format!("writing {}", out.display()))?;
            println!("exported to {}", out.display());
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("reset drops every block after genesis; pass --yes to confirm");
            }
            let head: serde_json::Value = node.post("/reset", &json!({})).await?;
            println!("ledger reset, tip {}", short_hash(head["hash"].as_str().unwrap_or_default()));
        }
    }
    Ok(())
}

fn with_goal(path: &str, goal: Option<f64>) -> String {
    match goal {
        Some(goal) => format!("{path}?goal={goal}"),
        None => path.to_string(),
    }
}

fn print_appended(block: &Block) {
    println!(
        "appended block #{} {} {} {:.2} ({})",
        block.index,
        block.actor,
        block.action,
        block.amount,
        short_hash(&block.hash)
    );
}

fn print_stats(view: &StatsView) {
    let currency = view.currency;
    let stats = &view.stats;
    println!("transactions   {}", stats.transactions);
    println!("deposited      {}", currency.format(stats.total_deposited));
    println!("withdrawn      {}", currency.format(stats.total_withdrawn));
    println!("balance        {}", currency.format(stats.balance));
    println!(
        "goal           {} {}",
        currency.format(view.goal),
        progress_bar(view.progress_percent, 20)
    );
    if let Some(top) = &view.top_contributor {
        println!("top            {top}");
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Actor", "Net", "Share of deposits"]));
    for (actor, net) in &stats.contributions {
        let share = view
            .deposit_shares
            .iter()
            .find(|s| &s.actor == actor)
            .map(|s| format!("{:.1}%", s.share * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let color = if *net >= 0.0 { Color::Green } else { Color::Red };
        table.add_row(vec![
            Cell::new(actor),
            Cell::new(currency.format(*net)).fg(color),
            Cell::new(share),
        ]);
    }
    println!("{table}");
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).fg(Color::Cyan).add_attribute(Attribute::Bold))
        .collect()
}

fn ledger_table(blocks: &[Block]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["#", "Time", "Actor", "Action", "Amount", "Note", "Signed", "Prev", "Hash"]));
    for block in blocks {
        let color = match block.action {
            Action::Genesis => Color::Cyan,
            Action::Deposit => Color::Green,
            Action::Withdraw => Color::Red,
        };
        table.add_row(vec![
            Cell::new(format!("#{}", block.index)),
            Cell::new(pretty_time(block.timestamp)).fg(Color::Grey),
            Cell::new(&block.actor),
            Cell::new(block.action).fg(color),
            Cell::new(format!("{:.2}", block.amount)),
            Cell::new(&block.note),
            Cell::new(if block.is_signed() { "yes" } else { "no" }),
            Cell::new(short_hash(&block.prev_hash)),
            Cell::new(short_hash(&block.hash)),
        ]);
    }
    table
}

/// Local wall-clock time for an epoch timestamp; genesis has none.
fn pretty_time(timestamp: f64) -> String {
    if timestamp <= 0.0 {
        return "-".to_string();
    }
    match DateTime::from_timestamp(timestamp.trunc() as i64, 0) {
        Some(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "Invalid".to_string(),
    }
}

fn short_hash(hash: &str) -> String {
    match hash.get(..10) {
        Some(head) if hash.len() > 12 => format!("{head}…"),
        _ => hash.to_string(),
    }
}

fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}] {percent:.1}%", "#".repeat(filled), "-".repeat(width - filled))
}
