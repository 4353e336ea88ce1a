use clap::Parser;
use pot_core::signature::personal_message_hash;
use pot_core::{Block, PendingTransaction};
use pot_node::{app, config::Args, AppState, ChainView, Head, StatsView, VerifyView};
use reqwest::{Client, StatusCode};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tempfile::{tempdir, TempDir};

const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const ADDRESS: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

struct TestNode {
    base: String,
    http: Client,
    _dir: TempDir,
}

impl TestNode {
    async fn start(extra: &[&str]) -> anyhow::Result<Self> {
        let dir = tempdir()?;
        let data_dir = dir.path().to_string_lossy().to_string();
        let mut argv = vec!["pot-node", "--data-dir", data_dir.as_str(), "--goal", "100"];
        argv.extend_from_slice(extra);
        let args = Args::try_parse_from(argv)?;
        let state = AppState::from_args(&args)?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let router = app(state);
        tokio::spawn(async move { axum::serve(listener, router).await });

        Ok(Self {
            base: format!("http://{addr}"),
            http: Client::new(),
            _dir: dir,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn prepare(&self, actor: &str, action: &str, amount: f64) -> anyhow::Result<PendingTransaction> {
        let res = self
            .http
            .post(self.url("/tx/prepare"))
            .json(&json!({ "actor": actor, "action": action, "amount": amount }))
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    async fn commit(&self, body: Value) -> anyhow::Result<reqwest::Response> {
        Ok(self.http.post(self.url("/tx")).json(&body).send().await?)
    }

    async fn record(&self, actor: &str, action: &str, amount: f64) -> anyhow::Result<Block> {
        let pending = self.prepare(actor, action, amount).await?;
        let res = self.commit(json!({ "pending": pending })).await?;
        assert_eq!(res.status(), StatusCode::CREATED);
        Ok(res.json().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        Ok(self
            .http
            .get(self.url(path))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

fn sign(message: &str) -> String {
    let secp = Secp256k1::new();
    let key = SecretKey::from_slice(&hex::decode(KEY).unwrap()).unwrap();
    let digest = Message::from_digest(personal_message_hash(message));
    let (id, compact) = secp.sign_ecdsa_recoverable(&digest, &key).serialize_compact();
    let mut raw = compact.to_vec();
    raw.push(id.to_i32() as u8 + 27);
    format!("0x{}", hex::encode(raw))
}

#[tokio::test]
async fn test_health_and_genesis() -> anyhow::Result<()> {
    let node = TestNode::start(&[]).await?;
    let health: Value = node.get_json("/health").await?;
    assert_eq!(health["status"], "ok");

    let head: Head = node.get_json("/chain/head").await?;
    assert_eq!(head.height, 0);
    assert_eq!(
        head.hash,
        "2da43c3f7a890d1fb171f5a51ac0a6ffd539c87e4ce9bf1f683008f21043ca97"
    );
    Ok(())
}

#[tokio::test]
async fn test_unsigned_deposit_flow() -> anyhow::Result<()> {
    let node = TestNode::start(&[]).await?;
    let pending = node.prepare("  Alice ", "DEPOSIT", 25.0).await?;
    assert_eq!(pending.actor, "Alice");
    assert!(pending.message.starts_with("POT:SpringBreakFund|ACTOR:Alice|ACTION:DEPOSIT|AMOUNT:25.00|TS:"));

    let res = node.commit(json!({ "pending": pending, "note": " first " })).await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let block: Block = res.json().await?;
    assert_eq!(block.index, 1);
    assert_eq!(block.note, "first");
    assert_eq!(block.signed_message, pending.message);
    assert!(!block.is_signed());

    let chain: ChainView = node.get_json("/chain").await?;
    assert!(chain.valid);
    assert_eq!(chain.blocks.len(), 2);
    assert_eq!(chain.blocks[1], block);
    Ok(())
}

#[tokio::test]
async fn test_signed_commit() -> anyhow::Result<()> {
    let node = TestNode::start(&[]).await?;
    let pending = node.prepare("Alice", "DEPOSIT", 10.0).await?;
    let signature = sign(&pending.message);
    let res = node
        .commit(json!({
            "pending": pending,
            "wallet_address": ADDRESS.to_uppercase().replace("0X", "0x"),
            "signature": signature,
        }))
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let block: Block = res.json().await?;
    assert!(block.is_signed());
    assert_eq!(block.signature, signature);
    Ok(())
}

#[tokio::test]
async fn test_signature_mismatch_is_rejected() -> anyhow::Result<()> {
    let node = TestNode::start(&[]).await?;
    let pending = node.prepare("Alice", "DEPOSIT", 10.0).await?;
    let signature = sign("some other message");
    let res = node
        .commit(json!({ "pending": pending, "wallet_address": ADDRESS, "signature": signature }))
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await?;
    assert!(body["error"].as_str().unwrap_or_default().contains("does not match"));

    let head: Head = node.get_json("/chain/head").await?;
    assert_eq!(head.height, 0);
    Ok(())
}

#[tokio::test]
async fn test_stale_pending_conflicts() -> anyhow::Result<()> {
    let node = TestNode::start(&[]).await?;
    let first = node.prepare("Alice", "DEPOSIT", 1.0).await?;
    let second = node.prepare("Bob", "DEPOSIT", 2.0).await?;
    assert_eq!(node.commit(json!({ "pending": first })).await?.status(), StatusCode::CREATED);
    assert_eq!(node.commit(json!({ "pending": second })).await?.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn test_bad_requests() -> anyhow::Result<()> {
    let node = TestNode::start(&["--allow-withdrawals", "false"]).await?;
    for body in [
        json!({ "actor": "Alice", "action": "DEPOSIT", "amount": 0.0 }),
        json!({ "actor": " ", "action": "DEPOSIT", "amount": 1.0 }),
        json!({ "actor": "Alice", "action": "GENESIS", "amount": 1.0 }),
        json!({ "actor": "Alice", "action": "WITHDRAW", "amount": 1.0 }),
        json!({ "actor": "Alice", "action": "REFUND", "amount": 1.0 }),
        json!({ "actor": "Alice", "action": "DEPOSIT", "amount": "abc" }),
        json!({ "actor": "Alice", "action": "DEPOSIT" }),
    ] {
        let res = node.http.post(node.url("/tx/prepare")).json(&body).send().await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        let error: Value = res.json().await?;
        assert!(error["error"].is_string(), "{body}: {error}");
    }

    let res = node.commit(json!({ "pending": { "actor": "Alice" } })).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let mut pending = node.prepare("Alice", "DEPOSIT", 1.0).await?;
    pending.amount = 1000.0;
    let res = node.commit(json!({ "pending": pending })).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_stats_and_summary() -> anyhow::Result<()> {
    let node = TestNode::start(&[]).await?;
    node.record("Alice", "DEPOSIT", 25.0).await?;
    node.record("Bob", "DEPOSIT", 10.0).await?;
    node.record("Alice", "WITHDRAW", 5.0).await?;

    let stats: StatsView = node.get_json("/stats").await?;
    assert_eq!(stats.stats.transactions, 3);
    assert_eq!(stats.stats.balance, 30.0);
    assert_eq!(stats.stats.contributions["Alice"], 20.0);
    assert_eq!(stats.stats.contributions["Bob"], 10.0);
    assert_eq!(stats.goal, 100.0);
    assert_eq!(stats.progress_percent, 30.0);
    assert_eq!(stats.top_contributor.as_deref(), Some("Alice"));

    let stats: StatsView = node.get_json("/stats?goal=60").await?;
    assert_eq!(stats.progress_percent, 50.0);

    let summary: Value = node.get_json("/summary").await?;
    assert_eq!(summary["source"], "local");
    assert!(summary["text"].as_str().unwrap_or_default().contains("Top contributor: Alice"));

    let verify: VerifyView = node.get_json("/chain/verify").await?;
    assert!(verify.valid);
    assert!(verify.fault.is_none());
    Ok(())
}

#[tokio::test]
async fn test_export_and_reset() -> anyhow::Result<()> {
    let node = TestNode::start(&["--backend", "sled"]).await?;
    node.record("Alice", "DEPOSIT", 25.0).await?;

    let res = node.http.get(node.url("/chain/export")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("ledger.csv"));
    let body = res.text().await?;
    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("index,timestamp,actor,action,amount,note,prev_hash,wallet_address,signed_message,signature,hash")
    );
    assert_eq!(lines.count(), 2);

    let res = node.http.post(node.url("/reset")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let chain: ChainView = node.get_json("/chain").await?;
    assert_eq!(chain.blocks.len(), 1);
    assert!(chain.valid);
    Ok(())
}
