pub mod coach;
pub mod config;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use coach::{Coach, Summary};
use config::{Args, Backend};
use pot_core::money::Currency;
use pot_core::stats::DepositShare;
use pot_core::{
    Block, ChainFault, ChainStore, EthereumVerifier, Ledger, LedgerError, PendingTransaction,
    PotStats, SignatureVerifier, TxRequest,
};
use pot_storage::{export_csv, CsvStore, SledStore, LEDGER_DB, LEDGER_FILE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub type SharedLedger = Arc<Mutex<Ledger<dyn ChainStore>>>;

#[derive(Clone)]
pub struct AppState {
    pub ledger: SharedLedger,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub coach: Arc<Coach>,
    pub goal: f64,
    pub currency: Currency,
}

impl AppState {
    pub fn new(ledger: Ledger<dyn ChainStore>, coach: Coach, goal: f64, currency: Currency) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            verifier: Arc::new(EthereumVerifier::new()),
            coach: Arc::new(coach),
            goal,
            currency,
        }
    }

    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let ledger = open_ledger(args)?;
        let coach = Coach::new(args.coach.config())?;
        Ok(Self::new(ledger, coach, args.goal, args.currency))
    }
}

/// Open the configured backend under the data directory.
pub fn open_ledger(args: &Args) -> anyhow::Result<Ledger<dyn ChainStore>> {
    let store: Arc<dyn ChainStore> = match args.backend {
        Backend::Csv => {
            info!(path = %args.data_dir.join(LEDGER_FILE).display(), "using csv store");
            Arc::new(CsvStore::in_dir(&args.data_dir))
        }
        Backend::Sled => {
            let path = args.data_dir.join(LEDGER_DB);
            Arc::new(
                SledStore::open(&path)
                    .with_context(|| format!("opening sled store at {}", path.display()))?,
            )
        }
    };
    Ok(Ledger::open(store, args.pot_settings())?)
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain", get(chain))
        .route("/chain/head", get(head))
        .route("/chain/verify", get(verify))
        .route("/chain/export", get(export))
        .route("/tx/prepare", post(prepare))
        .route("/tx", post(commit))
        .route("/stats", get(stats))
        .route("/summary", get(summary))
        .route("/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body `{"error": "..."}` with a status derived from the
/// ledger error kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::Tx(_) | LedgerError::MessageMismatch => StatusCode::BAD_REQUEST,
            LedgerError::StalePending { .. } => StatusCode::CONFLICT,
            LedgerError::Signature(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            LedgerError::Store(inner) => format!("{inner:#}"),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

/// Malformed bodies (unknown action, non-numeric amount, bad JSON) are
/// validation failures, answered like any other with a 400 error body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Store(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` extractor whose rejections go through [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChainView {
    pub valid: bool,
    pub blocks: Vec<Block>,
}

#[derive(Serialize, Deserialize)]
pub struct Head {
    pub height: u64,
    pub hash: String,
}

#[derive(Serialize, Deserialize)]
pub struct VerifyView {
    pub valid: bool,
    pub fault: Option<ChainFault>,
}

#[derive(Serialize, Deserialize)]
pub struct CommitRequest {
    pub pending: PendingTransaction,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Deserialize)]
pub struct GoalQuery {
    pub goal: Option<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct StatsView {
    #[serde(flatten)]
    pub stats: PotStats,
    pub goal: f64,
    pub progress_percent: f64,
    pub currency: Currency,
    pub top_contributor: Option<String>,
    pub deposit_shares: Vec<DepositShare>,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

async fn chain(State(state): State<AppState>) -> Json<ChainView> {
    let ledger = state.ledger.lock().await;
    Json(ChainView {
        valid: ledger.is_valid(),
        blocks: ledger.blocks().to_vec(),
    })
}

async fn head(State(state): State<AppState>) -> Json<Head> {
    let ledger = state.ledger.lock().await;
    Json(Head {
        height: ledger.height(),
        hash: ledger.tip().hash.clone(),
    })
}

async fn verify(State(state): State<AppState>) -> Json<VerifyView> {
    let fault = state.ledger.lock().await.verify().err();
    Json(VerifyView {
        valid: fault.is_none(),
        fault,
    })
}

async fn export(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = export_csv(state.ledger.lock().await.blocks())?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{LEDGER_FILE}\""),
            ),
        ],
        body,
    ))
}

async fn prepare(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TxRequest>,
) -> ApiResult<Json<PendingTransaction>> {
    let pending = state.ledger.lock().await.prepare(&request)?;
    Ok(Json(pending))
}

async fn commit(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CommitRequest>,
) -> ApiResult<(StatusCode, Json<Block>)> {
    let mut ledger = state.ledger.lock().await;
    let block = ledger.commit_signed(
        state.verifier.as_ref(),
        &req.pending,
        &req.note,
        &req.wallet_address,
        &req.signature,
    )?;
    Ok((StatusCode::CREATED, Json(block.clone())))
}

async fn stats(State(state): State<AppState>, Query(query): Query<GoalQuery>) -> Json<StatsView> {
    let goal = query.goal.unwrap_or(state.goal);
    let stats = PotStats::from_chain(state.ledger.lock().await.blocks());
    Json(StatsView {
        goal,
        progress_percent: stats.progress_percent(goal),
        currency: state.currency,
        top_contributor: stats.top_contributor().map(|(actor, _)| actor.to_string()),
        deposit_shares: stats.deposit_shares(),
        stats,
    })
}

async fn summary(State(state): State<AppState>, Query(query): Query<GoalQuery>) -> Json<Summary> {
    let goal = query.goal.unwrap_or(state.goal);
    // the coach may call out over the network; do not hold the ledger for it
    let blocks = state.ledger.lock().await.blocks().to_vec();
    let stats = PotStats::from_chain(&blocks);
    Json(
        state
            .coach
            .summarize(&blocks, &stats, goal, state.currency.symbol())
            .await,
    )
}

async fn reset(State(state): State<AppState>) -> ApiResult<Json<Head>> {
    let mut ledger = state.ledger.lock().await;
    ledger.reset()?;
    Ok(Json(Head {
        height: ledger.height(),
        hash: ledger.tip().hash.clone(),
    }))
}
