//! HTTP API for the ORAKEL node

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use orakel_core::{
    AccAddress, Denom, Hash, OracleParams, OrakelError, Period, TotalPower, ValAddress,
};
use orakel_oracle::{
    ExchangeRatePrevote, ExchangeRateVote, FinalizedRate, ParticipationCounter, PeriodOutcome,
    SignedMsg, ValidatorInfo, WindowReport,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::runtime::{NodeRuntime, TxReceipt};

/// API state containing node runtime
pub type ApiState = Arc<NodeRuntime>;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn fail<T: Serialize>(status: StatusCode, error: impl ToString) -> ApiResult<T> {
    (status, Json(ApiResponse::err(error)))
}

/// Map a keeper error to an HTTP status
fn error_status(err: &OrakelError) -> StatusCode {
    match err {
        OrakelError::StateNotFound => StatusCode::NOT_FOUND,
        OrakelError::StateCorruption(_)
        | OrakelError::StorageError(_)
        | OrakelError::SerializationError(_)
        | OrakelError::DeserializationError(_)
        | OrakelError::Internal(_)
        | OrakelError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        OrakelError::MempoolRejected(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn from_error<T: Serialize>(err: OrakelError) -> ApiResult<T> {
    fail(error_status(&err), err)
}

/// Node status response
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    pub name: String,
    pub chain_id: String,
    pub height: u64,
    pub period: Period,
    pub last_tallied_period: Option<Period>,
    pub state_version: u64,
    pub state_root: String,
    pub mempool_size: usize,
    pub validator_count: usize,
    pub total_power: TotalPower,
}

/// Transaction response
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub tx_id: String,
    pub status: String,
    pub receipt: Option<TxReceipt>,
}

/// Single rate response
#[derive(Debug, Serialize, Deserialize)]
pub struct RateResponse {
    pub denom: Denom,
    #[serde(flatten)]
    pub rate: FinalizedRate,
}

/// Feeder response
#[derive(Debug, Serialize, Deserialize)]
pub struct FeederResponse {
    pub validator: ValAddress,
    pub feeder: AccAddress,
}

/// State snapshot summary
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub version: u64,
    pub root: String,
    pub entries: usize,
    pub verified: bool,
}

/// Miss count response
#[derive(Debug, Serialize, Deserialize)]
pub struct MissesResponse {
    pub validator: ValAddress,
    pub window: u64,
    pub misses: u64,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub window: Option<u64>,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let enable_cors = state.config().api.enable_cors;

    let router = Router::new()
        // Health
        .route("/health", get(health))
        .route("/status", get(status))
        // Transactions
        .route("/tx", post(submit_transaction))
        .route("/tx/:tx_id", get(get_transaction))
        .route("/mempool", get(get_mempool))
        // Oracle
        .route("/oracle/params", get(get_params))
        .route("/oracle/rates", get(get_rates))
        .route("/oracle/rates/:denom", get(get_rate))
        .route("/oracle/feeder/:validator", get(get_feeder))
        .route("/oracle/misses/:validator", get(get_misses))
        .route("/oracle/participation/:validator", get(get_participation))
        .route("/oracle/prevote/:denom/:validator", get(get_prevote))
        .route("/oracle/vote/:denom/:validator", get(get_vote))
        .route("/oracle/reports/:window", get(get_report))
        .route("/oracle/tally", get(get_last_tally))
        // Validators
        .route("/validators", get(get_validators))
        // State
        .route("/state/snapshot", get(get_snapshot))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Node status
async fn status(State(runtime): State<ApiState>) -> impl IntoResponse {
    let last_tallied_period = match runtime.keeper().last_tallied_period() {
        Ok(p) => p,
        Err(e) => return from_error(e),
    };

    ok(NodeStatusResponse {
        name: runtime.config().name.clone(),
        chain_id: runtime.chain_id().to_string(),
        height: runtime.height().0,
        period: runtime.current_period(),
        last_tallied_period,
        state_version: runtime.state_version().0,
        state_root: runtime.state_root().to_hex(),
        mempool_size: runtime.mempool_size(),
        validator_count: runtime.validators().len(),
        total_power: runtime.total_power(),
    })
}

/// Submit a signed oracle message
async fn submit_transaction(
    State(runtime): State<ApiState>,
    Json(tx): Json<SignedMsg>,
) -> impl IntoResponse {
    match runtime.submit_transaction(tx) {
        Ok(tx_id) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::ok(TransactionResponse {
                tx_id: tx_id.to_hex(),
                status: "pending".to_string(),
                receipt: None,
            })),
        ),
        Err(e) => from_error(e),
    }
}

/// Transaction status
async fn get_transaction(
    State(runtime): State<ApiState>,
    Path(tx_id): Path<String>,
) -> impl IntoResponse {
    let id = match Hash::from_hex(&tx_id) {
        Ok(id) => id,
        Err(_) => return fail(StatusCode::BAD_REQUEST, "Invalid transaction ID"),
    };

    let (status, receipt) = match runtime.get_receipt(&id) {
        Some(receipt) => ("delivered", Some(receipt)),
        None if runtime.is_transaction_pending(&id) => ("pending", None),
        None => ("unknown", None),
    };

    ok(TransactionResponse {
        tx_id,
        status: status.to_string(),
        receipt,
    })
}

/// Pending transaction IDs
async fn get_mempool(State(runtime): State<ApiState>) -> impl IntoResponse {
    let tx_ids: Vec<String> = runtime
        .mempool_tx_ids()
        .iter()
        .map(|id| id.to_hex())
        .collect();

    Json(ApiResponse::ok(tx_ids))
}

async fn get_params(State(runtime): State<ApiState>) -> impl IntoResponse {
    let params: OracleParams = runtime.keeper().params().clone();
    Json(ApiResponse::ok(params))
}

async fn get_rates(State(runtime): State<ApiState>) -> impl IntoResponse {
    let rates: Result<BTreeMap<Denom, FinalizedRate>, _> = runtime.keeper().get_rates();
    match rates {
        Ok(rates) => ok(rates),
        Err(e) => from_error(e),
    }
}

async fn get_rate(
    State(runtime): State<ApiState>,
    Path(denom): Path<String>,
) -> impl IntoResponse {
    let denom = Denom::new(denom);
    let found = runtime.keeper().get_finalized_rate(&denom);
    match found {
        Ok(Some(rate)) => ok(RateResponse { denom, rate }),
        Ok(None) => fail(StatusCode::NOT_FOUND, format!("No rate for {}", denom)),
        Err(e) => from_error(e),
    }
}

async fn get_feeder(
    State(runtime): State<ApiState>,
    Path(validator): Path<String>,
) -> impl IntoResponse {
    let validator = ValAddress::new(validator);
    let feeder = runtime.keeper().get_feeder(&validator);
    match feeder {
        Ok(feeder) => ok(FeederResponse { validator, feeder }),
        Err(e) => from_error(e),
    }
}

async fn get_misses(
    State(runtime): State<ApiState>,
    Path(validator): Path<String>,
    Query(query): Query<WindowQuery>,
) -> impl IntoResponse {
    let validator = ValAddress::new(validator);
    let period = runtime.current_period();
    let keeper = runtime.keeper();
    let window = query
        .window
        .unwrap_or_else(|| period.window(keeper.params().slash_window));

    match keeper.miss_count(&validator, window) {
        Ok(misses) => ok(MissesResponse {
            validator,
            window,
            misses,
        }),
        Err(e) => from_error(e),
    }
}

async fn get_participation(
    State(runtime): State<ApiState>,
    Path(validator): Path<String>,
) -> impl IntoResponse {
    let validator = ValAddress::new(validator);
    let period = runtime.current_period();
    let counter: Result<ParticipationCounter, _> =
        runtime.keeper().get_participation(&validator, period);
    match counter {
        Ok(counter) => ok(counter),
        Err(e) => from_error(e),
    }
}

async fn get_prevote(
    State(runtime): State<ApiState>,
    Path((denom, validator)): Path<(String, String)>,
) -> impl IntoResponse {
    let found = runtime
        .keeper()
        .get_prevote(&Denom::new(denom), &ValAddress::new(validator));
    match found {
        Ok(Some(prevote)) => ok(prevote),
        Ok(None) => fail::<ExchangeRatePrevote>(StatusCode::NOT_FOUND, "No live prevote"),
        Err(e) => from_error(e),
    }
}

async fn get_vote(
    State(runtime): State<ApiState>,
    Path((denom, validator)): Path<(String, String)>,
) -> impl IntoResponse {
    let found = runtime
        .keeper()
        .get_vote(&Denom::new(denom), &ValAddress::new(validator));
    match found {
        Ok(Some(vote)) => ok(vote),
        Ok(None) => fail::<ExchangeRateVote>(StatusCode::NOT_FOUND, "No pending vote"),
        Err(e) => from_error(e),
    }
}

async fn get_report(
    State(runtime): State<ApiState>,
    Path(window): Path<u64>,
) -> impl IntoResponse {
    let found = runtime.keeper().get_window_report(window);
    match found {
        Ok(Some(report)) => ok(report),
        Ok(None) => fail::<WindowReport>(
            StatusCode::NOT_FOUND,
            format!("Window {} is open or no longer retained", window),
        ),
        Err(e) => from_error(e),
    }
}

async fn get_last_tally(State(runtime): State<ApiState>) -> impl IntoResponse {
    match runtime.last_tally() {
        Some(outcome) => ok(outcome),
        None => fail::<PeriodOutcome>(StatusCode::NOT_FOUND, "No period tallied since start"),
    }
}

async fn get_validators(State(runtime): State<ApiState>) -> impl IntoResponse {
    let validators: Vec<ValidatorInfo> = runtime.validators().all();
    Json(ApiResponse::ok(validators))
}

async fn get_snapshot(State(runtime): State<ApiState>) -> impl IntoResponse {
    match runtime.snapshot() {
        Ok(snapshot) => ok(SnapshotResponse {
            version: snapshot.version.0,
            root: snapshot.root.to_hex(),
            entries: snapshot.len(),
            verified: snapshot.verify(),
        }),
        Err(e) => from_error(e),
    }
}

/// Start API server
pub async fn start_api_server(runtime: Arc<NodeRuntime>, listen_addr: &str) -> anyhow::Result<()> {
    let router = create_router(runtime);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
