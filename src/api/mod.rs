//! HTTP API for the exchange and the asset ledgers
//!
//! Exposes the two exchange operations, the ledger capability set of the
//! in-process assets, and health/readiness endpoints.

use crate::asset::AssetRegistry;
use crate::config::ApiConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{ExchangeLedger, SwapReceipt};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<ExchangeLedger>,
    pub registry: Arc<AssetRegistry>,
}

/// Run the HTTP API server
pub async fn run_server(
    config: ApiConfig,
    exchange: Arc<ExchangeLedger>,
    registry: Arc<AssetRegistry>,
) -> ExchangeResult<()> {
    let state = AppState { exchange, registry };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/swap", post(swap))
        .route("/unswap", post(unswap))
        .route("/assets", get(get_assets))
        .route("/assets/:asset/mint", post(mint))
        .route("/assets/:asset/approve", post(approve))
        .route("/assets/:asset/transfer", post(transfer))
        .route("/reserves/:asset", get(get_reserves))
        .route("/accounts/:account/balances", get(get_balances))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ExchangeError::Internal(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ExchangeError::Internal(e.to_string()))?;

    Ok(())
}

/// Map an exchange error onto an HTTP status
fn error_status(err: &ExchangeError) -> StatusCode {
    match err {
        ExchangeError::AssetNotFound { .. } => StatusCode::NOT_FOUND,
        ExchangeError::ZeroAmount => StatusCode::UNPROCESSABLE_ENTITY,
        ExchangeError::InsufficientAllowance { .. }
        | ExchangeError::InsufficientBalance { .. }
        | ExchangeError::InsufficientReserve { .. } => StatusCode::CONFLICT,
        ExchangeError::Overflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ExchangeError::Config(_) | ExchangeError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: ExchangeError) -> (StatusCode, Json<ErrorResponse>) {
    (
        error_status(&err),
        Json(ErrorResponse {
            reason: err.reason().to_string(),
            message: err.to_string(),
        }),
    )
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the anchor ledger must resolve
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let anchor_ok = state.registry.get(state.exchange.anchor()).is_ok();

    let response = ReadinessResponse {
        ready: anchor_ok,
        anchor: state.exchange.anchor().to_string(),
        assets: state.registry.asset_ids().len(),
    };

    if anchor_ok {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Execute a swap: caller's asset in, anchor out
async fn swap(
    State(state): State<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<SwapReceipt>, (StatusCode, Json<ErrorResponse>)> {
    state
        .exchange
        .swap(&req.caller, &req.asset, req.amount)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Execute an unswap: caller's anchor in, asset out
async fn unswap(
    State(state): State<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<SwapReceipt>, (StatusCode, Json<ErrorResponse>)> {
    state
        .exchange
        .unswap(&req.caller, &req.asset, req.amount)
        .await
        .map(Json)
        .map_err(error_response)
}

/// List registered assets
async fn get_assets(State(state): State<AppState>) -> impl IntoResponse {
    let mut assets = state.registry.asset_ids();
    assets.sort();
    Json(AssetsResponse {
        anchor: state.exchange.anchor().to_string(),
        assets,
    })
}

/// Mint new units to an account
async fn mint(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Json(req): Json<MintRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let ledger = state.registry.get(&asset).map_err(error_response)?;
    ledger
        .mint(&req.account, req.amount)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

/// Set an allowance from owner to spender
async fn approve(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let ledger = state.registry.get(&asset).map_err(error_response)?;
    ledger
        .approve(&req.owner, &req.spender, req.amount)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

/// Move units between accounts
async fn transfer(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Json(req): Json<TransferRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let ledger = state.registry.get(&asset).map_err(error_response)?;
    ledger
        .transfer(&req.from, &req.to, req.amount)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

/// Get the exchange's reserve of one asset
async fn get_reserves(
    State(state): State<AppState>,
    Path(asset): Path<String>,
) -> Result<Json<ReserveResponse>, (StatusCode, Json<ErrorResponse>)> {
    let reserve = state.exchange.reserves(&asset).await.map_err(error_response)?;
    Ok(Json(ReserveResponse { asset, reserve }))
}

/// Get an account's balance on every registered ledger
async fn get_balances(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> Result<Json<BalancesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut balances = HashMap::new();

    for asset in state.registry.asset_ids() {
        let ledger = state.registry.get(&asset).map_err(error_response)?;
        let balance = ledger.balance_of(&account).await.map_err(error_response)?;
        balances.insert(asset, balance);
    }

    Ok(Json(BalancesResponse { account, balances }))
}

// Request types

#[derive(Debug, Deserialize)]
struct ExchangeRequest {
    caller: String,
    asset: String,
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct MintRequest {
    account: String,
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    owner: String,
    spender: String,
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
    amount: u128,
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    anchor: String,
    assets: usize,
}

#[derive(Serialize)]
struct AssetsResponse {
    anchor: String,
    assets: Vec<String>,
}

#[derive(Serialize)]
struct ReserveResponse {
    asset: String,
    reserve: u128,
}

#[derive(Serialize)]
struct BalancesResponse {
    account: String,
    balances: HashMap<String, u128>,
}

#[derive(Serialize)]
struct ErrorResponse {
    reason: String,
    message: String,
}
