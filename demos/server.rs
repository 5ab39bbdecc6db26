//! Simple REST API server example for the redemption engine.
//!
//! Run with: `cargo run --example server`
//!
//! ```bash
//! # Register a client and sell a pass
//! curl -X POST http://localhost:3000/clients \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": 1, "name": "Mira"}'
//!
//! curl -X POST http://localhost:3000/clients/1/passes \
//!   -H "Content-Type: application/json" \
//!   -d '{"planSize": 10, "validDays": 30, "priceRSD": "12000"}'
//!
//! # Redeem a scan (kiosk path)
//! curl -X POST http://localhost:3000/redeem \
//!   -H "Content-Type: application/json" \
//!   -d '{"clientId": 1, "kioskId": "front-door", "ts": "2026-08-26T10:00:00Z", "idempotencyKey": "evt-1"}'
//!
//! # Card view
//! curl http://localhost:3000/clients/1/passes
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pass_ledger_rs::{ClientId, Engine, Pass, RedeemError, RedeemRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
struct CreateClientRequest {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellPassRequest {
    plan_size: u32,
    valid_days: i64,
    #[serde(rename = "priceRSD")]
    price_rsd: Decimal,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    code: String,
    message: String,
}

struct ApiError(RedeemError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RedeemError::InvalidToken => StatusCode::NOT_FOUND,
            RedeemError::UnknownClient | RedeemError::UnknownPass => StatusCode::NOT_FOUND,
            RedeemError::Cooldown | RedeemError::DuplicateVisit => StatusCode::CONFLICT,
            RedeemError::Conflict => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = ErrorResponse {
            status: "error",
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<RedeemError> for ApiError {
    fn from(e: RedeemError) -> Self {
        Self(e)
    }
}

// === Handlers ===

async fn redeem(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<RedeemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = engine.redeem(&request)?;
    Ok(Json(serde_json::json!({ "status": "ok", "result": outcome })))
}

async fn create_client(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<CreateClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = engine.register_client(ClientId(request.id), request.name)?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn issue_token(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
) -> Result<impl IntoResponse, ApiError> {
    let token = engine.issue_token(ClientId(id))?;
    Ok(Json(TokenResponse { token }))
}

async fn sell_pass(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
    Json(request): Json<SellPassRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pass = engine.sell_pass(
        ClientId(id),
        request.plan_size,
        request.valid_days,
        request.price_rsd,
    )?;
    Ok((StatusCode::CREATED, Json(pass)))
}

async fn list_passes(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
) -> Result<Json<Vec<Pass>>, ApiError> {
    engine
        .client(ClientId(id))
        .ok_or(RedeemError::UnknownClient)?;
    Ok(Json(engine.passes(ClientId(id))))
}

async fn ledger(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let entries: Vec<_> = engine
        .ledger()
        .snapshot()
        .iter()
        .map(|e| e.as_ref().clone())
        .collect();
    Json(entries)
}

fn app(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/redeem", post(redeem))
        .route("/clients", post(create_client))
        .route("/clients/{id}/token", post(issue_token))
        .route("/clients/{id}/passes", post(sell_pass).get(list_passes))
        .route("/ledger", get(ledger))
        .with_state(engine)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let secret = std::env::var("TOKEN_SECRET").unwrap_or_else(|_| "dev-secret".into());
    let engine = Arc::new(Engine::new(secret.as_bytes()));

    let listener = TcpListener::bind("127.0.0.1:3000")
        .await
        .expect("failed to bind address");
    tracing::info!("listening on http://127.0.0.1:3000");

    axum::serve(listener, app(engine))
        .await
        .expect("server error");
}
