//! # API Handlers
//!
//! HTTP endpoint handlers for the StoryProof service.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{Value as JsonValue, json};

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod callback;
pub mod connect;
pub mod submissions;
pub mod webhooks;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness/readiness probe backed by a database ping
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|e| {
        tracing::error!(error = ?e, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database unreachable",
        )
    })?;

    Ok(Json(json!({ "status": "ok" })))
}
