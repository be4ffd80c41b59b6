//! # Authentication and Authorization
//!
//! Operator bearer authentication plus the `X-Profile-Id` header naming
//! the profile a request acts for. The web app's own session layer sits
//! in front of this service; calls arrive with a service token and the
//! already-authenticated profile id.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id, validation_error};
use crate::telemetry::TraceContext;

/// Profile ID wrapper for type safety
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileId(pub Uuid);

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Extractor for the acting profile from request extensions
#[derive(Debug, Clone)]
pub struct ProfileExtension(pub ProfileId);

/// Authentication middleware that validates bearer tokens and the profile header
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token(&headers, trace_id)?;
    validate_token(&config, token)?;

    let profile = extract_profile_id(&headers)?;
    tracing::debug!(profile_id = %profile, "Authenticated request");

    let mut request = request;
    request.extensions_mut().insert(ProfileExtension(profile));
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token<'h>(
    headers: &'h HeaderMap,
    trace_id: Option<String>,
) -> Result<&'h str, ApiError> {
    let fail = |message: &str, trace_id: Option<String>| match trace_id {
        Some(trace_id) => unauthorized_with_trace_id(Some(message), trace_id),
        None => unauthorized(Some(message)),
    };

    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| fail("Missing Authorization header", trace_id.clone()))?;

    let header = value
        .to_str()
        .map_err(|_| fail("Invalid Authorization header", trace_id.clone()))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| fail("Authorization header must use Bearer scheme", trace_id))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_profile_id(headers: &HeaderMap) -> Result<ProfileId, ApiError> {
    let header_value = headers
        .get("X-Profile-Id")
        .ok_or_else(|| {
            validation_error(
                "Missing required header",
                serde_json::json!({ "X-Profile-Id": "Required header is missing" }),
            )
        })?
        .to_str()
        .map_err(|_| {
            validation_error(
                "Invalid profile header",
                serde_json::json!({ "X-Profile-Id": "Header must be valid UTF-8" }),
            )
        })?;

    header_value.parse::<Uuid>().map(ProfileId).map_err(|_| {
        validation_error(
            "Invalid profile ID",
            serde_json::json!({ "X-Profile-Id": "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-Profile-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct ProfileHeader {
    /// Profile identifier (UUID) the request acts on behalf of
    #[serde(rename = "X-Profile-Id")]
    #[param(rename = "X-Profile-Id", value_type = String)]
    pub profile_id: String,
}

impl<S> FromRequestParts<S> for ProfileExtension
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ProfileExtension>()
            .cloned()
            .ok_or_else(|| {
                validation_error(
                    "Profile context missing",
                    serde_json::json!({ "X-Profile-Id": "Profile context not present" }),
                )
            })
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}
