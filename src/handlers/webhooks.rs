//! # Webhook Handlers
//!
//! The provider webhook endpoint. GET serves the one-time subscription
//! handshake (challenge echo, no side effects); POST ingests asynchronous
//! story-insight events, merging them into story verification rows with
//! per-entry error isolation.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::repositories::StoryVerificationRepository;
use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Insight fields this service understands; anything else is skipped so
/// new provider fields do not break ingestion.
const RECOGNIZED_FIELDS: &[&str] = &["story_insights"];

/// Query parameters for the subscription verification handshake
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Event delivery acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAckResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    field: String,
    #[serde(default)]
    value: JsonValue,
}

/// Subscription verification handshake
///
/// Pure challenge/response: proves endpoint ownership to the provider at
/// subscription time. Performs no persistence whatsoever.
#[utoipa::path(
    get,
    path = "/webhooks",
    params(
        ("hub.mode" = Option<String>, Query, description = "Subscription mode flag"),
        ("hub.verify_token" = Option<String>, Query, description = "Configured verify token"),
        ("hub.challenge" = Option<String>, Query, description = "Challenge to echo back")
    ),
    responses(
        (status = 200, description = "Challenge echoed verbatim", content_type = "text/plain"),
        (status = 403, description = "Verify token mismatch")
    ),
    tag = "webhooks"
)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, StatusCode> {
    let Some(configured) = state.config.webhook_verify_token.as_deref() else {
        warn!("Webhook handshake attempted without a configured verify token");
        return Err(StatusCode::FORBIDDEN);
    };

    let (Some(mode), Some(token), Some(challenge)) = (
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge,
    ) else {
        return Err(StatusCode::FORBIDDEN);
    };

    let token_matches: bool =
        ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into();

    if mode == "subscribe" && token_matches {
        info!("Webhook subscription verified");
        Ok(challenge)
    } else {
        warn!(mode, "Webhook handshake rejected");
        Err(StatusCode::FORBIDDEN)
    }
}

/// Ingest provider events
///
/// Accepts a batch of change entries. Recognized insight changes are
/// merged into the matching story verification row; unknown fields and
/// per-entry failures are logged and skipped — one bad entry never blocks
/// its siblings. The response acknowledges receipt whenever the payload
/// parses.
#[utoipa::path(
    post,
    path = "/webhooks",
    request_body(content = JsonValue, description = "Provider batch-of-entries document", content_type = "application/json"),
    responses(
        (status = 200, description = "Batch received", body = WebhookAckResponse),
        (status = 400, description = "Unparseable payload", body = ApiError),
        (status = 401, description = "Payload signature mismatch", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn ingest_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAckResponse>, ApiError> {
    // Payload signature check, enforced only when a secret is configured.
    if let Some(secret) = state.config.webhook_app_secret.as_deref() {
        verify_payload_signature(&headers, &body, secret)?;
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "Unparseable webhook payload");
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Webhook payload is not valid JSON",
        )
    })?;

    let repo = StoryVerificationRepository::new(Arc::new(state.db.clone()));
    let now = Utc::now();

    for entry in &envelope.entry {
        for change in &entry.changes {
            if !RECOGNIZED_FIELDS.contains(&change.field.as_str()) {
                debug!(field = %change.field, "Skipping unrecognized webhook field");
                continue;
            }

            // One change failing must not stop the rest of the batch.
            if let Err(err) = apply_change(&repo, change, now).await {
                counter!("webhook_changes_failed_total").increment(1);
                error!(
                    entry_id = entry.id.as_deref().unwrap_or("unknown"),
                    field = %change.field,
                    error = %err,
                    "Failed to apply webhook change"
                );
            } else {
                counter!("webhook_changes_applied_total").increment(1);
            }
        }
    }

    Ok(Json(WebhookAckResponse { success: true }))
}

/// Apply one recognized change to its story verification row.
async fn apply_change(
    repo: &StoryVerificationRepository,
    change: &WebhookChange,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), String> {
    let media_id = change
        .value
        .get("media_id")
        .or_else(|| change.value.get("id"))
        .and_then(JsonValue::as_str)
        .ok_or_else(|| "change value carries no media id".to_string())?;

    let record = repo
        .find_by_story_id(media_id)
        .await
        .map_err(|e| format!("lookup failed: {}", e))?
        .ok_or_else(|| format!("no story verification for media id {}", media_id))?;

    repo.merge_insight(record, &change.field, change.value.clone(), now)
        .await
        .map_err(|e| format!("merge failed: {}", e))?;

    Ok(())
}

/// Verify the `X-Hub-Signature-256` HMAC over the raw request body.
fn verify_payload_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
) -> Result<(), ApiError> {
    let provided = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("sha256="))
        .ok_or_else(|| {
            warn!("Webhook event missing payload signature");
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Missing or malformed X-Hub-Signature-256 header",
            )
        })?;

    let provided_bytes = hex::decode(provided).map_err(|_| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "INVALID_SIGNATURE",
            "Signature is not valid hex",
        )
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        error!(error = %e, "HMAC setup failed");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Signature verification unavailable",
        )
    })?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    let matches: bool = ConstantTimeEq::ct_eq(expected.as_slice(), provided_bytes.as_slice()).into();
    if matches {
        Ok(())
    } else {
        warn!("Webhook payload signature mismatch");
        Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "INVALID_SIGNATURE",
            "Payload signature mismatch",
        ))
    }
}

/// Compute a payload signature for tests.
#[allow(dead_code)]
fn sign_payload(body: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn signature_round_trip() {
        let body = r#"{"entry":[]}"#;
        let signature = sign_payload(body, "app-secret");

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Hub-Signature-256",
            HeaderValue::from_str(&signature).unwrap(),
        );

        assert!(verify_payload_signature(&headers, body.as_bytes(), "app-secret").is_ok());
        assert!(verify_payload_signature(&headers, body.as_bytes(), "other-secret").is_err());
    }

    #[test]
    fn signature_requires_header() {
        let headers = HeaderMap::new();
        let result = verify_payload_signature(&headers, b"{}", "app-secret");
        assert!(result.is_err());
    }

    #[test]
    fn signature_rejects_bad_hex() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Hub-Signature-256",
            HeaderValue::from_static("sha256=not-hex"),
        );
        assert!(verify_payload_signature(&headers, b"{}", "secret").is_err());
    }

    #[test]
    fn envelope_tolerates_unknown_shapes() {
        let parsed: WebhookEnvelope = serde_json::from_str(
            r#"{"object":"instagram","entry":[{"id":"1","changes":[{"field":"comments","value":{}}]}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.entry.len(), 1);
        assert_eq!(parsed.entry[0].changes[0].field, "comments");

        let empty: WebhookEnvelope = serde_json::from_str("{}").unwrap();
        assert!(empty.entry.is_empty());
    }
}
