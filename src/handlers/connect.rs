//! # Connect Handler
//!
//! Starts the Instagram connect flow: mints a single-use state token and
//! returns the provider authorization URL the client redirects the user
//! through.

use axum::{body::Bytes, extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use utoipa::ToSchema;

use crate::auth::{OperatorAuth, ProfileExtension, ProfileHeader};
use crate::error::{ApiError, configuration_error, validation_error};
use crate::instagram::InstagramError;
use crate::repositories::OAuthStateRepository;
use crate::server::AppState;

/// Optional request body for the connect endpoint
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AuthorizeUrlRequest {
    /// In-app path to resume after the callback (defaults per config)
    pub redirect_path: Option<String>,
}

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    /// Complete authorization URL for user redirection.
    /// HTTPS, valid per RFC 3986, max 2048 chars, no fragment.
    pub authorize_url: String,
}

/// Start the Instagram connect flow
///
/// Issues one OAuth state record bound to the acting profile, then returns
/// the fully formed provider authorization URL. If the state cannot be
/// persisted the flow aborts without handing out a URL.
#[utoipa::path(
    post,
    path = "/oauth/authorize-url",
    security(("bearer_auth" = [])),
    params(ProfileHeader),
    request_body(content = Option<AuthorizeUrlRequest>, content_type = "application/json"),
    responses(
        (status = 200, description = "Authorization URL generated", body = AuthorizeUrlResponse),
        (status = 400, description = "Invalid redirect path", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Configuration or persistence failure", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn authorize_url(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ProfileExtension(profile): ProfileExtension,
    body: Bytes,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    // The body is optional; an absent or empty body means defaults.
    let request: AuthorizeUrlRequest = if body.is_empty() {
        AuthorizeUrlRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            validation_error(
                "Invalid request body",
                serde_json::json!({ "body": err.to_string() }),
            )
        })?
    };

    let redirect_path = request
        .redirect_path
        .unwrap_or_else(|| state.config.oauth_redirect_path.clone());

    // Only in-app absolute paths may be bound; anything else would turn
    // the callback into an open redirect.
    if !redirect_path.starts_with('/') {
        return Err(validation_error(
            "Invalid redirect path",
            serde_json::json!({ "redirect_path": "must start with '/'" }),
        ));
    }

    let oauth_state_repo = OAuthStateRepository::new(Arc::new(state.db.clone()));

    let oauth_state = match oauth_state_repo
        .issue(
            profile.0,
            &redirect_path,
            state.config.oauth_state_ttl_minutes,
        )
        .await
    {
        Ok(record) => record,
        Err(err) => {
            tracing::error!(error = ?err, profile_id = %profile, "Failed to persist OAuth state");
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to create OAuth state",
            ));
        }
    };

    let authorize_url = match state.instagram.authorize_url(&oauth_state.token) {
        Ok(url) => url,
        Err(err) => {
            // The state row is useless without a URL; clean it up.
            let _ = oauth_state_repo.delete_by_id(oauth_state.id).await;

            return Err(match err {
                InstagramError::ConfigError(details) => {
                    tracing::error!(%details, "Connect flow missing provider configuration");
                    configuration_error("Instagram application is not configured")
                }
                other => {
                    tracing::error!(error = ?other, "Failed to build authorization URL");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_SERVER_ERROR",
                        "Failed to generate authorization URL",
                    )
                }
            });
        }
    };

    validate_authorize_url(&authorize_url)?;

    tracing::info!(
        profile_id = %profile,
        state_id = %oauth_state.id,
        "Connect flow initiated"
    );

    Ok(Json(AuthorizeUrlResponse {
        authorize_url: authorize_url.to_string(),
    }))
}

/// Validate the generated URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must use HTTPS",
        ));
    }

    // No fragment component per OAuth 2.0 RFC 6749 section 3.1.
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must not include fragment component",
        ));
    }

    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL exceeds maximum length of 2048 characters",
        ));
    }

    Ok(())
}
