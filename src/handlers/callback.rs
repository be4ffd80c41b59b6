//! # OAuth Callback Handler
//!
//! Receives the provider redirect and runs the connect state machine:
//! parse, validate state, exchange the code, resolve the linked business
//! account, persist the connection. Every exit — success or failure — is
//! an HTTP redirect back into the app; the browser is never left on an
//! error page.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::instagram::InstagramError;
use crate::repositories::{OAuthStateRepository, ProfileRepository};
use crate::server::AppState;

/// Lifetime assumed when the provider omits `expires_in` (Meta long-lived
/// tokens run ~60 days).
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 5_184_000;

/// Query parameters delivered on the provider redirect
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_reason: Option<String>,
    pub error_description: Option<String>,
}

/// Handle the provider redirect for the Instagram connect flow
///
/// Unauthenticated: the state token carries the identity. On success the
/// browser is redirected to the bound in-app path with `?success=true`;
/// on failure to a safe page with `?error=<reason>`.
#[utoipa::path(
    get,
    path = "/oauth/callback",
    params(
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "State token from the connect step"),
        ("error" = Option<String>, Query, description = "Provider-reported error"),
        ("error_reason" = Option<String>, Query, description = "Provider-reported error reason")
    ),
    responses(
        (status = 303, description = "Redirect back into the app")
    ),
    tag = "oauth"
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let default_path = state.config.oauth_redirect_path.clone();

    // Step 1: parse. A provider-reported error short-circuits before any
    // database mutation.
    if let Some(error) = params.error.as_deref() {
        let reason = params
            .error_reason
            .as_deref()
            .or(params.error_description.as_deref())
            .unwrap_or(error);
        tracing::warn!(error, reason, "Provider denied authorization");
        return failure_redirect(&state, &default_path, reason);
    }

    let (Some(code), Some(state_token)) = (params.code.as_deref(), params.state.as_deref()) else {
        tracing::warn!("Callback missing code or state parameter");
        return failure_redirect(&state, &default_path, "missing_required_parameters");
    };

    // Step 2: validate and consume the state token. A replayed or expired
    // token fails here, before the code is ever presented upstream.
    let oauth_state_repo = OAuthStateRepository::new(Arc::new(state.db.clone()));
    let consumed = match oauth_state_repo.consume(state_token).await {
        Ok(Some(consumed)) => consumed,
        Ok(None) => {
            tracing::warn!("Callback presented invalid or expired state token");
            return failure_redirect(&state, &default_path, "invalid_or_expired_state");
        }
        Err(err) => {
            tracing::error!(error = ?err, "Failed to consume OAuth state");
            return failure_redirect(&state, &default_path, "state_validation_failed");
        }
    };

    // Only in-app paths are followed; anything else falls back to the default.
    let redirect_path = if consumed.redirect_path.starts_with('/') {
        consumed.redirect_path.clone()
    } else {
        default_path.clone()
    };

    // Step 3: exchange the code for an access token.
    let token = match state.instagram.exchange_code(code).await {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(
                profile_id = %consumed.profile_id,
                error = %err,
                "Token exchange failed"
            );
            return failure_redirect(&state, &redirect_path, "token_exchange_failed");
        }
    };

    // Upgrade to a long-lived token when the provider allows it; the
    // short-lived token still completes the flow if the upgrade fails.
    let token = match state.instagram.exchange_long_lived(&token.access_token).await {
        Ok(long_lived) => long_lived,
        Err(err) => {
            tracing::warn!(error = %err, "Long-lived token exchange failed, keeping short-lived token");
            token
        }
    };

    let expires_at =
        Utc::now() + Duration::seconds(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));

    // Step 4: resolve the linked business account.
    let account = match state
        .instagram
        .resolve_business_account(&token.access_token)
        .await
    {
        Ok(account) => account,
        Err(InstagramError::NoLinkedAccount) => {
            tracing::warn!(
                profile_id = %consumed.profile_id,
                "No linked Instagram business account"
            );
            return failure_redirect(&state, &redirect_path, "no_linked_account_found");
        }
        Err(err) => {
            tracing::error!(
                profile_id = %consumed.profile_id,
                error = %err,
                "Account resolution failed"
            );
            return failure_redirect(&state, &redirect_path, "account_resolution_failed");
        }
    };

    // Step 5: persist the connection. This is the single profile write of
    // the whole flow; on failure the exchanged token is abandoned.
    let profile_repo = ProfileRepository::new(
        Arc::new(state.db.clone()),
        state.crypto_key.clone(),
    );
    if let Err(err) = profile_repo
        .mark_connected(
            consumed.profile_id,
            &account,
            &token.access_token,
            expires_at,
        )
        .await
    {
        tracing::error!(
            profile_id = %consumed.profile_id,
            error = %err,
            "Profile update failed after token exchange"
        );
        return failure_redirect(&state, &redirect_path, "profile_update_failed");
    }

    tracing::info!(
        profile_id = %consumed.profile_id,
        username = %account.username,
        "Instagram account connected"
    );

    app_redirect(&state, &redirect_path, "success", "true")
}

fn failure_redirect(state: &AppState, path: &str, reason: &str) -> Redirect {
    app_redirect(state, path, "error", reason)
}

/// Build a redirect into the web app with one query parameter appended.
fn app_redirect(state: &AppState, path: &str, key: &str, value: &str) -> Redirect {
    let base = state.config.app_base_url.trim_end_matches('/');

    match Url::parse(&format!("{}{}", base, path)) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(key, value);
            Redirect::to(url.as_str())
        }
        Err(err) => {
            // Misconfigured base URL; land on the app root rather than a dead end.
            tracing::error!(error = %err, base, path, "Failed to build redirect URL");
            Redirect::to(&format!("{}/?{}={}", base, key, value))
        }
    }
}
