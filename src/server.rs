//! # Server Configuration
//!
//! Application state, router assembly, and the server entry point that
//! also spawns the background verification worker.

use std::sync::Arc;

use axum::extract::FromRef;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::instagram::InstagramClient;
use crate::verification::VerificationService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub instagram: Arc<InstagramClient>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

impl AppState {
    /// Build state from configuration and an established DB connection.
    pub fn new(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let crypto_key = CryptoKey::new(
            config
                .crypto_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("crypto key not present in configuration"))?,
        )?;
        let instagram = Arc::new(InstagramClient::from_config(&config));

        Ok(Self {
            config: Arc::new(config),
            db,
            crypto_key,
            instagram,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    // Routes behind operator bearer auth + acting profile header.
    let protected = Router::new()
        .route("/oauth/authorize-url", post(handlers::connect::authorize_url))
        .route(
            "/collaborations/{collaboration_id}/submissions",
            post(handlers::submissions::create_submission),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth::auth_middleware,
        ));

    // The callback and webhook endpoints authenticate by other means: the
    // state token and the provider handshake/signature respectively.
    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/oauth/callback", get(handlers::callback::callback))
        .route(
            "/webhooks",
            get(handlers::webhooks::verify_subscription).post(handlers::webhooks::ingest_events),
        );

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(middleware::from_fn(
            crate::telemetry::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration, running the
/// verification worker alongside until shutdown.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config, db)?;
    let shutdown = CancellationToken::new();

    let worker = VerificationService::new(
        Arc::clone(&state.config),
        Arc::new(state.db.clone()),
        Arc::clone(&state.instagram),
        state.crypto_key.clone(),
    );
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The worker stops with the server.
    shutdown.cancel();
    if let Err(err) = worker_handle.await {
        tracing::error!(error = ?err, "Verification worker task failed");
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connect::authorize_url,
        crate::handlers::callback::callback,
        crate::handlers::webhooks::verify_subscription,
        crate::handlers::webhooks::ingest_events,
        crate::handlers::submissions::create_submission,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::connect::AuthorizeUrlRequest,
            crate::handlers::connect::AuthorizeUrlResponse,
            crate::handlers::webhooks::WebhookAckResponse,
            crate::handlers::submissions::CreateSubmissionRequest,
            crate::handlers::submissions::SubmissionResponse,
        )
    ),
    info(
        title = "StoryProof API",
        description = "Instagram connect and story verification service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
