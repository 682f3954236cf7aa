mod assignment;
mod config;
mod db;
mod errors;
mod handlers;
mod lytex_client;
mod models;
mod notifications;
mod reconciliation;
mod store;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::lytex_client::LytexClient;
use crate::notifications::ManagerNotifier;

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the database pool and the Lytex
/// client, then starts the Axum server with rate limiting, body-size limits
/// and request tracing.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contrib_billing_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // The Lytex client is shared so its access-token cache is process-wide;
    // concurrent refreshes are harmless since any valid token wins.
    let lytex = Arc::new(LytexClient::new(&config).map_err(|e| anyhow::anyhow!(e.to_string()))?);
    tracing::info!("Lytex client initialized: {}", config.lytex_base_url);

    let notifier = ManagerNotifier::new(&config).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        lytex,
        notifier,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route(
            "/api/v1/contributions/:id/assign-value",
            post(handlers::assign_value),
        )
        .route(
            "/api/v1/clinics/:clinic_id/contributions/sync",
            post(handlers::sync_contributions),
        )
        .route(
            "/api/v1/contributions/:id/reconcile",
            post(handlers::reconcile_one),
        )
        .route(
            "/api/v1/contributions/reconcile-batch",
            post(handlers::reconcile_batch),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check outside the rate limiter
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
