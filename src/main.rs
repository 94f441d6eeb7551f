// =============================================================================
// MAINTENANCE SERVICE - Main Entry Point
// =============================================================================
// Fleet-maintenance back office service.
//
// WHAT THIS SERVICE DOES:
// - Tracks workshop stock, service orders and purchase requests
// - Keeps stock quantities, order estimated costs and purchase linkage
//   consistent through the reconciliation engine (src/engine)
// - Derives vehicle maintenance history from completed/cancelled orders
// - Exposes Prometheus metrics for observability
// =============================================================================

mod config;      // Configuration loading (config.rs)
mod db;          // Pool, migrations, lookup queries (db.rs)
mod engine;      // Reconciliation engine (engine/)
mod error;       // Error types (error.rs)
mod handlers;    // HTTP request handlers (handlers.rs)
mod metrics;     // Prometheus metrics setup (metrics.rs)
mod models;      // Data structures (models.rs)

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::metrics::setup_metrics;

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared state available to all request handlers via the State extractor.
#[derive(Clone)]
pub struct AppState {
    // Database connection pool wrapper
    pub db: Database,

    // Prometheus metrics handle, used to render /metrics
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development; the file is optional.
    dotenvy::dotenv().ok();

    // Structured JSON logging; RUST_LOG controls levels,
    // e.g. RUST_LOG=info,maintenance_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,maintenance_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Maintenance Service...");

    let config = Config::from_env()?;
    info!(port = config.port, "Configuration loaded");

    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    let db = Database::connect(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db.run_migrations().await?;
    info!("Database migrations completed");

    let state = Arc::new(AppState { db, metrics_handle });

    let app = Router::new()
        // ----- Health & Readiness Endpoints -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // ----- Metrics Endpoint -----
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Inventory -----
        .route("/api/v1/inventory", post(handlers::create_inventory_item))
        .route("/api/v1/inventory/:id", get(handlers::get_inventory_item))
        // ----- Vehicle Maintenance History -----
        .route(
            "/api/v1/vehicles/:id/maintenance-records",
            get(handlers::list_maintenance_records),
        )
        // ----- Service Orders -----
        .route(
            "/api/v1/service-orders",
            post(handlers::create_service_order),
        )
        .route(
            "/api/v1/service-orders/:id",
            get(handlers::get_service_order),
        )
        .route(
            "/api/v1/service-orders/:id/items",
            post(handlers::add_line_item),
        )
        .route(
            "/api/v1/service-orders/:id/status",
            post(handlers::set_service_order_status),
        )
        // ----- Purchase Requests -----
        .route(
            "/api/v1/purchase-requests",
            post(handlers::create_purchase_request),
        )
        .route(
            "/api/v1/purchase-requests/:id",
            get(handlers::get_purchase_request),
        )
        .route(
            "/api/v1/purchase-requests/:id/status",
            post(handlers::set_purchase_status),
        )
        // ----- Middleware Layers -----
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "Maintenance Service is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
