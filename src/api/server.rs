//! HTTP server for the estimate REST API

use crate::api::handlers;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router with every route, shared state and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    // Build CORS layer (allow all for local development)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ================================================================
        // Health check
        // ================================================================
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::health_check))

        // ================================================================
        // Measurements and pipeline metadata
        // ================================================================
        .route("/api/v1/measurements", post(handlers::record_measurement))
        .route(
            "/api/v1/measurements/:property_id",
            get(handlers::list_measurements).delete(handlers::clear_measurements),
        )
        .route(
            "/api/v1/pipeline/:entry_id/metadata",
            get(handlers::get_pipeline_metadata).put(handlers::put_pipeline_metadata),
        )

        // ================================================================
        // Estimate workflow
        // ================================================================
        .route("/api/v1/estimates", get(handlers::list_estimates))
        .route(
            "/api/v1/estimates/number/:estimate_number",
            get(handlers::get_estimate),
        )
        .route("/api/v1/estimates/:entry_id/measure", post(handlers::measure))
        .route(
            "/api/v1/estimates/:entry_id/auto-populate",
            post(handlers::auto_populate),
        )
        .route(
            "/api/v1/estimates/:entry_id/template",
            post(handlers::apply_template),
        )
        .route(
            "/api/v1/estimates/:entry_id/line-items",
            put(handlers::update_line_items),
        )
        .route(
            "/api/v1/estimates/:entry_id/calculate",
            post(handlers::calculate),
        )
        .route("/api/v1/estimates/:entry_id/save", post(handlers::save))
        .route(
            "/api/v1/estimates/:entry_id/session",
            get(handlers::get_session).delete(handlers::discard_session),
        )

        // ================================================================
        // Formula, settings, templates, catalog
        // ================================================================
        .route("/api/v1/formula/evaluate", post(handlers::evaluate_formula))
        .route(
            "/api/v1/settings/pricing",
            get(handlers::get_pricing_defaults).put(handlers::update_pricing_defaults),
        )
        .route(
            "/api/v1/settings/packaging",
            get(handlers::get_packaging_rules).put(handlers::update_packaging_rules),
        )
        .route(
            "/api/v1/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route("/api/v1/templates/:id", delete(handlers::delete_template))
        .route("/api/v1/catalog", get(handlers::get_catalog))
        .route("/api/v1/catalog/:sku", put(handlers::put_catalog_price))

        // ================================================================
        // Add state and middleware
        // ================================================================
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_address();
    let app = build_router(state);

    info!("Starting Roofline API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("");
    info!("=== Endpoints ===");
    info!("  GET  http://{}/health", addr);
    info!("  POST http://{}/api/v1/estimates/{{entry_id}}/measure", addr);
    info!("  POST http://{}/api/v1/estimates/{{entry_id}}/auto-populate", addr);
    info!("  POST http://{}/api/v1/estimates/{{entry_id}}/calculate", addr);
    info!("  POST http://{}/api/v1/estimates/{{entry_id}}/save", addr);
    info!("  POST http://{}/api/v1/formula/evaluate", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("API server shutting down");
        })
        .await?;

    Ok(())
}
