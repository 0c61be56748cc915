//! Roofline - Roofing estimate back-office service
//!
//! Turns roof measurements into priced line items: measurement sources are
//! normalized, materialized into packaged quantities or rendered through
//! template formulas, then priced by a remote margin calculation.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod formula;
pub mod materializer;
pub mod measurement;
pub mod pricing;
pub mod services;
pub mod state;
pub mod workflow;

use config::AppConfig;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging and run the API server until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roofline=debug,roofline_lib=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Roofline...");

    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::new(config)?);

    tracing::info!("Application state initialized");

    api::serve(state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await?;

    Ok(())
}
