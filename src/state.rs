//! Application state management

use crate::config::AppConfig;
use crate::db::sqlite::SqliteDb;
use crate::error::{AppError, Result};
use crate::pricing::{HttpPricingGateway, PricingGateway, UnconfiguredPricingGateway};
use crate::workflow::EstimateSession;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// SQLite database connection
    pub sqlite: Arc<SqliteDb>,

    /// Remote pricing function
    pub pricing: Arc<dyn PricingGateway>,

    /// In-progress estimates keyed by pipeline entry
    pub sessions: DashMap<String, EstimateSession>,

    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        tracing::info!("Data directory: {:?}", config.data_dir);

        let sqlite = Arc::new(SqliteDb::new(&config.database_path())?);

        let pricing: Arc<dyn PricingGateway> = match &config.pricing_url {
            Some(url) => Arc::new(HttpPricingGateway::new(
                url.clone(),
                config.pricing_api_key.clone(),
                config.pricing_timeout,
            )?),
            None => {
                tracing::warn!("ROOFLINE_PRICING_URL not set; calculations will be rejected");
                Arc::new(UnconfiguredPricingGateway)
            }
        };

        Ok(Self::with_parts(sqlite, pricing, config))
    }

    /// Assemble state from already-built parts
    pub fn with_parts(
        sqlite: Arc<SqliteDb>,
        pricing: Arc<dyn PricingGateway>,
        config: AppConfig,
    ) -> Self {
        tracing::info!("Using {} pricing gateway", pricing.name());
        Self {
            sqlite,
            pricing,
            sessions: DashMap::new(),
            config,
        }
    }

    /// Session for a pipeline entry, created on first use
    pub fn session_mut(&self, pipeline_entry_id: &str) -> RefMut<'_, String, EstimateSession> {
        self.sessions
            .entry(pipeline_entry_id.to_string())
            .or_insert_with(|| EstimateSession::new(pipeline_entry_id))
    }

    /// Existing session for a pipeline entry
    pub fn existing_session_mut(
        &self,
        pipeline_entry_id: &str,
    ) -> Result<RefMut<'_, String, EstimateSession>> {
        self.sessions.get_mut(pipeline_entry_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "No estimate in progress for pipeline entry {}",
                pipeline_entry_id
            ))
        })
    }

    /// Snapshot of a session
    pub fn get_session(&self, pipeline_entry_id: &str) -> Option<EstimateSession> {
        self.sessions.get(pipeline_entry_id).map(|s| s.clone())
    }

    /// Drop a session, invalidating anything still in flight for it
    pub fn discard_session(&self, pipeline_entry_id: &str) -> bool {
        self.sessions.remove(pipeline_entry_id).is_some()
    }
}
