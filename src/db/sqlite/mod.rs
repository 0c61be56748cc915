//! SQLite database module

pub mod models;
mod catalog;
mod estimates;
mod measurements;
mod migrations;
mod settings;
mod templates;

use crate::error::Result;
use crate::materializer::{PackagingRules, PriceBook};
use crate::measurement::{SatelliteMeasurement, VerifiedMeasurement};
use crate::pricing::PricingConfig;
pub use estimates::format_estimate_number;
use models::*;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Create new SQLite database connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a save is in progress
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// In-memory database, used by tests and ephemeral runs
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Measurement Methods ==========

    /// Store a verified measurement
    pub fn insert_verified_measurement(
        &self,
        measurement: &NewVerifiedMeasurement,
    ) -> Result<VerifiedMeasurement> {
        let conn = self.conn.lock();
        measurements::insert_verified_measurement(&conn, measurement)
    }

    /// List measurements recorded for a property
    pub fn list_verified_measurements(&self, property_id: &str) -> Result<Vec<VerifiedMeasurement>> {
        let conn = self.conn.lock();
        measurements::list_verified_measurements(&conn, property_id)
    }

    /// Most recent active measurement for a property
    pub fn latest_active_measurement(&self, property_id: &str) -> Result<Option<VerifiedMeasurement>> {
        let conn = self.conn.lock();
        measurements::latest_active_measurement(&conn, property_id)
    }

    /// Clear active measurements for a property
    pub fn deactivate_measurements(&self, property_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        measurements::deactivate_measurements(&conn, property_id)
    }

    // ========== Pipeline Metadata Methods ==========

    /// Cache a satellite measurement against a pipeline entry
    pub fn upsert_pipeline_metadata(
        &self,
        pipeline_entry_id: &str,
        property_id: Option<&str>,
        measurement: Option<&SatelliteMeasurement>,
    ) -> Result<PipelineMetadata> {
        let conn = self.conn.lock();
        measurements::upsert_pipeline_metadata(&conn, pipeline_entry_id, property_id, measurement)
    }

    /// Read cached metadata for a pipeline entry
    pub fn get_pipeline_metadata(&self, pipeline_entry_id: &str) -> Result<Option<PipelineMetadata>> {
        let conn = self.conn.lock();
        measurements::get_pipeline_metadata(&conn, pipeline_entry_id)
    }

    // ========== Estimate Methods ==========

    /// Insert or re-save an estimate
    pub fn save_estimate(
        &self,
        estimate: &NewEstimate<'_>,
        estimate_number: Option<&str>,
    ) -> Result<EstimateRecord> {
        let mut conn = self.conn.lock();
        estimates::save_estimate(&mut conn, estimate, estimate_number)
    }

    /// Get estimate by number
    pub fn get_estimate_by_number(&self, estimate_number: &str) -> Result<EstimateRecord> {
        let conn = self.conn.lock();
        estimates::get_estimate_by_number(&conn, estimate_number)
    }

    /// List recent estimates
    pub fn list_estimates(&self, limit: u32) -> Result<Vec<EstimateSummary>> {
        let conn = self.conn.lock();
        estimates::list_estimates(&conn, limit)
    }

    // ========== Template Methods ==========

    /// Get all templates
    pub fn get_templates(&self) -> Result<Vec<EstimateTemplate>> {
        let conn = self.conn.lock();
        templates::get_templates(&conn)
    }

    /// Get template by ID
    pub fn get_template(&self, id: i64) -> Result<EstimateTemplate> {
        let conn = self.conn.lock();
        templates::get_template(&conn, id)
    }

    /// Create a template
    pub fn create_template(&self, template: &NewTemplate) -> Result<EstimateTemplate> {
        let conn = self.conn.lock();
        templates::create_template(&conn, template)
    }

    /// Delete a template
    pub fn delete_template(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        templates::delete_template(&conn, id)
    }

    // ========== Catalog Methods ==========

    /// Get catalog items
    pub fn get_catalog(&self) -> Result<Vec<CatalogItem>> {
        let conn = self.conn.lock();
        catalog::get_catalog(&conn)
    }

    /// Set a SKU price
    pub fn upsert_catalog_price(
        &self,
        sku: &str,
        name: &str,
        unit_cost: f64,
        unit_type: &str,
    ) -> Result<CatalogItem> {
        let conn = self.conn.lock();
        catalog::upsert_price(&conn, sku, name, unit_cost, unit_type)
    }

    /// Catalog prices as a price book
    pub fn load_price_book(&self) -> Result<PriceBook> {
        let conn = self.conn.lock();
        catalog::load_price_book(&conn)
    }

    // ========== Settings Methods ==========

    /// Get default pricing guarantees
    pub fn get_pricing_defaults(&self) -> Result<PricingConfig> {
        let conn = self.conn.lock();
        settings::get_pricing_defaults(&conn)
    }

    /// Update default pricing guarantees
    pub fn update_pricing_defaults(&self, update: &PricingDefaultsUpdate) -> Result<PricingConfig> {
        let conn = self.conn.lock();
        settings::update_pricing_defaults(&conn, update)
    }

    /// Get packaging rules
    pub fn get_packaging_rules(&self) -> Result<PackagingRules> {
        let conn = self.conn.lock();
        settings::get_packaging_rules(&conn)
    }

    /// Replace packaging rules
    pub fn update_packaging_rules(&self, rules: &PackagingRules) -> Result<PackagingRules> {
        let conn = self.conn.lock();
        settings::update_packaging_rules(&conn, rules)
    }
}

#[cfg(test)]
pub(crate) fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    migrations::run_migrations(&conn).unwrap();
    conn
}
