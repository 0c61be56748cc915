//! SQLite database models

use crate::measurement::{LinearFeatures, MeasurementSummary, SatelliteMeasurement};
use crate::pricing::{Calculations, LineItem, LineItemCategory, PricingConfig, PropertyDetails};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verified measurement to be stored for a property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVerifiedMeasurement {
    pub property_id: String,
    #[serde(default = "default_measurement_source")]
    pub source: String,
    pub summary: MeasurementSummary,
    pub linear_features: LinearFeatures,
}

fn default_measurement_source() -> String {
    "manual".to_string()
}

/// Satellite measurement cached against a pipeline entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub pipeline_entry_id: String,
    pub property_id: Option<String>,
    pub measurement: Option<SatelliteMeasurement>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub id: i64,
    pub estimate_number: String,
    pub pipeline_entry_id: String,
    pub template_id: Option<i64>,
    pub sales_rep_id: Option<String>,
    pub property_details: PropertyDetails,
    pub line_items: Vec<LineItem>,
    pub pricing: PricingConfig,
    pub calculations: Calculations,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row for estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateSummary {
    pub id: i64,
    pub estimate_number: String,
    pub pipeline_entry_id: String,
    pub customer_name: String,
    pub roof_area_sq_ft: f64,
    pub selling_price: f64,
    pub actual_profit_percent: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Estimate contents written on save
#[derive(Debug, Clone)]
pub struct NewEstimate<'a> {
    pub pipeline_entry_id: &'a str,
    pub template_id: Option<i64>,
    pub sales_rep_id: Option<&'a str>,
    pub property_details: &'a PropertyDetails,
    pub line_items: &'a [LineItem],
    pub pricing: &'a PricingConfig,
    pub calculations: &'a Calculations,
}

/// Template line whose quantity is computed from the measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateItem {
    pub category: LineItemCategory,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity_formula: String,
    pub unit_cost: f64,
    pub unit_type: String,
    #[serde(default)]
    pub markup_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

/// Named estimate template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateTemplate {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub roof_type: Option<String>,
    pub items: Vec<TemplateItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Template definition submitted for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub roof_type: Option<String>,
    pub items: Vec<TemplateItem>,
}

/// Catalog entry keyed by SKU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub name: String,
    pub unit_cost: f64,
    pub unit_type: String,
    pub last_price_updated: DateTime<Utc>,
}

/// Partial update of the stored pricing defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingDefaultsUpdate {
    pub target_margin_percent: Option<f64>,
    pub overhead_percent: Option<f64>,
    pub commission_percent: Option<f64>,
    pub waste_factor_percent: Option<f64>,
    pub contingency_percent: Option<f64>,
}

impl PricingDefaultsUpdate {
    /// Overlay the provided fields on `current`
    pub fn apply_to(&self, current: &PricingConfig) -> PricingConfig {
        PricingConfig {
            target_margin_percent: self
                .target_margin_percent
                .unwrap_or(current.target_margin_percent),
            overhead_percent: self.overhead_percent.unwrap_or(current.overhead_percent),
            commission_percent: self.commission_percent.unwrap_or(current.commission_percent),
            waste_factor_percent: self
                .waste_factor_percent
                .unwrap_or(current.waste_factor_percent),
            contingency_percent: self
                .contingency_percent
                .unwrap_or(current.contingency_percent),
        }
    }
}
