//! Estimate line items, pricing configuration and the pricing-function
//! request/response contract

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Line Items
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineItemCategory {
    Material,
    Labor,
    Equipment,
    Other,
}

impl fmt::Display for LineItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LineItemCategory::Material => "material",
            LineItemCategory::Labor => "labor",
            LineItemCategory::Equipment => "equipment",
            LineItemCategory::Other => "other",
        };
        f.write_str(label)
    }
}

/// One purchasable or billable estimate line.
///
/// `markup_percent` is stored as entered and only applied when pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub category: LineItemCategory,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub unit_type: String,
    #[serde(default)]
    pub markup_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price_updated: Option<DateTime<Utc>>,
}

impl LineItem {
    /// Quantity times unit cost, before markup
    pub fn extended_cost(&self) -> f64 {
        self.quantity * self.unit_cost
    }

    /// Extended cost with markup applied
    pub fn marked_up_total(&self) -> f64 {
        self.extended_cost() * (1.0 + self.markup_percent / 100.0)
    }
}

/// Reject line items that cannot be submitted for pricing
pub fn validate_line_items(items: &[LineItem]) -> Result<()> {
    if items.is_empty() {
        return Err(AppError::Validation(
            "At least one line item is required".to_string(),
        ));
    }

    for (index, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Line item {} is missing a name",
                index + 1
            )));
        }
        if !item.quantity.is_finite() || item.quantity <= 0.0 {
            return Err(AppError::Validation(format!(
                "Line item '{}' must have a quantity greater than zero",
                item.name
            )));
        }
        if !item.unit_cost.is_finite() || item.unit_cost < 0.0 {
            return Err(AppError::Validation(format!(
                "Line item '{}' has an invalid unit cost",
                item.name
            )));
        }
        if !item.markup_percent.is_finite() || item.markup_percent < 0.0 {
            return Err(AppError::Validation(format!(
                "Line item '{}' has an invalid markup",
                item.name
            )));
        }
    }

    Ok(())
}

// ============================================================================
// Pricing Configuration
// ============================================================================

/// Inclusive percentage range enforced for one pricing setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentRange {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
}

impl PercentRange {
    fn check(&self, value: f64) -> Result<()> {
        if value.is_finite() && value >= self.min && value <= self.max {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{} must be between {}% and {}% (got {})",
                self.field, self.min, self.max, value
            )))
        }
    }
}

pub const TARGET_MARGIN_RANGE: PercentRange = PercentRange {
    field: "target_margin_percent",
    min: 15.0,
    max: 50.0,
};
pub const OVERHEAD_RANGE: PercentRange = PercentRange {
    field: "overhead_percent",
    min: 0.0,
    max: 30.0,
};
pub const COMMISSION_RANGE: PercentRange = PercentRange {
    field: "commission_percent",
    min: 0.0,
    max: 20.0,
};
pub const WASTE_FACTOR_RANGE: PercentRange = PercentRange {
    field: "waste_factor_percent",
    min: 0.0,
    max: 30.0,
};
pub const CONTINGENCY_RANGE: PercentRange = PercentRange {
    field: "contingency_percent",
    min: 0.0,
    max: 20.0,
};

/// Guarantees the remote pricing function must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub target_margin_percent: f64,
    pub overhead_percent: f64,
    pub commission_percent: f64,
    pub waste_factor_percent: f64,
    pub contingency_percent: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            target_margin_percent: 30.0,
            overhead_percent: 10.0,
            commission_percent: 5.0,
            waste_factor_percent: 10.0,
            contingency_percent: 0.0,
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<()> {
        TARGET_MARGIN_RANGE.check(self.target_margin_percent)?;
        OVERHEAD_RANGE.check(self.overhead_percent)?;
        COMMISSION_RANGE.check(self.commission_percent)?;
        WASTE_FACTOR_RANGE.check(self.waste_factor_percent)?;
        CONTINGENCY_RANGE.check(self.contingency_percent)?;
        Ok(())
    }
}

// ============================================================================
// Calculation Request
// ============================================================================

/// Edge lengths forwarded with the property details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearMeasurements {
    pub ridge_ft: f64,
    pub hip_ft: f64,
    pub valley_ft: f64,
    pub eave_ft: f64,
    pub rake_ft: f64,
    pub perimeter_ft: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub roof_area_sq_ft: f64,
    #[serde(default)]
    pub roof_type: String,
    #[serde(default)]
    pub complexity_level: String,
    #[serde(default)]
    pub roof_pitch: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_measurements: Option<LinearMeasurements>,
}

impl PropertyDetails {
    /// Required fields block submission
    pub fn validate(&self) -> Result<()> {
        if self.customer_name.trim().is_empty() {
            return Err(AppError::Validation("Customer name is required".to_string()));
        }
        if !self.roof_area_sq_ft.is_finite() || self.roof_area_sq_ft <= 0.0 {
            return Err(AppError::Validation("Roof area is required".to_string()));
        }
        Ok(())
    }
}

/// Line item as sent to the pricing function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLineItem {
    pub category: LineItemCategory,
    pub name: String,
    pub description: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub unit_type: String,
    pub markup_percent: f64,
}

impl From<&LineItem> for RequestLineItem {
    fn from(item: &LineItem) -> Self {
        Self {
            category: item.category,
            name: item.name.clone(),
            description: item.description.clone(),
            quantity: item.quantity,
            unit_cost: item.unit_cost,
            unit_type: item.unit_type.clone(),
            markup_percent: item.markup_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub pipeline_entry_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
    pub property_details: PropertyDetails,
    pub line_items: Vec<RequestLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_rep_id: Option<String>,
    #[serde(flatten)]
    pub pricing: PricingConfig,
}

impl CalculationRequest {
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_entry_id.trim().is_empty() {
            return Err(AppError::Validation("Pipeline entry is required".to_string()));
        }
        self.property_details.validate()?;
        if self.line_items.is_empty() {
            return Err(AppError::Validation(
                "At least one line item is required".to_string(),
            ));
        }
        if let Some(item) = self
            .line_items
            .iter()
            .find(|item| !item.quantity.is_finite() || item.quantity <= 0.0)
        {
            return Err(AppError::Validation(format!(
                "Line item '{}' must have a quantity greater than zero",
                item.name
            )));
        }
        self.pricing.validate()
    }
}

// ============================================================================
// Calculation Response
// ============================================================================

/// Figures computed by the pricing function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calculations {
    pub material_total: f64,
    pub labor_total: f64,
    pub subtotal: f64,
    pub overhead_amount: f64,
    pub sales_rep_commission_amount: f64,
    pub target_profit_amount: f64,
    pub selling_price: f64,
    pub price_per_sq_ft: f64,
    pub actual_profit_percent: f64,
    pub labor_hours: f64,
    /// Any additional figures the function reports
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Estimate record echoed back by the pricing function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteEstimate {
    #[serde(default)]
    pub estimate_number: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResponse {
    pub calculations: Calculations,
    #[serde(default)]
    pub estimate: Option<RemoteEstimate>,
}
