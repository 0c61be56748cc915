//! Line-item materializer
//!
//! Turns a MeasurementSet into purchasable line items. Each material family
//! is packaged by ceiling-dividing a measured length by the family's
//! coverage, never emitting fewer than one unit. Output order and values
//! depend only on the inputs, so re-running on an unchanged measurement
//! regenerates the same list.

use crate::error::{AppError, Result};
use crate::measurement::MeasurementSet;
use crate::pricing::{LineItem, LineItemCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coverage constants used to package each material family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingRules {
    /// Linear feet of ridge/hip covered by one ridge-cap bundle
    pub ridge_cap_lf_per_bundle: f64,
    /// Linear feet of eave/rake covered by one starter-strip bundle
    pub starter_lf_per_bundle: f64,
    /// Linear feet covered by one ice-and-water roll
    pub ice_water_lf_per_roll: f64,
    /// Share of eave length that receives ice-and-water membrane
    pub ice_water_eave_fraction: f64,
    /// Linear feet per drip-edge piece
    pub drip_edge_lf_per_piece: f64,
    /// Linear feet per valley-liner roll
    pub valley_lf_per_roll: f64,
}

impl Default for PackagingRules {
    fn default() -> Self {
        Self {
            ridge_cap_lf_per_bundle: 3.0,
            starter_lf_per_bundle: 100.0,
            ice_water_lf_per_roll: 65.0,
            ice_water_eave_fraction: 0.25,
            drip_edge_lf_per_piece: 10.0,
            valley_lf_per_roll: 50.0,
        }
    }
}

impl PackagingRules {
    /// Coverages must be positive; the eave fraction must lie in 0..=1
    pub fn validate(&self) -> Result<()> {
        let coverages = [
            ("ridge_cap_lf_per_bundle", self.ridge_cap_lf_per_bundle),
            ("starter_lf_per_bundle", self.starter_lf_per_bundle),
            ("ice_water_lf_per_roll", self.ice_water_lf_per_roll),
            ("drip_edge_lf_per_piece", self.drip_edge_lf_per_piece),
            ("valley_lf_per_roll", self.valley_lf_per_roll),
        ];

        if let Some((field, value)) = coverages
            .iter()
            .find(|(_, value)| !value.is_finite() || *value <= 0.0)
        {
            return Err(AppError::Validation(format!(
                "{} must be greater than zero (got {})",
                field, value
            )));
        }

        let fraction = self.ice_water_eave_fraction;
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(AppError::Validation(format!(
                "ice_water_eave_fraction must be between 0 and 1 (got {})",
                fraction
            )));
        }

        Ok(())
    }
}

/// Whole packages needed to cover `length`, at least one
pub fn packages(length: f64, coverage: f64) -> f64 {
    if !coverage.is_finite() || coverage <= 0.0 || !length.is_finite() || length <= 0.0 {
        return 1.0;
    }
    (length / coverage).ceil().max(1.0)
}

/// Material families the materializer emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialFamily {
    Shingles,
    RidgeCap,
    StarterStrip,
    IceAndWater,
    DripEdge,
    ValleyMaterial,
    InstallationLabor,
}

impl MaterialFamily {
    pub fn sku(&self) -> &'static str {
        match self {
            MaterialFamily::Shingles => "SHG-ARCH-SQ",
            MaterialFamily::RidgeCap => "RDG-CAP-BDL",
            MaterialFamily::StarterStrip => "STR-STRIP-BDL",
            MaterialFamily::IceAndWater => "ICE-WTR-RL",
            MaterialFamily::DripEdge => "DRP-EDGE-10",
            MaterialFamily::ValleyMaterial => "VLY-LINER-RL",
            MaterialFamily::InstallationLabor => "LBR-INSTALL-SQ",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            MaterialFamily::Shingles => "Architectural Shingles",
            MaterialFamily::RidgeCap => "Ridge Cap",
            MaterialFamily::StarterStrip => "Starter Strip",
            MaterialFamily::IceAndWater => "Ice & Water Shield",
            MaterialFamily::DripEdge => "Drip Edge",
            MaterialFamily::ValleyMaterial => "Valley Material",
            MaterialFamily::InstallationLabor => "Installation Labor",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            MaterialFamily::Shingles => "Laminated shingles, waste included",
            MaterialFamily::RidgeCap => "Ridge and hip cap shingles",
            MaterialFamily::StarterStrip => "Starter course for eaves and rakes",
            MaterialFamily::IceAndWater => "Self-adhered membrane for valleys and eaves",
            MaterialFamily::DripEdge => "10 ft aluminum drip edge",
            MaterialFamily::ValleyMaterial => "Valley liner",
            MaterialFamily::InstallationLabor => "Tear-off and installation",
        }
    }

    fn unit_type(&self) -> &'static str {
        match self {
            MaterialFamily::Shingles | MaterialFamily::InstallationLabor => "square",
            MaterialFamily::RidgeCap | MaterialFamily::StarterStrip => "bundle",
            MaterialFamily::IceAndWater | MaterialFamily::ValleyMaterial => "roll",
            MaterialFamily::DripEdge => "piece",
        }
    }

    fn category(&self) -> LineItemCategory {
        match self {
            MaterialFamily::InstallationLabor => LineItemCategory::Labor,
            _ => LineItemCategory::Material,
        }
    }

    /// Unit cost used when the catalog has no price for the SKU
    pub fn default_unit_cost(&self) -> f64 {
        match self {
            MaterialFamily::Shingles => 115.0,
            MaterialFamily::RidgeCap => 65.0,
            MaterialFamily::StarterStrip => 55.0,
            MaterialFamily::IceAndWater => 95.0,
            MaterialFamily::DripEdge => 12.5,
            MaterialFamily::ValleyMaterial => 85.0,
            MaterialFamily::InstallationLabor => 85.0,
        }
    }
}

/// Catalog price for one SKU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPrice {
    pub unit_cost: f64,
    pub last_price_updated: Option<DateTime<Utc>>,
}

/// SKU-keyed unit costs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBook {
    prices: HashMap<String, CatalogPrice>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sku: impl Into<String>, price: CatalogPrice) {
        self.prices.insert(sku.into(), price);
    }

    pub fn get(&self, sku: &str) -> Option<&CatalogPrice> {
        self.prices.get(sku)
    }
}

/// Derive the default line-item list for a measurement.
///
/// Refuses incomplete measurements instead of emitting zero quantities.
pub fn materialize(
    set: &MeasurementSet,
    rules: &PackagingRules,
    prices: &PriceBook,
) -> Result<Vec<LineItem>> {
    if !set.is_complete() {
        return Err(AppError::IncompleteMeasurement(
            "Total squares is zero; measure the roof before generating line items".to_string(),
        ));
    }

    let squares = set.total_squares.ceil();
    let mut plan = vec![
        (MaterialFamily::Shingles, squares),
        (
            MaterialFamily::RidgeCap,
            packages(set.ridge_ft + set.hip_ft, rules.ridge_cap_lf_per_bundle),
        ),
        (
            MaterialFamily::StarterStrip,
            packages(set.eave_ft + set.rake_ft, rules.starter_lf_per_bundle),
        ),
        (
            MaterialFamily::IceAndWater,
            packages(
                set.valley_ft + set.eave_ft * rules.ice_water_eave_fraction,
                rules.ice_water_lf_per_roll,
            ),
        ),
        (
            MaterialFamily::DripEdge,
            packages(set.perimeter_ft, rules.drip_edge_lf_per_piece),
        ),
    ];

    if set.valley_ft > 0.0 {
        plan.push((
            MaterialFamily::ValleyMaterial,
            packages(set.valley_ft, rules.valley_lf_per_roll),
        ));
    }

    plan.push((MaterialFamily::InstallationLabor, squares));

    let items: Vec<LineItem> = plan
        .into_iter()
        .map(|(family, quantity)| line_item(family, quantity, prices))
        .collect();

    tracing::debug!(
        "Materialized {} line items for {:.2} squares",
        items.len(),
        set.total_squares
    );

    Ok(items)
}

fn line_item(family: MaterialFamily, quantity: f64, prices: &PriceBook) -> LineItem {
    let catalog = prices.get(family.sku());
    LineItem {
        category: family.category(),
        name: family.name().to_string(),
        description: family.description().to_string(),
        quantity,
        unit_cost: catalog
            .map(|price| price.unit_cost)
            .unwrap_or_else(|| family.default_unit_cost()),
        unit_type: family.unit_type().to_string(),
        markup_percent: 0.0,
        sku: Some(family.sku().to_string()),
        last_price_updated: catalog.and_then(|price| price.last_price_updated),
    }
}
