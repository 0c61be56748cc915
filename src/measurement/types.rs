//! Measurement payload shapes and the canonical MeasurementSet

use super::pitch::PitchMultiplierTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Roof complexity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
    Extreme,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::Extreme => "extreme",
        }
    }

    /// Classify by slope when no explicit complexity was recorded
    pub fn from_pitch(pitch: &str) -> Self {
        match PitchMultiplierTable::rise_per_12(pitch) {
            Some(rise) if rise <= 4.0 => Complexity::Simple,
            Some(rise) if rise <= 7.0 => Complexity::Moderate,
            Some(rise) if rise <= 10.0 => Complexity::Complex,
            Some(_) => Complexity::Extreme,
            None => Complexity::Simple,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "moderate" => Ok(Complexity::Moderate),
            "complex" => Ok(Complexity::Complex),
            "extreme" => Ok(Complexity::Extreme),
            other => Err(format!("Unknown complexity level: {}", other)),
        }
    }
}

/// Canonical bag of named roof quantities
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementSet {
    pub total_area_sqft: f64,
    pub total_squares: f64,
    pub perimeter_ft: f64,
    pub ridge_ft: f64,
    pub hip_ft: f64,
    pub valley_ft: f64,
    pub eave_ft: f64,
    pub rake_ft: f64,
    pub pitch: String,
    pub waste_percent: f64,
    pub complexity: Complexity,
}

impl MeasurementSet {
    /// A set with no resolvable area cannot drive line-item derivation
    pub fn is_complete(&self) -> bool {
        self.total_squares > 0.0
    }
}

/// Edge categories measured in linear feet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearFeatureKind {
    Ridge,
    Hip,
    Valley,
    Eave,
    Rake,
}

impl LinearFeatureKind {
    pub const ALL: [LinearFeatureKind; 5] = [
        LinearFeatureKind::Ridge,
        LinearFeatureKind::Hip,
        LinearFeatureKind::Valley,
        LinearFeatureKind::Eave,
        LinearFeatureKind::Rake,
    ];

    /// Match a feature label from either payload shape.
    ///
    /// Accepts "ridge", "Ridges", "ridge_ft", "ridge_lf" and so on.
    pub fn parse(label: &str) -> Option<Self> {
        let lower = label.trim().to_ascii_lowercase();
        let base = lower
            .strip_suffix("_ft")
            .or_else(|| lower.strip_suffix("_lf"))
            .unwrap_or(&lower);
        let base = base.strip_suffix('s').unwrap_or(base);

        match base {
            "ridge" => Some(LinearFeatureKind::Ridge),
            "hip" => Some(LinearFeatureKind::Hip),
            "valley" => Some(LinearFeatureKind::Valley),
            "eave" => Some(LinearFeatureKind::Eave),
            "rake" => Some(LinearFeatureKind::Rake),
            _ => None,
        }
    }
}

/// One linear feature in array-shaped payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFeatureRecord {
    #[serde(rename = "type", alias = "feature_type")]
    pub kind: String,
    #[serde(default, alias = "length", deserialize_with = "lenient_length")]
    pub length_ft: f64,
}

/// Null, string or otherwise malformed lengths read as zero instead of
/// failing the whole list
fn lenient_length<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(json_number).map(sanitize_length).unwrap_or(0.0))
}

/// Linear features arrive either as `[{type, length_ft}]` or as a flat
/// object keyed by feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinearFeatures {
    Records(Vec<LinearFeatureRecord>),
    Keyed(BTreeMap<String, serde_json::Value>),
}

impl Default for LinearFeatures {
    fn default() -> Self {
        LinearFeatures::Keyed(BTreeMap::new())
    }
}

impl LinearFeatures {
    /// Total length for a feature kind; absent features are zero
    pub fn length(&self, kind: LinearFeatureKind) -> f64 {
        match self {
            LinearFeatures::Records(records) => records
                .iter()
                .filter(|r| LinearFeatureKind::parse(&r.kind) == Some(kind))
                .map(|r| sanitize_length(r.length_ft))
                .sum(),
            LinearFeatures::Keyed(map) => map
                .iter()
                .find(|(key, _)| LinearFeatureKind::parse(key) == Some(kind))
                .map(|(_, value)| sanitize_length(json_number(value)))
                .unwrap_or(0.0),
        }
    }

    /// Perimeter when the keyed shape carries one
    pub fn perimeter(&self) -> Option<f64> {
        match self {
            LinearFeatures::Records(_) => None,
            LinearFeatures::Keyed(map) => ["perimeter_ft", "perimeter"]
                .iter()
                .find_map(|key| map.get(*key))
                .map(|value| sanitize_length(json_number(value))),
        }
    }
}

fn json_number(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Negative or non-finite lengths are treated as missing
pub(crate) fn sanitize_length(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Satellite / solar API measurement result.
///
/// This is also the shape cached in pipeline metadata. Edge lengths may be
/// given as top-level fields, inside `linear_features`, or both; top-level
/// fields win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteMeasurement {
    #[serde(default, alias = "adjustedSquares")]
    pub adjusted_squares: Option<f64>,
    #[serde(default, alias = "adjustedWastePercent")]
    pub adjusted_waste_percent: Option<f64>,
    #[serde(default, alias = "totalAreaSqft")]
    pub total_area_sqft: Option<f64>,
    #[serde(default)]
    pub pitch: Option<String>,
    #[serde(default, alias = "perimeterFt")]
    pub perimeter_ft: Option<f64>,
    #[serde(default)]
    pub ridge_ft: Option<f64>,
    #[serde(default)]
    pub hip_ft: Option<f64>,
    #[serde(default)]
    pub valley_ft: Option<f64>,
    #[serde(default)]
    pub eave_ft: Option<f64>,
    #[serde(default)]
    pub rake_ft: Option<f64>,
    #[serde(default, alias = "linearFeatures")]
    pub linear_features: Option<LinearFeatures>,
}

impl SatelliteMeasurement {
    pub fn length(&self, kind: LinearFeatureKind) -> f64 {
        let explicit = match kind {
            LinearFeatureKind::Ridge => self.ridge_ft,
            LinearFeatureKind::Hip => self.hip_ft,
            LinearFeatureKind::Valley => self.valley_ft,
            LinearFeatureKind::Eave => self.eave_ft,
            LinearFeatureKind::Rake => self.rake_ft,
        };

        match explicit {
            Some(value) => sanitize_length(value),
            None => self
                .linear_features
                .as_ref()
                .map(|features| features.length(kind))
                .unwrap_or(0.0),
        }
    }
}

/// Summary figures stored with a verified measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
    #[serde(default)]
    pub total_area_sqft: Option<f64>,
    #[serde(default)]
    pub total_squares: Option<f64>,
    #[serde(default)]
    pub pitch: Option<String>,
    #[serde(default)]
    pub waste_percent: Option<f64>,
    #[serde(default)]
    pub perimeter_ft: Option<f64>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
}

/// Verified third-party measurement record for a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedMeasurement {
    pub id: i64,
    pub property_id: String,
    pub is_active: bool,
    pub source: String,
    pub summary: MeasurementSummary,
    pub linear_features: LinearFeatures,
    pub created_at: DateTime<Utc>,
}

/// Manually entered property details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualEntry {
    pub roof_area_sq_ft: f64,
    #[serde(default)]
    pub pitch: Option<String>,
    #[serde(default)]
    pub waste_percent: Option<f64>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
}
