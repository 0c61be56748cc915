//! Measurement normalizer
//!
//! Resolves one upstream measurement source by precedence and reduces it to
//! a canonical [`MeasurementSet`]. Both the source precedence and the area
//! fallback chain are ordered lists of named strategies so each policy can
//! be exercised on its own.

use super::pitch::PitchMultiplierTable;
use super::types::*;
use crate::error::{AppError, Result};
use serde::Serialize;

/// Waste percentage assumed when no source records one
pub const DEFAULT_WASTE_PERCENT: f64 = 10.0;

/// Every upstream measurement available for one estimate
#[derive(Debug, Clone, Default)]
pub struct MeasurementCandidates {
    pub verified: Option<VerifiedMeasurement>,
    pub cached: Option<SatelliteMeasurement>,
    pub manual: Option<ManualEntry>,
}

/// The measurement source that won precedence
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementSource {
    Verified(VerifiedMeasurement),
    Cached(SatelliteMeasurement),
    Manual(ManualEntry),
}

impl MeasurementSource {
    pub fn label(&self) -> &'static str {
        match self {
            MeasurementSource::Verified(_) => "verified",
            MeasurementSource::Cached(_) => "cached",
            MeasurementSource::Manual(_) => "manual",
        }
    }
}

type SourceStrategy = fn(&MeasurementCandidates) -> Option<MeasurementSource>;

/// Active verified record > pipeline metadata cache > manual entry
const SOURCE_PRECEDENCE: [(&str, SourceStrategy); 3] = [
    ("active_verified", active_verified),
    ("metadata_cache", metadata_cache),
    ("manual_entry", manual_entry),
];

fn active_verified(candidates: &MeasurementCandidates) -> Option<MeasurementSource> {
    candidates
        .verified
        .as_ref()
        .filter(|record| record.is_active)
        .cloned()
        .map(MeasurementSource::Verified)
}

fn metadata_cache(candidates: &MeasurementCandidates) -> Option<MeasurementSource> {
    candidates.cached.clone().map(MeasurementSource::Cached)
}

fn manual_entry(candidates: &MeasurementCandidates) -> Option<MeasurementSource> {
    candidates.manual.clone().map(MeasurementSource::Manual)
}

/// Pick the highest-precedence source present
pub fn resolve_source(candidates: &MeasurementCandidates) -> Option<MeasurementSource> {
    SOURCE_PRECEDENCE.iter().find_map(|(name, strategy)| {
        let source = strategy(candidates);
        if source.is_some() {
            tracing::debug!("Measurement source resolved by {}", name);
        }
        source
    })
}

/// Figures the area fallback chain draws on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaInputs {
    pub adjusted_squares: Option<f64>,
    pub summary_total_squares: Option<f64>,
    pub summary_total_area_sqft: Option<f64>,
    pub manual_area_sqft: Option<f64>,
    pub pitch: String,
    pub waste_percent: f64,
}

type AreaStrategy = fn(&AreaInputs) -> Option<f64>;

const AREA_FALLBACK_CHAIN: [(&str, AreaStrategy); 4] = [
    ("adjusted_squares", adjusted_squares),
    ("summary_total_squares", summary_total_squares),
    ("summary_total_area", summary_total_area),
    ("manual_area", manual_area),
];

fn adjusted_squares(inputs: &AreaInputs) -> Option<f64> {
    inputs.adjusted_squares
}

fn summary_total_squares(inputs: &AreaInputs) -> Option<f64> {
    inputs.summary_total_squares
}

fn summary_total_area(inputs: &AreaInputs) -> Option<f64> {
    inputs.summary_total_area_sqft.map(|area| area / 100.0)
}

/// Footprint area adjusted for slope and waste
fn manual_area(inputs: &AreaInputs) -> Option<f64> {
    inputs.manual_area_sqft.map(|area| {
        area * PitchMultiplierTable::multiplier(&inputs.pitch) * (1.0 + inputs.waste_percent / 100.0)
            / 100.0
    })
}

/// Walk the area chain; the first positive figure wins.
///
/// Returns the squares and the name of the step that produced them, or
/// `(0.0, None)` when every step is empty.
pub fn resolve_squares(inputs: &AreaInputs) -> (f64, Option<&'static str>) {
    AREA_FALLBACK_CHAIN
        .iter()
        .find_map(|(name, strategy)| {
            strategy(inputs)
                .filter(|squares| squares.is_finite() && *squares > 0.0)
                .map(|squares| (squares, Some(*name)))
        })
        .unwrap_or((0.0, None))
}

/// Normalizer output with provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMeasurement {
    pub measurement: MeasurementSet,
    pub source: &'static str,
    pub area_strategy: Option<&'static str>,
}

/// Reduce the available candidates to a canonical MeasurementSet.
///
/// Fails only when no source exists at all. A resolved source with no
/// usable area yields a set with `total_squares == 0`, which downstream
/// derivation rejects as incomplete.
pub fn normalize(candidates: &MeasurementCandidates) -> Result<NormalizedMeasurement> {
    let source = resolve_source(candidates).ok_or_else(|| {
        AppError::IncompleteMeasurement("No measurement source is available".to_string())
    })?;

    let manual = candidates.manual.as_ref();
    let mut set = MeasurementSet::default();
    let mut inputs = AreaInputs {
        manual_area_sqft: manual.map(|m| m.roof_area_sq_ft),
        ..Default::default()
    };
    let mut complexity = None;
    let mut perimeter = None;
    let mut pitch = None;
    let mut waste = None;

    match &source {
        MeasurementSource::Verified(record) => {
            let summary = &record.summary;
            inputs.summary_total_squares = summary.total_squares;
            inputs.summary_total_area_sqft = summary.total_area_sqft;
            pitch = summary.pitch.clone();
            waste = summary.waste_percent;
            complexity = summary.complexity;
            perimeter = summary.perimeter_ft.or_else(|| record.linear_features.perimeter());
            fill_linear(&mut set, |kind| record.linear_features.length(kind));
        }
        MeasurementSource::Cached(satellite) => {
            inputs.adjusted_squares = satellite.adjusted_squares;
            inputs.summary_total_area_sqft = satellite.total_area_sqft;
            pitch = satellite.pitch.clone();
            waste = satellite.adjusted_waste_percent;
            perimeter = satellite.perimeter_ft.or_else(|| {
                satellite
                    .linear_features
                    .as_ref()
                    .and_then(|features| features.perimeter())
            });
            fill_linear(&mut set, |kind| satellite.length(kind));
        }
        MeasurementSource::Manual(_) => {}
    }

    let pitch = pitch
        .filter(|p| !p.trim().is_empty())
        .or_else(|| manual.and_then(|m| m.pitch.clone()))
        .unwrap_or_default();
    let waste_percent = waste
        .or_else(|| manual.and_then(|m| m.waste_percent))
        .filter(|w| w.is_finite() && *w >= 0.0)
        .unwrap_or(DEFAULT_WASTE_PERCENT);

    inputs.pitch = pitch.clone();
    inputs.waste_percent = waste_percent;

    let (squares, area_strategy) = resolve_squares(&inputs);

    set.total_squares = squares;
    set.total_area_sqft = squares * 100.0;
    set.pitch = pitch;
    set.waste_percent = waste_percent;
    set.complexity = complexity
        .or_else(|| manual.and_then(|m| m.complexity))
        .unwrap_or_else(|| Complexity::from_pitch(&set.pitch));

    set.perimeter_ft = match perimeter.map(sanitize_length) {
        Some(p) if p > 0.0 => p,
        _ => set.eave_ft + set.rake_ft,
    };

    if !set.is_complete() {
        tracing::warn!(
            "Measurement from {} source resolved to zero squares",
            source.label()
        );
    }

    Ok(NormalizedMeasurement {
        measurement: set,
        source: source.label(),
        area_strategy,
    })
}

fn fill_linear(set: &mut MeasurementSet, length: impl Fn(LinearFeatureKind) -> f64) {
    set.ridge_ft = length(LinearFeatureKind::Ridge);
    set.hip_ft = length(LinearFeatureKind::Hip);
    set.valley_ft = length(LinearFeatureKind::Valley);
    set.eave_ft = length(LinearFeatureKind::Eave);
    set.rake_ft = length(LinearFeatureKind::Rake);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn verified(is_active: bool, squares: Option<f64>) -> VerifiedMeasurement {
        VerifiedMeasurement {
            id: 1,
            property_id: "prop-1".to_string(),
            is_active,
            source: "eagleview".to_string(),
            summary: MeasurementSummary {
                total_squares: squares,
                pitch: Some("6/12".to_string()),
                ..Default::default()
            },
            linear_features: LinearFeatures::Records(vec![LinearFeatureRecord {
                kind: "ridge".to_string(),
                length_ft: 60.0,
            }]),
            created_at: chrono::Utc::now(),
        }
    }

    fn satellite() -> SatelliteMeasurement {
        SatelliteMeasurement {
            adjusted_squares: Some(25.0),
            adjusted_waste_percent: Some(10.0),
            ridge_ft: Some(40.0),
            hip_ft: Some(10.0),
            eave_ft: Some(120.0),
            rake_ft: Some(60.0),
            valley_ft: Some(0.0),
            perimeter_ft: Some(180.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_active_verified_wins() {
        let candidates = MeasurementCandidates {
            verified: Some(verified(true, Some(31.0))),
            cached: Some(satellite()),
            manual: Some(ManualEntry {
                roof_area_sq_ft: 1800.0,
                ..Default::default()
            }),
        };

        let normalized = normalize(&candidates).unwrap();
        assert_eq!(normalized.source, "verified");
        assert_eq!(normalized.area_strategy, Some("summary_total_squares"));
        assert_eq!(normalized.measurement.total_squares, 31.0);
        assert_eq!(normalized.measurement.ridge_ft, 60.0);
    }

    #[test]
    fn test_inactive_verified_falls_through_to_cache() {
        let candidates = MeasurementCandidates {
            verified: Some(verified(false, Some(31.0))),
            cached: Some(satellite()),
            manual: None,
        };

        let normalized = normalize(&candidates).unwrap();
        assert_eq!(normalized.source, "cached");
        assert_eq!(normalized.measurement.total_squares, 25.0);
        assert_eq!(normalized.measurement.total_area_sqft, 2500.0);
    }

    #[test]
    fn test_manual_entry_uses_pitch_and_waste() {
        let candidates = MeasurementCandidates {
            manual: Some(ManualEntry {
                roof_area_sq_ft: 2000.0,
                pitch: Some("4/12".to_string()),
                waste_percent: Some(10.0),
                complexity: None,
            }),
            ..Default::default()
        };

        let normalized = normalize(&candidates).unwrap();
        let expected = 2000.0 * 1.0541 * 1.10 / 100.0;
        assert_eq!(normalized.source, "manual");
        assert_eq!(normalized.area_strategy, Some("manual_area"));
        assert!((normalized.measurement.total_squares - expected).abs() < 1e-9);
        assert_eq!(normalized.measurement.complexity, Complexity::Simple);
    }

    #[test]
    fn test_area_chain_order() {
        let mut inputs = AreaInputs {
            adjusted_squares: Some(0.0),
            summary_total_squares: None,
            summary_total_area_sqft: Some(2200.0),
            manual_area_sqft: Some(1000.0),
            pitch: "6/12".to_string(),
            waste_percent: 10.0,
        };
        assert_eq!(resolve_squares(&inputs), (22.0, Some("summary_total_area")));

        inputs.summary_total_area_sqft = Some(0.0);
        let (squares, step) = resolve_squares(&inputs);
        assert_eq!(step, Some("manual_area"));
        assert!((squares - 1000.0 * 1.1180 * 1.1 / 100.0).abs() < 1e-9);

        inputs.manual_area_sqft = None;
        assert_eq!(resolve_squares(&inputs), (0.0, None));
    }

    #[test]
    fn test_zero_area_yields_incomplete_set() {
        let candidates = MeasurementCandidates {
            manual: Some(ManualEntry::default()),
            ..Default::default()
        };

        let normalized = normalize(&candidates).unwrap();
        assert_eq!(normalized.measurement.total_squares, 0.0);
        assert!(!normalized.measurement.is_complete());
    }

    #[test]
    fn test_no_source_is_an_error() {
        let result = normalize(&MeasurementCandidates::default());
        assert!(matches!(result, Err(AppError::IncompleteMeasurement(_))));
    }

    #[test]
    fn test_perimeter_derived_from_edges_when_absent() {
        let mut keyed = BTreeMap::new();
        keyed.insert("eave".to_string(), serde_json::json!(100));
        keyed.insert("rake".to_string(), serde_json::json!(50));
        let cached = SatelliteMeasurement {
            adjusted_squares: Some(18.0),
            linear_features: Some(LinearFeatures::Keyed(keyed)),
            ..Default::default()
        };

        let normalized = normalize(&MeasurementCandidates {
            cached: Some(cached),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(normalized.measurement.perimeter_ft, 150.0);
        assert_eq!(normalized.measurement.waste_percent, DEFAULT_WASTE_PERCENT);
    }
}
