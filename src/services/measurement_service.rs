//! Measurement Service
//!
//! Verified measurement records, the pipeline metadata cache, and
//! gathering measurement candidates for an estimate.

use crate::db::sqlite::models::{NewVerifiedMeasurement, PipelineMetadata};
use crate::error::{AppError, Result};
use crate::measurement::{
    ManualEntry, MeasurementCandidates, SatelliteMeasurement, VerifiedMeasurement,
};
use crate::state::AppState;
use tracing::info;

/// Measurement service for business logic
pub struct MeasurementService;

impl MeasurementService {
    /// Record a verified measurement as active for its property
    pub fn record_verified(
        state: &AppState,
        measurement: NewVerifiedMeasurement,
    ) -> Result<VerifiedMeasurement> {
        info!(
            "MeasurementService::record_verified - {}",
            measurement.property_id
        );

        if measurement.property_id.trim().is_empty() {
            return Err(AppError::Validation("Property ID is required".to_string()));
        }

        state.sqlite.insert_verified_measurement(&measurement)
    }

    /// List measurement records for a property
    pub fn list_verified(state: &AppState, property_id: &str) -> Result<Vec<VerifiedMeasurement>> {
        info!("MeasurementService::list_verified - {}", property_id);
        state.sqlite.list_verified_measurements(property_id)
    }

    /// Deactivate all measurement records for a property
    pub fn clear_verified(state: &AppState, property_id: &str) -> Result<usize> {
        info!("MeasurementService::clear_verified - {}", property_id);
        state.sqlite.deactivate_measurements(property_id)
    }

    /// Cache a satellite measurement against a pipeline entry
    pub fn cache_measurement(
        state: &AppState,
        pipeline_entry_id: &str,
        property_id: Option<&str>,
        measurement: Option<&SatelliteMeasurement>,
    ) -> Result<PipelineMetadata> {
        info!("MeasurementService::cache_measurement - {}", pipeline_entry_id);
        state
            .sqlite
            .upsert_pipeline_metadata(pipeline_entry_id, property_id, measurement)
    }

    /// Cached metadata for a pipeline entry
    pub fn get_metadata(state: &AppState, pipeline_entry_id: &str) -> Result<PipelineMetadata> {
        state
            .sqlite
            .get_pipeline_metadata(pipeline_entry_id)?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No metadata for pipeline entry {}",
                    pipeline_entry_id
                ))
            })
    }

    /// Collect every available measurement source for a pipeline entry.
    ///
    /// The property used for the verified lookup is the explicit one when
    /// given, else the property recorded in the pipeline metadata.
    pub fn gather_candidates(
        state: &AppState,
        pipeline_entry_id: &str,
        property_id: Option<&str>,
        manual: Option<ManualEntry>,
    ) -> Result<MeasurementCandidates> {
        let metadata = state.sqlite.get_pipeline_metadata(pipeline_entry_id)?;

        let property_id = property_id.map(str::to_string).or_else(|| {
            metadata
                .as_ref()
                .and_then(|m| m.property_id.clone())
        });

        let verified = match &property_id {
            Some(id) => state.sqlite.latest_active_measurement(id)?,
            None => None,
        };

        Ok(MeasurementCandidates {
            verified,
            cached: metadata.and_then(|m| m.measurement),
            manual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDb;
    use crate::measurement::{normalize, MeasurementSummary};
    use crate::pricing::UnconfiguredPricingGateway;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::with_parts(
            Arc::new(SqliteDb::open_in_memory().unwrap()),
            Arc::new(UnconfiguredPricingGateway),
            Default::default(),
        )
    }

    fn verified(property_id: &str, squares: f64) -> NewVerifiedMeasurement {
        NewVerifiedMeasurement {
            property_id: property_id.to_string(),
            source: "eagleview".to_string(),
            summary: MeasurementSummary {
                total_squares: Some(squares),
                ..Default::default()
            },
            linear_features: Default::default(),
        }
    }

    #[test]
    fn test_verified_beats_cache_until_cleared() {
        let state = state();
        let cached = SatelliteMeasurement {
            adjusted_squares: Some(25.0),
            ..Default::default()
        };
        MeasurementService::cache_measurement(&state, "entry-1", Some("prop-1"), Some(&cached))
            .unwrap();
        MeasurementService::record_verified(&state, verified("prop-1", 31.0)).unwrap();

        let candidates =
            MeasurementService::gather_candidates(&state, "entry-1", None, None).unwrap();
        let normalized = normalize(&candidates).unwrap();
        assert_eq!(normalized.source, "verified");
        assert_eq!(normalized.measurement.total_squares, 31.0);

        assert_eq!(MeasurementService::clear_verified(&state, "prop-1").unwrap(), 1);

        let candidates =
            MeasurementService::gather_candidates(&state, "entry-1", None, None).unwrap();
        let normalized = normalize(&candidates).unwrap();
        assert_eq!(normalized.source, "cached");
        assert_eq!(normalized.measurement.total_squares, 25.0);
    }

    #[test]
    fn test_manual_only() {
        let state = state();
        let candidates = MeasurementService::gather_candidates(
            &state,
            "entry-2",
            None,
            Some(ManualEntry {
                roof_area_sq_ft: 2000.0,
                ..Default::default()
            }),
        )
        .unwrap();

        assert!(candidates.verified.is_none());
        assert!(candidates.cached.is_none());
        assert!(candidates.manual.is_some());
    }

    #[test]
    fn test_property_id_required() {
        let state = state();
        assert!(matches!(
            MeasurementService::record_verified(&state, verified(" ", 10.0)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            MeasurementService::get_metadata(&state, "missing"),
            Err(AppError::NotFound(_))
        ));
    }
}
