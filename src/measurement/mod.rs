//! Roof measurement model and normalization
//!
//! Upstream payloads (satellite results, verified measurement records,
//! manual entry) are reduced to one canonical [`MeasurementSet`].

pub mod normalizer;
pub mod pitch;
pub mod types;

pub use normalizer::{
    normalize, resolve_source, resolve_squares, AreaInputs, MeasurementCandidates,
    MeasurementSource, NormalizedMeasurement, DEFAULT_WASTE_PERCENT,
};
pub use pitch::PitchMultiplierTable;
pub use types::{
    Complexity, LinearFeatureKind, LinearFeatureRecord, LinearFeatures, ManualEntry,
    MeasurementSet, MeasurementSummary, SatelliteMeasurement, VerifiedMeasurement,
};
