//! Services Layer
//!
//! Business logic called by the REST API handlers. Handlers stay thin:
//! they decode the request, call one service operation and wrap the result.
//!
//! # Architecture
//!
//! ```text
//! REST API --> Services --> Measurement / Formula / Materializer / Pricing
//!                      \--> SQLite, session map
//! ```
//!
//! # Services
//!
//! - `MeasurementService` - Verified measurements, pipeline metadata cache
//! - `EstimateService` - Measure, populate, calculate, save
//! - `TemplateService` - Estimate templates, formula preview

pub mod estimate_service;
pub mod measurement_service;
pub mod template_service;

pub use estimate_service::{
    CalculateEstimateRequest, EstimateService, MeasureRequest, TemplateApplication,
};
pub use measurement_service::MeasurementService;
pub use template_service::{FormulaPreview, FormulaWarning, RenderedTemplate, TemplateService};
