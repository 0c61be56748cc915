//! REST API request and response types

use crate::measurement::SatelliteMeasurement;
use crate::pricing::LineItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Response Envelope
// ============================================================================

/// Envelope wrapping every successful response.
///
/// Errors use the same `status` field with `code` and `message`, produced
/// by [`crate::error::AppError`]'s `IntoResponse`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success_with_message(message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn success_with_data(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Empty payload for message-only responses
#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

// ============================================================================
// Requests
// ============================================================================

/// `?replace=true` confirms discarding existing line items
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplaceParams {
    pub replace: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyTemplateRequest {
    pub template_id: i64,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItemsRequest {
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineMetadataRequest {
    pub property_id: Option<String>,
    pub measurement: Option<SatelliteMeasurement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormulaRequest {
    pub formula: String,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPriceRequest {
    pub name: String,
    pub unit_cost: f64,
    pub unit_type: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ClearedMeasurements {
    pub property_id: String,
    pub deactivated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub pricing_gateway: &'static str,
    pub active_sessions: usize,
}
