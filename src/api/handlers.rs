//! REST API endpoint handlers
//!
//! Each handler decodes its inputs, calls one service operation and wraps
//! the result in an [`ApiResponse`]. Errors render through `AppError`.

use crate::api::types::*;
use crate::db::sqlite::models::{
    CatalogItem, EstimateRecord, EstimateSummary, EstimateTemplate, NewTemplate,
    NewVerifiedMeasurement, PipelineMetadata, PricingDefaultsUpdate,
};
use crate::error::{AppError, Result};
use crate::materializer::PackagingRules;
use crate::measurement::VerifiedMeasurement;
use crate::pricing::PricingConfig;
use crate::services::{
    CalculateEstimateRequest, EstimateService, FormulaPreview, MeasureRequest,
    MeasurementService, TemplateApplication, TemplateService,
};
use crate::state::AppState;
use crate::workflow::{CalculatedEstimate, EstimateSession};
use axum::{
    extract::{Json, Path, Query, State as AxumState},
    http::StatusCode,
};
use std::sync::Arc;

type Shared = AxumState<Arc<AppState>>;
type ApiResult<T> = Result<Json<ApiResponse<T>>>;

fn ok<T: serde::Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success_with_data(data)))
}

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint - GET /health
pub async fn health_check(AxumState(state): Shared) -> Json<ApiResponse<HealthStatus>> {
    Json(
        ApiResponse::success_with_data(HealthStatus {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            pricing_gateway: state.pricing.name(),
            active_sessions: state.sessions.len(),
        })
        .with_message("Roofline API is running"),
    )
}

// ============================================================================
// Measurements
// ============================================================================

/// POST /api/v1/measurements
pub async fn record_measurement(
    AxumState(state): Shared,
    Json(payload): Json<NewVerifiedMeasurement>,
) -> Result<(StatusCode, Json<ApiResponse<VerifiedMeasurement>>)> {
    let record = MeasurementService::record_verified(&state, payload)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_data(record)),
    ))
}

/// GET /api/v1/measurements/:property_id
pub async fn list_measurements(
    AxumState(state): Shared,
    Path(property_id): Path<String>,
) -> ApiResult<Vec<VerifiedMeasurement>> {
    ok(MeasurementService::list_verified(&state, &property_id)?)
}

/// DELETE /api/v1/measurements/:property_id
pub async fn clear_measurements(
    AxumState(state): Shared,
    Path(property_id): Path<String>,
) -> ApiResult<ClearedMeasurements> {
    let deactivated = MeasurementService::clear_verified(&state, &property_id)?;
    ok(ClearedMeasurements {
        property_id,
        deactivated,
    })
}

// ============================================================================
// Pipeline Metadata
// ============================================================================

/// PUT /api/v1/pipeline/:entry_id/metadata
pub async fn put_pipeline_metadata(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
    Json(payload): Json<PipelineMetadataRequest>,
) -> ApiResult<PipelineMetadata> {
    ok(MeasurementService::cache_measurement(
        &state,
        &entry_id,
        payload.property_id.as_deref(),
        payload.measurement.as_ref(),
    )?)
}

/// GET /api/v1/pipeline/:entry_id/metadata
pub async fn get_pipeline_metadata(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
) -> ApiResult<PipelineMetadata> {
    ok(MeasurementService::get_metadata(&state, &entry_id)?)
}

// ============================================================================
// Estimate Workflow
// ============================================================================

/// POST /api/v1/estimates/:entry_id/measure
pub async fn measure(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
    payload: Option<Json<MeasureRequest>>,
) -> ApiResult<EstimateSession> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    ok(EstimateService::measure(&state, &entry_id, request)?)
}

/// POST /api/v1/estimates/:entry_id/auto-populate
pub async fn auto_populate(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
    Query(params): Query<ReplaceParams>,
) -> ApiResult<EstimateSession> {
    ok(EstimateService::auto_populate(
        &state,
        &entry_id,
        params.replace,
    )?)
}

/// POST /api/v1/estimates/:entry_id/template
pub async fn apply_template(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
    Json(payload): Json<ApplyTemplateRequest>,
) -> ApiResult<TemplateApplication> {
    let applied =
        EstimateService::apply_template(&state, &entry_id, payload.template_id, payload.replace)?;

    let message = match applied.warnings.len() {
        0 => None,
        n => Some(format!("{} formula(s) failed and used the fallback quantity", n)),
    };

    let mut response = ApiResponse::success_with_data(applied);
    response.message = message;
    Ok(Json(response))
}

/// PUT /api/v1/estimates/:entry_id/line-items
pub async fn update_line_items(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
    Json(payload): Json<LineItemsRequest>,
) -> ApiResult<EstimateSession> {
    ok(EstimateService::update_line_items(
        &state,
        &entry_id,
        payload.line_items,
    )?)
}

/// POST /api/v1/estimates/:entry_id/calculate
pub async fn calculate(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
    Json(payload): Json<CalculateEstimateRequest>,
) -> ApiResult<CalculatedEstimate> {
    ok(EstimateService::calculate(&state, &entry_id, payload).await?)
}

/// POST /api/v1/estimates/:entry_id/save
pub async fn save(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
) -> ApiResult<EstimateRecord> {
    let record = EstimateService::save(&state, &entry_id)?;
    let message = format!("Estimate {} saved", record.estimate_number);
    Ok(Json(
        ApiResponse::success_with_data(record).with_message(message),
    ))
}

/// GET /api/v1/estimates/:entry_id/session
pub async fn get_session(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
) -> ApiResult<EstimateSession> {
    ok(EstimateService::get_session(&state, &entry_id)?)
}

/// DELETE /api/v1/estimates/:entry_id/session
pub async fn discard_session(
    AxumState(state): Shared,
    Path(entry_id): Path<String>,
) -> ApiResult<Empty> {
    EstimateService::discard(&state, &entry_id)?;
    Ok(Json(ApiResponse::success_with_message("Estimate discarded")))
}

/// GET /api/v1/estimates
pub async fn list_estimates(
    AxumState(state): Shared,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<EstimateSummary>> {
    ok(EstimateService::list(&state, params.limit)?)
}

/// GET /api/v1/estimates/number/:estimate_number
pub async fn get_estimate(
    AxumState(state): Shared,
    Path(estimate_number): Path<String>,
) -> ApiResult<EstimateRecord> {
    ok(EstimateService::get_by_number(&state, &estimate_number)?)
}

// ============================================================================
// Formula
// ============================================================================

/// POST /api/v1/formula/evaluate
pub async fn evaluate_formula(Json(payload): Json<FormulaRequest>) -> ApiResult<FormulaPreview> {
    ok(TemplateService::preview(&payload.formula, &payload.values)?)
}

// ============================================================================
// Settings
// ============================================================================

/// GET /api/v1/settings/pricing
pub async fn get_pricing_defaults(AxumState(state): Shared) -> ApiResult<PricingConfig> {
    ok(state.sqlite.get_pricing_defaults()?)
}

/// PUT /api/v1/settings/pricing
pub async fn update_pricing_defaults(
    AxumState(state): Shared,
    Json(payload): Json<PricingDefaultsUpdate>,
) -> ApiResult<PricingConfig> {
    ok(state.sqlite.update_pricing_defaults(&payload)?)
}

/// GET /api/v1/settings/packaging
pub async fn get_packaging_rules(AxumState(state): Shared) -> ApiResult<PackagingRules> {
    ok(state.sqlite.get_packaging_rules()?)
}

/// PUT /api/v1/settings/packaging
pub async fn update_packaging_rules(
    AxumState(state): Shared,
    Json(payload): Json<PackagingRules>,
) -> ApiResult<PackagingRules> {
    ok(state.sqlite.update_packaging_rules(&payload)?)
}

// ============================================================================
// Templates
// ============================================================================

/// GET /api/v1/templates
pub async fn list_templates(AxumState(state): Shared) -> ApiResult<Vec<EstimateTemplate>> {
    ok(TemplateService::list(&state)?)
}

/// POST /api/v1/templates
pub async fn create_template(
    AxumState(state): Shared,
    Json(payload): Json<NewTemplate>,
) -> Result<(StatusCode, Json<ApiResponse<EstimateTemplate>>)> {
    let template = TemplateService::create(&state, payload)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_data(template)),
    ))
}

/// DELETE /api/v1/templates/:id
pub async fn delete_template(
    AxumState(state): Shared,
    Path(id): Path<i64>,
) -> ApiResult<Empty> {
    TemplateService::delete(&state, id)?;
    Ok(Json(ApiResponse::success_with_message("Template deleted")))
}

// ============================================================================
// Catalog
// ============================================================================

/// GET /api/v1/catalog
pub async fn get_catalog(AxumState(state): Shared) -> ApiResult<Vec<CatalogItem>> {
    ok(state.sqlite.get_catalog()?)
}

/// PUT /api/v1/catalog/:sku
pub async fn put_catalog_price(
    AxumState(state): Shared,
    Path(sku): Path<String>,
    Json(payload): Json<CatalogPriceRequest>,
) -> ApiResult<CatalogItem> {
    if sku.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(AppError::Validation("SKU and name are required".to_string()));
    }
    ok(state.sqlite.upsert_catalog_price(
        &sku,
        &payload.name,
        payload.unit_cost,
        &payload.unit_type,
    )?)
}
