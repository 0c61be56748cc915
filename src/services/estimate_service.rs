//! Estimate Service
//!
//! Drives one estimate through measure, populate, calculate and save.
//! Every step goes through the session state machine in [`crate::workflow`].

use super::measurement_service::MeasurementService;
use super::template_service::{FormulaWarning, TemplateService};
use crate::db::sqlite::models::{EstimateRecord, EstimateSummary, NewEstimate};
use crate::error::{AppError, Result};
use crate::materializer::materialize;
use crate::measurement::{normalize, ManualEntry, MeasurementSet};
use crate::pricing::{
    validate_line_items, CalculationRequest, LineItem, LinearMeasurements, PricingConfig,
    PropertyDetails, RequestLineItem,
};
use crate::state::AppState;
use crate::workflow::{CalculatedEstimate, EstimateEvent, EstimateSession, ItemsOrigin};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Default page size when listing estimates
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Inputs for (re-)measuring an estimate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureRequest {
    pub property_id: Option<String>,
    pub manual: Option<ManualEntry>,
}

/// Customer and pricing inputs for a calculation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculateEstimateRequest {
    pub customer_name: String,
    pub customer_address: String,
    pub roof_type: String,
    /// Overrides the measured area when set
    pub roof_area_sq_ft: Option<f64>,
    pub sales_rep_id: Option<String>,
    pub template_id: Option<i64>,
    /// Falls back to the stored pricing defaults
    pub pricing: Option<PricingConfig>,
}

/// Session after a template was applied, with any formula fallbacks
#[derive(Debug, Clone, Serialize)]
pub struct TemplateApplication {
    pub session: EstimateSession,
    pub warnings: Vec<FormulaWarning>,
}

/// Estimate service for business logic
pub struct EstimateService;

impl EstimateService {
    /// Resolve the measurement for a pipeline entry and apply it
    pub fn measure(
        state: &AppState,
        pipeline_entry_id: &str,
        request: MeasureRequest,
    ) -> Result<EstimateSession> {
        info!("EstimateService::measure - {}", pipeline_entry_id);

        let candidates = MeasurementService::gather_candidates(
            state,
            pipeline_entry_id,
            request.property_id.as_deref(),
            request.manual,
        )?;
        let normalized = normalize(&candidates)?;

        let mut session = state.session_mut(pipeline_entry_id);
        session.apply_measurement(normalized)?;
        Ok(session.value().clone())
    }

    /// Replace the line items with the materialized defaults
    pub fn auto_populate(
        state: &AppState,
        pipeline_entry_id: &str,
        replace: bool,
    ) -> Result<EstimateSession> {
        info!("EstimateService::auto_populate - {}", pipeline_entry_id);

        let rules = state.sqlite.get_packaging_rules()?;
        let prices = state.sqlite.load_price_book()?;

        let mut session = state.existing_session_mut(pipeline_entry_id)?;
        let set = Self::applied_measurement(&session)?;
        let items = materialize(&set, &rules, &prices)?;
        session.replace_line_items(items, ItemsOrigin::AutoPopulate, replace)?;

        Ok(session.value().clone())
    }

    /// Replace the line items with a rendered template
    pub fn apply_template(
        state: &AppState,
        pipeline_entry_id: &str,
        template_id: i64,
        replace: bool,
    ) -> Result<TemplateApplication> {
        info!(
            "EstimateService::apply_template - {} template {}",
            pipeline_entry_id, template_id
        );

        let template = state.sqlite.get_template(template_id)?;

        let mut session = state.existing_session_mut(pipeline_entry_id)?;
        let set = Self::applied_measurement(&session)?;
        let rendered = TemplateService::render(&template, &set);
        session.replace_line_items(
            rendered.items,
            ItemsOrigin::Template { template_id },
            replace,
        )?;

        Ok(TemplateApplication {
            session: session.value().clone(),
            warnings: rendered.warnings,
        })
    }

    /// Accept edited line items
    pub fn update_line_items(
        state: &AppState,
        pipeline_entry_id: &str,
        items: Vec<LineItem>,
    ) -> Result<EstimateSession> {
        info!(
            "EstimateService::update_line_items - {} ({} items)",
            pipeline_entry_id,
            items.len()
        );

        if let Some(item) = items
            .iter()
            .find(|item| !item.quantity.is_finite() || !item.unit_cost.is_finite())
        {
            return Err(AppError::Validation(format!(
                "Line item '{}' has a non-numeric quantity or cost",
                item.name
            )));
        }

        let mut session = state.existing_session_mut(pipeline_entry_id)?;
        session.edit_line_items(items)?;
        Ok(session.value().clone())
    }

    /// Send the estimate to the pricing function.
    ///
    /// The session is not locked while the remote call runs; if it changes
    /// in the meantime the response is discarded as stale.
    pub async fn calculate(
        state: &AppState,
        pipeline_entry_id: &str,
        request: CalculateEstimateRequest,
    ) -> Result<CalculatedEstimate> {
        info!("EstimateService::calculate - {}", pipeline_entry_id);

        let pricing = match request.pricing {
            Some(pricing) => pricing,
            None => state.sqlite.get_pricing_defaults()?,
        };

        let (ticket, calculation_request) = {
            let mut session = state.existing_session_mut(pipeline_entry_id)?;
            session.stage().next(EstimateEvent::Calculate)?;

            let calculation_request = Self::build_request(&session, request, pricing)?;
            validate_line_items(session.line_items())?;
            calculation_request.validate()?;

            (session.begin_calculation()?, calculation_request)
        };

        let response = state
            .pricing
            .calculate(&calculation_request)
            .await
            .map_err(|e| {
                error!(
                    "Pricing calculation failed for {}: {}",
                    pipeline_entry_id, e
                );
                e
            })?;

        let calculated = CalculatedEstimate {
            request: calculation_request,
            response,
        };

        let mut session = state.existing_session_mut(pipeline_entry_id).map_err(|_| {
            AppError::Stale("The estimate was discarded while the calculation was running".to_string())
        })?;
        session.complete_calculation(ticket, calculated.clone())?;

        Ok(calculated)
    }

    /// Persist the calculated estimate, re-saving in place after the first save
    pub fn save(state: &AppState, pipeline_entry_id: &str) -> Result<EstimateRecord> {
        info!("EstimateService::save - {}", pipeline_entry_id);

        let (ticket, calculated, line_items, estimate_number) = {
            let session = state.existing_session_mut(pipeline_entry_id)?;
            let ticket = session.begin_save()?;
            let calculated = session.calculation().cloned().ok_or_else(|| {
                AppError::InvalidTransition("Calculate the estimate before saving".to_string())
            })?;
            let estimate_number = session.estimate_number().map(str::to_string).or_else(|| {
                calculated
                    .response
                    .estimate
                    .as_ref()
                    .and_then(|estimate| estimate.estimate_number.clone())
            });
            (ticket, calculated, session.line_items().to_vec(), estimate_number)
        };

        let record = state.sqlite.save_estimate(
            &NewEstimate {
                pipeline_entry_id,
                template_id: calculated.request.template_id,
                sales_rep_id: calculated.request.sales_rep_id.as_deref(),
                property_details: &calculated.request.property_details,
                line_items: &line_items,
                pricing: &calculated.request.pricing,
                calculations: &calculated.response.calculations,
            },
            estimate_number.as_deref(),
        )?;

        let mut session = state.existing_session_mut(pipeline_entry_id).map_err(|_| {
            AppError::Stale(format!(
                "The estimate was discarded while saving as {}",
                record.estimate_number
            ))
        })?;
        session.complete_save(ticket, record.estimate_number.clone())?;
        Ok(record)
    }

    /// Current session snapshot
    pub fn get_session(state: &AppState, pipeline_entry_id: &str) -> Result<EstimateSession> {
        state.get_session(pipeline_entry_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "No estimate in progress for pipeline entry {}",
                pipeline_entry_id
            ))
        })
    }

    /// Drop the in-progress session
    pub fn discard(state: &AppState, pipeline_entry_id: &str) -> Result<()> {
        info!("EstimateService::discard - {}", pipeline_entry_id);
        if state.discard_session(pipeline_entry_id) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "No estimate in progress for pipeline entry {}",
                pipeline_entry_id
            )))
        }
    }

    /// Saved estimates, newest first
    pub fn list(state: &AppState, limit: Option<u32>) -> Result<Vec<EstimateSummary>> {
        state
            .sqlite
            .list_estimates(limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500))
    }

    /// Saved estimate by number
    pub fn get_by_number(state: &AppState, estimate_number: &str) -> Result<EstimateRecord> {
        state.sqlite.get_estimate_by_number(estimate_number)
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    fn applied_measurement(session: &EstimateSession) -> Result<MeasurementSet> {
        session
            .measurement()
            .map(|m| m.measurement.clone())
            .ok_or_else(|| {
                AppError::InvalidTransition(
                    "Measure the roof before populating line items".to_string(),
                )
            })
    }

    fn build_request(
        session: &EstimateSession,
        request: CalculateEstimateRequest,
        pricing: PricingConfig,
    ) -> Result<CalculationRequest> {
        let set = Self::applied_measurement(session)?;

        let template_id = request.template_id.or(match session.items_origin() {
            Some(ItemsOrigin::Template { template_id }) => Some(*template_id),
            _ => None,
        });

        Ok(CalculationRequest {
            pipeline_entry_id: session.pipeline_entry_id.clone(),
            template_id,
            property_details: PropertyDetails {
                roof_area_sq_ft: request.roof_area_sq_ft.unwrap_or(set.total_area_sqft),
                roof_type: request.roof_type,
                complexity_level: set.complexity.as_str().to_string(),
                roof_pitch: set.pitch.clone(),
                customer_name: request.customer_name,
                customer_address: request.customer_address,
                linear_measurements: Some(LinearMeasurements {
                    ridge_ft: set.ridge_ft,
                    hip_ft: set.hip_ft,
                    valley_ft: set.valley_ft,
                    eave_ft: set.eave_ft,
                    rake_ft: set.rake_ft,
                    perimeter_ft: set.perimeter_ft,
                }),
            },
            line_items: session.line_items().iter().map(RequestLineItem::from).collect(),
            sales_rep_id: request.sales_rep_id,
            pricing,
        })
    }
}
