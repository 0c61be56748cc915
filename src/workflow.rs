//! Per-estimate workflow state
//!
//! Each estimate being worked on moves through
//! `Unmeasured -> Measured -> Populated -> Calculated -> Saved`.
//! Remote calculations are issued against a [`RequestTicket`]; any
//! re-measurement, edit or discard in the meantime bumps the session
//! generation so the late response is rejected instead of applied.

use crate::error::{AppError, Result};
use crate::measurement::NormalizedMeasurement;
use crate::pricing::{CalculationRequest, CalculationResponse, LineItem};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generations are unique across sessions, so a ticket issued for a
/// discarded session never matches its replacement.
fn next_generation() -> u64 {
    static GENERATION: AtomicU64 = AtomicU64::new(1);
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStage {
    Unmeasured,
    Measured,
    Populated,
    Calculated,
    Saved,
}

impl fmt::Display for EstimateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EstimateStage::Unmeasured => "unmeasured",
            EstimateStage::Measured => "measured",
            EstimateStage::Populated => "populated",
            EstimateStage::Calculated => "calculated",
            EstimateStage::Saved => "saved",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateEvent {
    Measure,
    Populate,
    EditItems,
    Calculate,
    Save,
}

impl fmt::Display for EstimateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EstimateEvent::Measure => "measure",
            EstimateEvent::Populate => "populate line items",
            EstimateEvent::EditItems => "edit line items",
            EstimateEvent::Calculate => "calculate",
            EstimateEvent::Save => "save",
        };
        f.write_str(label)
    }
}

impl EstimateStage {
    /// Legal transitions; anything else is rejected
    pub fn next(self, event: EstimateEvent) -> Result<EstimateStage> {
        use EstimateEvent as E;
        use EstimateStage::*;

        match (self, event) {
            (_, E::Measure) => Ok(Measured),
            (Measured | Populated | Calculated | Saved, E::Populate) => Ok(Populated),
            (Measured | Populated | Calculated | Saved, E::EditItems) => Ok(Populated),
            (Populated | Calculated | Saved, E::Calculate) => Ok(Calculated),
            (Calculated | Saved, E::Save) => Ok(Saved),
            (stage, event) => Err(AppError::InvalidTransition(format!(
                "Cannot {} while the estimate is {}",
                event, stage
            ))),
        }
    }
}

/// How the current line items were produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemsOrigin {
    AutoPopulate,
    Template { template_id: i64 },
    Manual,
}

/// Last successful remote calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculatedEstimate {
    pub request: CalculationRequest,
    pub response: CalculationResponse,
}

/// Proof that a calculation was started against a given session generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
}

/// In-memory state for one estimate being prepared
#[derive(Debug, Clone, Serialize)]
pub struct EstimateSession {
    pub pipeline_entry_id: String,
    stage: EstimateStage,
    measurement: Option<NormalizedMeasurement>,
    line_items: Vec<LineItem>,
    items_origin: Option<ItemsOrigin>,
    calculation: Option<CalculatedEstimate>,
    estimate_number: Option<String>,
    #[serde(skip)]
    generation: u64,
}

impl EstimateSession {
    pub fn new(pipeline_entry_id: impl Into<String>) -> Self {
        Self {
            pipeline_entry_id: pipeline_entry_id.into(),
            stage: EstimateStage::Unmeasured,
            measurement: None,
            line_items: Vec::new(),
            items_origin: None,
            calculation: None,
            estimate_number: None,
            generation: next_generation(),
        }
    }

    pub fn stage(&self) -> EstimateStage {
        self.stage
    }

    pub fn measurement(&self) -> Option<&NormalizedMeasurement> {
        self.measurement.as_ref()
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn items_origin(&self) -> Option<&ItemsOrigin> {
        self.items_origin.as_ref()
    }

    pub fn calculation(&self) -> Option<&CalculatedEstimate> {
        self.calculation.as_ref()
    }

    pub fn estimate_number(&self) -> Option<&str> {
        self.estimate_number.as_deref()
    }

    fn transition(&mut self, event: EstimateEvent) -> Result<()> {
        let next = self.stage.next(event)?;
        tracing::debug!(
            "Estimate {} {} -> {}",
            self.pipeline_entry_id,
            self.stage,
            next
        );
        self.stage = next;
        Ok(())
    }

    fn invalidate(&mut self) {
        self.generation = next_generation();
        self.calculation = None;
    }

    /// Record a (re-)measurement; prior calculations no longer apply
    pub fn apply_measurement(&mut self, measurement: NormalizedMeasurement) -> Result<()> {
        self.transition(EstimateEvent::Measure)?;
        self.measurement = Some(measurement);
        self.invalidate();
        Ok(())
    }

    /// Replace the line items wholesale.
    ///
    /// Existing items are only discarded when `confirm_replace` is set.
    pub fn replace_line_items(
        &mut self,
        items: Vec<LineItem>,
        origin: ItemsOrigin,
        confirm_replace: bool,
    ) -> Result<()> {
        let next = self.stage.next(EstimateEvent::Populate)?;

        match &self.measurement {
            Some(m) if m.measurement.is_complete() => {}
            _ => {
                return Err(AppError::IncompleteMeasurement(
                    "Line items cannot be generated until a complete measurement is applied"
                        .to_string(),
                ))
            }
        }

        if !self.line_items.is_empty() && !confirm_replace {
            return Err(AppError::Validation(format!(
                "Estimate already has {} line items; confirm replacement to discard them",
                self.line_items.len()
            )));
        }

        self.stage = next;
        self.line_items = items;
        self.items_origin = Some(origin);
        self.invalidate();
        Ok(())
    }

    /// Accept user edits to the line items
    pub fn edit_line_items(&mut self, items: Vec<LineItem>) -> Result<()> {
        self.transition(EstimateEvent::EditItems)?;
        self.line_items = items;
        self.items_origin = Some(ItemsOrigin::Manual);
        self.invalidate();
        Ok(())
    }

    /// Start a remote calculation
    pub fn begin_calculation(&mut self) -> Result<RequestTicket> {
        self.stage.next(EstimateEvent::Calculate)?;
        if self.line_items.is_empty() {
            return Err(AppError::Validation(
                "At least one line item is required".to_string(),
            ));
        }
        self.generation = next_generation();
        Ok(RequestTicket {
            generation: self.generation,
        })
    }

    /// Apply a calculation result if nothing changed since it was started
    pub fn complete_calculation(
        &mut self,
        ticket: RequestTicket,
        calculation: CalculatedEstimate,
    ) -> Result<()> {
        if ticket.generation != self.generation {
            tracing::warn!(
                "Discarding stale calculation for estimate {}",
                self.pipeline_entry_id
            );
            return Err(AppError::Stale(
                "The estimate changed while the calculation was running".to_string(),
            ));
        }

        self.transition(EstimateEvent::Calculate)?;
        self.calculation = Some(calculation);
        Ok(())
    }

    /// Record that the calculated estimate was persisted
    pub fn mark_saved(&mut self, estimate_number: String) -> Result<()> {
        self.transition(EstimateEvent::Save)?;
        self.estimate_number = Some(estimate_number);
        Ok(())
    }

    /// Check the estimate can be saved and pin the generation being written
    pub fn begin_save(&self) -> Result<RequestTicket> {
        self.stage.next(EstimateEvent::Save)?;
        if self.calculation.is_none() {
            return Err(AppError::InvalidTransition(
                "Calculate the estimate before saving".to_string(),
            ));
        }
        Ok(RequestTicket {
            generation: self.generation,
        })
    }

    /// Record a finished save.
    ///
    /// If the estimate changed while the row was written, the number is kept
    /// so the next save updates the same row, but the stage is left alone.
    pub fn complete_save(&mut self, ticket: RequestTicket, estimate_number: String) -> Result<()> {
        if ticket.generation != self.generation {
            tracing::warn!(
                "Estimate {} changed while saving as {}",
                self.pipeline_entry_id,
                estimate_number
            );
            self.estimate_number = Some(estimate_number);
            return Ok(());
        }
        self.mark_saved(estimate_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::MeasurementSet;
    use crate::pricing::{Calculations, LineItemCategory, PricingConfig, PropertyDetails};

    fn measured(squares: f64) -> NormalizedMeasurement {
        NormalizedMeasurement {
            measurement: MeasurementSet {
                total_squares: squares,
                total_area_sqft: squares * 100.0,
                ..Default::default()
            },
            source: "manual",
            area_strategy: Some("manual_area"),
        }
    }

    fn items() -> Vec<LineItem> {
        vec![LineItem {
            category: LineItemCategory::Material,
            name: "Drip Edge".to_string(),
            description: String::new(),
            quantity: 18.0,
            unit_cost: 12.5,
            unit_type: "piece".to_string(),
            markup_percent: 0.0,
            sku: None,
            last_price_updated: None,
        }]
    }

    fn calculation() -> CalculatedEstimate {
        CalculatedEstimate {
            request: CalculationRequest {
                pipeline_entry_id: "entry-1".to_string(),
                template_id: None,
                property_details: PropertyDetails::default(),
                line_items: vec![],
                sales_rep_id: None,
                pricing: PricingConfig::default(),
            },
            response: CalculationResponse {
                calculations: Calculations::default(),
                estimate: None,
            },
        }
    }

    #[test]
    fn test_transition_table() {
        use EstimateEvent as E;
        use EstimateStage::*;

        assert_eq!(Unmeasured.next(E::Measure).unwrap(), Measured);
        assert_eq!(Saved.next(E::Measure).unwrap(), Measured);
        assert_eq!(Measured.next(E::Populate).unwrap(), Populated);
        assert_eq!(Calculated.next(E::EditItems).unwrap(), Populated);
        assert_eq!(Populated.next(E::Calculate).unwrap(), Calculated);
        assert_eq!(Calculated.next(E::Save).unwrap(), Saved);
        assert_eq!(Saved.next(E::Save).unwrap(), Saved);

        assert!(Unmeasured.next(E::Populate).is_err());
        assert!(Measured.next(E::Calculate).is_err());
        assert!(Populated.next(E::Save).is_err());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session
            .replace_line_items(items(), ItemsOrigin::AutoPopulate, false)
            .unwrap();
        let ticket = session.begin_calculation().unwrap();
        session.complete_calculation(ticket, calculation()).unwrap();
        session.mark_saved("EST-00001".to_string()).unwrap();

        assert_eq!(session.stage(), EstimateStage::Saved);
        assert_eq!(session.estimate_number(), Some("EST-00001"));
    }

    #[test]
    fn test_populate_requires_complete_measurement() {
        let mut session = EstimateSession::new("entry-1");
        assert!(matches!(
            session.replace_line_items(items(), ItemsOrigin::AutoPopulate, true),
            Err(AppError::InvalidTransition(_))
        ));

        session.apply_measurement(measured(0.0)).unwrap();
        assert!(matches!(
            session.replace_line_items(items(), ItemsOrigin::AutoPopulate, true),
            Err(AppError::IncompleteMeasurement(_))
        ));
        assert_eq!(session.stage(), EstimateStage::Measured);
    }

    #[test]
    fn test_replacing_items_needs_confirmation() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session
            .replace_line_items(items(), ItemsOrigin::AutoPopulate, false)
            .unwrap();

        let err = session
            .replace_line_items(items(), ItemsOrigin::Template { template_id: 4 }, false)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(session.items_origin(), Some(&ItemsOrigin::AutoPopulate));

        session
            .replace_line_items(items(), ItemsOrigin::Template { template_id: 4 }, true)
            .unwrap();
        assert_eq!(
            session.items_origin(),
            Some(&ItemsOrigin::Template { template_id: 4 })
        );
    }

    #[test]
    fn test_stale_calculation_is_rejected() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session
            .replace_line_items(items(), ItemsOrigin::AutoPopulate, false)
            .unwrap();

        let ticket = session.begin_calculation().unwrap();
        session.edit_line_items(items()).unwrap();

        let result = session.complete_calculation(ticket, calculation());
        assert!(matches!(result, Err(AppError::Stale(_))));
        assert_eq!(session.stage(), EstimateStage::Populated);
        assert!(session.calculation().is_none());
    }

    #[test]
    fn test_newer_calculation_supersedes_older() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session.edit_line_items(items()).unwrap();

        let first = session.begin_calculation().unwrap();
        let second = session.begin_calculation().unwrap();

        session.complete_calculation(second, calculation()).unwrap();
        assert!(matches!(
            session.complete_calculation(first, calculation()),
            Err(AppError::Stale(_))
        ));
    }

    #[test]
    fn test_edit_during_save_keeps_number_but_not_stage() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session.edit_line_items(items()).unwrap();
        let ticket = session.begin_calculation().unwrap();
        session.complete_calculation(ticket, calculation()).unwrap();

        let save = session.begin_save().unwrap();
        session.edit_line_items(items()).unwrap();
        session.complete_save(save, "EST-00004".to_string()).unwrap();

        assert_eq!(session.stage(), EstimateStage::Populated);
        assert_eq!(session.estimate_number(), Some("EST-00004"));
        assert!(session.begin_save().is_err());
    }

    #[test]
    fn test_save_requires_calculation() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session.edit_line_items(items()).unwrap();
        assert!(session.begin_save().is_err());
    }

    #[test]
    fn test_remeasure_clears_calculation() {
        let mut session = EstimateSession::new("entry-1");
        session.apply_measurement(measured(25.0)).unwrap();
        session.edit_line_items(items()).unwrap();
        let ticket = session.begin_calculation().unwrap();
        session.complete_calculation(ticket, calculation()).unwrap();

        session.apply_measurement(measured(30.0)).unwrap();
        assert_eq!(session.stage(), EstimateStage::Measured);
        assert!(session.calculation().is_none());
        assert_eq!(session.line_items().len(), 1);
    }
}
