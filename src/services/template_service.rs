//! Template Service
//!
//! Estimate templates and formula previews.

use crate::db::sqlite::models::{EstimateTemplate, NewTemplate, TemplateItem};
use crate::error::{AppError, Result};
use crate::formula::{self, Formula, FormulaContext, MEASURE_FIELDS};
use crate::measurement::MeasurementSet;
use crate::pricing::LineItem;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Quantity used when a template formula cannot be evaluated
pub const TEMPLATE_FALLBACK_QUANTITY: f64 = 1.0;

/// A template formula that failed and was replaced by the fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaWarning {
    pub item: String,
    pub formula: String,
    pub error: String,
    pub fallback: f64,
}

/// Line items produced from a template
#[derive(Debug, Clone, Serialize)]
pub struct RenderedTemplate {
    pub items: Vec<LineItem>,
    pub warnings: Vec<FormulaWarning>,
}

/// Result of a strict formula evaluation
#[derive(Debug, Clone, Serialize)]
pub struct FormulaPreview {
    pub formula: String,
    pub expanded: String,
    pub variables: Vec<String>,
    pub value: f64,
}

/// Template service for business logic
pub struct TemplateService;

impl TemplateService {
    /// List templates
    pub fn list(state: &AppState) -> Result<Vec<EstimateTemplate>> {
        info!("TemplateService::list");
        state.sqlite.get_templates()
    }

    /// Create a template after checking every quantity formula parses
    pub fn create(state: &AppState, template: NewTemplate) -> Result<EstimateTemplate> {
        info!("TemplateService::create - {}", template.name);

        if template.name.trim().is_empty() {
            return Err(AppError::Validation("Template name is required".to_string()));
        }
        if template.items.is_empty() {
            return Err(AppError::Validation(
                "Template must contain at least one item".to_string(),
            ));
        }
        for item in &template.items {
            Self::check_item(item)?;
        }

        state.sqlite.create_template(&template)
    }

    /// Delete a template
    pub fn delete(state: &AppState, id: i64) -> Result<()> {
        info!("TemplateService::delete - {}", id);
        state.sqlite.delete_template(id)
    }

    /// Evaluate each template item against a measurement.
    ///
    /// A failing formula yields [`TEMPLATE_FALLBACK_QUANTITY`] and a warning,
    /// so callers can tell it apart from a formula that really produced 1.
    pub fn render(template: &EstimateTemplate, set: &MeasurementSet) -> RenderedTemplate {
        let ctx = FormulaContext::from_measurement(set);
        let mut warnings = Vec::new();

        let items = template
            .items
            .iter()
            .map(|item| {
                let quantity = match formula::evaluate(&item.quantity_formula, &ctx) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(
                            "Template {} item '{}' formula failed: {}",
                            template.id,
                            item.name,
                            e
                        );
                        warnings.push(FormulaWarning {
                            item: item.name.clone(),
                            formula: item.quantity_formula.clone(),
                            error: e.to_string(),
                            fallback: TEMPLATE_FALLBACK_QUANTITY,
                        });
                        TEMPLATE_FALLBACK_QUANTITY
                    }
                };

                LineItem {
                    category: item.category,
                    name: item.name.clone(),
                    description: item.description.clone(),
                    quantity,
                    unit_cost: item.unit_cost,
                    unit_type: item.unit_type.clone(),
                    markup_percent: item.markup_percent,
                    sku: item.sku.clone(),
                    last_price_updated: None,
                }
            })
            .collect();

        RenderedTemplate { items, warnings }
    }

    /// Strictly evaluate a formula against supplied values
    pub fn preview(formula: &str, values: &BTreeMap<String, f64>) -> Result<FormulaPreview> {
        info!("TemplateService::preview");

        let parsed = Formula::parse(formula)?;
        let ctx = FormulaContext::from_values(values.iter().map(|(k, v)| (k.as_str(), *v)));
        let value = parsed.evaluate(&ctx)?;

        Ok(FormulaPreview {
            formula: formula.to_string(),
            expanded: formula::substitute_placeholders(formula, &ctx),
            variables: parsed.variables(),
            value,
        })
    }

    fn check_item(item: &TemplateItem) -> Result<()> {
        if item.name.trim().is_empty() {
            return Err(AppError::Validation("Template item name is required".to_string()));
        }
        if !item.unit_cost.is_finite() || item.unit_cost < 0.0 {
            return Err(AppError::Validation(format!(
                "Template item '{}' has an invalid unit cost",
                item.name
            )));
        }
        let parsed = Formula::parse(&item.quantity_formula).map_err(|e| {
            AppError::Validation(format!(
                "Template item '{}' has an invalid formula: {}",
                item.name, e
            ))
        })?;

        if let Some(name) = parsed
            .variables()
            .into_iter()
            .find(|name| !MEASURE_FIELDS.contains(&name.as_str()))
        {
            return Err(AppError::Validation(format!(
                "Template item '{}' references unknown measurement '{}'",
                item.name, name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDb;
    use crate::formula::FormulaError;
    use crate::pricing::{LineItemCategory, UnconfiguredPricingGateway};
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::with_parts(
            Arc::new(SqliteDb::open_in_memory().unwrap()),
            Arc::new(UnconfiguredPricingGateway),
            Default::default(),
        )
    }

    fn item(name: &str, formula: &str) -> TemplateItem {
        TemplateItem {
            category: LineItemCategory::Material,
            name: name.to_string(),
            description: String::new(),
            quantity_formula: formula.to_string(),
            unit_cost: 40.0,
            unit_type: "each".to_string(),
            markup_percent: 0.0,
            sku: None,
        }
    }

    fn template(items: Vec<TemplateItem>) -> EstimateTemplate {
        EstimateTemplate {
            id: 3,
            name: "Metal Retrofit".to_string(),
            description: String::new(),
            roof_type: None,
            items,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_render_evaluates_against_measurement() {
        let set = MeasurementSet {
            total_squares: 20.0,
            total_area_sqft: 2000.0,
            ridge_ft: 42.0,
            ..Default::default()
        };
        let rendered = TemplateService::render(
            &template(vec![
                item("Shingles", "{{ measure.surface_squares }} * 1.10"),
                item("Ridge Vent", "ceil(ridge_lf / 4)"),
            ]),
            &set,
        );

        assert!(rendered.warnings.is_empty());
        assert_eq!(rendered.items[0].quantity, 22.0);
        assert_eq!(rendered.items[1].quantity, 11.0);
    }

    #[test]
    fn test_render_reports_fallbacks() {
        let rendered = TemplateService::render(
            &template(vec![
                item("Pipe Boots", "1"),
                item("Snow Guards", "gutter_lf / 2"),
            ]),
            &MeasurementSet::default(),
        );

        assert_eq!(rendered.items[0].quantity, 1.0);
        assert_eq!(rendered.items[1].quantity, TEMPLATE_FALLBACK_QUANTITY);
        assert_eq!(rendered.warnings.len(), 1);
        assert_eq!(rendered.warnings[0].item, "Snow Guards");
    }

    #[test]
    fn test_render_misspelled_placeholder_falls_back_with_warning() {
        let set = MeasurementSet {
            total_squares: 25.0,
            ..Default::default()
        };
        let rendered = TemplateService::render(
            &template(vec![item("Shingles", "ceil({{ measure.total_squares }} * 3)")]),
            &set,
        );

        assert_eq!(rendered.items[0].quantity, TEMPLATE_FALLBACK_QUANTITY);
        assert_eq!(rendered.warnings.len(), 1);
        assert!(rendered.warnings[0].error.contains("measure.total_squares"));
    }

    #[test]
    fn test_create_rejects_unknown_measurement_names() {
        let state = state();
        for formula in ["ceil({{ measure.total_squares }} * 3)", "gutter_lf / 2"] {
            let err = TemplateService::create(
                &state,
                NewTemplate {
                    name: "Misspelled".to_string(),
                    description: String::new(),
                    roof_type: None,
                    items: vec![item("Shingles", formula)],
                },
            )
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "accepted {}", formula);
        }
        assert!(TemplateService::list(&state).unwrap().is_empty());
    }

    #[test]
    fn test_preview_is_strict() {
        let values = BTreeMap::from([("surface_squares".to_string(), 20.0)]);
        let preview =
            TemplateService::preview("{{ measure.surface_squares }} * 1.10", &values).unwrap();
        assert_eq!(preview.value, 22.0);
        assert_eq!(preview.expanded, "20 * 1.10");

        let err = TemplateService::preview("surface_squares / 0", &values).unwrap_err();
        assert!(matches!(err, AppError::Formula(FormulaError::DivisionByZero)));
    }

    #[test]
    fn test_create_rejects_bad_formula() {
        let state = state();
        let err = TemplateService::create(
            &state,
            NewTemplate {
                name: "Broken".to_string(),
                description: String::new(),
                roof_type: None,
                items: vec![item("Nails", "import os")],
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(TemplateService::list(&state).unwrap().is_empty());
    }
}
