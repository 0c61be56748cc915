//! Estimate persistence and `EST-#####` numbering

use crate::db::sqlite::models::{EstimateRecord, EstimateSummary, NewEstimate};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

/// Format a sequence value as a human-readable estimate number
pub fn format_estimate_number(value: i64) -> String {
    format!("EST-{:05}", value)
}

/// Take the next unused number from the sequence
fn next_estimate_number(tx: &Transaction<'_>) -> Result<String> {
    loop {
        let value: i64 = tx.query_row(
            "SELECT next_value FROM estimate_sequence WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE estimate_sequence SET next_value = next_value + 1 WHERE id = 1",
            [],
        )?;

        let number = format_estimate_number(value);
        if !estimate_exists(tx, &number)? {
            return Ok(number);
        }
    }
}

/// Pipeline entry that owns an estimate number, if the number is taken
fn estimate_owner(conn: &Connection, estimate_number: &str) -> Result<Option<String>> {
    let owner = conn
        .query_row(
            "SELECT pipeline_entry_id FROM estimates WHERE estimate_number = ?",
            [estimate_number],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

fn estimate_exists(conn: &Connection, estimate_number: &str) -> Result<bool> {
    Ok(estimate_owner(conn, estimate_number)?.is_some())
}

/// Insert a new estimate or re-save an existing one in place.
///
/// With `estimate_number` set, the record is updated when it belongs to the
/// same pipeline entry and created under that number when it is free. A
/// number already held by another entry is never reused; the next sequential
/// number is allocated instead, as it is when no number is given.
pub fn save_estimate(
    conn: &mut Connection,
    estimate: &NewEstimate<'_>,
    estimate_number: Option<&str>,
) -> Result<EstimateRecord> {
    let property_details = serde_json::to_string(estimate.property_details)?;
    let line_items = serde_json::to_string(estimate.line_items)?;
    let pricing = serde_json::to_string(estimate.pricing)?;
    let calculations = serde_json::to_string(estimate.calculations)?;
    let now = Utc::now();

    let tx = conn.transaction()?;

    let owner = match estimate_number {
        Some(number) => estimate_owner(&tx, number)?,
        None => None,
    };

    let number = match (estimate_number, owner) {
        (Some(number), Some(owner)) if owner == estimate.pipeline_entry_id => {
            tx.execute(
                "UPDATE estimates SET
                     template_id = ?1, sales_rep_id = ?2, customer_name = ?3,
                     roof_area_sq_ft = ?4, selling_price = ?5, actual_profit_percent = ?6,
                     property_details = ?7, line_items = ?8, pricing = ?9, calculations = ?10,
                     updated_at = ?11
                 WHERE estimate_number = ?12 AND pipeline_entry_id = ?13",
                params![
                    estimate.template_id,
                    estimate.sales_rep_id,
                    estimate.property_details.customer_name,
                    estimate.property_details.roof_area_sq_ft,
                    estimate.calculations.selling_price,
                    estimate.calculations.actual_profit_percent,
                    property_details,
                    line_items,
                    pricing,
                    calculations,
                    now,
                    number,
                    estimate.pipeline_entry_id,
                ],
            )?;
            tracing::info!("Re-saved estimate {}", number);
            number.to_string()
        }
        (requested, owner) => {
            let number = match (requested, owner) {
                (Some(number), None) => number.to_string(),
                (Some(number), Some(owner)) => {
                    tracing::warn!(
                        "Estimate number {} belongs to pipeline entry {}; allocating a new one for {}",
                        number,
                        owner,
                        estimate.pipeline_entry_id
                    );
                    next_estimate_number(&tx)?
                }
                (None, _) => next_estimate_number(&tx)?,
            };
            tx.execute(
                "INSERT INTO estimates (
                     estimate_number, pipeline_entry_id, template_id, sales_rep_id,
                     customer_name, roof_area_sq_ft, selling_price, actual_profit_percent,
                     property_details, line_items, pricing, calculations, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    number,
                    estimate.pipeline_entry_id,
                    estimate.template_id,
                    estimate.sales_rep_id,
                    estimate.property_details.customer_name,
                    estimate.property_details.roof_area_sq_ft,
                    estimate.calculations.selling_price,
                    estimate.calculations.actual_profit_percent,
                    property_details,
                    line_items,
                    pricing,
                    calculations,
                    now,
                ],
            )?;
            tracing::info!(
                "Saved estimate {} for pipeline entry {}",
                number,
                estimate.pipeline_entry_id
            );
            number
        }
    };

    tx.commit()?;

    get_estimate_by_number(conn, &number)
}

/// Fetch a full estimate by its number
pub fn get_estimate_by_number(conn: &Connection, estimate_number: &str) -> Result<EstimateRecord> {
    let row = conn
        .query_row(
            "SELECT id, estimate_number, pipeline_entry_id, template_id, sales_rep_id,
                    property_details, line_items, pricing, calculations, created_at, updated_at
             FROM estimates WHERE estimate_number = ?",
            [estimate_number],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, DateTime<Utc>>(9)?,
                    row.get::<_, DateTime<Utc>>(10)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Estimate not found: {}", estimate_number)))?;

    let (
        id,
        estimate_number,
        pipeline_entry_id,
        template_id,
        sales_rep_id,
        property_details,
        line_items,
        pricing,
        calculations,
        created_at,
        updated_at,
    ) = row;

    Ok(EstimateRecord {
        id,
        estimate_number,
        pipeline_entry_id,
        template_id,
        sales_rep_id,
        property_details: serde_json::from_str(&property_details)?,
        line_items: serde_json::from_str(&line_items)?,
        pricing: serde_json::from_str(&pricing)?,
        calculations: serde_json::from_str(&calculations)?,
        created_at,
        updated_at,
    })
}

/// List estimates, newest first
pub fn list_estimates(conn: &Connection, limit: u32) -> Result<Vec<EstimateSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, estimate_number, pipeline_entry_id, customer_name, roof_area_sq_ft,
                selling_price, actual_profit_percent, created_at, updated_at
         FROM estimates ORDER BY created_at DESC, id DESC LIMIT ?",
    )?;

    let estimates = stmt
        .query_map([limit], |row| {
            Ok(EstimateSummary {
                id: row.get(0)?,
                estimate_number: row.get(1)?,
                pipeline_entry_id: row.get(2)?,
                customer_name: row.get(3)?,
                roof_area_sq_ft: row.get(4)?,
                selling_price: row.get(5)?,
                actual_profit_percent: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_connection;
    use crate::pricing::{
        Calculations, LineItem, LineItemCategory, PricingConfig, PropertyDetails,
    };

    struct Fixture {
        details: PropertyDetails,
        items: Vec<LineItem>,
        pricing: PricingConfig,
        calculations: Calculations,
    }

    fn fixture(selling_price: f64) -> Fixture {
        Fixture {
            details: PropertyDetails {
                roof_area_sq_ft: 2500.0,
                customer_name: "Dana Reyes".to_string(),
                ..Default::default()
            },
            items: vec![LineItem {
                category: LineItemCategory::Labor,
                name: "Installation Labor".to_string(),
                description: String::new(),
                quantity: 25.0,
                unit_cost: 85.0,
                unit_type: "square".to_string(),
                markup_percent: 0.0,
                sku: None,
                last_price_updated: None,
            }],
            pricing: PricingConfig::default(),
            calculations: Calculations {
                selling_price,
                actual_profit_percent: 30.0,
                ..Default::default()
            },
        }
    }

    fn new_estimate<'a>(entry: &'a str, f: &'a Fixture) -> NewEstimate<'a> {
        NewEstimate {
            pipeline_entry_id: entry,
            template_id: None,
            sales_rep_id: Some("rep-1"),
            property_details: &f.details,
            line_items: &f.items,
            pricing: &f.pricing,
            calculations: &f.calculations,
        }
    }

    #[test]
    fn test_estimate_numbers_are_sequential() {
        let mut conn = test_connection();
        let f = fixture(16000.0);

        let first = save_estimate(&mut conn, &new_estimate("entry-1", &f), None).unwrap();
        let second = save_estimate(&mut conn, &new_estimate("entry-2", &f), None).unwrap();

        assert_eq!(first.estimate_number, "EST-00001");
        assert_eq!(second.estimate_number, "EST-00002");
        assert_eq!(second.line_items, f.items);
    }

    #[test]
    fn test_resave_updates_in_place() {
        let mut conn = test_connection();
        let original = fixture(16000.0);
        let saved = save_estimate(&mut conn, &new_estimate("entry-1", &original), None).unwrap();

        let revised = fixture(17250.0);
        let resaved = save_estimate(
            &mut conn,
            &new_estimate("entry-1", &revised),
            Some(&saved.estimate_number),
        )
        .unwrap();

        assert_eq!(resaved.id, saved.id);
        assert_eq!(resaved.calculations.selling_price, 17250.0);
        assert_eq!(list_estimates(&conn, 50).unwrap().len(), 1);
    }

    #[test]
    fn test_remote_number_is_kept_and_skipped_by_sequence() {
        let mut conn = test_connection();
        let f = fixture(16000.0);

        save_estimate(&mut conn, &new_estimate("entry-1", &f), Some("EST-00001")).unwrap();
        let next = save_estimate(&mut conn, &new_estimate("entry-2", &f), None).unwrap();

        assert_eq!(next.estimate_number, "EST-00002");
    }

    #[test]
    fn test_number_owned_by_another_entry_is_not_overwritten() {
        let mut conn = test_connection();
        let original = fixture(16000.0);
        let first = save_estimate(&mut conn, &new_estimate("entry-1", &original), None).unwrap();

        let mut other = fixture(5000.0);
        other.details.customer_name = "Sam Ortiz".to_string();
        let second = save_estimate(
            &mut conn,
            &new_estimate("entry-2", &other),
            Some(&first.estimate_number),
        )
        .unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(second.estimate_number, "EST-00002");
        assert_eq!(second.pipeline_entry_id, "entry-2");

        let kept = get_estimate_by_number(&conn, "EST-00001").unwrap();
        assert_eq!(kept.pipeline_entry_id, "entry-1");
        assert_eq!(kept.property_details.customer_name, "Dana Reyes");
        assert_eq!(kept.calculations.selling_price, 16000.0);
        assert_eq!(list_estimates(&conn, 50).unwrap().len(), 2);
    }

    #[test]
    fn test_resave_bumps_updated_at_only() {
        let mut conn = test_connection();
        let f = fixture(16000.0);
        let saved = save_estimate(&mut conn, &new_estimate("entry-1", &f), None).unwrap();
        let resaved = save_estimate(
            &mut conn,
            &new_estimate("entry-1", &f),
            Some(&saved.estimate_number),
        )
        .unwrap();

        assert_eq!(resaved.created_at, saved.created_at);
        assert!(resaved.updated_at >= saved.updated_at);
    }

    #[test]
    fn test_list_newest_first_and_missing_number() {
        let mut conn = test_connection();
        let f = fixture(16000.0);
        save_estimate(&mut conn, &new_estimate("entry-1", &f), None).unwrap();
        save_estimate(&mut conn, &new_estimate("entry-2", &f), None).unwrap();

        let listed = list_estimates(&conn, 10).unwrap();
        assert_eq!(listed[0].estimate_number, "EST-00002");
        assert_eq!(listed[1].customer_name, "Dana Reyes");

        assert!(matches!(
            get_estimate_by_number(&conn, "EST-99999"),
            Err(AppError::NotFound(_))
        ));
    }
}
