//! Settings management

use crate::db::sqlite::models::PricingDefaultsUpdate;
use crate::error::Result;
use crate::materializer::PackagingRules;
use crate::pricing::PricingConfig;
use chrono::Utc;
use rusqlite::{params, Connection};

/// Get the default pricing guarantees
pub fn get_pricing_defaults(conn: &Connection) -> Result<PricingConfig> {
    let config = conn.query_row(
        "SELECT target_margin_percent, overhead_percent, commission_percent,
                waste_factor_percent, contingency_percent
         FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(PricingConfig {
                target_margin_percent: row.get(0)?,
                overhead_percent: row.get(1)?,
                commission_percent: row.get(2)?,
                waste_factor_percent: row.get(3)?,
                contingency_percent: row.get(4)?,
            })
        },
    )?;

    Ok(config)
}

/// Update the default pricing guarantees.
///
/// The merged result is range-checked before anything is written.
pub fn update_pricing_defaults(
    conn: &Connection,
    update: &PricingDefaultsUpdate,
) -> Result<PricingConfig> {
    let current = get_pricing_defaults(conn)?;
    update.apply_to(&current).validate()?;

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(v) = update.target_margin_percent {
        updates.push("target_margin_percent = ?");
        params.push(Box::new(v));
    }
    if let Some(v) = update.overhead_percent {
        updates.push("overhead_percent = ?");
        params.push(Box::new(v));
    }
    if let Some(v) = update.commission_percent {
        updates.push("commission_percent = ?");
        params.push(Box::new(v));
    }
    if let Some(v) = update.waste_factor_percent {
        updates.push("waste_factor_percent = ?");
        params.push(Box::new(v));
    }
    if let Some(v) = update.contingency_percent {
        updates.push("contingency_percent = ?");
        params.push(Box::new(v));
    }

    if !updates.is_empty() {
        updates.push("updated_at = ?");
        params.push(Box::new(Utc::now()));

        let sql = format!("UPDATE settings SET {} WHERE id = 1", updates.join(", "));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;
    }

    get_pricing_defaults(conn)
}

/// Get packaging rules, falling back to the built-in conventions
pub fn get_packaging_rules(conn: &Connection) -> Result<PackagingRules> {
    let stored: Option<String> = conn.query_row(
        "SELECT packaging_rules FROM settings WHERE id = 1",
        [],
        |row| row.get(0),
    )?;

    match stored {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(PackagingRules::default()),
    }
}

/// Replace the packaging rules
pub fn update_packaging_rules(conn: &Connection, rules: &PackagingRules) -> Result<PackagingRules> {
    rules.validate()?;

    conn.execute(
        "UPDATE settings SET packaging_rules = ?1, updated_at = ?2 WHERE id = 1",
        params![serde_json::to_string(rules)?, Utc::now()],
    )?;

    get_packaging_rules(conn)
}
