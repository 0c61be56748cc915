//! Catalog prices keyed by SKU

use crate::db::sqlite::models::CatalogItem;
use crate::error::{AppError, Result};
use crate::materializer::{CatalogPrice, PriceBook};
use chrono::Utc;
use rusqlite::{params, Connection};

/// Get all catalog items
pub fn get_catalog(conn: &Connection) -> Result<Vec<CatalogItem>> {
    let mut stmt = conn.prepare(
        "SELECT sku, name, unit_cost, unit_type, last_price_updated
         FROM catalog_items ORDER BY sku",
    )?;

    let items = stmt
        .query_map([], |row| {
            Ok(CatalogItem {
                sku: row.get(0)?,
                name: row.get(1)?,
                unit_cost: row.get(2)?,
                unit_type: row.get(3)?,
                last_price_updated: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Set the unit cost for a SKU, stamping `last_price_updated`
pub fn upsert_price(
    conn: &Connection,
    sku: &str,
    name: &str,
    unit_cost: f64,
    unit_type: &str,
) -> Result<CatalogItem> {
    if !unit_cost.is_finite() || unit_cost < 0.0 {
        return Err(AppError::Validation(format!(
            "Invalid unit cost for {}: {}",
            sku, unit_cost
        )));
    }

    conn.execute(
        "INSERT INTO catalog_items (sku, name, unit_cost, unit_type, last_price_updated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(sku) DO UPDATE SET
             name = excluded.name,
             unit_cost = excluded.unit_cost,
             unit_type = excluded.unit_type,
             last_price_updated = excluded.last_price_updated",
        params![sku, name, unit_cost, unit_type, Utc::now()],
    )?;

    conn.query_row(
        "SELECT sku, name, unit_cost, unit_type, last_price_updated
         FROM catalog_items WHERE sku = ?",
        [sku],
        |row| {
            Ok(CatalogItem {
                sku: row.get(0)?,
                name: row.get(1)?,
                unit_cost: row.get(2)?,
                unit_type: row.get(3)?,
                last_price_updated: row.get(4)?,
            })
        },
    )
    .map_err(Into::into)
}

/// Load the catalog as a price book for the materializer
pub fn load_price_book(conn: &Connection) -> Result<PriceBook> {
    let mut book = PriceBook::new();
    for item in get_catalog(conn)? {
        book.insert(
            item.sku,
            CatalogPrice {
                unit_cost: item.unit_cost,
                last_price_updated: Some(item.last_price_updated),
            },
        );
    }
    Ok(book)
}
