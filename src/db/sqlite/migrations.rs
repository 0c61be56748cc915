//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_verified_measurements", CREATE_VERIFIED_MEASUREMENTS_TABLE)?;
    run_migration(conn, "002_pipeline_metadata", CREATE_PIPELINE_METADATA_TABLE)?;
    run_migration(conn, "003_estimates", CREATE_ESTIMATES_TABLE)?;
    run_migration(conn, "004_estimate_sequence", CREATE_ESTIMATE_SEQUENCE_TABLE)?;
    run_migration(conn, "005_estimate_templates", CREATE_ESTIMATE_TEMPLATES_TABLE)?;
    run_migration(conn, "006_catalog_items", CREATE_CATALOG_ITEMS_TABLE)?;
    run_migration(conn, "007_settings", CREATE_SETTINGS_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_VERIFIED_MEASUREMENTS_TABLE: &str = r#"
CREATE TABLE verified_measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    property_id TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'manual',
    summary TEXT NOT NULL,
    linear_features TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_verified_measurements_property
    ON verified_measurements(property_id, is_active);
"#;

const CREATE_PIPELINE_METADATA_TABLE: &str = r#"
CREATE TABLE pipeline_metadata (
    pipeline_entry_id TEXT PRIMARY KEY,
    property_id TEXT,
    measurement TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_ESTIMATES_TABLE: &str = r#"
CREATE TABLE estimates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    estimate_number TEXT NOT NULL UNIQUE,
    pipeline_entry_id TEXT NOT NULL,
    template_id INTEGER,
    sales_rep_id TEXT,
    customer_name TEXT NOT NULL,
    roof_area_sq_ft REAL NOT NULL,
    selling_price REAL NOT NULL DEFAULT 0,
    actual_profit_percent REAL NOT NULL DEFAULT 0,
    property_details TEXT NOT NULL,
    line_items TEXT NOT NULL,
    pricing TEXT NOT NULL,
    calculations TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_estimates_pipeline_entry ON estimates(pipeline_entry_id);
"#;

const CREATE_ESTIMATE_SEQUENCE_TABLE: &str = r#"
CREATE TABLE estimate_sequence (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    next_value INTEGER NOT NULL
);

INSERT INTO estimate_sequence (id, next_value) VALUES (1, 1);
"#;

const CREATE_ESTIMATE_TEMPLATES_TABLE: &str = r#"
CREATE TABLE estimate_templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    roof_type TEXT,
    items TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_CATALOG_ITEMS_TABLE: &str = r#"
CREATE TABLE catalog_items (
    sku TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    unit_cost REAL NOT NULL,
    unit_type TEXT NOT NULL,
    last_price_updated TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_SETTINGS_TABLE: &str = r#"
CREATE TABLE settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    target_margin_percent REAL NOT NULL DEFAULT 30,
    overhead_percent REAL NOT NULL DEFAULT 10,
    commission_percent REAL NOT NULL DEFAULT 5,
    waste_factor_percent REAL NOT NULL DEFAULT 10,
    contingency_percent REAL NOT NULL DEFAULT 0,
    packaging_rules TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

INSERT INTO settings (id) VALUES (1);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 7);

        let next: i64 = conn
            .query_row("SELECT next_value FROM estimate_sequence", [], |row| row.get(0))
            .unwrap();
        assert_eq!(next, 1);
    }
}
