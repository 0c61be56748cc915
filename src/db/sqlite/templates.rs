//! Estimate template management

use crate::db::sqlite::models::{EstimateTemplate, NewTemplate};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

type TemplateRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_template(row: TemplateRow) -> Result<EstimateTemplate> {
    let (id, name, description, roof_type, items, created_at, updated_at) = row;
    Ok(EstimateTemplate {
        id,
        name,
        description,
        roof_type,
        items: serde_json::from_str(&items)?,
        created_at,
        updated_at,
    })
}

/// Get all templates
pub fn get_templates(conn: &Connection) -> Result<Vec<EstimateTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, roof_type, items, created_at, updated_at
         FROM estimate_templates ORDER BY name",
    )?;

    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(into_template).collect()
}

/// Get template by ID
pub fn get_template(conn: &Connection, id: i64) -> Result<EstimateTemplate> {
    let row = conn
        .query_row(
            "SELECT id, name, description, roof_type, items, created_at, updated_at
             FROM estimate_templates WHERE id = ?",
            [id],
            read_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound(format!("Template not found: {}", id))
            }
            _ => e.into(),
        })?;

    into_template(row)
}

/// Create a new template
pub fn create_template(conn: &Connection, template: &NewTemplate) -> Result<EstimateTemplate> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM estimate_templates WHERE name = ?)",
        [&template.name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::Validation(format!(
            "A template named '{}' already exists",
            template.name
        )));
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO estimate_templates (name, description, roof_type, items, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            template.name,
            template.description,
            template.roof_type,
            serde_json::to_string(&template.items)?,
            now,
        ],
    )?;

    get_template(conn, conn.last_insert_rowid())
}

/// Delete a template
pub fn delete_template(conn: &Connection, id: i64) -> Result<()> {
    let rows = conn.execute("DELETE FROM estimate_templates WHERE id = ?", [id])?;

    if rows == 0 {
        return Err(AppError::NotFound(format!("Template not found: {}", id)));
    }

    Ok(())
}
