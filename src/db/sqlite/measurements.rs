//! Verified measurements and the pipeline metadata cache

use crate::db::sqlite::models::{NewVerifiedMeasurement, PipelineMetadata};
use crate::error::{AppError, Result};
use crate::measurement::{SatelliteMeasurement, VerifiedMeasurement};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

struct VerifiedRow {
    id: i64,
    property_id: String,
    source: String,
    summary: String,
    linear_features: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl VerifiedRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            property_id: row.get(1)?,
            source: row.get(2)?,
            summary: row.get(3)?,
            linear_features: row.get(4)?,
            is_active: row.get::<_, i32>(5)? == 1,
            created_at: row.get(6)?,
        })
    }

    fn into_measurement(self) -> Result<VerifiedMeasurement> {
        Ok(VerifiedMeasurement {
            id: self.id,
            property_id: self.property_id,
            is_active: self.is_active,
            source: self.source,
            summary: serde_json::from_str(&self.summary)?,
            linear_features: serde_json::from_str(&self.linear_features)?,
            created_at: self.created_at,
        })
    }
}

const VERIFIED_COLUMNS: &str =
    "id, property_id, source, summary, linear_features, is_active, created_at";

/// Store a verified measurement as the active record for its property
pub fn insert_verified_measurement(
    conn: &Connection,
    measurement: &NewVerifiedMeasurement,
) -> Result<VerifiedMeasurement> {
    conn.execute(
        "INSERT INTO verified_measurements (property_id, source, summary, linear_features, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            measurement.property_id,
            measurement.source,
            serde_json::to_string(&measurement.summary)?,
            serde_json::to_string(&measurement.linear_features)?,
            Utc::now(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_verified_measurement(conn, id)
}

fn get_verified_measurement(conn: &Connection, id: i64) -> Result<VerifiedMeasurement> {
    let sql = format!(
        "SELECT {} FROM verified_measurements WHERE id = ?",
        VERIFIED_COLUMNS
    );
    conn.query_row(&sql, [id], VerifiedRow::from_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound(format!("Verified measurement not found: {}", id))
            }
            _ => e.into(),
        })?
        .into_measurement()
}

/// All measurement records for a property, newest first
pub fn list_verified_measurements(
    conn: &Connection,
    property_id: &str,
) -> Result<Vec<VerifiedMeasurement>> {
    let sql = format!(
        "SELECT {} FROM verified_measurements WHERE property_id = ?
         ORDER BY created_at DESC, id DESC",
        VERIFIED_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map([property_id], VerifiedRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(VerifiedRow::into_measurement).collect()
}

/// Most recent active record for a property
pub fn latest_active_measurement(
    conn: &Connection,
    property_id: &str,
) -> Result<Option<VerifiedMeasurement>> {
    let sql = format!(
        "SELECT {} FROM verified_measurements
         WHERE property_id = ? AND is_active = 1
         ORDER BY created_at DESC, id DESC LIMIT 1",
        VERIFIED_COLUMNS
    );

    conn.query_row(&sql, [property_id], VerifiedRow::from_row)
        .optional()?
        .map(VerifiedRow::into_measurement)
        .transpose()
}

/// Mark every active record for a property inactive; returns rows changed
pub fn deactivate_measurements(conn: &Connection, property_id: &str) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE verified_measurements SET is_active = 0
         WHERE property_id = ? AND is_active = 1",
        [property_id],
    )?;

    tracing::info!(
        "Deactivated {} measurement records for property {}",
        rows,
        property_id
    );
    Ok(rows)
}

/// Insert or replace the cached measurement for a pipeline entry
pub fn upsert_pipeline_metadata(
    conn: &Connection,
    pipeline_entry_id: &str,
    property_id: Option<&str>,
    measurement: Option<&SatelliteMeasurement>,
) -> Result<PipelineMetadata> {
    let measurement_json = measurement.map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO pipeline_metadata (pipeline_entry_id, property_id, measurement, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(pipeline_entry_id) DO UPDATE SET
             property_id = COALESCE(excluded.property_id, pipeline_metadata.property_id),
             measurement = excluded.measurement,
             updated_at = excluded.updated_at",
        params![pipeline_entry_id, property_id, measurement_json, Utc::now()],
    )?;

    get_pipeline_metadata(conn, pipeline_entry_id)?.ok_or_else(|| {
        AppError::Internal(format!(
            "Pipeline metadata for {} vanished after upsert",
            pipeline_entry_id
        ))
    })
}

/// Cached metadata for a pipeline entry, if any
pub fn get_pipeline_metadata(
    conn: &Connection,
    pipeline_entry_id: &str,
) -> Result<Option<PipelineMetadata>> {
    let row = conn
        .query_row(
            "SELECT pipeline_entry_id, property_id, measurement, updated_at
             FROM pipeline_metadata WHERE pipeline_entry_id = ?",
            [pipeline_entry_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(
        |(pipeline_entry_id, property_id, measurement, updated_at)| -> Result<PipelineMetadata> {
            Ok(PipelineMetadata {
                pipeline_entry_id,
                property_id,
                measurement: measurement
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?,
                updated_at,
            })
        },
    )
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_connection;
    use crate::measurement::{LinearFeatures, MeasurementSummary};
    use serde_json::json;

    fn record(property_id: &str, squares: f64) -> NewVerifiedMeasurement {
        NewVerifiedMeasurement {
            property_id: property_id.to_string(),
            source: "eagleview".to_string(),
            summary: MeasurementSummary {
                total_squares: Some(squares),
                pitch: Some("6/12".to_string()),
                ..Default::default()
            },
            linear_features: serde_json::from_value(json!([
                {"type": "ridge", "length_ft": 40.0},
                {"type": "eave", "length_ft": 120.0}
            ]))
            .unwrap(),
        }
    }

    #[test]
    fn test_latest_active_measurement_wins() {
        let conn = test_connection();
        insert_verified_measurement(&conn, &record("prop-1", 20.0)).unwrap();
        let newer = insert_verified_measurement(&conn, &record("prop-1", 24.0)).unwrap();
        insert_verified_measurement(&conn, &record("prop-2", 31.0)).unwrap();

        let latest = latest_active_measurement(&conn, "prop-1").unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.summary.total_squares, Some(24.0));
        assert!(matches!(latest.linear_features, LinearFeatures::Records(ref r) if r.len() == 2));
    }

    #[test]
    fn test_deactivate_clears_active_records() {
        let conn = test_connection();
        insert_verified_measurement(&conn, &record("prop-1", 20.0)).unwrap();
        insert_verified_measurement(&conn, &record("prop-1", 24.0)).unwrap();

        assert_eq!(deactivate_measurements(&conn, "prop-1").unwrap(), 2);
        assert!(latest_active_measurement(&conn, "prop-1").unwrap().is_none());

        let all = list_verified_measurements(&conn, "prop-1").unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| !m.is_active));
    }

    #[test]
    fn test_pipeline_metadata_upsert() {
        let conn = test_connection();
        assert!(get_pipeline_metadata(&conn, "entry-1").unwrap().is_none());

        let first = SatelliteMeasurement {
            adjusted_squares: Some(25.0),
            ..Default::default()
        };
        upsert_pipeline_metadata(&conn, "entry-1", Some("prop-9"), Some(&first)).unwrap();

        let second = SatelliteMeasurement {
            adjusted_squares: Some(27.5),
            ..Default::default()
        };
        let stored = upsert_pipeline_metadata(&conn, "entry-1", None, Some(&second)).unwrap();

        assert_eq!(stored.property_id.as_deref(), Some("prop-9"));
        assert_eq!(stored.measurement.unwrap().adjusted_squares, Some(27.5));
    }
}
