//! Derived per-row breakdown. Always regenerated as a whole from a job's result.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, Default)]
pub struct RowAnalysisRow {
    pub id: String,
    pub job_id: String,
    pub sku: Option<String>,
    pub region: Option<String>,
    pub recommendation: Option<String>,
    pub alert: Option<String>,
    pub forecast_highlight: Option<String>,
    pub priority: Option<String>,
    pub action: Option<String>,
    pub reason: Option<String>,
    pub created_at: String,
}

impl RowAnalysisRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            sku: row.get("sku")?,
            region: row.get("region")?,
            recommendation: row.get("recommendation")?,
            alert: row.get("alert")?,
            forecast_highlight: row.get("forecast_highlight")?,
            priority: row.get("priority")?,
            action: row.get("action")?,
            reason: row.get("reason")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Replaces all rows of a job in one transaction.
pub fn replace_for_job(
    db: &Database,
    job_id: &str,
    rows: &[RowAnalysisRow],
) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute("DELETE FROM row_analysis WHERE job_id = ?1", params![job_id])?;
        let mut stmt = tx.prepare(
            "INSERT INTO row_analysis (id, job_id, sku, region, recommendation, alert,
             forecast_highlight, priority, action, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.id,
                job_id,
                row.sku,
                row.region,
                row.recommendation,
                row.alert,
                row.forecast_highlight,
                row.priority,
                row.action,
                row.reason,
                row.created_at,
            ])?;
        }
        Ok(())
    })
}

pub fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<RowAnalysisRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, job_id, sku, region, recommendation, alert, forecast_highlight,
             priority, action, reason, created_at
             FROM row_analysis WHERE job_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], RowAnalysisRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
