//! Job repository: reads and guarded status writes for the `jobs` table.
//!
//! Every status write carries a `WHERE status ...` guard so the stored
//! status can only move forward. Callers learn from the returned flag
//! whether their write won.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub filename: String,
    pub file_ref: String,
    pub status: String,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub row_count: Option<i64>,
    pub rows_submitted: Option<i64>,
    pub attempts: i64,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub retry_of: Option<String>,
}

impl JobRow {
    /// A fresh `pending` row.
    pub fn pending(id: &str, filename: &str, file_ref: &str, created_at: &str) -> Self {
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            file_ref: file_ref.to_string(),
            status: "pending".to_string(),
            result: None,
            error_message: None,
            created_at: created_at.to_string(),
            started_at: None,
            completed_at: None,
            row_count: None,
            rows_submitted: None,
            attempts: 0,
            input_tokens: None,
            output_tokens: None,
            retry_of: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            file_ref: row.get("file_ref")?,
            status: row.get("status")?,
            result: row.get("result")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            row_count: row.get("row_count")?,
            rows_submitted: row.get("rows_submitted")?,
            attempts: row.get("attempts")?,
            input_tokens: row.get("input_tokens")?,
            output_tokens: row.get("output_tokens")?,
            retry_of: row.get("retry_of")?,
        })
    }
}

/// Values written when a job completes.
#[derive(Debug, Clone)]
pub struct Completion<'a> {
    pub result: &'a str,
    pub completed_at: &'a str,
    pub row_count: i64,
    pub rows_submitted: i64,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, filename, file_ref, status, result, error_message,
             created_at, started_at, completed_at, row_count, rows_submitted, attempts,
             input_tokens, output_tokens, retry_of)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.id,
                job.filename,
                job.file_ref,
                job.status,
                job.result,
                job.error_message,
                job.created_at,
                job.started_at,
                job.completed_at,
                job.row_count,
                job.rows_submitted,
                job.attempts,
                job.input_tokens,
                job.output_tokens,
                job.retry_of,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All jobs, newest first.
pub fn list_all(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC")?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Oldest pending jobs first, at most `limit`.
pub fn list_pending(db: &Database, limit: usize) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE status = 'pending'
             ORDER BY created_at ASC, rowid ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Atomically moves a job from `pending` to `processing`.
///
/// This is the only way into `processing`. Returns `false` when another
/// worker already claimed the job or it is no longer pending.
pub fn claim(db: &Database, id: &str, started_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'processing', started_at = ?2, attempts = attempts + 1
             WHERE id = ?1 AND status = 'pending'",
            params![id, started_at],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a `processing` job to `complete` with its result payload.
pub fn complete(db: &Database, id: &str, done: &Completion<'_>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'complete', result = ?2, error_message = NULL,
             completed_at = ?3, row_count = ?4, rows_submitted = ?5,
             input_tokens = ?6, output_tokens = ?7
             WHERE id = ?1 AND status = 'processing'",
            params![
                id,
                done.result,
                done.completed_at,
                done.row_count,
                done.rows_submitted,
                done.input_tokens,
                done.output_tokens,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a non-terminal job to `error`.
pub fn fail(
    db: &Database,
    id: &str,
    message: &str,
    completed_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'error', error_message = ?2, result = NULL,
             completed_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id, message, completed_at],
        )?;
        Ok(changed == 1)
    })
}

/// Fails every job left in `processing`, returning their IDs.
///
/// Run once at startup: a job in `processing` then belongs to a process
/// that no longer exists.
pub fn fail_interrupted(
    db: &Database,
    message: &str,
    completed_at: &str,
) -> Result<Vec<String>, DatabaseError> {
    db.with_transaction(|tx| {
        let ids = {
            let mut stmt = tx.prepare("SELECT id FROM jobs WHERE status = 'processing'")?;
            let ids = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        tx.execute(
            "UPDATE jobs SET status = 'error', error_message = ?1, completed_at = ?2
             WHERE status = 'processing'",
            params![message, completed_at],
        )?;
        Ok(ids)
    })
}

/// Deletes a job together with its chat messages and derived rows.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute("DELETE FROM chat_messages WHERE job_id = ?1", params![id])?;
        tx.execute("DELETE FROM row_analysis WHERE job_id = ?1", params![id])?;
        let changed = tx.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    })
}

/// Deletes every job and all dependent rows. Returns the number of jobs removed.
pub fn delete_all(db: &Database) -> Result<u64, DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute("DELETE FROM chat_messages", [])?;
        tx.execute("DELETE FROM row_analysis", [])?;
        let changed = tx.execute("DELETE FROM jobs", [])?;
        Ok(changed as u64)
    })
}
