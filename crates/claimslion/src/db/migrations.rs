//! Database migration system.
//!
//! Applied versions are recorded in `_migrations`; each migration runs at
//! most once. Column additions are skipped when the column already exists
//! so a database created by a newer build can be reopened by this one.

use std::collections::BTreeSet;

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_chat_messages_table",
        sql: include_str!("sql/002_create_chat_messages.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_row_analysis_table",
        sql: include_str!("sql/003_create_row_analysis.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "add_retry_of_to_jobs",
        sql: include_str!("sql/004_add_retry_of.sql"),
        kind: MigrationKind::AddColumn {
            table: "jobs",
            column: "retry_of",
        },
    },
];

impl Migration {
    /// Whether the migration's SQL still has work to do on this schema.
    fn needed(&self, conn: &Connection) -> Result<bool, DatabaseError> {
        match &self.kind {
            MigrationKind::Standard => Ok(true),
            MigrationKind::AddColumn { table, column } => {
                Ok(!column_exists(conn, table, column)?)
            }
        }
    }

    /// Executes the SQL (when needed) and records the version in one
    /// transaction.
    fn apply(&self, conn: &mut Connection) -> Result<(), DatabaseError> {
        let needed = self.needed(conn)?;
        let tx = conn.transaction()?;
        if needed {
            tx.execute_batch(self.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: self.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!("Migration v{} already reflected in schema", self.version);
        }
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![self.version, self.description],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Brings the schema up to date.
pub fn run_all(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied: BTreeSet<u32> = {
        let mut stmt = conn.prepare("SELECT version FROM _migrations")?;
        let versions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        versions
    };

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();
    for migration in pending {
        log::info!("Applying migration v{} ({})", migration.version, migration.description);
        migration.apply(conn)?;
    }

    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let columns: Vec<String> = conn
        .prepare(&format!("PRAGMA table_info({})", table))?
        .query_map([], |row| row.get(1))?
        .collect::<Result<_, _>>()?;
    Ok(columns.iter().any(|name| name == column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = fresh();
        run_all(&mut conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_add_column_skipped_when_present() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("sql/001_create_jobs.sql"))
            .unwrap();
        conn.execute_batch(include_str!("sql/004_add_retry_of.sql"))
            .unwrap();

        // Would fail with "duplicate column" if not skipped.
        run_all(&mut conn).unwrap();
        assert!(column_exists(&conn, "jobs", "retry_of").unwrap());
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = fresh();
        let result = conn.execute(
            "INSERT INTO jobs (id, filename, file_ref, status, created_at)
             VALUES ('j1', 'a.csv', 'j1.csv', 'done', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_chat_messages_cascade_on_job_delete() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO jobs (id, filename, file_ref, created_at)
             VALUES ('j1', 'a.csv', 'j1.csv', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_messages (id, job_id, role, content, created_at)
             VALUES ('m1', 'j1', 'user', 'hi', '2026-01-01T00:00:01Z')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM jobs WHERE id = 'j1'", []).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
