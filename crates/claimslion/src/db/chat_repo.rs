//! Chat message repository. Messages are append-only.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub id: String,
    pub job_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            role: row.get("role")?,
            content: row.get("content")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn append(db: &Database, message: &ChatMessageRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO chat_messages (id, job_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.job_id,
                message.role,
                message.content,
                message.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Messages for a job in the order they were appended.
pub fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<ChatMessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, job_id, role, content, created_at FROM chat_messages
             WHERE job_id = ?1 ORDER BY created_at ASC, seq ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], ChatMessageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_for_job(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, JobRow};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(
            &db,
            &JobRow::pending("job-1", "claims.csv", "job-1.csv", "2026-01-01T00:00:00.000000Z"),
        )
        .unwrap();
        db
    }

    fn message(id: &str, role: &str, created_at: &str) -> ChatMessageRow {
        ChatMessageRow {
            id: id.to_string(),
            job_id: "job-1".to_string(),
            role: role.to_string(),
            content: format!("content of {}", id),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_append_and_list_in_order() {
        let db = setup();
        append(&db, &message("m1", "user", "2026-01-01T00:00:01.000000Z")).unwrap();
        append(&db, &message("m2", "assistant", "2026-01-01T00:00:02.000000Z")).unwrap();

        let messages = list_for_job(&db, "job-1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(count_for_job(&db, "job-1").unwrap(), 2);
    }

    #[test]
    fn test_same_timestamp_keeps_insertion_order() {
        let db = setup();
        let ts = "2026-01-01T00:00:01.000000Z";
        append(&db, &message("b", "user", ts)).unwrap();
        append(&db, &message("a", "assistant", ts)).unwrap();

        let ids: Vec<String> = list_for_job(&db, "job-1")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_append_requires_existing_job() {
        let db = setup();
        let mut orphan = message("m1", "user", "2026-01-01T00:00:01.000000Z");
        orphan.job_id = "missing".to_string();
        assert!(append(&db, &orphan).is_err());
    }

    #[test]
    fn test_invalid_role_rejected() {
        let db = setup();
        assert!(append(&db, &message("m1", "system", "2026-01-01T00:00:01.000000Z")).is_err());
    }
}
