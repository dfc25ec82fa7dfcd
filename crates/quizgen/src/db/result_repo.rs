//! Generation result repository: operations on the `generation_results` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw generation result row. `payload` holds serialized JSON.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub id: String,
    pub topic_id: String,
    pub job_id: String,
    pub payload: String,
    pub created_at: String,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            topic_id: row.get("topic_id")?,
            job_id: row.get("job_id")?,
            payload: row.get("payload")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Writes the result for a topic, replacing the payload of an earlier
/// attempt. A topic never has more than one result row.
pub fn upsert(
    db: &Database,
    topic_id: &str,
    job_id: &str,
    payload: &str,
    now: &str,
) -> Result<String, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO generation_results (id, topic_id, job_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(topic_id) DO UPDATE SET payload = excluded.payload",
            params![
                uuid::Uuid::new_v4().to_string(),
                topic_id,
                job_id,
                payload,
                now
            ],
        )?;
        let id: String = conn.query_row(
            "SELECT id FROM generation_results WHERE topic_id = ?1",
            params![topic_id],
            |r| r.get(0),
        )?;
        Ok(id)
    })
}

/// Removes the result of a topic, if any. Returns `true` if a row was deleted.
pub fn delete_by_topic(db: &Database, topic_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM generation_results WHERE topic_id = ?1",
            params![topic_id],
        )?;
        Ok(deleted > 0)
    })
}

/// Finds the result of a topic.
pub fn find_by_topic(db: &Database, topic_id: &str) -> Result<Option<ResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM generation_results WHERE topic_id = ?1",
                params![topic_id],
                ResultRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts the results stored for a job.
pub fn count_by_job(db: &Database, job_id: &str) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM generation_results WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
