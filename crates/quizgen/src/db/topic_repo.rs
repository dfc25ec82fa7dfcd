//! Topic repository: operations on the `topics` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw topic row from the database.
#[derive(Debug, Clone)]
pub struct TopicRow {
    pub id: String,
    pub job_id: String,
    pub name: String,
    pub position: u32,
    pub status: String,
    pub attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl TopicRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            name: row.get("name")?,
            position: row.get("position")?,
            status: row.get("status")?,
            attempts: row.get("attempts")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts one `pending` topic per name, in order, inside a single
/// transaction. Either every topic is created or none is.
pub fn insert_many(
    db: &Database,
    job_id: &str,
    names: &[String],
    now: &str,
) -> Result<Vec<String>, DatabaseError> {
    db.with_tx(|tx| insert_all(tx, job_id, names, now))
}

/// Inserts the topics on a connection the caller already holds, typically
/// inside a wider transaction.
pub(crate) fn insert_all(
    conn: &Connection,
    job_id: &str,
    names: &[String],
    now: &str,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO topics (id, job_id, name, position, status, attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
    )?;
    let mut ids = Vec::with_capacity(names.len());
    for (position, name) in names.iter().enumerate() {
        let id = uuid::Uuid::new_v4().to_string();
        stmt.execute(params![id, job_id, name, position as u32, now])?;
        ids.push(id);
    }
    Ok(ids)
}

/// Finds a topic by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<TopicRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM topics WHERE id = ?1",
                params![id],
                TopicRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists the topics of a job in extraction order.
pub fn list_by_job(db: &Database, job_id: &str) -> Result<Vec<TopicRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM topics WHERE job_id = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map(params![job_id], TopicRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Marks a non-terminal topic `processing` and bumps its attempt counter.
///
/// Terminal topics are returned unchanged so the caller can see that the
/// work is already done. Returns `None` if the topic does not exist.
pub fn begin_attempt(
    db: &Database,
    id: &str,
    now: &str,
) -> Result<Option<TopicRow>, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE topics SET status = 'processing', attempts = attempts + 1, updated_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id, now],
        )?;
        let row = conn
            .query_row(
                "SELECT * FROM topics WHERE id = ?1",
                params![id],
                TopicRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Sets the status of a topic that is not yet `completed` or `failed`.
///
/// Returns `true` when the row changed.
pub fn update_status(
    db: &Database,
    id: &str,
    status: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE topics SET status = ?2, updated_at = ?3
             WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
            params![id, status, now],
        )?;
        Ok(updated > 0)
    })
}
