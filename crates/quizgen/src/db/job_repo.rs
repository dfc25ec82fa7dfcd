//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{topic_repo, Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub user_id: Option<String>,
    pub filename: String,
    pub source_ref: String,
    pub status: String,
    pub total_topics: Option<u32>,
    pub completed_topics: u32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub finalized_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            filename: row.get("filename")?,
            source_ref: row.get("source_ref")?,
            status: row.get("status")?,
            total_topics: row.get("total_topics")?,
            completed_topics: row.get("completed_topics")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            finalized_at: row.get("finalized_at")?,
        })
    }
}

/// A status change for one job row.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub status: &'a str,
    pub error_message: Option<&'a str>,
    /// Left untouched when `None`.
    pub total_topics: Option<u32>,
    /// Stamps `finalized_at` together with the status.
    pub finalize: bool,
    pub updated_at: &'a str,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, user_id, filename, source_ref, status, total_topics,
             completed_topics, error_message, created_at, updated_at, finalized_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id,
                job.user_id,
                job.filename,
                job.source_ref,
                job.status,
                job.total_topics,
                job.completed_topics,
                job.error_message,
                job.created_at,
                job.updated_at,
                job.finalized_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns true if a job with this ID exists.
pub fn exists(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Applies a status change to a job that has not reached a terminal status.
///
/// Returns `true` when the row was updated. A job that is already
/// `completed` or `failed` is never modified, which makes the terminal
/// transition happen at most once per job.
pub fn update_status(
    db: &Database,
    id: &str,
    change: &StatusChange<'_>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| apply_status(conn, id, change))
}

fn apply_status(
    conn: &Connection,
    id: &str,
    change: &StatusChange<'_>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE jobs SET status = ?2, error_message = ?3,
         total_topics = COALESCE(?4, total_topics), updated_at = ?5,
         finalized_at = CASE WHEN ?6 THEN ?5 ELSE finalized_at END
         WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
        params![
            id,
            change.status,
            change.error_message,
            change.total_topics,
            change.updated_at,
            change.finalize,
        ],
    )?;
    Ok(updated > 0)
}

/// Moves a job to `generating_quizzes` with `total_topics` set to the number
/// of names and creates its topics, in one transaction.
///
/// Returns the topic ids, or `None` when the job is missing or already
/// terminal; nothing is written in that case.
pub fn record_topics(
    db: &Database,
    id: &str,
    names: &[String],
    now: &str,
) -> Result<Option<Vec<String>>, DatabaseError> {
    let change = StatusChange {
        status: "generating_quizzes",
        error_message: None,
        total_topics: Some(names.len() as u32),
        finalize: false,
        updated_at: now,
    };
    db.with_tx(|tx| {
        if !apply_status(tx, id, &change)? {
            return Ok(None);
        }
        topic_repo::insert_all(tx, id, names, now).map(Some)
    })
}

/// Recomputes `completed_topics` from the topic rows of the job.
///
/// The count is clamped to `total_topics`. Returns `None` if the job does
/// not exist.
pub fn recount_completed(
    db: &Database,
    id: &str,
    updated_at: &str,
) -> Result<Option<u32>, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET completed_topics = MIN(
                (SELECT COUNT(*) FROM topics WHERE job_id = ?1 AND status = 'completed'),
                COALESCE(total_topics, 0)
             ), updated_at = ?2
             WHERE id = ?1",
            params![id, updated_at],
        )?;
        let count = conn
            .query_row(
                "SELECT completed_topics FROM jobs WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::topic_repo;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            user_id: None,
            filename: "lecture.pdf".to_string(),
            source_ref: format!("{}.pdf", id),
            status: "pending".to_string(),
            total_topics: None,
            completed_topics: 0,
            error_message: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            finalized_at: None,
        }
    }

    fn change(status: &str) -> StatusChange<'_> {
        StatusChange {
            status,
            error_message: None,
            total_topics: None,
            finalize: false,
            updated_at: "2026-01-01T01:00:00Z",
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_job("job-1")).unwrap();

        let found = find_by_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(found.filename, "lecture.pdf");
        assert_eq!(found.status, "pending");
        assert_eq!(found.total_topics, None);
        assert_eq!(found.completed_topics, 0);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "nonexistent").unwrap().is_none());
        assert!(!exists(&db, "nonexistent").unwrap());
    }

    #[test]
    fn test_update_status_sets_total_and_error() {
        let db = test_db();
        insert(&db, &sample_job("job-2")).unwrap();

        let mut c = change("generating_quizzes");
        c.total_topics = Some(4);
        assert!(update_status(&db, "job-2", &c).unwrap());

        let found = find_by_id(&db, "job-2").unwrap().unwrap();
        assert_eq!(found.status, "generating_quizzes");
        assert_eq!(found.total_topics, Some(4));

        // total_topics is kept when not provided
        let mut c = change("failed");
        c.error_message = Some("boom");
        assert!(update_status(&db, "job-2", &c).unwrap());
        let found = find_by_id(&db, "job-2").unwrap().unwrap();
        assert_eq!(found.total_topics, Some(4));
        assert_eq!(found.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let db = test_db();
        insert(&db, &sample_job("job-3")).unwrap();

        let mut done = change("completed");
        done.finalize = true;
        assert!(update_status(&db, "job-3", &done).unwrap());
        assert!(!update_status(&db, "job-3", &done).unwrap());
        assert!(!update_status(&db, "job-3", &change("failed")).unwrap());

        let found = find_by_id(&db, "job-3").unwrap().unwrap();
        assert_eq!(found.status, "completed");
        assert!(found.finalized_at.is_some());
    }

    #[test]
    fn test_update_status_missing_job() {
        let db = test_db();
        assert!(!update_status(&db, "ghost", &change("failed")).unwrap());
    }

    #[test]
    fn test_recount_completed_is_idempotent() {
        let db = test_db();
        insert(&db, &sample_job("job-4")).unwrap();
        let mut c = change("generating_quizzes");
        c.total_topics = Some(3);
        update_status(&db, "job-4", &c).unwrap();

        let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let ids = topic_repo::insert_many(&db, "job-4", &names, "now").unwrap();
        topic_repo::update_status(&db, &ids[0], "completed", "now").unwrap();
        topic_repo::update_status(&db, &ids[2], "completed", "now").unwrap();

        assert_eq!(recount_completed(&db, "job-4", "now").unwrap(), Some(2));
        assert_eq!(recount_completed(&db, "job-4", "now").unwrap(), Some(2));
        assert_eq!(find_by_id(&db, "job-4").unwrap().unwrap().completed_topics, 2);
    }

    #[test]
    fn test_record_topics_sets_total_with_topics() {
        let db = test_db();
        insert(&db, &sample_job("job-5")).unwrap();
        let names = vec!["A".to_string(), "B".to_string()];

        let ids = record_topics(&db, "job-5", &names, "now").unwrap().unwrap();

        assert_eq!(ids.len(), 2);
        let found = find_by_id(&db, "job-5").unwrap().unwrap();
        assert_eq!(found.status, "generating_quizzes");
        assert_eq!(found.total_topics, Some(2));
        assert_eq!(topic_repo::list_by_job(&db, "job-5").unwrap().len(), 2);
    }

    #[test]
    fn test_record_topics_on_terminal_job_writes_nothing() {
        let db = test_db();
        insert(&db, &sample_job("job-6")).unwrap();
        let mut failed = change("failed");
        failed.finalize = true;
        update_status(&db, "job-6", &failed).unwrap();

        let names = vec!["A".to_string(), "B".to_string()];
        assert!(record_topics(&db, "job-6", &names, "now").unwrap().is_none());

        let found = find_by_id(&db, "job-6").unwrap().unwrap();
        assert_eq!(found.status, "failed");
        assert_eq!(found.total_topics, None);
        assert!(topic_repo::list_by_job(&db, "job-6").unwrap().is_empty());
    }

    #[test]
    fn test_record_topics_rolls_back_status_when_insert_fails() {
        let db = test_db();
        insert(&db, &sample_job("job-7")).unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_topic BEFORE INSERT ON topics
                 WHEN NEW.name = 'B' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let names = vec!["A".to_string(), "B".to_string()];
        assert!(record_topics(&db, "job-7", &names, "now").is_err());

        let found = find_by_id(&db, "job-7").unwrap().unwrap();
        assert_eq!(found.status, "pending");
        assert_eq!(found.total_topics, None);
        assert!(topic_repo::list_by_job(&db, "job-7").unwrap().is_empty());
    }

    #[test]
    fn test_recount_missing_job() {
        let db = test_db();
        assert_eq!(recount_completed(&db, "ghost", "now").unwrap(), None);
    }
}
