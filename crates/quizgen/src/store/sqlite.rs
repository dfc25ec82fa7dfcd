//! SQLite-backed [`JobStore`].

use chrono::{DateTime, Utc};

use super::{
    GenerationResult, Job, JobStatus, JobStore, JobUpdate, NewJob, StoreError, Topic, TopicStatus,
};
use crate::db::job_repo::{self, JobRow, StatusChange};
use crate::db::result_repo::{self, ResultRow};
use crate::db::topic_repo::{self, TopicRow};
use crate::db::{now_timestamp, Database};

/// Job store over the crate's [`Database`] handle.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn require_job(&self, job_id: &str) -> Result<(), StoreError> {
        if job_repo::exists(&self.db, job_id)? {
            Ok(())
        } else {
            Err(StoreError::JobNotFound(job_id.to_string()))
        }
    }
}

fn parse_time(entity: &'static str, id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            entity,
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", raw, e),
        })
}

fn job_from_row(row: JobRow) -> Result<Job, StoreError> {
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|reason| StoreError::CorruptRow {
            entity: "job",
            id: row.id.clone(),
            reason,
        })?;
    let created_at = parse_time("job", &row.id, &row.created_at)?;
    let updated_at = parse_time("job", &row.id, &row.updated_at)?;
    let finalized_at = row
        .finalized_at
        .as_deref()
        .map(|raw| parse_time("job", &row.id, raw))
        .transpose()?;

    Ok(Job {
        id: row.id,
        user_id: row.user_id,
        filename: row.filename,
        source_ref: row.source_ref,
        status,
        total_topics: row.total_topics,
        completed_topics: row.completed_topics,
        error_message: row.error_message,
        created_at,
        updated_at,
        finalized_at,
    })
}

fn topic_from_row(row: TopicRow) -> Result<Topic, StoreError> {
    let status = row
        .status
        .parse::<TopicStatus>()
        .map_err(|reason| StoreError::CorruptRow {
            entity: "topic",
            id: row.id.clone(),
            reason,
        })?;
    let created_at = parse_time("topic", &row.id, &row.created_at)?;
    let updated_at = parse_time("topic", &row.id, &row.updated_at)?;

    Ok(Topic {
        id: row.id,
        job_id: row.job_id,
        name: row.name,
        position: row.position,
        status,
        attempts: row.attempts,
        created_at,
        updated_at,
    })
}

fn result_from_row(row: ResultRow) -> Result<GenerationResult, StoreError> {
    let payload = serde_json::from_str(&row.payload).map_err(|e| StoreError::CorruptRow {
        entity: "result",
        id: row.id.clone(),
        reason: format!("payload is not JSON: {}", e),
    })?;
    let created_at = parse_time("result", &row.id, &row.created_at)?;

    Ok(GenerationResult {
        id: row.id,
        topic_id: row.topic_id,
        job_id: row.job_id,
        payload,
        created_at,
    })
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let now = now_timestamp();
        let row = JobRow {
            id: job.id,
            user_id: job.user_id,
            filename: job.filename,
            source_ref: job.source_ref,
            status: JobStatus::Pending.as_str().to_string(),
            total_topics: None,
            completed_topics: 0,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            finalized_at: None,
        };
        job_repo::insert(&self.db, &row)?;
        job_from_row(row)
    }

    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        job_repo::find_by_id(&self.db, job_id)?
            .map(job_from_row)
            .transpose()
    }

    fn update_job_status(&self, job_id: &str, update: JobUpdate) -> Result<bool, StoreError> {
        let now = now_timestamp();
        let change = StatusChange {
            status: update.status.as_str(),
            error_message: update.error_message.as_deref(),
            total_topics: update.total_topics,
            finalize: update.status.is_terminal(),
            updated_at: &now,
        };
        if job_repo::update_status(&self.db, job_id, &change)? {
            return Ok(true);
        }
        self.require_job(job_id)?;
        Ok(false)
    }

    fn insert_topics(&self, job_id: &str, names: &[String]) -> Result<Vec<String>, StoreError> {
        self.require_job(job_id)?;
        let ids = topic_repo::insert_many(&self.db, job_id, names, &now_timestamp())?;
        Ok(ids)
    }

    fn record_topics(
        &self,
        job_id: &str,
        names: &[String],
    ) -> Result<Option<Vec<String>>, StoreError> {
        match job_repo::record_topics(&self.db, job_id, names, &now_timestamp())? {
            Some(ids) => Ok(Some(ids)),
            None => {
                self.require_job(job_id)?;
                Ok(None)
            }
        }
    }

    fn list_topics(&self, job_id: &str) -> Result<Vec<Topic>, StoreError> {
        topic_repo::list_by_job(&self.db, job_id)?
            .into_iter()
            .map(topic_from_row)
            .collect()
    }

    fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError> {
        topic_repo::find_by_id(&self.db, topic_id)?
            .map(topic_from_row)
            .transpose()
    }

    fn begin_topic_attempt(&self, topic_id: &str) -> Result<Topic, StoreError> {
        match topic_repo::begin_attempt(&self.db, topic_id, &now_timestamp())? {
            Some(row) => topic_from_row(row),
            None => Err(StoreError::TopicNotFound(topic_id.to_string())),
        }
    }

    fn update_topic_status(
        &self,
        topic_id: &str,
        status: TopicStatus,
    ) -> Result<bool, StoreError> {
        if topic_repo::update_status(&self.db, topic_id, status.as_str(), &now_timestamp())? {
            return Ok(true);
        }
        if topic_repo::find_by_id(&self.db, topic_id)?.is_none() {
            return Err(StoreError::TopicNotFound(topic_id.to_string()));
        }
        Ok(false)
    }

    fn recount_completed_topics(&self, job_id: &str) -> Result<u32, StoreError> {
        job_repo::recount_completed(&self.db, job_id, &now_timestamp())?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    fn upsert_result(
        &self,
        topic_id: &str,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError> {
        let payload = serde_json::to_string(payload).map_err(crate::db::DatabaseError::from)?;
        let id = result_repo::upsert(&self.db, topic_id, job_id, &payload, &now_timestamp())?;
        Ok(id)
    }

    fn delete_result(&self, topic_id: &str) -> Result<bool, StoreError> {
        Ok(result_repo::delete_by_topic(&self.db, topic_id)?)
    }

    fn get_result(&self, topic_id: &str) -> Result<Option<GenerationResult>, StoreError> {
        result_repo::find_by_topic(&self.db, topic_id)?
            .map(result_from_row)
            .transpose()
    }

    fn count_results(&self, job_id: &str) -> Result<u32, StoreError> {
        Ok(result_repo::count_by_job(&self.db, job_id)?)
    }
}
