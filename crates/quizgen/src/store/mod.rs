//! Job store: the durable source of truth for jobs, topics and results.
//!
//! Every operation is a self-contained atomic update of one job or topic
//! row. Tasks coordinate only through this store and the queue substrate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod sqlite;

pub use sqlite::SqliteJobStore;

/// Errors from job store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Corrupt row for {entity} '{id}': {reason}")]
    CorruptRow {
        entity: &'static str,
        id: String,
        reason: String,
    },
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    GeneratingTopics,
    GeneratingQuizzes,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::GeneratingTopics => "generating_topics",
            JobStatus::GeneratingQuizzes => "generating_quizzes",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "generating_topics" => Ok(JobStatus::GeneratingTopics),
            "generating_quizzes" => Ok(JobStatus::GeneratingQuizzes),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Lifecycle of a topic. `Processing -> Pending` happens when a retry is
/// scheduled; `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Pending => "pending",
            TopicStatus::Processing => "processing",
            TopicStatus::Completed => "completed",
            TopicStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TopicStatus::Completed | TopicStatus::Failed)
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TopicStatus::Pending),
            "processing" => Ok(TopicStatus::Processing),
            "completed" => Ok(TopicStatus::Completed),
            "failed" => Ok(TopicStatus::Failed),
            other => Err(format!("unknown topic status '{}'", other)),
        }
    }
}

/// One submitted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub filename: String,
    /// Reference understood by the document store.
    pub source_ref: String,
    pub status: JobStatus,
    /// `None` until extraction completes.
    pub total_topics: Option<u32>,
    pub completed_topics: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

/// One fan-out unit of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub job_id: String,
    pub name: String,
    /// Index in the extracted topic list.
    pub position: u32,
    pub status: TopicStatus,
    /// Generation attempts started so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The quiz produced for one topic. The payload is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: String,
    pub topic_id: String,
    pub job_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub user_id: Option<String>,
    pub filename: String,
    pub source_ref: String,
}

/// A job status change, optionally carrying an error message and the topic
/// total. The error message always replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub total_topics: Option<u32>,
}

impl JobUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error_message: None,
            total_topics: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_total_topics(mut self, total: u32) -> Self {
        self.total_topics = Some(total);
        self
    }
}

/// Operations the orchestration engine needs from durable storage.
pub trait JobStore: Send + Sync {
    fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Applies `update` unless the job is already `completed` or `failed`.
    /// Returns `true` when the job changed; a terminal status is therefore
    /// entered by exactly one caller.
    fn update_job_status(&self, job_id: &str, update: JobUpdate) -> Result<bool, StoreError>;

    /// Creates one `pending` topic per name, all or nothing. Returns the
    /// topic ids in the order of `names`.
    fn insert_topics(&self, job_id: &str, names: &[String]) -> Result<Vec<String>, StoreError>;

    /// Stores freshly extracted topics and moves the job to
    /// `generating_quizzes` with `total_topics = names.len()`, atomically.
    /// Returns `None`, having written nothing, when the job is already
    /// terminal.
    fn record_topics(
        &self,
        job_id: &str,
        names: &[String],
    ) -> Result<Option<Vec<String>>, StoreError>;

    fn list_topics(&self, job_id: &str) -> Result<Vec<Topic>, StoreError>;

    fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError>;

    /// Marks the topic `processing` and counts the attempt. A topic that is
    /// already terminal is returned as-is.
    fn begin_topic_attempt(&self, topic_id: &str) -> Result<Topic, StoreError>;

    /// Sets a non-terminal topic's status. Returns `true` when it changed.
    fn update_topic_status(&self, topic_id: &str, status: TopicStatus)
        -> Result<bool, StoreError>;

    /// Recomputes the job's `completed_topics` from its topic rows and
    /// returns the new value. Calling it repeatedly is harmless.
    fn recount_completed_topics(&self, job_id: &str) -> Result<u32, StoreError>;

    /// Writes the result of a topic, replacing a previous attempt's payload.
    fn upsert_result(
        &self,
        topic_id: &str,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError>;

    fn delete_result(&self, topic_id: &str) -> Result<bool, StoreError>;

    fn get_result(&self, topic_id: &str) -> Result<Option<GenerationResult>, StoreError>;

    fn count_results(&self, job_id: &str) -> Result<u32, StoreError>;
}
