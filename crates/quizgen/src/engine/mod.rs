//! Job orchestration: topic extraction, per-topic quiz generation with
//! bounded retry, and a finalize step that settles each job exactly once.
//!
//! The [`Orchestrator`] is a [`TaskHandler`]. It never touches the queue
//! directly; each step returns a [`TaskOutcome`] and the substrate applies it.

use std::sync::Arc;

use thiserror::Error;
use tracing::info_span;

use crate::broadcast::{JobEventBroadcaster, JobEventKind};
use crate::config::Config;
use crate::error::{QueueError, QuizgenError, StorageError};
use crate::llm::{ModelClient, ModelError};
use crate::parse::ParseError;
use crate::prompts::{PromptError, PromptStore};
use crate::queue::{Task, TaskEnvelope, TaskHandler, TaskOutcome, TaskQueue};
use crate::storage::DocumentStore;
use crate::store::{Job, JobStatus, JobStore, JobUpdate, NewJob, StoreError};

pub mod extraction;
pub mod fanout;
pub mod finalize;
pub mod generation;
pub mod retry;

#[cfg(test)]
mod testing;

pub use fanout::FanOutPlan;
pub use retry::RetryPolicy;

/// Failure of a task step, classified by whether trying again can help.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Retryable(_))
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(_) => TaskError::Retryable(e.to_string()),
            StoreError::JobNotFound(_)
            | StoreError::TopicNotFound(_)
            | StoreError::CorruptRow { .. } => TaskError::Fatal(e.to_string()),
        }
    }
}

impl From<StorageError> for TaskError {
    fn from(e: StorageError) -> Self {
        TaskError::Retryable(e.to_string())
    }
}

impl From<ModelError> for TaskError {
    fn from(e: ModelError) -> Self {
        if e.is_transient() {
            TaskError::Retryable(e.to_string())
        } else {
            TaskError::Fatal(e.to_string())
        }
    }
}

impl From<PromptError> for TaskError {
    fn from(e: PromptError) -> Self {
        TaskError::Fatal(e.to_string())
    }
}

impl From<ParseError> for TaskError {
    fn from(e: ParseError) -> Self {
        TaskError::Retryable(e.to_string())
    }
}

/// Tunables for the task steps.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub retry: RetryPolicy,
    pub questions_per_topic: u32,
    pub start_index: u32,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            questions_per_topic: config.generation.questions_per_topic,
            start_index: config.generation.start_index,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            questions_per_topic: 10,
            start_index: 1,
        }
    }
}

/// Everything a task step needs, constructed once and shared by all workers.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    documents: Arc<dyn DocumentStore>,
    model: Arc<dyn ModelClient>,
    prompts: PromptStore,
    settings: EngineSettings,
    events: JobEventBroadcaster,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        documents: Arc<dyn DocumentStore>,
        model: Arc<dyn ModelClient>,
        prompts: PromptStore,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            documents,
            model,
            prompts,
            settings,
            events: JobEventBroadcaster::default(),
        }
    }

    pub fn with_events(mut self, events: JobEventBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn events(&self) -> &JobEventBroadcaster {
        &self.events
    }

    fn emit(&self, job_id: &str, kind: JobEventKind) {
        self.events.emit(job_id, kind);
    }
}

impl TaskHandler for Orchestrator {
    fn handle(&self, envelope: &TaskEnvelope) -> TaskOutcome {
        let _span = info_span!("task",
            task_id = %envelope.id,
            kind = envelope.task.kind(),
            job_id = %envelope.task.job_id(),
            attempt = envelope.attempt,
        )
        .entered();

        match &envelope.task {
            Task::ExtractTopics { job_id } => extraction::run(self, job_id),
            Task::GenerateQuiz {
                job_id,
                topic,
                topic_id,
            } => generation::run(self, job_id, topic, topic_id, envelope.attempt),
            Task::Finalize { job_id } => finalize::run(self, job_id, envelope.attempt),
        }
    }
}

/// Queues topic extraction for an existing job. Returns the task id.
pub fn enqueue_extraction(queue: &dyn TaskQueue, job_id: &str) -> Result<String, QueueError> {
    let envelope = TaskEnvelope::new(Task::ExtractTopics {
        job_id: job_id.to_string(),
    });
    let task_id = envelope.id.clone();
    queue.schedule(envelope)?;
    log::info!("Queued topic extraction for job {}", job_id);
    Ok(task_id)
}

/// A document handed to [`submit_document`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: Option<String>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Stores the document, creates its job and queues extraction.
pub fn submit_document(
    store: &dyn JobStore,
    documents: &dyn DocumentStore,
    queue: &dyn TaskQueue,
    submission: Submission,
) -> Result<Job, QuizgenError> {
    let job_id = uuid::Uuid::new_v4().to_string();
    let source_ref = documents.store(&job_id, &submission.bytes)?;

    let job = store.create_job(NewJob {
        id: job_id,
        user_id: submission.user_id,
        filename: submission.filename,
        source_ref,
    })?;

    if let Err(e) = enqueue_extraction(queue, &job.id) {
        let message = format!("could not queue extraction: {}", e);
        store.update_job_status(&job.id, JobUpdate::new(JobStatus::Failed).with_error(&message))?;
        return Err(e.into());
    }

    Ok(job)
}
