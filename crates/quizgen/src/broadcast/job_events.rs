//! Job event broadcaster for real-time job progress streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What happened to a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    ExtractionStarted,
    TopicsExtracted {
        count: u32,
    },
    TopicStarted {
        topic_id: String,
        topic: String,
        attempt: u32,
    },
    RetryScheduled {
        topic_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    TopicCompleted {
        topic_id: String,
        topic: String,
    },
    TopicFailed {
        topic_id: String,
        topic: String,
        error: String,
    },
    JobCompleted {
        completed_topics: u32,
        total_topics: u32,
    },
    JobFailed {
        error: String,
    },
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobEventKind::ExtractionStarted => write!(f, "Extracting topics"),
            JobEventKind::TopicsExtracted { count } => write!(f, "Extracted {} topics", count),
            JobEventKind::TopicStarted { topic, attempt, .. } => {
                write!(f, "Generating quiz for '{}' (attempt {})", topic, attempt)
            }
            JobEventKind::RetryScheduled {
                attempt, delay_ms, ..
            } => write!(f, "Retry {} scheduled in {} ms", attempt, delay_ms),
            JobEventKind::TopicCompleted { topic, .. } => write!(f, "Quiz ready for '{}'", topic),
            JobEventKind::TopicFailed { topic, error, .. } => {
                write!(f, "Quiz for '{}' failed: {}", topic, error)
            }
            JobEventKind::JobCompleted {
                completed_topics,
                total_topics,
            } => write!(f, "Completed {}/{} topics", completed_topics, total_topics),
            JobEventKind::JobFailed { error } => write!(f, "Job failed: {}", error),
        }
    }
}

/// Event for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub kind: JobEventKind,
    /// Human-readable summary of `kind`.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: &str, kind: JobEventKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            message: kind.to_string(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Whether this is the last event a job will produce.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            JobEventKind::JobCompleted { .. } | JobEventKind::JobFailed { .. }
        )
    }
}

/// Broadcasts job events for streaming.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Builds and sends an event for `job_id`.
    pub fn emit(&self, job_id: &str, kind: JobEventKind) {
        self.send(JobEvent::new(job_id, kind));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
