use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A unit of work. Serializable so it can cross a process boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    ExtractTopics {
        job_id: String,
    },
    GenerateQuiz {
        job_id: String,
        topic: String,
        topic_id: String,
    },
    Finalize {
        job_id: String,
    },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::ExtractTopics { .. } => "extract_topics",
            Task::GenerateQuiz { .. } => "generate_quiz",
            Task::Finalize { .. } => "finalize",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Task::ExtractTopics { job_id }
            | Task::GenerateQuiz { job_id, .. }
            | Task::Finalize { job_id } => job_id,
        }
    }
}

/// A task plus its delivery metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskEnvelope {
    /// Stable across retries of the same task.
    pub id: String,
    pub task: Task,
    /// Zero-based delivery attempt.
    pub attempt: u32,
    /// Barrier this task reports to when it settles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chord: Option<String>,
}

impl TaskEnvelope {
    pub fn new(task: Task) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task,
            attempt: 0,
            chord: None,
        }
    }

    /// The same task, one attempt later.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// What became of one task execution. The queue, not the handler, turns
/// this into follow-up scheduling.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded,
    /// Settled without success. Counts as done for any barrier.
    Failed { error: String },
    /// Deliver the same task again after `delay`.
    Retry { delay: Duration },
    /// Run every member, then the continuation once all have settled.
    FanOut {
        members: Vec<TaskEnvelope>,
        continuation: TaskEnvelope,
    },
}

impl TaskOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskOutcome::Succeeded => OutcomeKind::Succeeded,
            TaskOutcome::Failed { .. } => OutcomeKind::Failed,
            TaskOutcome::Retry { .. } => OutcomeKind::Retry,
            TaskOutcome::FanOut { .. } => OutcomeKind::FanOut,
        }
    }
}

/// Payload-free view of a [`TaskOutcome`], for bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Retry,
    FanOut,
}
