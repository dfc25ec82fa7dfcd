//! Quiz generation for one topic.

use std::time::Duration;

use log::{error, info, warn};

use super::{Orchestrator, TaskError};
use crate::broadcast::JobEventKind;
use crate::llm::Attachment;
use crate::parse;
use crate::prompts::QUIZ_GENERATION;
use crate::queue::TaskOutcome;
use crate::store::{StoreError, TopicStatus};

enum Generated {
    Completed,
    /// The topic reached a terminal status in an earlier delivery.
    AlreadySettled(TopicStatus),
}

pub(crate) fn run(
    orch: &Orchestrator,
    job_id: &str,
    topic: &str,
    topic_id: &str,
    attempt: u32,
) -> TaskOutcome {
    match generate(orch, job_id, topic, topic_id, attempt) {
        Ok(Generated::Completed) => {
            info!("Quiz for topic '{}' stored", topic);
            orch.emit(
                job_id,
                JobEventKind::TopicCompleted {
                    topic_id: topic_id.to_string(),
                    topic: topic.to_string(),
                },
            );
            TaskOutcome::Succeeded
        }
        Ok(Generated::AlreadySettled(TopicStatus::Completed)) => TaskOutcome::Succeeded,
        Ok(Generated::AlreadySettled(status)) => {
            TaskOutcome::failed(format!("topic '{}' is already {}", topic, status))
        }
        Err(e) => on_failure(orch, job_id, topic, topic_id, attempt, e),
    }
}

fn generate(
    orch: &Orchestrator,
    job_id: &str,
    topic: &str,
    topic_id: &str,
    attempt: u32,
) -> Result<Generated, TaskError> {
    let current = orch.store.begin_topic_attempt(topic_id)?;
    if current.status.is_terminal() {
        info!(
            "Topic '{}' is already {}, ignoring redelivery",
            topic, current.status
        );
        if current.status == TopicStatus::Completed {
            orch.store.recount_completed_topics(job_id)?;
        }
        return Ok(Generated::AlreadySettled(current.status));
    }
    orch.emit(
        job_id,
        JobEventKind::TopicStarted {
            topic_id: topic_id.to_string(),
            topic: topic.to_string(),
            attempt: attempt + 1,
        },
    );

    let job = orch
        .store
        .get_job(job_id)?
        .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
    let bytes = orch.documents.fetch(&job.source_ref)?;

    let settings = orch.settings();
    let prompt = orch.prompts.render_named(
        QUIZ_GENERATION,
        job.user_id.as_deref(),
        &[
            ("topic", topic.to_string()),
            ("count", settings.questions_per_topic.to_string()),
            ("start_index", settings.start_index.to_string()),
        ],
    )?;

    let response = orch
        .model
        .generate_with_document(&prompt, Attachment::pdf(bytes))?;
    let payload = parse::extract_json(&response)?;

    orch.store.upsert_result(topic_id, job_id, &payload)?;
    if !orch
        .store
        .update_topic_status(topic_id, TopicStatus::Completed)?
    {
        return settled_meanwhile(orch, job_id, topic, topic_id);
    }
    orch.store.recount_completed_topics(job_id)?;

    Ok(Generated::Completed)
}

/// Another delivery settled the topic while this one was generating. A
/// failed topic must not keep the result just written.
fn settled_meanwhile(
    orch: &Orchestrator,
    job_id: &str,
    topic: &str,
    topic_id: &str,
) -> Result<Generated, TaskError> {
    let status = orch
        .store
        .get_topic(topic_id)?
        .ok_or_else(|| StoreError::TopicNotFound(topic_id.to_string()))?
        .status;
    info!(
        "Topic '{}' became {} during generation, discarding this attempt",
        topic, status
    );
    if status == TopicStatus::Completed {
        orch.store.recount_completed_topics(job_id)?;
    } else {
        orch.store.delete_result(topic_id)?;
    }
    Ok(Generated::AlreadySettled(status))
}

fn on_failure(
    orch: &Orchestrator,
    job_id: &str,
    topic: &str,
    topic_id: &str,
    attempt: u32,
    err: TaskError,
) -> TaskOutcome {
    let message = err.to_string();

    if err.is_retryable() {
        if let Some(delay) = orch.settings().retry.next_delay(attempt) {
            return schedule_retry(orch, job_id, topic, topic_id, attempt, delay, message);
        }
        warn!(
            "Topic '{}' failed on its last attempt ({}): {}",
            topic,
            attempt + 1,
            message
        );
    } else {
        warn!("Topic '{}' failed permanently: {}", topic, message);
    }

    match orch.store.update_topic_status(topic_id, TopicStatus::Failed) {
        Ok(true) => {
            if let Err(e) = orch.store.delete_result(topic_id) {
                error!("Could not remove partial result of topic {}: {}", topic_id, e);
            }
            orch.emit(
                job_id,
                JobEventKind::TopicFailed {
                    topic_id: topic_id.to_string(),
                    topic: topic.to_string(),
                    error: message.clone(),
                },
            );
            TaskOutcome::failed(message)
        }
        // Settled by a concurrent delivery.
        Ok(false) => match orch.store.get_topic(topic_id) {
            Ok(Some(t)) if t.status == TopicStatus::Completed => TaskOutcome::Succeeded,
            _ => TaskOutcome::failed(message),
        },
        Err(e) => {
            error!("Could not mark topic {} failed: {}", topic_id, e);
            TaskOutcome::failed(message)
        }
    }
}

fn schedule_retry(
    orch: &Orchestrator,
    job_id: &str,
    topic: &str,
    topic_id: &str,
    attempt: u32,
    delay: Duration,
    message: String,
) -> TaskOutcome {
    warn!(
        "Topic '{}' attempt {} failed: {}; retrying in {:?}",
        topic,
        attempt + 1,
        message,
        delay
    );
    if let Err(e) = orch.store.update_topic_status(topic_id, TopicStatus::Pending) {
        warn!("Could not reset topic {} to pending: {}", topic_id, e);
    }
    orch.emit(
        job_id,
        JobEventKind::RetryScheduled {
            topic_id: topic_id.to_string(),
            attempt: attempt + 2,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error: message,
        },
    );
    TaskOutcome::Retry { delay }
}
