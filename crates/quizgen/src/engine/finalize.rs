//! Finalize: runs once every generation task of a job has settled and moves
//! the job to its terminal status.

use log::{error, info, warn};

use super::{Orchestrator, TaskError};
use crate::broadcast::JobEventKind;
use crate::queue::TaskOutcome;
use crate::store::{JobStatus, JobUpdate, StoreError, TopicStatus};

pub(crate) fn run(orch: &Orchestrator, job_id: &str, attempt: u32) -> TaskOutcome {
    match finalize(orch, job_id) {
        Ok(()) => TaskOutcome::Succeeded,
        Err(e) if e.is_retryable() => match orch.settings().retry.next_delay(attempt) {
            Some(delay) => {
                warn!(
                    "Finalizing job {} failed: {}; retrying in {:?}",
                    job_id, e, delay
                );
                TaskOutcome::Retry { delay }
            }
            None => give_up(orch, job_id, &e),
        },
        Err(e) => give_up(orch, job_id, &e),
    }
}

/// No later finalize will come for this job, so fail it here if the store
/// still accepts writes.
fn give_up(orch: &Orchestrator, job_id: &str, err: &TaskError) -> TaskOutcome {
    let message = format!("finalize failed: {}", err);
    error!("Giving up finalizing job {}: {}", job_id, err);
    let update = JobUpdate::new(JobStatus::Failed).with_error(message.as_str());
    match orch.store.update_job_status(job_id, update) {
        Ok(true) => orch.emit(
            job_id,
            JobEventKind::JobFailed {
                error: message.clone(),
            },
        ),
        Ok(false) => {}
        Err(e) => error!(
            "Job {} is stranded before its terminal status: {}",
            job_id, e
        ),
    }
    TaskOutcome::failed(message)
}

fn finalize(orch: &Orchestrator, job_id: &str) -> Result<(), TaskError> {
    let job = orch
        .store
        .get_job(job_id)?
        .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
    if job.status.is_terminal() {
        info!("Job {} already {}, nothing to finalize", job_id, job.status);
        return Ok(());
    }

    let completed = orch.store.recount_completed_topics(job_id)?;
    let topics = orch.store.list_topics(job_id)?;
    let total = u32::try_from(topics.len()).unwrap_or(u32::MAX);

    let unfinished: Vec<&str> = topics
        .iter()
        .filter(|t| t.status != TopicStatus::Completed)
        .map(|t| t.name.as_str())
        .collect();

    if unfinished.is_empty() {
        if orch
            .store
            .update_job_status(job_id, JobUpdate::new(JobStatus::Completed))?
        {
            info!("Job {} completed: {}/{} topics", job_id, completed, total);
            orch.emit(
                job_id,
                JobEventKind::JobCompleted {
                    completed_topics: completed,
                    total_topics: total,
                },
            );
        }
        return Ok(());
    }

    let message = format!(
        "{} of {} topics failed: {}",
        unfinished.len(),
        total,
        unfinished.join(", ")
    );
    let update = JobUpdate::new(JobStatus::Failed).with_error(message.as_str());
    if orch.store.update_job_status(job_id, update)? {
        warn!("Job {} failed: {}", job_id, message);
        orch.emit(job_id, JobEventKind::JobFailed { error: message });
    }
    Ok(())
}
