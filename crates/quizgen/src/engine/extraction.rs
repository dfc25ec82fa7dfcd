//! Topic extraction: document in, topic rows and a fan-out plan out.
//!
//! Extraction is not retried. Any failure moves the job to `failed` with the
//! error message.

use log::{error, info, warn};

use super::fanout::{self, FanOutPlan};
use super::{Orchestrator, TaskError};
use crate::broadcast::JobEventKind;
use crate::llm::Attachment;
use crate::parse;
use crate::prompts::TOPIC_EXTRACTION;
use crate::queue::TaskOutcome;
use crate::store::{Job, JobStatus, JobUpdate};

pub(crate) fn run(orch: &Orchestrator, job_id: &str) -> TaskOutcome {
    let job = match orch.store.get_job(job_id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!("Extraction requested for unknown job {}, dropping", job_id);
            return TaskOutcome::failed(format!("job {} not found", job_id));
        }
        Err(e) => return fail_job(orch, job_id, &e.to_string()),
    };

    if !matches!(job.status, JobStatus::Pending | JobStatus::GeneratingTopics) {
        info!(
            "Job {} is already {}, skipping duplicate extraction",
            job_id, job.status
        );
        return TaskOutcome::Succeeded;
    }

    match extract(orch, &job) {
        Ok(Some(plan)) => {
            info!("Job {}: fanning out {} topics", job_id, plan.len());
            plan.into()
        }
        Ok(None) => TaskOutcome::Succeeded,
        Err(e) => fail_job(orch, job_id, &e.to_string()),
    }
}

/// Returns `None` when the job left the extraction phase underneath us.
fn extract(orch: &Orchestrator, job: &Job) -> Result<Option<FanOutPlan>, TaskError> {
    if !orch
        .store
        .update_job_status(&job.id, JobUpdate::new(JobStatus::GeneratingTopics))?
    {
        return Ok(None);
    }
    orch.emit(&job.id, JobEventKind::ExtractionStarted);

    // A redelivered extraction reuses topics a previous run already stored.
    let existing = orch.store.list_topics(&job.id)?;
    let (count, topics): (u32, Vec<(String, String)>) = if existing.is_empty() {
        let names = extract_topic_names(orch, job)?;
        let total = check_total(names.len())?;
        // Topics and the new total land together or not at all.
        match orch.store.record_topics(&job.id, &names)? {
            Some(ids) => (total, names.into_iter().zip(ids).collect()),
            None => return Ok(None),
        }
    } else {
        info!(
            "Job {} already has {} topics, reusing them",
            job.id,
            existing.len()
        );
        let total = check_total(existing.len())?;
        let update = JobUpdate::new(JobStatus::GeneratingQuizzes).with_total_topics(total);
        if !orch.store.update_job_status(&job.id, update)? {
            return Ok(None);
        }
        (total, existing.into_iter().map(|t| (t.name, t.id)).collect())
    };

    orch.emit(&job.id, JobEventKind::TopicsExtracted { count });

    Ok(Some(fanout::plan(&job.id, topics)))
}

fn check_total(len: usize) -> Result<u32, TaskError> {
    u32::try_from(len).map_err(|_| TaskError::Fatal(format!("too many topics: {}", len)))
}

fn extract_topic_names(orch: &Orchestrator, job: &Job) -> Result<Vec<String>, TaskError> {
    let bytes = orch.documents.fetch(&job.source_ref)?;
    let prompt = orch.prompts.render_named(
        TOPIC_EXTRACTION,
        job.user_id.as_deref(),
        &[("filename", job.filename.clone())],
    )?;
    let response = orch
        .model
        .generate_with_document(&prompt, Attachment::pdf(bytes))?;
    let names = parse::extract_list(&response)?;
    info!("Job {}: extracted {} topics", job.id, names.len());
    Ok(names)
}

fn fail_job(orch: &Orchestrator, job_id: &str, message: &str) -> TaskOutcome {
    warn!("Topic extraction for job {} failed: {}", job_id, message);
    let update = JobUpdate::new(JobStatus::Failed).with_error(message);
    match orch.store.update_job_status(job_id, update) {
        Ok(true) => orch.emit(
            job_id,
            JobEventKind::JobFailed {
                error: message.to_string(),
            },
        ),
        Ok(false) => {}
        Err(e) => error!("Could not mark job {} failed: {}", job_id, e),
    }
    TaskOutcome::failed(message)
}
