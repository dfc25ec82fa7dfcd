//! quizgen-worker: runs the quiz pipeline over local PDF documents.
//!
//! Usage: `quizgen-worker <config.json> <document.pdf>...`
//!
//! Each document becomes one job. The process exits once every job has
//! settled, or on Ctrl-C after the running tasks finish.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use quizgen::db::Database;
use quizgen::{
    build_client, load_config, submit_document, EngineSettings, FilesystemDocumentStore,
    JobEventBroadcaster, JobStatus, JobStore, Orchestrator, PromptStore, QuizgenError,
    SqliteJobStore, Submission, WorkerPool,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((config_path, documents)) = args.split_first() else {
        eprintln!("usage: quizgen-worker <config.json> <document.pdf>...");
        return ExitCode::from(2);
    };

    match run(Path::new(config_path), documents) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

/// `RUST_LOG` filters, defaulting to `info`. `QUIZGEN_LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_logging() {
    // Library code logs through the `log` facade.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge already installed: {}", e);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("QUIZGEN_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let result = if json {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json()),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false)),
        )
    };
    if let Err(e) = result {
        eprintln!("failed to install tracing subscriber: {}", e);
    }
}

/// Returns whether every submitted job completed.
fn run(config_path: &Path, documents: &[String]) -> Result<bool, QuizgenError> {
    let config = load_config(config_path)?;
    info!(
        "Loaded config from {} ({} workers, model {})",
        config_path.display(),
        config.worker_count,
        config.model.model_name()
    );

    let db_path = config.database_path().ok_or_else(|| {
        QuizgenError::Config(quizgen::ConfigError::Validation {
            message: "database_path is unset and no home directory was found".to_string(),
        })
    })?;
    let store = Arc::new(SqliteJobStore::new(Database::open(&db_path)?));
    let document_store = Arc::new(FilesystemDocumentStore::new(config.document_directory()));
    let model = build_client(&config.model)?;

    let events = JobEventBroadcaster::default();
    spawn_event_logger(&events);

    let orchestrator = Orchestrator::new(
        store.clone(),
        document_store.clone(),
        model,
        PromptStore::new(config.prompt_directory()),
        EngineSettings::from_config(&config),
    )
    .with_events(events);

    let pool = WorkerPool::new(Arc::new(orchestrator), config.worker_count)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            warn!("Interrupt received, stopping after running tasks");
            interrupted.store(true, Ordering::SeqCst);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    let mut job_ids = Vec::new();
    for path in documents.iter().map(PathBuf::from) {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let submission = Submission {
            user_id: None,
            filename,
            bytes,
        };
        match submit_document(store.as_ref(), document_store.as_ref(), &pool, submission) {
            Ok(job) => {
                info!("Submitted {} as job {}", path.display(), job.id);
                job_ids.push(job.id);
            }
            Err(e) => error!("Could not submit {}: {}", path.display(), e),
        }
    }

    while !pool.wait_idle(POLL_INTERVAL) {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
    }

    pool.wait();

    let mut all_completed = job_ids.len() == documents.len();
    for job_id in &job_ids {
        let Some(job) = store.get_job(job_id)? else {
            all_completed = false;
            continue;
        };
        let total = job.total_topics.unwrap_or(0);
        match &job.error_message {
            Some(message) => println!(
                "{}  {}  {}  {}/{}  {}",
                job.id, job.filename, job.status, job.completed_topics, total, message
            ),
            None => println!(
                "{}  {}  {}  {}/{}",
                job.id, job.filename, job.status, job.completed_topics, total
            ),
        }
        all_completed &= job.status == JobStatus::Completed;
    }

    Ok(all_completed)
}

fn spawn_event_logger(events: &JobEventBroadcaster) {
    let mut receiver = events.subscribe();
    let spawned = thread::Builder::new()
        .name("quizgen-events".to_string())
        .spawn(move || loop {
            match receiver.blocking_recv() {
                Ok(event) => info!("[job {}] {}", event.job_id, event.message),
                Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        });
    if let Err(e) = spawned {
        warn!("Could not start event logger: {}", e);
    }
}
