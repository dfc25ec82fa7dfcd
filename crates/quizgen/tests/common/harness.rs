//! Test harness for isolated orchestration runs.
//!
//! Prompts come from YAML files written into the temp directory, so the
//! scripted model can recognise each request by its first word.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use quizgen::db::Database;
use quizgen::{
    submit_document, Attachment, Capabilities, EngineSettings, FilesystemDocumentStore, Job,
    JobEventBroadcaster, JobStore, ModelClient, ModelError, Orchestrator, PromptStore,
    RetryPolicy, SqliteJobStore, Submission, TaskQueue, Topic,
};

const EXTRACTION_PROMPT: &str = "template: \"EXTRACT topics from {{ filename }}\"\n";
const GENERATION_PROMPT: &str =
    "template: \"QUIZ topic={{ topic }} count={{ count }} start={{ start_index }}\"\n";

/// How the model treats generation requests for one topic.
#[derive(Debug, Clone, Copy)]
pub enum TopicScript {
    /// Transient failures before the first success.
    FailTimes(u32),
    /// Transient failure on every attempt.
    AlwaysTransient,
    /// Non-retryable failure.
    Fatal,
    /// Panics inside the model call.
    Panic,
}

/// Model stub: returns a fixed topic list and per-topic scripted quizzes.
pub struct ScriptedModel {
    topics: Vec<String>,
    scripts: HashMap<String, TopicScript>,
    calls: Mutex<HashMap<String, u32>>,
    extractions: Mutex<u32>,
}

impl ScriptedModel {
    pub fn new(topics: &[&str]) -> Self {
        Self {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            scripts: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            extractions: Mutex::new(0),
        }
    }

    pub fn script(mut self, topic: &str, script: TopicScript) -> Self {
        self.scripts.insert(topic.to_string(), script);
        self
    }

    /// Generation calls made for `topic`.
    pub fn calls_for(&self, topic: &str) -> u32 {
        self.calls.lock().unwrap().get(topic).copied().unwrap_or(0)
    }

    pub fn extraction_calls(&self) -> u32 {
        *self.extractions.lock().unwrap()
    }

    fn quiz(topic: &str, count: &str) -> String {
        format!(
            "Sure! Here is the quiz:\n```json\n{{\"topic\": \"{}\", \"count\": {}, \"questions\": []}}\n```",
            topic, count
        )
    }
}

fn field<'a>(prompt: &'a str, key: &str) -> &'a str {
    prompt
        .split_whitespace()
        .find_map(|part| part.strip_prefix(key))
        .unwrap_or("")
}

impl ModelClient for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch: false,
            streaming: false,
            documents: true,
        }
    }

    fn generate(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError> {
        assert_eq!(attachments.len(), 1, "every request carries the document");

        if prompt.starts_with("EXTRACT") {
            *self.extractions.lock().unwrap() += 1;
            return Ok(serde_json::to_string(&self.topics).unwrap());
        }

        let topic = field(prompt, "topic=").to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(topic.clone()).or_insert(0);
            *count += 1;
            *count
        };

        match self.scripts.get(&topic) {
            Some(TopicScript::FailTimes(n)) if call <= *n => {
                Err(ModelError::Http(format!("flaky network for {}", topic)))
            }
            Some(TopicScript::AlwaysTransient) => Err(ModelError::Status {
                status: 503,
                body: "overloaded".to_string(),
            }),
            Some(TopicScript::Fatal) => Err(ModelError::Configuration(
                "model rejected the request".to_string(),
            )),
            Some(TopicScript::Panic) => panic!("model crashed on {}", topic),
            _ => Ok(Self::quiz(&topic, field(prompt, "count="))),
        }
    }
}

/// Isolated environment: temp document store, YAML prompts and an
/// in-memory job store.
pub struct TestHarness {
    temp_dir: TempDir,
    pub document_dir: PathBuf,
    pub prompt_dir: PathBuf,
    pub store: Arc<SqliteJobStore>,
    pub documents: Arc<FilesystemDocumentStore>,
    pub events: JobEventBroadcaster,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let document_dir = temp_dir.path().join("documents");
        let prompt_dir = temp_dir.path().join("prompts");
        std::fs::create_dir_all(&prompt_dir).expect("Failed to create prompt directory");
        std::fs::write(prompt_dir.join("topic_extraction.yml"), EXTRACTION_PROMPT)
            .expect("Failed to write extraction prompt");
        std::fs::write(prompt_dir.join("quiz_generation.yml"), GENERATION_PROMPT)
            .expect("Failed to write generation prompt");

        let db = Database::open_in_memory().expect("Failed to open database");

        Self {
            document_dir: document_dir.clone(),
            prompt_dir,
            store: Arc::new(SqliteJobStore::new(db)),
            documents: Arc::new(FilesystemDocumentStore::new(document_dir)),
            events: JobEventBroadcaster::default(),
            temp_dir,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Default settings with second-scale backoff.
    pub fn settings() -> EngineSettings {
        EngineSettings::default()
    }

    /// Settings with millisecond backoff for runs on real threads.
    pub fn fast_settings() -> EngineSettings {
        EngineSettings {
            retry: RetryPolicy::new(3, Duration::from_millis(5)),
            ..EngineSettings::default()
        }
    }

    pub fn orchestrator(&self, model: Arc<ScriptedModel>, settings: EngineSettings) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            self.documents.clone(),
            model,
            PromptStore::new(Some(self.prompt_dir.clone())),
            settings,
        )
        .with_events(self.events.clone())
    }

    pub fn submit(&self, queue: &dyn TaskQueue, filename: &str) -> Job {
        submit_document(
            self.store.as_ref(),
            self.documents.as_ref(),
            queue,
            Submission {
                user_id: Some("student-1".to_string()),
                filename: filename.to_string(),
                bytes: b"%PDF-1.7\n% test document\n".to_vec(),
            },
        )
        .expect("Failed to submit document")
    }

    pub fn job(&self, job_id: &str) -> Job {
        self.store
            .get_job(job_id)
            .expect("Failed to load job")
            .expect("Job missing")
    }

    pub fn topics(&self, job_id: &str) -> Vec<Topic> {
        self.store.list_topics(job_id).expect("Failed to list topics")
    }

    pub fn topic(&self, job_id: &str, name: &str) -> Topic {
        self.topics(job_id)
            .into_iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("no topic named {}", name))
    }

    /// Asserts the count invariant: `completed_topics` equals the number of
    /// completed topic rows and the number of stored results.
    pub fn assert_counts_consistent(&self, job_id: &str) {
        let job = self.job(job_id);
        let completed = self
            .topics(job_id)
            .iter()
            .filter(|t| t.status == quizgen::TopicStatus::Completed)
            .count() as u32;
        assert_eq!(job.completed_topics, completed, "completed_topics drifted");
        assert_eq!(
            self.store.count_results(job_id).unwrap(),
            completed,
            "results do not match completed topics"
        );
        if let Some(total) = job.total_topics {
            assert!(job.completed_topics <= total);
        }
    }
}
