//! Fixtures shared by the engine's unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use super::{submit_document, EngineSettings, Orchestrator, RetryPolicy, Submission};
use crate::db::{Database, DatabaseError};
use crate::llm::{Attachment, Capabilities, ModelClient, ModelError};
use crate::prompts::PromptStore;
use crate::queue::TaskQueue;
use crate::storage::FilesystemDocumentStore;
use crate::store::{
    GenerationResult, Job, JobStore, JobUpdate, NewJob, SqliteJobStore, StoreError, Topic,
    TopicStatus,
};

type Responder = dyn Fn(&str, usize) -> Result<String, ModelError> + Send + Sync;

/// Answers prompts with a closure that sees the prompt and the call index.
pub(crate) struct StubModel {
    responder: Box<Responder>,
    calls: Mutex<Vec<String>>,
}

impl StubModel {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str, usize) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Topics `topics`, then a one-question quiz for every generation prompt.
    pub fn topics(topics: &[&str]) -> Arc<Self> {
        let list = serde_json::to_string(topics).unwrap();
        Self::new(move |prompt, _| {
            if is_extraction(prompt) {
                Ok(list.clone())
            } else {
                Ok(r#"```json
{"questions": [{"number": 1, "question": "q", "answer": "A"}]}
```"#
                    .to_string())
            }
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ModelClient for StubModel {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch: false,
            streaming: false,
            documents: true,
        }
    }

    fn generate(&self, prompt: &str, _attachments: &[Attachment]) -> Result<String, ModelError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(prompt.to_string());
            calls.len() - 1
        };
        (self.responder)(prompt, index)
    }
}

pub(crate) fn is_extraction(prompt: &str) -> bool {
    prompt.contains("Identify the main topics")
}

pub(crate) struct Fixture {
    pub _dir: TempDir,
    pub store: Arc<SqliteJobStore>,
    pub documents: Arc<FilesystemDocumentStore>,
    pub orch: Orchestrator,
}

impl Fixture {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self::build(model, |store| store as Arc<dyn JobStore>)
    }

    /// Like [`Fixture::new`], with the orchestrator going through a
    /// [`FaultyStore`] the test can arm.
    pub fn with_faults(model: Arc<dyn ModelClient>) -> (Self, Arc<FaultyStore>) {
        let mut faulty = None;
        let fx = Self::build(model, |store| {
            let wrapper = Arc::new(FaultyStore::new(store));
            faulty = Some(wrapper.clone());
            wrapper as Arc<dyn JobStore>
        });
        (fx, faulty.unwrap())
    }

    fn build<F>(model: Arc<dyn ModelClient>, wrap: F) -> Self
    where
        F: FnOnce(Arc<SqliteJobStore>) -> Arc<dyn JobStore>,
    {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteJobStore::new(Database::open_in_memory().unwrap()));
        let documents = Arc::new(FilesystemDocumentStore::new(dir.path()));
        let settings = EngineSettings {
            retry: RetryPolicy::default(),
            questions_per_topic: 5,
            start_index: 1,
        };
        let orch = Orchestrator::new(
            wrap(store.clone()),
            documents.clone(),
            model,
            PromptStore::default(),
            settings,
        );
        Self {
            _dir: dir,
            store,
            documents,
            orch,
        }
    }

    pub fn submit(&self, queue: &dyn TaskQueue) -> Job {
        submit_document(
            self.store.as_ref(),
            self.documents.as_ref(),
            queue,
            Submission {
                user_id: Some("user-1".to_string()),
                filename: "biology.pdf".to_string(),
                bytes: b"%PDF-1.4 test".to_vec(),
            },
        )
        .unwrap()
    }

    pub fn job(&self, job_id: &str) -> Job {
        self.store.get_job(job_id).unwrap().unwrap()
    }
}

/// Delegates to a [`SqliteJobStore`] and fails chosen operations with a
/// retryable database error while their flag is set.
pub(crate) struct FaultyStore {
    inner: Arc<SqliteJobStore>,
    pub fail_record_topics: AtomicBool,
    pub fail_recount: AtomicBool,
}

impl FaultyStore {
    fn new(inner: Arc<SqliteJobStore>) -> Self {
        Self {
            inner,
            fail_record_topics: AtomicBool::new(false),
            fail_recount: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Database(DatabaseError::LockPoisoned))
        } else {
            Ok(())
        }
    }
}

impl JobStore for FaultyStore {
    fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        self.inner.create_job(job)
    }

    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.get_job(job_id)
    }

    fn update_job_status(&self, job_id: &str, update: JobUpdate) -> Result<bool, StoreError> {
        self.inner.update_job_status(job_id, update)
    }

    fn insert_topics(&self, job_id: &str, names: &[String]) -> Result<Vec<String>, StoreError> {
        self.inner.insert_topics(job_id, names)
    }

    fn record_topics(
        &self,
        job_id: &str,
        names: &[String],
    ) -> Result<Option<Vec<String>>, StoreError> {
        Self::check(&self.fail_record_topics)?;
        self.inner.record_topics(job_id, names)
    }

    fn list_topics(&self, job_id: &str) -> Result<Vec<Topic>, StoreError> {
        self.inner.list_topics(job_id)
    }

    fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError> {
        self.inner.get_topic(topic_id)
    }

    fn begin_topic_attempt(&self, topic_id: &str) -> Result<Topic, StoreError> {
        self.inner.begin_topic_attempt(topic_id)
    }

    fn update_topic_status(
        &self,
        topic_id: &str,
        status: TopicStatus,
    ) -> Result<bool, StoreError> {
        self.inner.update_topic_status(topic_id, status)
    }

    fn recount_completed_topics(&self, job_id: &str) -> Result<u32, StoreError> {
        Self::check(&self.fail_recount)?;
        self.inner.recount_completed_topics(job_id)
    }

    fn upsert_result(
        &self,
        topic_id: &str,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError> {
        self.inner.upsert_result(topic_id, job_id, payload)
    }

    fn delete_result(&self, topic_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_result(topic_id)
    }

    fn get_result(&self, topic_id: &str) -> Result<Option<GenerationResult>, StoreError> {
        self.inner.get_result(topic_id)
    }

    fn count_results(&self, job_id: &str) -> Result<u32, StoreError> {
        self.inner.count_results(job_id)
    }
}
