pub mod broadcast;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod llm;
pub mod parse;
pub mod prompts;
pub mod queue;
pub mod secrets;
pub mod storage;
pub mod store;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use config::{load_config, Config, ModelProvider};
pub use engine::{
    enqueue_extraction, submit_document, EngineSettings, Orchestrator, RetryPolicy, Submission,
    TaskError,
};
pub use error::{ConfigError, QueueError, QuizgenError, Result, StorageError};
pub use llm::{build_client, Attachment, Capabilities, ModelClient, ModelError};
pub use parse::ParseError;
pub use prompts::{PromptError, PromptStore};
pub use queue::{
    ManualQueue, OutcomeKind, Task, TaskEnvelope, TaskHandler, TaskOutcome, TaskQueue,
};
pub use storage::{DocumentStore, FilesystemDocumentStore};
pub use store::{
    GenerationResult, Job, JobStatus, JobStore, JobUpdate, NewJob, SqliteJobStore, StoreError,
    Topic, TopicStatus,
};
pub use worker::WorkerPool;
