use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuizgenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] crate::llm::ModelError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] crate::prompts::PromptError),

    #[error("Parse error: {0}")]
    Parse(#[from] crate::parse::ParseError),

    #[error("Job store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document reference '{0}'")]
    InvalidReference(String),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Task channel closed unexpectedly")]
    ChannelClosed,

    #[error("Queue is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, QuizgenError>;
