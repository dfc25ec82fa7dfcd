use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A result payload could not be encoded or decoded.
    #[error("invalid stored payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A thread panicked while holding the connection.
    #[error("database connection poisoned")]
    LockPoisoned,
}
