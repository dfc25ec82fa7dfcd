//! Document store: raw document bytes by opaque reference.

pub mod filesystem;

pub use filesystem::FilesystemDocumentStore;

use crate::error::StorageError;

/// Storage for uploaded documents. References are opaque to callers and
/// only meaningful to the store that issued them.
pub trait DocumentStore: Send + Sync {
    /// Persists `bytes` under `id` and returns the reference to fetch them by.
    fn store(&self, id: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Returns the bytes behind `reference`. An unknown reference is
    /// [`StorageError::NotFound`].
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError>;
}
