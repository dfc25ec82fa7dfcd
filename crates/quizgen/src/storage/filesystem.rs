use std::io::Write;
use std::path::{Path, PathBuf};

use super::DocumentStore;
use crate::error::StorageError;

const DOCUMENT_EXTENSION: &str = "pdf";

/// Stores each document as `<root>/<id>.pdf`.
pub struct FilesystemDocumentStore {
    root: PathBuf,
}

impl FilesystemDocumentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| StorageError::CreateDirectory {
                path: self.root.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Maps a reference to a path inside the root. Anything other than a
    /// single plain file name is rejected.
    fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let valid = !reference.is_empty()
            && reference != "."
            && reference != ".."
            && !reference.starts_with('.')
            && !reference.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(reference))
    }
}

impl DocumentStore for FilesystemDocumentStore {
    fn store(&self, id: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let reference = format!("{}.{}", id, DOCUMENT_EXTENSION);
        let path = self.resolve(&reference)?;
        self.ensure_directory()?;

        // Readers never observe a partially written document.
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", reference, uuid::Uuid::new_v4()));
        let write_tmp = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StorageError::WriteFile {
                path: tmp_path,
                source: e,
            });
        }

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            StorageError::WriteFile {
                path: path.clone(),
                source: e,
            }
        })?;

        log::debug!("Stored document {} ({} bytes)", path.display(), bytes.len());
        Ok(reference)
    }

    fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }
}
