use std::path::Path;

use bytes::Bytes;
use walkdir::WalkDir;

use crate::error::StorageError;

/// Trait for listing and fetching objects from a storage backend.
///
/// This abstraction lets the dataset readers work against the local filesystem
/// or a remote blob store without variant-specific code. Paths are plain strings
/// with `/` separators; a position directory is simply a prefix.
pub trait StorageBackend {
    /// List the paths of every object stored under `prefix`, recursively.
    ///
    /// Returned paths include the prefix itself (they can be passed straight
    /// back to [`get_bytes`](Self::get_bytes)).
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Fetch the full contents of the object at `path`.
    fn get_bytes(&self, path: &str) -> Result<Bytes, StorageError>;

    /// Fetch the object at `path` and interpret it as UTF-8 text.
    fn get_text(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.get_bytes(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StorageError::InvalidText(path.to_string()))
    }

    /// Join a directory path and an entry name.
    fn join(&self, base: &str, name: &str) -> String {
        if base.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), name)
        }
    }
}

/// Local filesystem implementation of [`StorageBackend`].
///
/// Paths are ordinary filesystem paths (absolute or relative to the working
/// directory).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    /// Create a new local filesystem backend.
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for LocalStorage {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        if !Path::new(prefix).is_dir() {
            return Err(StorageError::NotFound(prefix.to_string()));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(prefix).sort_by_file_name() {
            let entry = entry.map_err(|e| StorageError::Io {
                path: prefix.to_string(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file() {
                paths.push(entry.path().to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(paths)
    }

    fn get_bytes(&self, path: &str) -> Result<Bytes, StorageError> {
        std::fs::read(path)
            .map(Bytes::from)
            .map_err(|e| StorageError::from_io(path, e))
    }

    fn get_text(&self, path: &str) -> Result<String, StorageError> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => StorageError::InvalidText(path.to_string()),
            _ => StorageError::from_io(path, e),
        })
    }
}
