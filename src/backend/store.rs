//! Durable record of the last activated version.
//!
//! The state file holds a single token (`v1` or `v2`) and acts as a restart
//! hint: absent or garbled content falls back to the configured default.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::backend::Version;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write version file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("version write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Persistence seam for the active version.
pub trait VersionStore: Send + Sync {
    /// Last persisted version, or `None` when nothing valid is stored.
    fn load(&self) -> Option<Version>;

    /// Durably record `version`. Must not return before the write is durable.
    fn persist(&self, version: Version) -> Result<(), PersistError>;
}

/// Stores the version token in a small file, replaced atomically on write.
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self) -> Option<Version> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read version file");
                return None;
            }
        };

        match content.trim().parse::<Version>() {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring invalid version file");
                None
            }
        }
    }

    fn persist(&self, version: Version) -> Result<(), PersistError> {
        self.write_atomic(version.as_str().as_bytes())
            .map_err(|source| PersistError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// In-memory store for running without a state file.
#[derive(Default)]
pub struct MemoryVersionStore {
    value: Mutex<Option<Version>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self) -> Option<Version> {
        *self.value.lock()
    }

    fn persist(&self, version: Version) -> Result<(), PersistError> {
        *self.value.lock() = Some(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FileVersionStore::new(dir.path().join(".version"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn persist_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileVersionStore::new(dir.path().join("nested").join(".version"));

        store.persist(Version::V2).unwrap();
        assert_eq!(store.load(), Some(Version::V2));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "v2");

        store.persist(Version::V1).unwrap();
        assert_eq!(store.load(), Some(Version::V1));
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".version");
        fs::write(&path, "  v2\n").unwrap();
        assert_eq!(FileVersionStore::new(path).load(), Some(Version::V2));
    }

    #[test]
    fn invalid_content_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".version");
        fs::write(&path, "v3").unwrap();
        assert_eq!(FileVersionStore::new(path).load(), None);
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store = FileVersionStore::new(blocker.join(".version"));
        assert!(matches!(
            store.persist(Version::V1),
            Err(PersistError::Write { .. })
        ));
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryVersionStore::new();
        assert_eq!(store.load(), None);
        store.persist(Version::V2).unwrap();
        assert_eq!(store.load(), Some(Version::V2));
    }
}
