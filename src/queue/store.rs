//! Queue persistence
//!
//! The queue is saved as a full snapshot on every mutation. [`SnapshotFile`]
//! writes the snapshot to a temp file beside the state file and renames it
//! into place, so a crash leaves either the old or the new snapshot.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{DirsyncError, DirsyncResult};

/// Where a [`DurableQueue`](super::DurableQueue) keeps its snapshot.
pub trait QueueStore<T>: Send + Sync {
    /// Load the persisted items. A missing snapshot is an empty queue.
    fn load(&self) -> DirsyncResult<Vec<T>>;

    /// Replace the persisted snapshot with `items`.
    fn save(&self, items: &VecDeque<T>) -> DirsyncResult<()>;
}

/// JSON snapshot stored in a single state file
#[derive(Debug, Clone)]
pub struct SnapshotFile<T> {
    path: PathBuf,
    _items: PhantomData<fn() -> T>,
}

impl<T> SnapshotFile<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _items: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, message: impl ToString) -> DirsyncError {
        DirsyncError::Persistence {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl<T> QueueStore<T> for SnapshotFile<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> DirsyncResult<Vec<T>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.persistence_error(e)),
        };

        serde_json::from_slice(&content).map_err(|e| self.persistence_error(format!("corrupt snapshot: {e}")))
    }

    fn save(&self, items: &VecDeque<T>) -> DirsyncResult<()> {
        let content = serde_json::to_vec(items).map_err(|e| self.persistence_error(e))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.persistence_error(e))?;
        tmp.write_all(&content)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| self.persistence_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.persistence_error(e.error))?;
        Ok(())
    }
}

/// Exclusive advisory lock on `<state>.lock`, held until dropped.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    pub fn acquire(state_file: &Path) -> DirsyncResult<Self> {
        let mut name = state_file.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| DirsyncError::StateLocked {
                path: state_file.to_path_buf(),
            })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
