//! Bidirectional watch handle <-> directory path map

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::codec::WatchHandle;

#[derive(Debug, Default)]
struct Entries {
    by_handle: HashMap<WatchHandle, PathBuf>,
    by_path: HashMap<PathBuf, WatchHandle>,
}

/// Source of truth for resolving a record's watch handle back to a path.
///
/// Holds at most one entry per path and one per handle. All access goes
/// through a single lock owned by the table.
#[derive(Debug, Default)]
pub struct WatchTable {
    entries: Mutex<Entries>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `handle` watches `path`.
    ///
    /// The kernel reuses a handle when the same inode is registered again, so
    /// a directory renamed inside the tree moves its handle to the new path.
    /// Any mapping that would break the one-entry-per-path invariant is dropped.
    pub fn insert(&self, handle: WatchHandle, path: PathBuf) {
        let mut entries = self.entries.lock();
        if let Some(old_path) = entries.by_handle.remove(&handle) {
            entries.by_path.remove(&old_path);
        }
        if let Some(old_handle) = entries.by_path.remove(&path) {
            entries.by_handle.remove(&old_handle);
        }
        entries.by_path.insert(path.clone(), handle);
        entries.by_handle.insert(handle, path);
    }

    pub fn resolve(&self, handle: WatchHandle) -> Option<PathBuf> {
        self.entries.lock().by_handle.get(&handle).cloned()
    }

    pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
        self.entries.lock().by_path.get(path).copied()
    }

    /// Forget the entry for `handle`, returning the path it covered.
    pub fn remove_handle(&self, handle: WatchHandle) -> Option<PathBuf> {
        let mut entries = self.entries.lock();
        let path = entries.by_handle.remove(&handle)?;
        entries.by_path.remove(&path);
        Some(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watched directory paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.entries.lock().by_path.keys().cloned().collect();
        paths.sort();
        paths
    }
}
