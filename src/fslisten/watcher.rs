//! Recursive directory watcher
//!
//! Registers one inotify watch per directory under the root and turns the
//! kernel's record stream into [`ChangeEvent`]s. Directories that appear
//! later are registered on the fly so the tree can grow without a restart.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ignore::WalkBuilder;
use tracing::{debug, trace, warn};

use crate::error::{DirsyncError, DirsyncResult};

use super::codec::{self, ChangeEvent, ChangeKind, EventMask, RawRecord, HEADER_LEN, NAME_MAX};
use super::exclude::ExcludePatterns;
use super::inotify::{self, Inotify, Readiness};
use super::table::WatchTable;

/// Records buffered per read.
const BATCH_RECORDS: usize = 64;

/// Owns the notification channel and the watch table for one root.
#[derive(Debug)]
pub struct RecursiveWatcher {
    inotify: Inotify,
    table: Arc<WatchTable>,
    root: PathBuf,
    excludes: ExcludePatterns,
}

impl RecursiveWatcher {
    /// Open a channel for `root` with a fresh table and no exclusions.
    pub fn new(root: impl Into<PathBuf>) -> DirsyncResult<Self> {
        Self::with_table(root, Arc::new(WatchTable::new()), ExcludePatterns::empty())
    }

    pub fn with_table(
        root: impl Into<PathBuf>,
        table: Arc<WatchTable>,
        excludes: ExcludePatterns,
    ) -> DirsyncResult<Self> {
        Ok(Self {
            inotify: Inotify::init()?,
            table,
            root: root.into(),
            excludes,
        })
    }

    /// Convenience: open a channel and watch the whole tree under `root`.
    pub fn watch(root: impl Into<PathBuf>) -> DirsyncResult<Events> {
        let watcher = Self::new(root)?;
        watcher.start()
    }

    /// Register the whole tree and hand back the event source.
    pub fn start(self) -> DirsyncResult<Events> {
        let root = self.root.clone();
        let count = self.watch_tree(&root)?;
        debug!(root = %root.display(), directories = count, "watching tree");
        Ok(Events::new(self))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table(&self) -> &WatchTable {
        &self.table
    }

    /// Register a watch on `dir` and every directory below it.
    ///
    /// Stops at the first failure; returns the number of directories registered.
    pub fn watch_tree(&self, dir: &Path) -> DirsyncResult<usize> {
        let excludes = self.excludes.clone();
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !excludes.is_excluded(entry.path(), is_dir)
            })
            .build();

        let mut count = 0;
        for entry in walker {
            let entry = entry.map_err(|e| DirsyncError::Watch {
                path: dir.to_path_buf(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            })?;
            if entry.file_type().is_some_and(|t| t.is_dir()) {
                self.add_watch(entry.path())?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn add_watch(&self, path: &Path) -> DirsyncResult<()> {
        let handle = self.inotify.add_watch(path, EventMask::WATCHED)?;
        trace!(path = %path.display(), %handle, "watch added");
        self.table.insert(handle, path.to_path_buf());
        Ok(())
    }

    /// Stop watching `path`. The kernel follows up with `IN_IGNORED`.
    pub fn unwatch(&self, path: &Path) -> DirsyncResult<()> {
        let Some(handle) = self.table.handle_for(path) else {
            return Ok(());
        };
        self.inotify.rm_watch(handle).map_err(|source| DirsyncError::Watch {
            path: path.to_path_buf(),
            source,
        })?;
        self.table.remove_handle(handle);
        Ok(())
    }

    /// Turn one raw record into zero or more events, updating the table.
    fn process(&self, record: &RawRecord<'_>, out: &mut VecDeque<DirsyncResult<ChangeEvent>>) {
        if record.mask.contains(EventMask::Q_OVERFLOW) {
            warn!(root = %self.root.display(), "inotify queue overflowed, scheduling full resync");
            out.push_back(Ok(ChangeEvent::new(self.root.clone(), ChangeKind::Modify)));
            return;
        }

        if record.mask.contains(EventMask::IGNORED) {
            if let Some(path) = self.table.remove_handle(record.handle) {
                debug!(path = %path.display(), "watch retired");
            }
            return;
        }

        let Some(base) = self.table.resolve(record.handle) else {
            trace!(handle = %record.handle, "record for unknown watch dropped");
            return;
        };

        let path = record.path_under(&base);
        let is_dir = record.mask.is_dir();
        if self.excludes.is_excluded(&path, is_dir) {
            return;
        }

        let kind = record.kind();
        out.push_back(Ok(ChangeEvent::new(path.clone(), kind)));

        if record.name().is_none() || !kind.is_create_like() {
            return;
        }

        if is_dir {
            // Anything written before the new watch existed is only visible by
            // mirroring the directory as a whole.
            if let Err(err) = self.watch_tree(&path) {
                warn!(path = %path.display(), error = %err, "failed to watch new directory");
            }
            out.push_back(Ok(ChangeEvent::new(path, ChangeKind::Modify)));
        } else if record.mask.contains(EventMask::MOVED_TO) {
            out.push_back(Ok(ChangeEvent::new(path, ChangeKind::Modify)));
        }
    }
}

/// Blocking, infinite source of change events.
///
/// Dropping it closes the notification channel.
#[derive(Debug)]
pub struct Events {
    watcher: RecursiveWatcher,
    buf: Vec<u8>,
    pending: VecDeque<DirsyncResult<ChangeEvent>>,
}

impl Events {
    fn new(watcher: RecursiveWatcher) -> Self {
        Self {
            watcher,
            buf: vec![0u8; BATCH_RECORDS * (HEADER_LEN + NAME_MAX + 1)],
            pending: VecDeque::new(),
        }
    }

    pub fn watcher(&self) -> &RecursiveWatcher {
        &self.watcher
    }

    /// Wait at most `timeout` for the next event; `None` on timeout.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<DirsyncResult<ChangeEvent>> {
        if self.pending.is_empty() {
            self.fill(Some(timeout));
        }
        self.pending.pop_front()
    }

    /// Read and decode one batch. Transient failures are retried in place.
    fn fill(&mut self, timeout: Option<Duration>) {
        loop {
            match self.watcher.inotify.wait(timeout) {
                Ok(Readiness::TimedOut) => return,
                Ok(Readiness::Ready) => {}
                Err(err) if inotify::is_transient(&err) => continue,
                Err(err) => {
                    self.pending.push_back(Err(DirsyncError::Read(err)));
                    return;
                }
            }

            match self.watcher.inotify.read(&mut self.buf) {
                Ok(n) => {
                    self.decode_batch(n);
                    return;
                }
                Err(err) if inotify::is_transient(&err) => continue,
                Err(err) => {
                    self.pending.push_back(Err(DirsyncError::Read(err)));
                    return;
                }
            }
        }
    }

    fn decode_batch(&mut self, len: usize) {
        for record in codec::decode(&self.buf[..len]) {
            match record {
                Ok(record) => self.watcher.process(&record, &mut self.pending),
                Err(err) => self.pending.push_back(Err(err)),
            }
        }
    }
}

impl Iterator for Events {
    type Item = DirsyncResult<ChangeEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            self.fill(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::tempdir;

    /// Pull events until `pred` matches or two seconds pass.
    fn wait_for(events: &mut Events, pred: impl Fn(&ChangeEvent) -> bool) -> Option<ChangeEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(Ok(event)) = events.next_timeout(Duration::from_millis(50)) {
                if pred(&event) {
                    return Some(event);
                }
            }
        }
        None
    }

    #[test]
    fn startup_walk_registers_every_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("a/file.txt"), "x").unwrap();

        let events = RecursiveWatcher::watch(dir.path()).unwrap();
        assert_eq!(events.watcher().table().len(), 4);
    }

    #[test]
    fn watching_missing_root_is_watch_error() {
        let dir = tempdir().unwrap();
        let err = RecursiveWatcher::watch(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, DirsyncError::Watch { .. }));
    }

    #[test]
    fn file_write_is_reported_as_modify() {
        let dir = tempdir().unwrap();
        let mut events = RecursiveWatcher::watch(dir.path()).unwrap();
        let file = dir.path().join("note.txt");

        fs::write(&file, "hello").unwrap();

        let event = wait_for(&mut events, |e| e.kind == ChangeKind::Modify).unwrap();
        assert_eq!(event.path, file);
    }

    #[test]
    fn new_subdirectory_is_watched_without_restart() {
        let dir = tempdir().unwrap();
        let mut events = RecursiveWatcher::watch(dir.path()).unwrap();
        let sub = dir.path().join("sub");

        fs::create_dir(&sub).unwrap();
        wait_for(&mut events, |e| e.path == sub && e.kind == ChangeKind::Create).unwrap();
        assert!(events.watcher().table().handle_for(&sub).is_some());

        let nested = sub.join("inner.txt");
        fs::write(&nested, "x").unwrap();
        let event = wait_for(&mut events, |e| e.path == nested && e.kind == ChangeKind::Modify);
        assert!(event.is_some());
    }

    #[test]
    fn new_directory_is_followed_by_modify_for_itself() {
        let dir = tempdir().unwrap();
        let mut events = RecursiveWatcher::watch(dir.path()).unwrap();
        let sub = dir.path().join("fresh");

        fs::create_dir(&sub).unwrap();
        let event = wait_for(&mut events, |e| e.path == sub && e.kind == ChangeKind::Modify);
        assert!(event.is_some());
    }

    #[test]
    fn moved_in_file_is_followed_by_modify() {
        let dir = tempdir().unwrap();
        let mut events = RecursiveWatcher::watch(dir.path()).unwrap();

        let staged = dir.path().join(".draft");
        fs::write(&staged, "x").unwrap();
        let target = dir.path().join("final.txt");
        fs::rename(&staged, &target).unwrap();

        let event = wait_for(&mut events, |e| e.path == target && e.kind == ChangeKind::Modify);
        assert!(event.is_some());
    }

    #[test]
    fn deleted_directory_is_pruned_from_table() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("doomed");
        fs::create_dir(&sub).unwrap();
        let mut events = RecursiveWatcher::watch(dir.path()).unwrap();
        assert!(events.watcher().table().handle_for(&sub).is_some());

        fs::remove_dir(&sub).unwrap();
        wait_for(&mut events, |e| e.path == sub && e.kind == ChangeKind::Delete).unwrap();

        // IN_IGNORED for the child watch may trail the parent's IN_DELETE.
        let deadline = Instant::now() + Duration::from_secs(2);
        while events.watcher().table().handle_for(&sub).is_some() && Instant::now() < deadline {
            let _ = events.next_timeout(Duration::from_millis(50));
        }
        assert!(events.watcher().table().handle_for(&sub).is_none());
    }

    #[test]
    fn excluded_paths_are_not_reported() {
        let dir = tempdir().unwrap();
        let excludes = ExcludePatterns::new(dir.path(), &["*.swp"]).unwrap();
        let watcher =
            RecursiveWatcher::with_table(dir.path(), Arc::new(WatchTable::new()), excludes).unwrap();
        let mut events = watcher.start().unwrap();

        fs::write(dir.path().join("x.swp"), "noise").unwrap();
        fs::write(dir.path().join("kept.txt"), "x").unwrap();

        let first = wait_for(&mut events, |e| e.kind == ChangeKind::Modify).unwrap();
        assert_eq!(first.path, dir.path().join("kept.txt"));
    }

    #[test]
    fn excluded_directories_are_not_watched() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        let excludes = ExcludePatterns::new(dir.path(), &[".git/"]).unwrap();
        let watcher =
            RecursiveWatcher::with_table(dir.path(), Arc::new(WatchTable::new()), excludes).unwrap();
        let events = watcher.start().unwrap();

        assert_eq!(events.watcher().table().paths(), vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn unwatch_removes_entry() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let events = RecursiveWatcher::watch(dir.path()).unwrap();

        events.watcher().unwatch(&sub).unwrap();
        assert!(events.watcher().table().handle_for(&sub).is_none());
    }

    #[test]
    fn next_timeout_returns_none_when_idle() {
        let dir = tempdir().unwrap();
        let mut events = RecursiveWatcher::watch(dir.path()).unwrap();
        assert!(events.next_timeout(Duration::from_millis(20)).is_none());
    }
}
