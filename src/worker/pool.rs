//! Fixed-size pool of mirror workers draining the durable queue

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::error::{DirsyncError, DirsyncResult};
use crate::eventlog::LogSink;
use crate::fslisten::ChangeEvent;
use crate::queue::{DurableQueue, QueueStore};

use super::affinity::PathLocks;
use super::handler::{EventHandler, FailurePolicy, MirrorOptions, Outcome, WorkerContext};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    failure: Mutex<Option<String>>,
    signalled: Condvar,
}

/// Shared cancellation signal.
///
/// Cheap to clone; every clone observes the same state. Cancelling is
/// one-way.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let guard = self.state.failure.lock();
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.signalled.notify_all();
        drop(guard);
    }

    /// Cancel and remember why. Only the first reason is kept.
    pub fn cancel_with_failure(&self, reason: impl Into<String>) {
        let mut failure = self.state.failure.lock();
        if failure.is_none() {
            *failure = Some(reason.into());
        }
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.signalled.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn failure(&self) -> Option<String> {
        self.state.failure.lock().clone()
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let mut guard = self.state.failure.lock();
        while !self.is_cancelled() {
            self.state.signalled.wait(&mut guard);
        }
    }

    /// Block until cancelled or `timeout` passes. Returns whether cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.failure.lock();
        while !self.is_cancelled() {
            if self.state.signalled.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_cancelled()
    }
}

/// Everything a pool needs besides the queue and the log sink
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub mirror: MirrorOptions,
}

impl PoolOptions {
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            workers: 1,
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            mirror: MirrorOptions::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_mirror(mut self, mirror: MirrorOptions) -> Self {
        self.mirror = mirror;
        self
    }
}

/// Running workers
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    finished: Receiver<usize>,
}

impl WorkerPool {
    /// Start `options.workers` threads, each looping pop → handle until the
    /// queue shuts down or `cancel` fires.
    pub fn spawn<S>(
        options: PoolOptions,
        queue: Arc<DurableQueue<ChangeEvent, S>>,
        sink: Arc<dyn LogSink>,
        cancel: CancelToken,
    ) -> DirsyncResult<Self>
    where
        S: QueueStore<ChangeEvent> + 'static,
    {
        if options.workers == 0 {
            return Err(DirsyncError::Validation(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let mirror = Arc::new(options.mirror);
        let locks = Arc::new(PathLocks::new());
        let (finished_tx, finished) = mpsc::channel();
        let mut handles = Vec::with_capacity(options.workers);

        for id in 0..options.workers {
            let handler = EventHandler::new(
                WorkerContext {
                    id,
                    source_root: options.source_root.clone(),
                    destination_root: options.destination_root.clone(),
                },
                Arc::clone(&mirror),
                Arc::clone(&sink),
                Arc::clone(&locks),
            );
            let worker_queue = Arc::clone(&queue);
            let worker_cancel = cancel.clone();
            let finished_tx = finished_tx.clone();

            let handle = thread::Builder::new()
                .name(format!("dirsync-worker-{id}"))
                .spawn(move || {
                    run_worker(&handler, &worker_queue, &worker_cancel);
                    let _ = finished_tx.send(id);
                });
            match handle {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Unwind the workers already started before reporting.
                    queue.shutdown();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(DirsyncError::Io(err));
                }
            }
        }

        info!(workers = handles.len(), "worker pool started");
        Ok(Self { handles, finished })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }

    /// Wait up to `grace` for every worker to exit.
    ///
    /// Returns `false` if some worker was still busy when time ran out;
    /// those threads are left detached.
    pub fn join_timeout(self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut remaining = self.handles.len();

        while remaining > 0 {
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.finished.recv_timeout(wait) {
                Ok(id) => {
                    trace!(worker = id, "worker exited");
                    remaining -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(busy = remaining, "grace period elapsed with workers still busy");
                    return false;
                }
                // Every sender gone means every worker returned or panicked.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.join();
        true
    }
}

fn run_worker<S>(handler: &EventHandler, queue: &DurableQueue<ChangeEvent, S>, cancel: &CancelToken)
where
    S: QueueStore<ChangeEvent>,
{
    let id = handler.id();
    debug!(worker = id, "worker started");

    while !cancel.is_cancelled() {
        let Some(event) = queue.pop() else {
            break;
        };

        match handler.handle(&event) {
            Ok(Outcome::Ignored) => {
                trace!(worker = id, kind = %event.kind, path = %event.path.display(), "no action")
            }
            Ok(outcome) => debug!(worker = id, path = %event.path.display(), ?outcome, "event handled"),
            Err(err) => {
                error!(worker = id, path = %event.path.display(), error = %err, "failed to sync event");
                handler.record_failure(&event, &err);

                if handler.options().on_error == FailurePolicy::Shutdown {
                    cancel.cancel_with_failure(format!(
                        "worker {id} failed on {}: {err}",
                        event.path.display()
                    ));
                    queue.shutdown();
                    break;
                }
            }
        }
    }

    info!(worker = id, "worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::MemoryLogSink;
    use crate::fslisten::ChangeKind;
    use crate::queue::SnapshotFile;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Setup {
        _dir: TempDir,
        hot: PathBuf,
        backup: PathBuf,
        queue: Arc<DurableQueue<ChangeEvent, SnapshotFile<ChangeEvent>>>,
        sink: Arc<MemoryLogSink>,
    }

    fn setup() -> Setup {
        let dir = tempdir().unwrap();
        let hot = dir.path().join("hot");
        let backup = dir.path().join("backup");
        fs::create_dir_all(&hot).unwrap();
        fs::create_dir_all(&backup).unwrap();
        let queue = Arc::new(DurableQueue::open(SnapshotFile::new(dir.path().join("state.json"))));
        Setup {
            _dir: dir,
            hot,
            backup,
            queue,
            sink: Arc::new(MemoryLogSink::new()),
        }
    }

    fn wait_until(pred: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pred() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait())
        };
        assert!(!token.wait_timeout(Duration::from_millis(20)));

        token.cancel();
        waiter.join().unwrap();
        assert!(token.is_cancelled());
        assert_eq!(token.failure(), None);
    }

    #[test]
    fn cancel_token_keeps_first_failure() {
        let token = CancelToken::new();
        token.cancel_with_failure("first");
        token.cancel_with_failure("second");
        assert!(token.wait_timeout(Duration::ZERO));
        assert_eq!(token.failure().as_deref(), Some("first"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let s = setup();
        let err = WorkerPool::spawn(
            PoolOptions::new(&s.hot, &s.backup).with_workers(0),
            Arc::clone(&s.queue),
            s.sink.clone(),
            CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DirsyncError::Validation(_)));
    }

    #[test]
    fn workers_mirror_queued_events() {
        let s = setup();
        for i in 0..10 {
            fs::write(s.hot.join(format!("f{i}.txt")), format!("{i}")).unwrap();
            s.queue
                .push(ChangeEvent::new(s.hot.join(format!("f{i}.txt")), ChangeKind::Modify));
        }

        let pool = WorkerPool::spawn(
            PoolOptions::new(&s.hot, &s.backup).with_workers(3),
            Arc::clone(&s.queue),
            s.sink.clone(),
            CancelToken::new(),
        )
        .unwrap();
        assert_eq!(pool.len(), 3);

        wait_until(|| s.sink.records().len() == 10);
        s.queue.shutdown();
        assert!(pool.join_timeout(Duration::from_secs(5)));

        for i in 0..10 {
            let copy = s.backup.join(format!("f{i}.txt.bak"));
            assert_eq!(fs::read_to_string(copy).unwrap(), format!("{i}"));
        }
        assert!(s.queue.is_empty());
    }

    #[test]
    fn continue_policy_survives_failures() {
        let s = setup();
        s.queue.push(ChangeEvent::new("/outside/root", ChangeKind::Modify));
        fs::write(s.hot.join("ok.txt"), "ok").unwrap();
        s.queue.push(ChangeEvent::new(s.hot.join("ok.txt"), ChangeKind::Modify));

        let cancel = CancelToken::new();
        let pool = WorkerPool::spawn(
            PoolOptions::new(&s.hot, &s.backup),
            Arc::clone(&s.queue),
            s.sink.clone(),
            cancel.clone(),
        )
        .unwrap();

        wait_until(|| s.backup.join("ok.txt.bak").exists());
        s.queue.shutdown();
        assert!(pool.join_timeout(Duration::from_secs(5)));

        assert!(!cancel.is_cancelled());
        let actions: Vec<_> = s.sink.records().into_iter().map(|r| r.action).collect();
        assert!(actions[0].starts_with("Failed:"));
    }

    #[test]
    fn shutdown_policy_cancels_with_reason() {
        let s = setup();
        s.queue.push(ChangeEvent::new("/outside/root", ChangeKind::Modify));
        s.queue.push(ChangeEvent::new(s.hot.join("later"), ChangeKind::Modify));

        let cancel = CancelToken::new();
        let mirror = MirrorOptions {
            on_error: FailurePolicy::Shutdown,
            ..MirrorOptions::default()
        };
        let pool = WorkerPool::spawn(
            PoolOptions::new(&s.hot, &s.backup).with_mirror(mirror),
            Arc::clone(&s.queue),
            s.sink.clone(),
            cancel.clone(),
        )
        .unwrap();

        assert!(cancel.wait_timeout(Duration::from_secs(5)));
        assert!(pool.join_timeout(Duration::from_secs(5)));
        assert!(cancel.failure().unwrap().contains("/outside/root"));
        // The untouched event stays queued for the next run.
        assert_eq!(s.queue.len(), 1);
    }

    #[test]
    fn join_timeout_reports_idle_workers_as_finished() {
        let s = setup();
        let pool = WorkerPool::spawn(
            PoolOptions::new(&s.hot, &s.backup).with_workers(2),
            Arc::clone(&s.queue),
            s.sink.clone(),
            CancelToken::new(),
        )
        .unwrap();

        s.queue.shutdown();
        assert!(pool.join_timeout(Duration::from_secs(5)));
    }
}
