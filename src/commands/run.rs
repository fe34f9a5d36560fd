use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use dirsync::config::{self, CliOverrides, SyncConfig};
use dirsync::eventlog::EventLog;
use dirsync::fslisten::{ChangeEvent, ChangeKind, Events, ExcludePatterns, RecursiveWatcher, WatchTable};
use dirsync::queue::{DurableQueue, SnapshotFile, StateLock};
use dirsync::worker::{CancelToken, PoolOptions, WorkerPool};

/// How long the watcher thread blocks before re-checking cancellation.
const WATCH_POLL: Duration = Duration::from_millis(250);

type EventQueue = DurableQueue<ChangeEvent, SnapshotFile<ChangeEvent>>;

pub fn cmd_run(overrides: CliOverrides) -> Result<()> {
    let (config, warnings) = config::resolve(overrides)?;
    for warning in &warnings {
        warn!("{warning}");
    }
    let config = config.prepare()?;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        on_signal.cancel();
    })
    .context("failed to install signal handler")?;

    run(config, cancel)
}

/// Run the pipeline until `cancel` fires.
pub fn run(config: SyncConfig, cancel: CancelToken) -> Result<()> {
    let _lock = StateLock::acquire(&config.state_file)?;

    let log = Arc::new(
        EventLog::open(&config.log_file)
            .with_context(|| format!("failed to open log file {}", config.log_file.display()))?,
    );
    let queue: Arc<EventQueue> = Arc::new(DurableQueue::open(SnapshotFile::new(&config.state_file)));
    if !queue.is_empty() {
        info!(pending = queue.len(), "resuming queued events from previous run");
    }

    let excludes = ExcludePatterns::new(&config.hot_dir, &config.exclude)?;
    let events = RecursiveWatcher::with_table(&config.hot_dir, Arc::new(WatchTable::new()), excludes)?
        .start()
        .with_context(|| format!("failed to watch {}", config.hot_dir.display()))?;

    if config.initial_sync {
        queue.push(ChangeEvent::new(&config.hot_dir, ChangeKind::Modify));
    }

    let watcher = spawn_watcher(events, Arc::clone(&queue), cancel.clone())?;

    let pool = WorkerPool::spawn(
        PoolOptions::new(&config.hot_dir, &config.backup_dir)
            .with_workers(config.workers)
            .with_mirror(config.mirror.clone()),
        Arc::clone(&queue),
        log.clone(),
        cancel.clone(),
    )?;

    info!(
        hot = %config.hot_dir.display(),
        backup = %config.backup_dir.display(),
        workers = pool.len(),
        "sync running, press Ctrl+C to stop"
    );

    cancel.wait();

    queue.shutdown();
    if !pool.join_timeout(config.shutdown_grace) {
        warn!(
            grace_secs = config.shutdown_grace.as_secs(),
            "workers did not finish in time, exiting anyway"
        );
    }
    if watcher.join().is_err() {
        error!("watcher thread panicked");
    }
    log.close();

    info!(pending = queue.len(), "sync stopped");

    if let Some(reason) = cancel.failure() {
        bail!("sync aborted: {reason}");
    }
    Ok(())
}

fn spawn_watcher(mut events: Events, queue: Arc<EventQueue>, cancel: CancelToken) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("dirsync-watcher".to_string())
        .spawn(move || {
            while !cancel.is_cancelled() {
                match events.next_timeout(WATCH_POLL) {
                    Some(Ok(event)) => queue.push(event),
                    Some(Err(err)) => error!(error = %err, "watcher error"),
                    None => {}
                }
            }
        })
        .context("failed to start watcher thread")?;
    Ok(handle)
}
