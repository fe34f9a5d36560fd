//! Durable FIFO queue between the watcher and the workers
//!
//! Every push and pop rewrites the full snapshot while holding the queue
//! lock, so the in-memory sequence and the state file agree after each
//! successful mutation. Persistence failures are reported and swallowed:
//! the producer must never stall because the disk did.

mod store;

pub use store::{QueueStore, SnapshotFile, StateLock};

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{error, warn};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Blocking multi-producer multi-consumer queue with snapshot persistence.
#[derive(Debug)]
pub struct DurableQueue<T, S> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    store: S,
}

impl<T, S> DurableQueue<T, S>
where
    S: QueueStore<T>,
{
    /// Open the queue, restoring whatever the store holds.
    ///
    /// A corrupt snapshot is reported and treated as empty rather than
    /// blocking startup.
    pub fn open(store: S) -> Self {
        let items = match store.load() {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "discarding unreadable queue state");
                Vec::new()
            }
        };

        Self {
            state: Mutex::new(QueueState {
                items: items.into(),
                closed: false,
            }),
            available: Condvar::new(),
            store,
        }
    }

    /// Append to the tail, persist, and wake one waiting consumer.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        state.items.push_back(item);
        self.persist(&state);
        self.available.notify_one();
    }

    /// Block until an item is available and remove it from the head.
    ///
    /// Returns `None` once the queue has been shut down; anything still
    /// queued stays persisted for the next run.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                self.persist(&state);
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Remove the head without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let item = state.items.pop_front()?;
        self.persist(&state);
        Some(item)
    }

    /// Wake every blocked consumer; subsequent pops return `None`.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn persist(&self, state: &MutexGuard<'_, QueueState<T>>) {
        if let Err(err) = self.store.save(&state.items) {
            warn!(error = %err, pending = state.items.len(), "queue state not persisted");
        }
    }
}

impl<T: Clone, S> DurableQueue<T, S> {
    /// Copy of the pending items, head first.
    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock().items.iter().cloned().collect()
    }
}
