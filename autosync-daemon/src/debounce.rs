//! Quiet-window debouncer in front of the sync queue.
//!
//! Holds at most one pending timer. Every relevant event aborts the previous
//! timer and arms a new one; only a timer that reaches its deadline while
//! still the newest one, and while the debouncer is active, enqueues a sync.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use autosync_core::SyncTrigger;

use crate::runtime::SyncJob;

struct DebounceState {
    pending: Option<JoinHandle<()>>,
    /// Bumped on every reschedule and on stop; a timer only fires if the
    /// generation it was armed with is still current.
    generation: u64,
    active: bool,
}

pub struct Debouncer {
    delay: Duration,
    state: Arc<Mutex<DebounceState>>,
    queue: mpsc::Sender<SyncJob>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("active", &state.active)
            .field("pending", &state.pending.is_some())
            .finish()
    }
}

impl Debouncer {
    pub fn new(delay: Duration, queue: mpsc::Sender<SyncJob>) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState {
                pending: None,
                generation: 0,
                active: true,
            })),
            queue,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the quiet window. Returns `false` (and does nothing) once the
    /// debouncer has been stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_relevant_event(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.active {
            return false;
        }
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let deadline = Instant::now() + self.delay;
        let shared = Arc::clone(&self.state);
        let queue = self.queue.clone();
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fire(&shared, generation, &queue);
        }));
        true
    }

    /// Cancel any pending timer and refuse all future events. Idempotent.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        state.active = false;
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
            tracing::debug!("pending sync timer cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn fire(state: &Mutex<DebounceState>, generation: u64, queue: &mpsc::Sender<SyncJob>) {
    // Enqueue under the lock so a concurrent stop() either happens entirely
    // before (and we bail) or entirely after the trigger is queued.
    let mut state = lock(state);
    if !state.active || state.generation != generation {
        return;
    }
    state.pending = None;
    match queue.try_send(SyncJob::new(SyncTrigger::Debounced)) {
        Ok(()) => tracing::debug!("quiet window elapsed, sync queued"),
        Err(TrySendError::Full(_)) => {
            tracing::debug!("sync already queued, coalescing");
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!("sync processor has exited, dropping trigger");
        }
    }
}

fn lock(state: &Mutex<DebounceState>) -> MutexGuard<'_, DebounceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
