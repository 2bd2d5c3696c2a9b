//! Write coalescing for the shared store.
//!
//! Mutations call [`WriteScheduler::schedule`], which records the latest
//! `(root, store)` pair and restarts a single debounce timer. When the timer
//! fires, exactly one [`store::save`] runs against a snapshot of the live
//! store. [`WriteScheduler::flush`] cancels the timer and performs any pending
//! write immediately.
//!
//! Saves are serialized by an async gate: a flush arriving while a
//! timer-fired save is in flight waits for it instead of racing a second
//! write. Cancelling the timer never interrupts a save that has begun,
//! because the save runs on its own task once the quiet period has elapsed;
//! [`WriteScheduler::discard`] waits for such a save to finish.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{self, lock};
use crate::types::SharedStore;

/// Quiet period after the last mutation before a scheduled write fires.
pub const WRITE_DEBOUNCE: Duration = Duration::from_millis(300);

struct PendingWrite {
    root: PathBuf,
    store: SharedStore,
}

#[derive(Default)]
struct WriterState {
    pending: Mutex<Option<PendingWrite>>,
    /// Failure of a timer-fired save, reported by the next flush.
    deferred_error: Mutex<Option<StoreError>>,
    completed: AtomicUsize,
    gate: tokio::sync::Mutex<()>,
}

impl WriterState {
    /// Saves the pending write, if any. Returns whether a save ran.
    ///
    /// The caller must hold `gate`. A failed save puts the write back so a
    /// later flush retries it, unless a newer write was scheduled meanwhile.
    async fn save_pending(&self) -> Result<bool, StoreError> {
        let pending = lock(&self.pending).take();
        let Some(pending) = pending else {
            return Ok(false);
        };

        let mut snapshot = lock(&pending.store).clone();
        let last_backup = snapshot.last_backup;
        if let Err(err) = store::save(&pending.root, &mut snapshot).await {
            let mut slot = lock(&self.pending);
            if slot.is_none() {
                *slot = Some(pending);
            }
            return Err(err);
        }

        // carry the refreshed backup timestamp back into the live store
        if snapshot.last_backup != last_backup {
            lock(&pending.store).last_backup = snapshot.last_backup;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    /// Timer entry point. Failures are parked for the next flush before the
    /// gate is released.
    async fn fire(&self) {
        let _gate = self.gate.lock().await;
        match self.save_pending().await {
            Ok(true) => debug!("debounced store write completed"),
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "debounced store write failed");
                *lock(&self.deferred_error) = Some(err);
            }
        }
    }
}

/// Cancellable debounce timer owning the pending durable write.
///
/// [`schedule`](Self::schedule) must be called from within a Tokio runtime.
pub struct WriteScheduler {
    delay: Duration,
    state: Arc<WriterState>,
    timer: Option<JoinHandle<()>>,
}

impl WriteScheduler {
    pub fn new() -> Self {
        Self::with_delay(WRITE_DEBOUNCE)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(WriterState::default()),
            timer: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Records `(root, store)` as the pending write and restarts the timer.
    ///
    /// Returns immediately. Any outstanding timer is cancelled first, so at
    /// most one timer is ever pending.
    pub fn schedule(&mut self, root: &Path, store: &SharedStore) {
        *lock(&self.state.pending) = Some(PendingWrite {
            root: root.to_path_buf(),
            store: Arc::clone(store),
        });
        self.cancel_timer();

        let state = Arc::clone(&self.state);
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(async move { state.fire().await });
        }));
    }

    /// Cancels the timer and performs the pending write, if any.
    ///
    /// Idempotent: with nothing pending this only waits for an in-flight save.
    /// A write whose save failed stays pending and is retried here.
    ///
    /// # Errors
    ///
    /// Returns the error of the save performed here, or else the error of an
    /// earlier timer-fired save that has not been reported yet.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        self.cancel_timer();
        let _gate = self.state.gate.lock().await;
        let result = self.state.save_pending().await;
        let deferred = lock(&self.state.deferred_error).take();
        result?;
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cancels the timer and drops the pending write. Returns whether one was dropped.
    pub fn cancel(&mut self) -> bool {
        self.cancel_timer();
        lock(&self.state.pending).take().is_some()
    }

    /// Like [`cancel`](Self::cancel), but also waits for a save that has
    /// already begun, so nothing this scheduler owns touches the store file
    /// once it returns.
    pub async fn discard(&mut self) -> bool {
        self.cancel_timer();
        let _gate = self.state.gate.lock().await;
        lock(&self.state.pending).take().is_some()
    }

    /// True while a scheduled write has not yet been saved.
    pub fn is_pending(&self) -> bool {
        lock(&self.state.pending).is_some()
    }

    /// Number of saves completed by this scheduler.
    pub fn completed_writes(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WriteScheduler {
    fn drop(&mut self) {
        self.cancel_timer();
        if self.is_pending() {
            warn!("write scheduler dropped with an unflushed write");
        }
    }
}
