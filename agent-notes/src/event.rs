//! Event bus for `agent-notes watch`.
//!
//! Poll ticks, store-file changes and shutdown requests are normalised into a
//! single `AppEvent` enum and sent over a tokio unbounded MPSC channel. The
//! watch loop receives from this channel and dispatches accordingly.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::debug;

/// All events the watch loop can receive from any source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AppEvent {
    /// Poll tick: rescan annotated source files for edits.
    Tick,
    /// The store file's modification time changed since the last poll.
    StoreChanged,
    /// Shutdown requested (Ctrl-C).
    Quit,
}

/// Holds the sender and receiver ends of the unified event channel.
///
/// The sender (`tx`) is cloned and distributed to background tasks;
/// the receiver (`rx`) is owned by the watch loop.
pub struct EventHandler {
    pub tx: mpsc::UnboundedSender<AppEvent>,
    pub rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Spawns the polling task that drives [`AppEvent::Tick`] and
/// [`AppEvent::StoreChanged`].
///
/// Every `period` the task sends a tick, then compares the store file's
/// modification time with the previous poll. A file appearing or vanishing
/// counts as a change. The task exits once the receiver is dropped.
pub fn spawn_poll_task(tx: mpsc::UnboundedSender<AppEvent>, store_path: PathBuf, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut last_seen = modified_at(&store_path).await;

        loop {
            ticker.tick().await;
            if tx.send(AppEvent::Tick).is_err() {
                break;
            }
            let current = modified_at(&store_path).await;
            if current != last_seen {
                debug!(path = %store_path.display(), "store file changed");
                last_seen = current;
                if tx.send(AppEvent::StoreChanged).is_err() {
                    break;
                }
            }
        }
    });
}

/// Spawns a task that forwards Ctrl-C as [`AppEvent::Quit`].
pub fn spawn_ctrl_c_task(tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(AppEvent::Quit);
        }
    });
}
