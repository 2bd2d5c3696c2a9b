//! `agent-notes watch`: a long-running host for the anchor tracker.
//!
//! Annotated files are polled and diffed against their last snapshot; each
//! difference is fed to the tracker as an edit event. External rewrites of
//! the store file (an agent resolving a thread) trigger a resync. One view
//! entry per thread is kept in a [`Registry`] and every change to it is
//! reported on stdout, one line per event.
//!
//! # Shutdown
//!
//! Ctrl-C arrives as [`AppEvent::Quit`]. SIGTERM sets a flag that is checked
//! on a 50ms heartbeat and after every event. Either way the loop exits and
//! pending writes are flushed before returning.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_notes_core::document::EditEvent;
use agent_notes_core::paths;
use agent_notes_core::registry::Registry;
use agent_notes_core::store;
use agent_notes_core::types::{Range, Thread};
use agent_notes_core::workspace::Workspace;
use signal_hook::consts::SIGTERM;
use signal_hook::flag::register;
use tracing::{debug, info};

use crate::commands::CommandError;
use crate::config::Config;
use crate::event::{self, AppEvent, EventHandler};

/// What the watcher last reported for one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ThreadView {
    uri: String,
    range: Range,
    orphaned: bool,
}

impl ThreadView {
    fn of(thread: &Thread) -> Self {
        Self {
            uri: thread.uri.clone(),
            range: thread.range,
            orphaned: thread.is_orphaned(),
        }
    }

    fn location(&self) -> String {
        format!("{}:{}-{}", self.uri, self.range.start_line + 1, self.range.end_line + 1)
    }
}

/// Registers a SIGTERM handler and returns the shared flag it sets.
fn register_sigterm() -> Result<Arc<AtomicBool>, CommandError> {
    let term = Arc::new(AtomicBool::new(false));
    register(SIGTERM, Arc::clone(&term)).map_err(CommandError::Signal)?;
    Ok(term)
}

/// Runs the watch loop until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns [`CommandError::Signal`] if the SIGTERM handler cannot be installed
/// and [`CommandError::Store`] if the final flush fails.
pub async fn run(root: &Path, config: &Config) -> Result<(), CommandError> {
    let mut ws = Workspace::open(root, config.workspace_options()).await;
    let term_flag = register_sigterm()?;

    let handler = EventHandler::new();
    event::spawn_poll_task(handler.tx.clone(), paths::store_path(root), config.poll_interval());
    event::spawn_ctrl_c_task(handler.tx.clone());
    let mut rx = handler.rx;

    let mut snapshots: HashMap<String, String> = HashMap::new();
    let mut views: Registry<ThreadView> = Registry::new();
    read_snapshots(&ws, &mut snapshots).await;
    sync_views(&mut views, &ws.snapshot().threads);
    info!(root = %root.display(), threads = views.len(), "watching");

    'watch: loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                if term_flag.load(Ordering::Relaxed) {
                    break 'watch;
                }
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(AppEvent::Tick) => {
                        if track_sources(&mut ws, &mut snapshots).await {
                            sync_views(&mut views, &ws.snapshot().threads);
                        }
                    }
                    Some(AppEvent::StoreChanged) => {
                        if resync_if_external(&mut ws).await {
                            read_snapshots(&ws, &mut snapshots).await;
                            sync_views(&mut views, &ws.snapshot().threads);
                        }
                    }
                    Some(AppEvent::Quit) | None => break 'watch,
                }
                if term_flag.load(Ordering::Relaxed) {
                    break 'watch;
                }
            }
        }
    }

    ws.flush().await?;
    let disposed = views.drain().count();
    info!(disposed, "watch stopped");
    Ok(())
}

/// Snapshots annotated files not seen yet. Unreadable files are skipped.
async fn read_snapshots(ws: &Workspace, snapshots: &mut HashMap<String, String>) {
    for uri in ws.uris() {
        if snapshots.contains_key(&uri) {
            continue;
        }
        match tokio::fs::read_to_string(ws.root().join(&uri)).await {
            Ok(text) => {
                snapshots.insert(uri, text);
            }
            Err(err) => debug!(uri = %uri, error = %err, "annotated file unreadable"),
        }
    }
}

/// Diffs every annotated file against its snapshot and tracks the edits.
/// Returns whether any thread changed.
async fn track_sources(ws: &mut Workspace, snapshots: &mut HashMap<String, String>) -> bool {
    let mut changed = false;
    for uri in ws.uris() {
        let text = match tokio::fs::read_to_string(ws.root().join(&uri)).await {
            Ok(text) => text,
            Err(err) => {
                debug!(uri = %uri, error = %err, "annotated file unreadable");
                continue;
            }
        };
        let Some(old) = snapshots.get(&uri) else {
            snapshots.insert(uri, text);
            continue;
        };
        if *old == text {
            continue;
        }

        let event = EditEvent::from_snapshots(uri.as_str(), old, &text);
        let report = ws.apply_edit(&event);
        debug!(uri = %uri, changes = event.changes.len(), "file edited");
        changed |= report.changed();
        snapshots.insert(uri, text);
    }
    changed
}

/// Reloads the store when it was rewritten by another process.
///
/// Our own debounced writes also touch the file; those are recognised by the
/// disk content matching memory. While a local write is still pending the
/// event is ignored and the local state wins.
async fn resync_if_external(ws: &mut Workspace) -> bool {
    if ws.writer().is_pending() {
        debug!("store changed while a local write is pending, keeping local state");
        return false;
    }
    let disk = store::load(ws.root()).await;
    if disk.threads == ws.snapshot().threads {
        return false;
    }
    let report = ws.resync().await;
    info!(added = report.added.len(), removed = report.removed.len(), "store changed on disk");
    true
}

/// Brings the registry in line with `threads`, printing one line per change.
fn sync_views(views: &mut Registry<ThreadView>, threads: &[Thread]) {
    for (id, view) in views.retain_threads(threads) {
        println!("resolved {id} {}", view.location());
    }

    for thread in views.missing(threads) {
        let view = ThreadView::of(thread);
        println!("tracking {} {}", thread.id, view.location());
        views.insert(thread.id.clone(), view);
    }

    for thread in threads {
        let current = ThreadView::of(thread);
        let Some(view) = views.get_mut(&thread.id) else {
            continue;
        };
        if *view == current {
            continue;
        }
        if current.orphaned && !view.orphaned {
            println!("orphaned {} {}", thread.id, view.location());
        } else {
            println!("moved {} {} -> {}", thread.id, view.location(), current.location());
        }
        *view = current;
    }
}
