//! One workspace's live store, write scheduler and anchor tracker.
//!
//! Every mutation takes effect in memory immediately and schedules a
//! coalesced durable write. Call [`Workspace::flush`] before shutdown and
//! before reading the store file back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::capture;
use crate::document::{Document, EditEvent};
use crate::error::{StoreError, ValidationError};
use crate::store::{self, lock, LoadSource};
use crate::tracker::{AnchorTracker, TrackReport, TrackerConfig};
use crate::types::{Comment, Range, SharedStore, Store, Thread};
use crate::writer::{WriteScheduler, WRITE_DEBOUNCE};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkspaceOptions {
    pub debounce: Duration,
    pub tracker: TrackerConfig,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            debounce: WRITE_DEBOUNCE,
            tracker: TrackerConfig::default(),
        }
    }
}

/// Thread ids that appeared or vanished when the store was reloaded from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ResyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct Workspace {
    root: PathBuf,
    store: SharedStore,
    writer: WriteScheduler,
    tracker: AnchorTracker,
    source: LoadSource,
}

impl Workspace {
    /// Loads the store under `root`. Never fails; see [`store::load`].
    pub async fn open(root: impl Into<PathBuf>, options: WorkspaceOptions) -> Self {
        let root = root.into();
        let (loaded, source) = store::load_with_source(&root).await;
        info!(
            root = %root.display(),
            source = source.as_str(),
            threads = loaded.threads.len(),
            "workspace opened"
        );
        Self {
            root,
            store: Arc::new(Mutex::new(loaded)),
            writer: WriteScheduler::with_delay(options.debounce),
            tracker: AnchorTracker::new(options.tracker),
            source,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the store came from when the workspace was opened.
    pub fn load_source(&self) -> LoadSource {
        self.source
    }

    pub fn shared_store(&self) -> &SharedStore {
        &self.store
    }

    pub fn writer(&self) -> &WriteScheduler {
        &self.writer
    }

    /// A copy of the current in-memory store.
    pub fn snapshot(&self) -> Store {
        lock(&self.store).clone()
    }

    pub fn thread(&self, thread_id: &str) -> Option<Thread> {
        lock(&self.store).thread(thread_id).cloned()
    }

    pub fn threads_for(&self, uri: &str) -> Vec<Thread> {
        lock(&self.store).threads_for(uri).cloned().collect()
    }

    pub fn uris(&self) -> Vec<String> {
        lock(&self.store).uris()
    }

    fn schedule_write(&mut self) {
        self.writer.schedule(&self.root, &self.store);
    }

    pub fn add_thread(&mut self, thread: Thread) {
        debug!(thread = %thread.id, uri = %thread.uri, "thread added");
        store::add_thread(&mut lock(&self.store), thread);
        self.schedule_write();
    }

    /// Captures a new thread from a selection and adds it.
    ///
    /// # Errors
    ///
    /// Propagates the [`ValidationError`] from [`capture::capture_thread`];
    /// nothing is added in that case.
    pub fn annotate(
        &mut self,
        uri: &str,
        document: &Document,
        range: Range,
        body: &str,
        author: &str,
    ) -> Result<Thread, ValidationError> {
        let thread = capture::capture_thread(uri, document, range, body, author)?;
        self.add_thread(thread.clone());
        Ok(thread)
    }

    /// Removes a thread (resolve or delete). Returns whether it existed.
    pub fn delete_thread(&mut self, thread_id: &str) -> bool {
        let found = store::delete_thread(&mut lock(&self.store), thread_id);
        if found {
            debug!(thread = %thread_id, "thread removed");
            self.schedule_write();
        }
        found
    }

    /// Replaces a thread by id. Returns whether it existed.
    pub fn update_thread(&mut self, thread: Thread) -> bool {
        let found = store::update_thread(&mut lock(&self.store), thread);
        if found {
            self.schedule_write();
        }
        found
    }

    /// Appends a reply. Returns `Ok(None)` if the thread does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CommentBody`] for a blank body.
    pub fn reply(
        &mut self,
        thread_id: &str,
        body: &str,
        author: &str,
    ) -> Result<Option<Comment>, ValidationError> {
        let comment = capture::new_comment(body, author)?;
        let found = store::add_reply(&mut lock(&self.store), thread_id, comment.clone());
        if !found {
            return Ok(None);
        }
        self.schedule_write();
        Ok(Some(comment))
    }

    /// Edits a comment body in place. Returns `Ok(false)` if either id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CommentBody`] for a blank body.
    pub fn edit_comment(
        &mut self,
        thread_id: &str,
        comment_id: &str,
        body: &str,
    ) -> Result<bool, ValidationError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ValidationError::CommentBody);
        }
        let found = store::edit_comment(&mut lock(&self.store), thread_id, comment_id, body);
        if found {
            self.schedule_write();
        }
        Ok(found)
    }

    /// Feeds one host edit event to the anchor tracker.
    ///
    /// Schedules a write when any thread changed; the report tells the caller
    /// whether dependent views need a refresh.
    pub fn apply_edit(&mut self, event: &EditEvent) -> TrackReport {
        let report = {
            let mut store = lock(&self.store);
            let report = self.tracker.track(event, store.threads.iter_mut());
            report
        };
        if report.changed() {
            self.schedule_write();
        }
        report
    }

    /// Re-anchors every thread of `uri` against `text` without an edit stream.
    pub fn reanchor_document(&mut self, uri: &str, text: &str) -> TrackReport {
        let document = Document::new(text);
        let report = {
            let mut store = lock(&self.store);
            let report = self.tracker.reanchor_all(uri, &document, store.threads.iter_mut());
            report
        };
        if report.changed() {
            self.schedule_write();
        }
        report
    }

    /// Reloads the store from disk and replaces the in-memory state.
    ///
    /// Any pending write is discarded and a save already under way is waited
    /// for before reading: the disk state wins. The report lists which thread
    /// ids appeared and vanished so view state can be rebuilt.
    pub async fn resync(&mut self) -> ResyncReport {
        if self.writer.discard().await {
            debug!("pending write discarded by resync");
        }
        let loaded = store::load(&self.root).await;

        let mut live = lock(&self.store);
        let report = diff_ids(&live.threads, &loaded.threads);
        *live = loaded;
        drop(live);

        if !report.is_empty() {
            info!(added = report.added.len(), removed = report.removed.len(), "store resynced from disk");
        }
        report
    }

    /// Performs any pending write now.
    ///
    /// # Errors
    ///
    /// Propagates the [`StoreError`] of this write or of an earlier failed
    /// debounced write.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush().await
    }
}

fn diff_ids(before: &[Thread], after: &[Thread]) -> ResyncReport {
    let old: HashSet<&str> = before.iter().map(|t| t.id.as_str()).collect();
    let new: HashSet<&str> = after.iter().map(|t| t.id.as_str()).collect();
    ResyncReport {
        added: after
            .iter()
            .filter(|t| !old.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect(),
        removed: before
            .iter()
            .filter(|t| !new.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect(),
    }
}
