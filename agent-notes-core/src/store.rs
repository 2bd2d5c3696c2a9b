//! Durable read/write of the annotation store.
//!
//! # Write path
//!
//! Every durable write goes to `<path>.tmp`, is fsynced, then renamed onto the
//! canonical path, so readers only ever see the previous file or the complete
//! new one. The backup copy is refreshed by the same discipline, at most once
//! per [`BACKUP_INTERVAL`].
//!
//! # Read path
//!
//! [`load`] degrades in three tiers: primary file, then backup file, then an
//! empty store. It never fails.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{TimeDelta, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::paths;
use crate::schema;
use crate::types::{Comment, Store, Thread};

/// Minimum age of `last_backup` before a save refreshes the backup file.
pub const BACKUP_INTERVAL: TimeDelta = TimeDelta::seconds(30);

/// Where [`load_with_source`] found the store it returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// No store file exists yet; a fresh store was returned.
    Missing,
    /// The primary file parsed and validated.
    Primary,
    /// The primary file was unusable; the backup was used.
    Backup,
    /// Both files were unusable; a fresh store was returned.
    Empty,
}

impl LoadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadSource::Missing => "missing",
            LoadSource::Primary => "primary",
            LoadSource::Backup => "backup",
            LoadSource::Empty => "empty",
        }
    }
}

/// Loads the store for the workspace at `root`. Never fails.
pub async fn load(root: &Path) -> Store {
    load_with_source(root).await.0
}

/// Loads the store and reports which tier it came from.
///
/// An absent primary file yields a fresh store without consulting the backup.
/// A primary file that cannot be read, parsed or validated falls back to the
/// backup; an unusable backup falls back to a fresh store.
pub async fn load_with_source(root: &Path) -> (Store, LoadSource) {
    let primary = paths::store_path(root);
    match read_valid(&primary).await {
        Ok(Some(store)) => return (store, LoadSource::Primary),
        Ok(None) => return (Store::empty(), LoadSource::Missing),
        Err(err) => warn!(error = %err, "store unusable, attempting backup recovery"),
    }

    let backup = paths::backup_path(root);
    match read_valid(&backup).await {
        Ok(Some(store)) => {
            warn!(path = %backup.display(), threads = store.threads.len(), "recovered store from backup");
            (store, LoadSource::Backup)
        }
        Ok(None) => {
            warn!("no backup available, starting from an empty store");
            (Store::empty(), LoadSource::Empty)
        }
        Err(err) => {
            warn!(error = %err, "backup unusable, starting from an empty store");
            (Store::empty(), LoadSource::Empty)
        }
    }
}

/// Strictly reads the primary store file without any recovery.
///
/// Returns `Ok(None)` when no store file exists yet.
///
/// # Errors
///
/// Returns the [`StoreError`] that [`load`] would have recovered from.
pub async fn check(root: &Path) -> Result<Option<Store>, StoreError> {
    read_valid(&paths::store_path(root)).await
}

/// Reads and validates one store file. `Ok(None)` means the file is absent.
async fn read_valid(path: &Path) -> Result<Option<Store>, StoreError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::io(path)(err)),
    };
    let store: Store = serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    schema::validate(&store)?;
    Ok(Some(store))
}

/// Validates and durably writes `store` under `root`.
///
/// When `store.last_backup` is at least [`BACKUP_INTERVAL`] old it is bumped
/// to now before serializing, and the backup file is refreshed with the same
/// content after the primary write.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] without touching disk if `store` is
/// structurally invalid, and [`StoreError::Io`] if creating the directory,
/// writing, syncing or renaming fails.
pub async fn save(root: &Path, store: &mut Store) -> Result<(), StoreError> {
    schema::validate(store)?;

    let dir = paths::store_dir(root);
    fs::create_dir_all(&dir).await.map_err(StoreError::io(&dir))?;

    let now = Utc::now();
    let backup_due = now.signed_duration_since(store.last_backup) >= BACKUP_INTERVAL;
    if backup_due {
        store.last_backup = now;
    }

    let json = serde_json::to_string_pretty(store).map_err(StoreError::Serialize)?;
    write_atomic(&paths::store_path(root), json.as_bytes()).await?;
    debug!(threads = store.threads.len(), "store written");

    if backup_due {
        write_atomic(&paths::backup_path(root), json.as_bytes()).await?;
        debug!("backup refreshed");
    }
    Ok(())
}

/// Write-to-temp, fsync, rename. The canonical path never holds a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = paths::temp_path(path);

    let mut file = fs::File::create(&tmp).await.map_err(StoreError::io(&tmp))?;
    file.write_all(bytes).await.map_err(StoreError::io(&tmp))?;
    file.sync_all().await.map_err(StoreError::io(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).await.map_err(StoreError::io(path))?;

    // fsync the directory so the rename itself is durable
    #[cfg(unix)]
    {
        if let Some(dir) = path.parent() {
            if let Ok(dir) = fs::File::open(dir).await {
                let _ = dir.sync_all().await;
            }
        }
    }
    Ok(())
}

/// Appends `thread` to the store.
pub fn add_thread(store: &mut Store, thread: Thread) {
    store.threads.push(thread);
}

/// Removes the thread with `thread_id`. Returns whether it existed.
pub fn delete_thread(store: &mut Store, thread_id: &str) -> bool {
    let Some(idx) = store.threads.iter().position(|t| t.id == thread_id) else {
        return false;
    };
    store.threads.remove(idx);
    true
}

/// Replaces the stored thread that has the same id. Returns whether it existed.
pub fn update_thread(store: &mut Store, thread: Thread) -> bool {
    match store.thread_mut(&thread.id) {
        Some(slot) => {
            *slot = thread;
            true
        }
        None => false,
    }
}

/// Appends `comment` as a reply. Returns whether the thread existed.
pub fn add_reply(store: &mut Store, thread_id: &str, comment: Comment) -> bool {
    match store.thread_mut(thread_id) {
        Some(thread) => {
            thread.comments.push(comment);
            true
        }
        None => false,
    }
}

/// Replaces the body of one comment in place. Returns whether both ids matched.
pub fn edit_comment(store: &mut Store, thread_id: &str, comment_id: &str, body: &str) -> bool {
    match store.thread_mut(thread_id).and_then(|t| t.comment_mut(comment_id)) {
        Some(comment) => {
            comment.body = body.to_owned();
            true
        }
        None => false,
    }
}

/// Locks a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
