//! Data model shared by the persistence engine and the anchor tracker.
//!
//! Field names serialize in camelCase so the on-disk JSON matches the format
//! read and written by the editor extension and by agents editing the file
//! by hand.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The process-wide live store for one workspace.
///
/// Mutated synchronously in memory by mutation calls and the anchor tracker;
/// snapshotted by the write scheduler when a save fires. The lock is never
/// held across an `.await`.
pub type SharedStore = Arc<Mutex<Store>>;

/// A zero-based line/character location in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open text span in line/character coordinates.
///
/// Invariant: `start_line <= end_line` (checked by validation, not by the type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self {
            start_line: start.line,
            start_character: start.character,
            end_line: end.line,
            end_character: end.character,
        }
    }

    /// Whole-line span from the start of `start_line` to the start of `end_line`.
    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            start_character: 0,
            end_line,
            end_character: 0,
        }
    }

    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_character)
    }

    pub fn end(&self) -> Position {
        Position::new(self.end_line, self.end_character)
    }

    /// Returns this range moved vertically by `delta` lines.
    ///
    /// Character offsets are untouched. Lines saturate at zero.
    pub fn shifted(&self, delta: i64) -> Self {
        let shift = |line: u32| -> u32 {
            (i64::from(line) + delta).clamp(0, i64::from(u32::MAX)) as u32
        };
        Self {
            start_line: shift(self.start_line),
            start_character: self.start_character,
            end_line: shift(self.end_line),
            end_character: self.end_character,
        }
    }
}

/// A single comment within a feedback thread.
///
/// Immutable once created except for `body`, which may be edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,         // UUID v4 text
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: String, // ISO-8601 as written on disk
}

/// A feedback thread anchored to a span of a workspace file.
///
/// The first comment is the original feedback; the rest are replies.
/// The anchor tracker only ever mutates `range` and `orphaned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String, // UUID v4 text
    /// Workspace-relative, `/`-separated path. Never absolute.
    pub uri: String,
    pub range: Range,
    /// The anchor snippet used for fuzzy re-anchoring.
    pub selected_text: String,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
    #[serde(default)]
    pub content_hash: String,
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned: Option<bool>,
}

impl Thread {
    pub fn is_orphaned(&self) -> bool {
        self.orphaned.unwrap_or(false)
    }

    pub fn comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }
}

/// The persisted annotation store for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub version: u32,
    pub threads: Vec<Thread>,
    /// Missing or unreadable values load as "now", which defers the next backup.
    #[serde(default = "Utc::now", deserialize_with = "timestamp_or_now")]
    pub last_backup: DateTime<Utc>,
}

/// Hand-edited stores may carry any value here; none of them make the file unusable.
fn timestamp_or_now<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw
        .as_str()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now))
}

impl Store {
    /// A fresh store at the current schema version with no threads.
    ///
    /// `last_backup` starts at "now", so the first backup is written once the
    /// store has lived for a full backup window.
    pub fn empty() -> Self {
        Self {
            version: crate::schema::CURRENT_VERSION,
            threads: Vec::new(),
            last_backup: Utc::now(),
        }
    }

    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: &str) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    /// All threads anchored to `uri`.
    pub fn threads_for<'a>(&'a self, uri: &'a str) -> impl Iterator<Item = &'a Thread> + 'a {
        self.threads.iter().filter(move |t| t.uri == uri)
    }

    /// Distinct uris that carry at least one thread, in first-seen order.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = Vec::new();
        for thread in &self.threads {
            if !uris.contains(&thread.uri) {
                uris.push(thread.uri.clone());
            }
        }
        uris
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::empty()
    }
}
