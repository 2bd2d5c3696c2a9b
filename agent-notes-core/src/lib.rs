//! agent-notes-core: review annotations anchored to source ranges.
//!
//! Threads of comments live in one JSON document per workspace
//! (`.vscode/agent-notes.json`). This crate owns that document: its schema and
//! validation ([`schema`]), crash-safe persistence with backup and recovery
//! ([`store`]), debounced write coalescing ([`writer`]), and the anchor
//! tracker that keeps thread ranges valid while the underlying files are
//! edited ([`tracker`], built on the bitap search in [`fuzzy`]).
//!
//! [`workspace::Workspace`] ties these together for a host process.

pub mod capture;
pub mod document;
pub mod error;
pub mod format;
pub mod fuzzy;
pub mod paths;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tracker;
pub mod types;
pub mod workspace;
pub mod writer;

pub use document::{ContentChange, Document, EditEvent};
pub use error::{StoreError, ValidationError};
pub use store::LoadSource;
pub use tracker::{AnchorTracker, TrackReport, TrackerConfig};
pub use types::{Comment, Position, Range, SharedStore, Store, Thread};
pub use workspace::{ResyncReport, Workspace, WorkspaceOptions};
pub use writer::WriteScheduler;
