use std::path::PathBuf;

use thiserror::Error;

/// A structural violation found by [`crate::schema::validate`].
///
/// Each variant corresponds to one rule; [`ValidationError::field`] names the
/// offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("version must be a positive integer")]
    Version,
    #[error("thread.id is not a valid UUID v4: {0}")]
    ThreadId(String),
    #[error("thread.uri must be a non-empty string")]
    EmptyUri,
    #[error("thread.uri must be workspace-relative (no absolute paths): {0}")]
    AbsoluteUri(String),
    #[error("range.startLine ({start_line}) must be <= endLine ({end_line})")]
    InvertedRange { start_line: u32, end_line: u32 },
    #[error("thread.comments must have at least one entry")]
    NoComments,
    #[error("thread.selectedText must be non-empty")]
    SelectedText,
    #[error("comment.id is not a valid UUID v4: {0}")]
    CommentId(String),
    #[error("comment.body must be non-empty")]
    CommentBody,
}

impl ValidationError {
    /// Dotted path of the field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Version => "version",
            ValidationError::ThreadId(_) => "thread.id",
            ValidationError::EmptyUri | ValidationError::AbsoluteUri(_) => "thread.uri",
            ValidationError::InvertedRange { .. } => "thread.range",
            ValidationError::NoComments => "thread.comments",
            ValidationError::SelectedText => "thread.selectedText",
            ValidationError::CommentId(_) => "comment.id",
            ValidationError::CommentBody => "comment.body",
        }
    }
}

/// Failures of the persistence engine.
///
/// `load` never returns these (it recovers locally); `save` and
/// `WriteScheduler::flush` propagate them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid store: {0}")]
    Validation(#[from] ValidationError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}
