//! Store schema version and structural validation.
//!
//! Validation runs on every load (primary and backup) and before every save.
//! Typing already guarantees non-negative line/character values and the
//! presence of required fields; the checks here cover what serde cannot.

use std::path::Path;

use uuid::{Uuid, Variant};

use crate::error::ValidationError;
use crate::types::{Comment, Range, Store, Thread};

/// Schema version written into fresh stores.
pub const CURRENT_VERSION: u32 = 1;

/// Recursively validates `store`, stopping at the first violation.
///
/// # Errors
///
/// Returns the [`ValidationError`] for the first rule that fails, checking
/// the version first and then each thread in order.
pub fn validate(store: &Store) -> Result<(), ValidationError> {
    if store.version < 1 {
        return Err(ValidationError::Version);
    }
    store.threads.iter().try_for_each(validate_thread)
}

/// Validates one thread and all of its comments.
///
/// # Errors
///
/// Returns the first violated rule: id, uri, range, comments, selected text,
/// then each comment.
pub fn validate_thread(thread: &Thread) -> Result<(), ValidationError> {
    if !is_uuid_v4(&thread.id) {
        return Err(ValidationError::ThreadId(thread.id.clone()));
    }
    if thread.uri.is_empty() {
        return Err(ValidationError::EmptyUri);
    }
    if is_absolute_uri(&thread.uri) {
        return Err(ValidationError::AbsoluteUri(thread.uri.clone()));
    }
    validate_range(&thread.range)?;
    if thread.comments.is_empty() {
        return Err(ValidationError::NoComments);
    }
    if thread.selected_text.is_empty() {
        return Err(ValidationError::SelectedText);
    }
    thread.comments.iter().try_for_each(validate_comment)
}

/// # Errors
///
/// Returns [`ValidationError::InvertedRange`] when `start_line > end_line`.
pub fn validate_range(range: &Range) -> Result<(), ValidationError> {
    if range.start_line > range.end_line {
        return Err(ValidationError::InvertedRange {
            start_line: range.start_line,
            end_line: range.end_line,
        });
    }
    Ok(())
}

/// # Errors
///
/// Returns [`ValidationError::CommentId`] for a malformed id and
/// [`ValidationError::CommentBody`] for a blank body.
pub fn validate_comment(comment: &Comment) -> Result<(), ValidationError> {
    if !is_uuid_v4(&comment.id) {
        return Err(ValidationError::CommentId(comment.id.clone()));
    }
    if comment.body.trim().is_empty() {
        return Err(ValidationError::CommentBody);
    }
    Ok(())
}

/// True for the 36-character hyphenated form of an RFC 4122 version-4 UUID,
/// in either case. Braced, URN and simple forms are rejected.
pub fn is_uuid_v4(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    Uuid::try_parse(id)
        .map(|uuid| uuid.get_version_num() == 4 && uuid.get_variant() == Variant::RFC4122)
        .unwrap_or(false)
}

/// Absolute on this platform, or absolute-looking on any platform the store
/// file might travel to (`/x`, `\x`, `C:\x`, `C:/x`).
fn is_absolute_uri(uri: &str) -> bool {
    if Path::new(uri).is_absolute() || uri.starts_with('/') || uri.starts_with('\\') {
        return true;
    }
    let bytes = uri.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'/' | b'\\')
}
