//! Creating threads and comments from a reviewer's selection.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::document::Document;
use crate::error::ValidationError;
use crate::schema;
use crate::types::{Comment, Range, Thread};

/// Lines of surrounding text captured on each side of a selection.
pub const CONTEXT_LINES: usize = 3;

/// Fast non-cryptographic fingerprint of anchored text.
///
/// 31-multiplier rolling hash over UTF-16 code units with 32-bit wraparound,
/// rendered as the lowercase hex of its absolute value. Matches the hashes
/// written by the editor extension.
pub fn content_hash(text: &str) -> String {
    let hash = text
        .encode_utf16()
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(i32::from(unit)));
    format!("{:x}", hash.unsigned_abs())
}

/// Current time as RFC 3339 with millisecond precision and a `Z` suffix.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A new comment with a fresh id and the current timestamp.
///
/// # Errors
///
/// Returns [`ValidationError::CommentBody`] if `body` is blank.
pub fn new_comment(body: &str, author: &str) -> Result<Comment, ValidationError> {
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        body: body.trim().to_owned(),
        author: author.to_owned(),
        created_at: timestamp(),
    };
    schema::validate_comment(&comment)?;
    Ok(comment)
}

/// Builds a thread anchored at `range` of `document`.
///
/// The anchor snippet is the selected text or, for an empty selection, the
/// whole start line. `uri` separators are normalised to `/`.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the body is blank, the anchor snippet is
/// empty (empty selection on a blank line), or the uri is empty or absolute.
pub fn capture_thread(
    uri: &str,
    document: &Document,
    range: Range,
    body: &str,
    author: &str,
) -> Result<Thread, ValidationError> {
    let mut selected_text = document.slice(&range);
    if selected_text.is_empty() {
        selected_text = document.line_text(range.start_line as usize);
    }

    let start = range.start_line as usize;
    let end = range.end_line as usize;
    let last_line = document.line_count().saturating_sub(1);
    let context_before = (start.saturating_sub(CONTEXT_LINES)..start)
        .map(|line| document.line_text(line))
        .collect::<Vec<_>>()
        .join("\n");
    let context_after = (end + 1..=last_line.min(end + CONTEXT_LINES))
        .map(|line| document.line_text(line))
        .collect::<Vec<_>>()
        .join("\n");

    let thread = Thread {
        id: Uuid::new_v4().to_string(),
        uri: uri.replace('\\', "/"),
        range,
        content_hash: content_hash(&selected_text),
        selected_text,
        context_before,
        context_after,
        comments: vec![new_comment(body, author)?],
        orphaned: None,
    };
    schema::validate_thread(&thread)?;
    Ok(thread)
}
