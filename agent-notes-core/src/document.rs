//! Document text model and the edit-event feed consumed by the anchor tracker.
//!
//! Offsets and character columns count Unicode scalar values. Lines are split
//! on `\n`; a trailing `\r` is treated as part of the line terminator.

use similar::{DiffTag, TextDiff};

use crate::types::{Position, Range};

/// Immutable document text with a line-start index.
#[derive(Debug, Clone)]
pub struct Document {
    chars: Vec<char>,
    line_starts: Vec<usize>,
}

impl Document {
    pub fn new(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut line_starts = vec![0];
        line_starts.extend(
            chars
                .iter()
                .enumerate()
                .filter(|(_, c)| **c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self { chars, line_starts }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Character offset of the end of `line`'s content (before `\r\n` / `\n`).
    fn line_content_end(&self, line: usize) -> usize {
        let mut end = match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.chars.len(),
        };
        if end > self.line_starts[line] && self.chars.get(end - 1) == Some(&'\r') {
            end -= 1;
        }
        end
    }

    /// Converts a position to a character offset.
    ///
    /// Lines past the end clamp to the last line; characters past the end of
    /// a line clamp to the end of its content.
    pub fn offset_at(&self, position: Position) -> usize {
        let line = (position.line as usize).min(self.line_count() - 1);
        let start = self.line_starts[line];
        let end = self.line_content_end(line);
        (start + position.character as usize).min(end)
    }

    /// Converts a character offset (clamped to the text length) to a position.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.chars.len());
        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let character = offset - self.line_starts[line];
        Position::new(to_u32(line), to_u32(character))
    }

    /// Text of `line` without its terminator. Empty for lines past the end.
    pub fn line_text(&self, line: usize) -> String {
        if line >= self.line_count() {
            return String::new();
        }
        self.chars[self.line_starts[line]..self.line_content_end(line)]
            .iter()
            .collect()
    }

    /// Text covered by `range`, with both ends clamped.
    pub fn slice(&self, range: &Range) -> String {
        let start = self.offset_at(range.start());
        let end = self.offset_at(range.end()).max(start);
        self.chars[start..end].iter().collect()
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// One replaced span within an edit: `range` (pre-edit coordinates) was
/// replaced by `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub range: Range,
    pub text: String,
}

impl ContentChange {
    pub fn new(range: Range, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    /// Pure insertion of `text` at `at`.
    pub fn insert(at: Position, text: impl Into<String>) -> Self {
        Self::new(Range::new(at, at), text)
    }

    /// Number of line breaks inserted.
    pub fn added_lines(&self) -> i64 {
        self.text.matches('\n').count() as i64
    }

    /// Number of line breaks spanned by the replaced range.
    pub fn removed_lines(&self) -> i64 {
        i64::from(self.range.end_line) - i64::from(self.range.start_line)
    }

    pub fn line_delta(&self) -> i64 {
        self.added_lines() - self.removed_lines()
    }
}

/// One host edit to a single document: the batch of changes and the full
/// post-edit text.
///
/// Events for the same document must be fed to the tracker in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    /// Workspace-relative uri of the edited document.
    pub uri: String,
    pub changes: Vec<ContentChange>,
    /// Document text after all `changes` were applied.
    pub text: String,
}

impl EditEvent {
    pub fn new(uri: impl Into<String>, changes: Vec<ContentChange>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            changes,
            text: text.into(),
        }
    }

    /// Builds an event from two snapshots of the same document.
    pub fn from_snapshots(uri: impl Into<String>, old: &str, new: &str) -> Self {
        Self::new(uri, changes_between(old, new), new)
    }
}

/// Derives a line-granular change batch that turns `old` into `new`.
///
/// Each non-equal diff op becomes one change whose range spans the replaced
/// old lines (whole lines, character 0 to character 0) and whose text is the
/// inserted new lines, terminators included.
pub fn changes_between(old: &str, new: &str) -> Vec<ContentChange> {
    let diff = TextDiff::from_lines(old, new);
    let new_lines = diff.new_slices();

    diff.ops()
        .iter()
        .filter_map(|op| {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                return None;
            }
            let text: String = new_lines[new_range].concat();
            Some(ContentChange::new(
                Range::lines(to_u32(old_range.start), to_u32(old_range.end)),
                text,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_round_trip_through_positions() {
        let doc = Document::new("ab\ncdé\n\nxyz");
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.offset_at(Position::new(1, 2)), 5);
        assert_eq!(doc.position_at(5), Position::new(1, 2));
        assert_eq!(doc.position_at(7), Position::new(2, 0));
        assert_eq!(doc.position_at(8), Position::new(3, 0));
        assert_eq!(doc.position_at(100), Position::new(3, 3));
    }

    #[test]
    fn offset_at_clamps() {
        let doc = Document::new("short\nline two\n");
        assert_eq!(doc.offset_at(Position::new(0, 99)), 5);
        assert_eq!(doc.offset_at(Position::new(9, 0)), doc.len());
    }

    #[test]
    fn crlf_lines() {
        let doc = Document::new("one\r\ntwo\r\n");
        assert_eq!(doc.line_text(0), "one");
        assert_eq!(doc.line_text(1), "two");
        assert_eq!(doc.offset_at(Position::new(0, 10)), 3);
        assert_eq!(doc.line_text(5), "");
    }

    #[test]
    fn slice_spans_lines() {
        let doc = Document::new("fn a() {\n    body();\n}\n");
        let range = Range {
            start_line: 0,
            start_character: 3,
            end_line: 1,
            end_character: 8,
        };
        assert_eq!(doc.slice(&range), "a() {\n    body");
    }

    #[test]
    fn line_delta_counts_breaks() {
        let change = ContentChange::new(Range::lines(5, 8), "x\ny\n");
        assert_eq!(change.added_lines(), 2);
        assert_eq!(change.removed_lines(), 3);
        assert_eq!(change.line_delta(), -1);
    }

    #[test]
    fn changes_between_inserted_block() {
        let old = "a\nb\nc\n";
        let new = "a\nx\ny\nb\nc\n";
        let changes = changes_between(old, new);
        assert_eq!(changes, vec![ContentChange::new(Range::lines(1, 1), "x\ny\n")]);
        assert_eq!(changes[0].line_delta(), 2);
    }

    #[test]
    fn changes_between_replaced_and_deleted() {
        let old = "a\nb\nc\nd\n";
        let new = "a\nB\nd\n";
        let changes = changes_between(old, new);
        let delta: i64 = changes.iter().map(ContentChange::line_delta).sum();
        assert_eq!(delta, -1);
        assert!(changes.iter().all(|c| c.range.start_line >= 1 && c.range.end_line <= 3));
    }

    #[test]
    fn identical_snapshots_produce_no_changes() {
        assert!(changes_between("same\n", "same\n").is_empty());
    }
}
