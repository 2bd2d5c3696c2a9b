//! Plain-text rendering of a thread for humans and agents.

use chrono::DateTime;

use crate::paths::STORE_REL_PATH;
use crate::types::Thread;

/// Formats `thread` as a self-contained text block.
///
/// The block ends with an instruction telling an automated agent how to
/// resolve the thread by editing the store file directly.
pub fn format_thread(thread: &Thread) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(first) = thread.comments.first() {
        let prefix = if thread.is_orphaned() { "[ORPHANED] " } else { "" };
        parts.push(format!(
            "{prefix}[Feedback] {} ({}): {}",
            first.author,
            format_date(&first.created_at),
            first.body
        ));
    }
    parts.push(format!("On: \"{}\"", thread.selected_text));

    for reply in thread.comments.iter().skip(1) {
        parts.push("---".to_owned());
        parts.push(format!(
            "[Reply] {} ({}): {}",
            reply.author,
            format_date(&reply.created_at),
            reply.body
        ));
    }

    parts.push(String::new());
    parts.push(format!(
        "[Resolve] After addressing this feedback, resolve it by removing the thread object with \"id\": \"{}\" from the \"threads\" array in {STORE_REL_PATH}",
        thread.id
    ));
    parts.join("\n")
}

/// Calendar date of an RFC 3339 timestamp; the raw text if it does not parse.
fn format_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Comment, Range};

    fn comment(author: &str, body: &str, created_at: &str) -> Comment {
        Comment {
            id: "87654321-4321-4321-8321-210987654321".to_owned(),
            body: body.to_owned(),
            author: author.to_owned(),
            created_at: created_at.to_owned(),
        }
    }

    fn thread(comments: Vec<Comment>, orphaned: Option<bool>) -> Thread {
        Thread {
            id: "12345678-1234-4234-8234-123456789012".to_owned(),
            uri: "src/auth.ts".to_owned(),
            range: Range::lines(15, 22),
            selected_text: "function foo() {}".to_owned(),
            context_before: String::new(),
            context_after: String::new(),
            content_hash: "abc123".to_owned(),
            comments,
            orphaned,
        }
    }

    #[test]
    fn single_comment_block() {
        let t = thread(vec![comment("dev", "Handle the error", "2024-03-05T10:00:00.000Z")], None);
        let text = format_thread(&t);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[Feedback] dev (2024-03-05): Handle the error");
        assert_eq!(lines[1], "On: \"function foo() {}\"");
        assert_eq!(lines[2], "");
        assert!(lines[3].starts_with("[Resolve]"));
        assert!(lines[3].contains("\"id\": \"12345678-1234-4234-8234-123456789012\""));
        assert!(lines[3].ends_with(".vscode/agent-notes.json"));
    }

    #[test]
    fn replies_and_orphan_marker() {
        let t = thread(
            vec![
                comment("dev", "first", "2024-03-05T10:00:00Z"),
                comment("agent", "done", "not a date"),
            ],
            Some(true),
        );
        let text = format_thread(&t);
        assert!(text.starts_with("[ORPHANED] [Feedback] dev (2024-03-05): first"));
        assert!(text.contains("\n---\n[Reply] agent (not a date): done\n"));
    }
}
