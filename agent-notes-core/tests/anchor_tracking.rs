//! Integration tests for the anchor tracker: geometric shifts, fuzzy
//! re-anchoring and orphaning over whole edit batches.

use agent_notes_core::document::{ContentChange, Document, EditEvent};
use agent_notes_core::tracker::{AnchorTracker, TrackerConfig};
use agent_notes_core::types::{Comment, Position, Range, Thread};

const URI: &str = "src/lib.rs";
const ANCHOR: &str = "function foo() {}";

/// 40 filler lines with the anchor text on line 15.
fn base_lines() -> Vec<String> {
    (0..40)
        .map(|i| if i == 15 { ANCHOR.to_owned() } else { "zzzz".to_owned() })
        .collect()
}

fn join(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn thread(id: &str, range: Range) -> Thread {
    Thread {
        id: id.to_owned(),
        uri: URI.to_owned(),
        range,
        selected_text: ANCHOR.to_owned(),
        context_before: String::new(),
        context_after: String::new(),
        content_hash: String::new(),
        comments: vec![Comment {
            id: "c0ffee00-0000-4000-8000-000000000000".to_owned(),
            body: "look here".to_owned(),
            author: "dev".to_owned(),
            created_at: "2024-01-01T00:00:00.000Z".to_owned(),
        }],
        orphaned: None,
    }
}

fn anchor_range(line: u32) -> Range {
    Range::new(Position::new(line, 0), Position::new(line, ANCHOR.len() as u32))
}

#[test]
fn insertion_above_shifts_thread() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", Range::lines(15, 22))];

    let mut lines = base_lines();
    for i in 0..5 {
        lines.insert(10, format!("new {i}"));
    }
    let event = EditEvent::new(
        URI,
        vec![ContentChange::insert(Position::new(10, 0), "a\nb\nc\nd\ne\n")],
        join(&lines),
    );

    let report = tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].range, Range::lines(20, 27));
    assert_eq!(threads[0].orphaned, None);
    assert_eq!(report.shifted, vec!["t".to_owned()]);
    assert!(report.changed());
}

#[test]
fn deletion_above_shifts_thread_up() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", Range::new(Position::new(15, 4), Position::new(22, 9)))];

    let mut lines = base_lines();
    lines.drain(5..8);
    let event = EditEvent::new(URI, vec![ContentChange::new(Range::lines(5, 8), "")], join(&lines));

    tracker.track(&event, threads.iter_mut());
    // character offsets are untouched by a geometric shift
    assert_eq!(threads[0].range, Range::new(Position::new(12, 4), Position::new(19, 9)));
}

#[test]
fn edit_below_leaves_thread_alone() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", Range::lines(15, 22))];

    let mut lines = base_lines();
    lines.insert(30, "tail".to_owned());
    let event = EditEvent::new(
        URI,
        vec![ContentChange::insert(Position::new(30, 0), "tail\n")],
        join(&lines),
    );

    let report = tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].range, Range::lines(15, 22));
    assert!(!report.changed());
}

#[test]
fn other_documents_are_ignored() {
    let tracker = AnchorTracker::default();
    let mut other = thread("t", Range::lines(15, 22));
    other.uri = "src/other.rs".to_owned();
    let mut threads = vec![other];

    let event = EditEvent::new(
        URI,
        vec![ContentChange::insert(Position::new(0, 0), "x\n")],
        "x\n",
    );
    assert!(!tracker.track(&event, threads.iter_mut()).changed());
    assert_eq!(threads[0].range, Range::lines(15, 22));
}

#[test]
fn overlapping_deletion_orphans_and_keeps_range() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", Range::lines(15, 22))];

    let mut lines = base_lines();
    lines.drain(14..16);
    let event = EditEvent::new(URI, vec![ContentChange::new(Range::lines(14, 16), "")], join(&lines));

    let report = tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].orphaned, Some(true));
    assert_eq!(threads[0].range, Range::lines(15, 22));
    assert_eq!(report.orphaned, vec!["t".to_owned()]);
}

#[test]
fn moved_text_is_reanchored() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", anchor_range(15))];

    // the anchored line is pushed down by ten filler lines in one replacement
    let mut lines = base_lines();
    for _ in 0..10 {
        lines.insert(15, "zzzz".to_owned());
    }
    let replacement = format!("{}{ANCHOR}\n", "zzzz\n".repeat(10));
    let event = EditEvent::new(
        URI,
        vec![ContentChange::new(Range::lines(15, 16), replacement)],
        join(&lines),
    );

    let report = tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].orphaned, Some(false));
    assert_eq!(threads[0].range, anchor_range(25));
    assert_eq!(report.reanchored, vec!["t".to_owned()]);
}

#[test]
fn renamed_text_still_anchors() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", anchor_range(15))];

    let mut lines = base_lines();
    lines[15] = "function fooBar() {}".to_owned();
    let event = EditEvent::new(
        URI,
        vec![ContentChange::new(
            Range::new(Position::new(15, 12), Position::new(15, 12)),
            "Bar",
        )],
        join(&lines),
    );

    tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].orphaned, Some(false));
    assert_eq!(threads[0].range.start(), Position::new(15, 0));
}

#[test]
fn strict_acceptance_threshold_orphans_partial_match() {
    let tracker = AnchorTracker::new(TrackerConfig {
        acceptance_threshold: 0.95,
        ..TrackerConfig::default()
    });
    let mut threads = vec![thread("t", anchor_range(15))];

    let mut lines = base_lines();
    lines[15] = "function fooBar() {}".to_owned();
    let event = EditEvent::new(
        URI,
        vec![ContentChange::new(
            Range::new(Position::new(15, 12), Position::new(15, 12)),
            "Bar",
        )],
        join(&lines),
    );

    tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].orphaned, Some(true));
    assert_eq!(threads[0].range, anchor_range(15));
}

#[test]
fn batch_applies_changes_bottom_up() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![
        thread("upper", Range::lines(5, 6)),
        thread("lower", Range::lines(20, 21)),
    ];

    // events arrive in document order; the tracker sorts them
    let mut lines = base_lines();
    lines.splice(10..10, ["x".to_owned(), "y".to_owned(), "z".to_owned()]);
    lines.insert(0, "header".to_owned());
    let event = EditEvent::new(
        URI,
        vec![
            ContentChange::insert(Position::new(0, 0), "header\n"),
            ContentChange::insert(Position::new(10, 0), "x\ny\nz\n"),
        ],
        join(&lines),
    );

    let report = tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].range, Range::lines(6, 7));
    assert_eq!(threads[1].range, Range::lines(24, 25));
    assert_eq!(report.shifted.len(), 2);
}

#[test]
fn reanchored_thread_is_not_shifted_again_in_same_batch() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", anchor_range(15))];

    // one line inserted at the top, and the anchor pushed down by one line
    let mut lines = base_lines();
    lines.insert(15, "zzzz".to_owned());
    lines.insert(2, "new".to_owned());
    let event = EditEvent::new(
        URI,
        vec![
            ContentChange::insert(Position::new(2, 0), "new\n"),
            ContentChange::new(Range::lines(15, 16), format!("zzzz\n{ANCHOR}\n")),
        ],
        join(&lines),
    );

    tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].orphaned, Some(false));
    assert_eq!(threads[0].range, anchor_range(17));
}

#[test]
fn snapshot_diff_drives_tracker() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", anchor_range(15))];

    let old = join(&base_lines());
    let mut lines = base_lines();
    lines.splice(0..0, (0..5).map(|i| format!("prelude {i}")));
    let event = EditEvent::from_snapshots(URI, &old, &join(&lines));

    tracker.track(&event, threads.iter_mut());
    assert_eq!(threads[0].range, anchor_range(20));
    assert_eq!(threads[0].orphaned, None);
}

#[test]
fn reanchor_all_relocates_without_edit_stream() {
    let tracker = AnchorTracker::default();
    let mut threads = vec![thread("t", anchor_range(15)), thread("gone", anchor_range(3))];
    threads[1].selected_text = "struct Missing;".to_owned();

    let mut lines = base_lines();
    lines.splice(0..0, ["a".to_owned(), "b".to_owned()]);
    let doc = Document::new(&join(&lines));

    let report = tracker.reanchor_all(URI, &doc, threads.iter_mut());
    assert_eq!(threads[0].range, anchor_range(17));
    assert_eq!(threads[1].orphaned, Some(true));
    assert_eq!(report.reanchored, vec!["t".to_owned()]);
    assert_eq!(report.orphaned, vec!["gone".to_owned()]);
}
