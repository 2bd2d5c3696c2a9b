//! Keeps thread anchors valid across document edits.
//!
//! For each change of an [`EditEvent`], processed bottom-up:
//!
//! - change entirely above a thread: shift the thread by the change's line delta;
//! - change overlapping a thread: fuzzy re-anchor against the post-edit text,
//!   orphaning the thread (range untouched) when no candidate scores high enough;
//! - change entirely below: nothing.
//!
//! Threads are never removed here. Only `range` and `orphaned` are written.

use serde::Deserialize;
use tracing::debug;

use crate::document::{ContentChange, Document, EditEvent};
use crate::fuzzy::{self, MatchOptions};
use crate::types::{Range, Thread};

/// Tunable constants of the re-anchoring search.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum `1 - edit_distance / max_len` for a candidate to be accepted.
    pub acceptance_threshold: f64,
    /// Bitap score threshold (accuracy + proximity) for candidate search.
    pub match_threshold: f64,
    /// Bitap proximity scale in characters.
    pub match_distance: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            match_threshold: 0.5,
            match_distance: 1000,
        }
    }
}

/// Ids of the threads an edit touched, by final outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackReport {
    pub shifted: Vec<String>,
    pub reanchored: Vec<String>,
    pub orphaned: Vec<String>,
}

impl TrackReport {
    /// True if any thread changed and a persistence write is warranted.
    pub fn changed(&self) -> bool {
        !(self.shifted.is_empty() && self.reanchored.is_empty() && self.orphaned.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Untouched,
    Shifted,
    Reanchored,
    Orphaned,
}

#[derive(Debug, Clone, Default)]
pub struct AnchorTracker {
    config: TrackerConfig,
}

impl AnchorTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Applies one edit event to the threads anchored to `event.uri`.
    ///
    /// Threads for other uris are ignored. Changes are processed in
    /// descending start-line order. A thread re-anchored against the post-edit
    /// text is settled for the rest of the batch: later (higher) changes do not
    /// shift it again, since its new range is already in post-edit coordinates.
    pub fn track<'a, I>(&self, event: &EditEvent, threads: I) -> TrackReport
    where
        I: IntoIterator<Item = &'a mut Thread>,
    {
        let mut threads: Vec<&mut Thread> = threads
            .into_iter()
            .filter(|t| t.uri == event.uri)
            .collect();
        if threads.is_empty() || event.changes.is_empty() {
            return TrackReport::default();
        }

        let mut changes: Vec<&ContentChange> = event.changes.iter().collect();
        changes.sort_by(|a, b| b.range.start_line.cmp(&a.range.start_line));

        let mut document: Option<Document> = None;
        let mut outcomes = vec![Outcome::Untouched; threads.len()];

        for change in changes {
            let delta = change.line_delta();
            let change_start = change.range.start_line;
            let change_end = change.range.end_line;

            for (thread, outcome) in threads.iter_mut().zip(outcomes.iter_mut()) {
                if *outcome == Outcome::Reanchored {
                    continue;
                }
                let range = thread.range;

                if change_end < range.start_line {
                    if delta != 0 {
                        thread.range = range.shifted(delta);
                        if *outcome == Outcome::Untouched {
                            *outcome = Outcome::Shifted;
                        }
                    }
                } else if change_start <= range.end_line && change_end >= range.start_line {
                    // a failed attempt against this text will fail again
                    if *outcome == Outcome::Orphaned {
                        continue;
                    }
                    let document = document.get_or_insert_with(|| Document::new(&event.text));
                    match self.relocate(document, &**thread) {
                        Some(found) => {
                            thread.range = found;
                            thread.orphaned = Some(false);
                            *outcome = Outcome::Reanchored;
                        }
                        None => {
                            thread.orphaned = Some(true);
                            *outcome = Outcome::Orphaned;
                        }
                    }
                }
            }
        }

        let report = collect_report(&threads, &outcomes);
        debug!(
            uri = %event.uri,
            shifted = report.shifted.len(),
            reanchored = report.reanchored.len(),
            orphaned = report.orphaned.len(),
            "edit tracked"
        );
        report
    }

    /// Re-anchors every thread of `uri` against `document` as it stands,
    /// without an edit stream. Threads that cannot be relocated are orphaned.
    pub fn reanchor_all<'a, I>(&self, uri: &str, document: &Document, threads: I) -> TrackReport
    where
        I: IntoIterator<Item = &'a mut Thread>,
    {
        let mut report = TrackReport::default();
        for thread in threads.into_iter().filter(|t| t.uri == uri) {
            match self.relocate(document, thread) {
                Some(found) => {
                    let moved = found != thread.range || thread.is_orphaned();
                    thread.range = found;
                    thread.orphaned = Some(false);
                    if moved {
                        report.reanchored.push(thread.id.clone());
                    }
                }
                None => {
                    if !thread.is_orphaned() {
                        report.orphaned.push(thread.id.clone());
                    }
                    thread.orphaned = Some(true);
                }
            }
        }
        report
    }

    /// Locates `thread.selected_text` in `document` near the thread's last
    /// known start. Returns the recovered range, or `None` if no candidate
    /// reaches the acceptance threshold.
    pub fn relocate(&self, document: &Document, thread: &Thread) -> Option<Range> {
        let needle: Vec<char> = thread.selected_text.chars().collect();
        if needle.is_empty() {
            return None;
        }
        let seed = document.offset_at(thread.range.start());
        let options = MatchOptions {
            threshold: self.config.match_threshold,
            distance: self.config.match_distance,
        };

        let found = fuzzy::find_near(document.chars(), &needle, seed, options)?;
        let end = (found + needle.len()).min(document.len());
        let score = fuzzy::similarity(&needle, &document.chars()[found..end]);
        if score < self.config.acceptance_threshold {
            debug!(thread = %thread.id, score, "candidate below acceptance threshold");
            return None;
        }

        Some(Range::new(
            document.position_at(found),
            document.position_at(found + needle.len()),
        ))
    }
}

fn collect_report(threads: &[&mut Thread], outcomes: &[Outcome]) -> TrackReport {
    let mut report = TrackReport::default();
    for (thread, outcome) in threads.iter().zip(outcomes) {
        let bucket = match outcome {
            Outcome::Untouched => continue,
            Outcome::Shifted => &mut report.shifted,
            Outcome::Reanchored => &mut report.reanchored,
            Outcome::Orphaned => &mut report.orphaned,
        };
        bucket.push(thread.id.clone());
    }
    report
}
