//! Approximate substring search and edit-distance scoring.
//!
//! [`find_near`] follows the diff-match-patch `match_main` semantics: an exact
//! hit at the seed location wins outright, otherwise a Bitap search scores
//! each candidate by `errors / pattern_len + distance_from_seed / match_distance`
//! and keeps the lowest score under the threshold. Candidates with equal
//! scores resolve toward the seed.

use std::collections::HashMap;

/// Width of the Bitap bit-parallel state.
pub const MATCH_MAX_BITS: usize = 64;

/// Tuning knobs for [`find_near`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Highest combined score (accuracy + proximity) a candidate may have.
    pub threshold: f64,
    /// How far from the seed a match may drift before proximity alone
    /// exhausts the threshold. Zero demands an exact location.
    pub distance: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            distance: 1000,
        }
    }
}

/// Finds the best approximate occurrence of `pattern` in `text` near `loc`.
///
/// Returns the character offset of the match start. Patterns longer than
/// [`MATCH_MAX_BITS`] are located by their leading window, falling back to
/// their trailing window; the caller is expected to score the full slice.
pub fn find_near(text: &[char], pattern: &[char], loc: usize, options: MatchOptions) -> Option<usize> {
    let loc = loc.min(text.len());
    if text == pattern {
        return Some(0);
    }
    if text.is_empty() {
        return None;
    }
    if text.get(loc..loc + pattern.len()) == Some(pattern) {
        return Some(loc);
    }
    if pattern.len() <= MATCH_MAX_BITS {
        return bitap(text, pattern, loc, options);
    }

    let head = &pattern[..MATCH_MAX_BITS];
    if let Some(found) = bitap(text, head, loc, options) {
        return Some(found);
    }
    let tail_offset = pattern.len() - MATCH_MAX_BITS;
    let tail = &pattern[tail_offset..];
    bitap(text, tail, (loc + tail_offset).min(text.len()), options)
        .map(|found| found.saturating_sub(tail_offset))
}

/// Bit mask per pattern character: bit `len - i - 1` set for position `i`.
fn alphabet(pattern: &[char]) -> HashMap<char, u64> {
    let mut masks: HashMap<char, u64> = HashMap::new();
    for (i, c) in pattern.iter().enumerate() {
        *masks.entry(*c).or_insert(0) |= 1u64 << (pattern.len() - i - 1);
    }
    masks
}

fn index_of(text: &[char], pattern: &[char], from: usize) -> Option<usize> {
    if pattern.len() > text.len() {
        return None;
    }
    (from..=text.len() - pattern.len()).find(|&i| text[i..i + pattern.len()] == *pattern)
}

fn last_index_of(text: &[char], pattern: &[char], from: usize) -> Option<usize> {
    if pattern.len() > text.len() {
        return None;
    }
    let upper = from.min(text.len() - pattern.len());
    (0..=upper).rev().find(|&i| text[i..i + pattern.len()] == *pattern)
}

/// Bitap search for `pattern` (at most [`MATCH_MAX_BITS`] long) around `loc`.
fn bitap(text: &[char], pattern: &[char], loc: usize, options: MatchOptions) -> Option<usize> {
    if pattern.is_empty() {
        return Some(loc);
    }
    let masks = alphabet(pattern);
    let pattern_len = pattern.len();

    let score = |errors: usize, x: usize| -> f64 {
        let accuracy = errors as f64 / pattern_len as f64;
        let proximity = loc.abs_diff(x);
        if options.distance == 0 {
            return if proximity == 0 { accuracy } else { 1.0 };
        }
        accuracy + proximity as f64 / options.distance as f64
    };

    // exact occurrences on either side of the seed tighten the threshold
    let mut threshold = options.threshold;
    if let Some(exact) = index_of(text, pattern, loc) {
        threshold = threshold.min(score(0, exact));
        if let Some(exact) = last_index_of(text, pattern, loc + pattern_len) {
            threshold = threshold.min(score(0, exact));
        }
    }

    let match_mask = 1u64 << (pattern_len - 1);
    let mut best = None;
    let mut bin_max = pattern_len + text.len();
    let mut last_rd: Vec<u64> = Vec::new();

    for errors in 0..pattern_len {
        // widest window at which this error count can still beat the threshold
        let mut bin_min = 0;
        let mut bin_mid = bin_max;
        while bin_min < bin_mid {
            if score(errors, loc + bin_mid) <= threshold {
                bin_min = bin_mid;
            } else {
                bin_max = bin_mid;
            }
            bin_mid = (bin_max - bin_min) / 2 + bin_min;
        }
        bin_max = bin_mid;

        let mut start = (loc + 1).saturating_sub(bin_mid).max(1);
        let finish = (loc + bin_mid).min(text.len()) + pattern_len;

        let mut rd = vec![0u64; finish + 2];
        rd[finish + 1] = (1u64 << errors) - 1;

        let mut j = finish;
        while j >= start {
            let char_match = text
                .get(j - 1)
                .and_then(|c| masks.get(c))
                .copied()
                .unwrap_or(0);
            let shifted = ((rd[j + 1] << 1) | 1) & char_match;
            rd[j] = if errors == 0 {
                shifted
            } else {
                let prev_here = last_rd.get(j).copied().unwrap_or(0);
                let prev_next = last_rd.get(j + 1).copied().unwrap_or(0);
                shifted | (((prev_next | prev_here) << 1) | 1) | prev_next
            };

            if rd[j] & match_mask != 0 {
                let candidate = score(errors, j - 1);
                if candidate <= threshold {
                    threshold = candidate;
                    best = Some(j - 1);
                    if j - 1 > loc {
                        // keep scanning left, but no further than the mirror of this hit
                        start = (2 * loc).saturating_sub(j - 1).max(1);
                    } else {
                        break;
                    }
                }
            }
            j -= 1;
        }

        if score(errors + 1, loc) > threshold {
            break;
        }
        last_rd = rd;
    }
    best
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j]
            } else {
                1 + prev[j].min(prev[j + 1]).min(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - edit_distance / max(len)`, in `[0, 1]`. Two empty inputs score 1.
pub fn similarity(a: &[char], b: &[char]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}
