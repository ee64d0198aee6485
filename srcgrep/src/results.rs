//! Match results, grouped per file.
//!
//! A [`MatchGroup`] travels from a scanner worker to the output collector
//! through a channel. It deliberately does not implement `Clone`: groups can
//! hold many matched lines, and the hot path must move them, never copy.

use std::path::PathBuf;

/// One matched line in a file.
///
/// If the pattern hits the same line more than once, the hits are coalesced
/// into a single `Match` whose `spans` list has more than one entry.
#[derive(Debug)]
pub struct Match {
    /// 1-based line number.
    pub line_number: usize,
    /// Byte offset of the start of this line in the file.
    pub line_start: u64,
    /// The line's content, without the trailing newline.
    pub line: String,
    /// Highlight ranges as `(start, end)` byte offsets within `line`,
    /// ascending and non-overlapping.
    pub spans: Vec<(usize, usize)>,
}

/// All matches found in one file, ordered by ascending line number.
///
/// Move-only by construction: no `Clone` impl, so a group enqueued for
/// output transfers ownership instead of duplicating its lines.
#[derive(Debug)]
pub struct MatchGroup {
    /// The file the matches were found in.
    pub path: PathBuf,
    matches: Vec<Match>,
}

impl MatchGroup {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            matches: Vec::new(),
        }
    }

    /// Appends a match. Line numbers must arrive in strictly ascending
    /// order; the scanner guarantees this.
    pub fn push(&mut self, m: Match) {
        debug_assert!(
            self.matches
                .last()
                .map_or(true, |prev| prev.line_number < m.line_number),
            "line numbers must be strictly ascending"
        );
        self.matches.push(m);
    }

    /// Adds another highlight span to the most recent match. Used when a
    /// second hit lands on an already-reported line.
    pub fn extend_last(&mut self, span: (usize, usize)) {
        if let Some(last) = self.matches.last_mut() {
            last.spans.push(span);
        }
    }

    /// Line number of the most recently reported match, or 0 if none.
    pub fn last_line_number(&self) -> usize {
        self.matches.last().map_or(0, |m| m.line_number)
    }

    pub fn last(&self) -> Option<&Match> {
        self.matches.last()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Number of matched lines (not highlight spans).
    pub fn matched_lines(&self) -> usize {
        self.matches.len()
    }

    /// Total number of highlight spans across all matched lines.
    pub fn total_spans(&self) -> usize {
        self.matches.iter().map(|m| m.spans.len()).sum()
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }
}
