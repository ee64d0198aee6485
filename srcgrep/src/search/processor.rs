//! Scanner workers: read file contents and run the matcher over them.
//!
//! Each worker owns one growable read buffer that is reused across files;
//! only files above the mmap threshold bypass it. Matches are collected
//! into a per-file [`MatchGroup`] and moved into the output channel. A
//! file that cannot be opened or read is reported on stderr and skipped;
//! it never takes the worker down.

use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::errors::{SearchError, SearchResult};
use crate::queue::{StageReceiver, StageSender};
use crate::results::{Match, MatchGroup};
use crate::search::bytescan::{count_newlines, line_end, line_start};
use crate::search::matcher::PatternMatcher;
use crate::walker::FileIdentity;
use crate::PROGRAM_NAME;

/// Files at or above this size are memory-mapped instead of read into the
/// worker's buffer.
pub(crate) const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Per-worker scanning telemetry, summed at shutdown.
#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    /// Files pulled from the queue and opened (including empty ones).
    pub files_scanned: u64,
    /// Files that produced at least one match.
    pub files_matched: u64,
    pub bytes_read: u64,
    /// Open/read failures, reported and skipped.
    pub read_errors: u64,
    /// Wall time spent reading and scanning.
    pub elapsed: Duration,
}

impl ScanStats {
    pub fn merge(&mut self, other: &ScanStats) {
        self.files_scanned += other.files_scanned;
        self.files_matched += other.files_matched;
        self.bytes_read += other.bytes_read;
        self.read_errors += other.read_errors;
        self.elapsed += other.elapsed;
    }
}

/// Launches `jobs` scanner workers. The group channel closes when the
/// last worker finishes and drops its sender.
pub fn spawn_scanners(
    jobs: usize,
    matcher: Arc<PatternMatcher>,
    files: StageReceiver<FileIdentity>,
    groups: StageSender<MatchGroup>,
) -> SearchResult<Vec<JoinHandle<ScanStats>>> {
    let mut workers = Vec::with_capacity(jobs);
    for id in 0..jobs {
        let matcher = Arc::clone(&matcher);
        let files = files.clone();
        let groups = groups.clone();
        let handle = std::thread::Builder::new()
            .name(format!("scan-{id}"))
            .spawn(move || scan_worker(id, &matcher, &files, &groups))?;
        workers.push(handle);
    }
    Ok(workers)
}

fn scan_worker(
    id: usize,
    matcher: &PatternMatcher,
    files: &StageReceiver<FileIdentity>,
    groups: &StageSender<MatchGroup>,
) -> ScanStats {
    let mut stats = ScanStats::default();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(identity) = files.recv() {
        let started = Instant::now();
        match process_file(&identity, matcher, &mut buf, &mut stats) {
            Ok(Some(group)) => {
                stats.files_matched += 1;
                if !groups.send(group) {
                    // Collector is gone; the run is tearing down.
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("{PROGRAM_NAME}: {e}");
                stats.read_errors += 1;
            }
        }
        stats.elapsed += started.elapsed();
    }

    debug!(
        worker = id,
        files = stats.files_scanned,
        matched = stats.files_matched,
        bytes = stats.bytes_read,
        "scan worker finished"
    );
    stats
}

/// Reads one file and scans it. Returns the match group when non-empty.
fn process_file(
    identity: &FileIdentity,
    matcher: &PatternMatcher,
    buf: &mut Vec<u8>,
    stats: &mut ScanStats,
) -> SearchResult<Option<MatchGroup>> {
    let path = &identity.path;
    trace!(path = %path.display(), "scanning");

    let mut file = File::open(path).map_err(|e| SearchError::file_io(path, e))?;
    let size = match identity.size {
        Some(size) => size,
        None => file
            .metadata()
            .map_err(|e| SearchError::file_io(path, e))?
            .len(),
    };
    stats.files_scanned += 1;

    if size == 0 {
        return Ok(None);
    }

    let mut group = MatchGroup::new(path.clone());
    if size >= MMAP_THRESHOLD {
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SearchError::file_io(path, e))?;
        stats.bytes_read += mmap.len() as u64;
        scan_buffer(&mmap, matcher, &mut group);
    } else {
        buf.clear();
        buf.reserve(size as usize);
        file.read_to_end(buf)
            .map_err(|e| SearchError::file_io(path, e))?;
        stats.bytes_read += buf.len() as u64;
        scan_buffer(buf, matcher, &mut group);
    }

    Ok((!group.is_empty()).then_some(group))
}

/// Runs the matcher over `data`, appending coalesced per-line matches to
/// `group`.
///
/// Line numbers are tracked incrementally: only the gap between the
/// previous match start and the current one is recounted, with the
/// vectorized newline counter. A second hit on an already-reported line
/// extends that line's highlight list instead of adding a row. Zero-width
/// matches advance the cursor by one character (skipping UTF-8
/// continuation bytes) so the loop always makes progress.
pub fn scan_buffer(data: &[u8], matcher: &PatternMatcher, group: &mut MatchGroup) {
    let mut cursor = 0usize;
    let mut count_from = 0usize;
    let mut line = 1usize;

    while let Some((m_start, m_end)) = matcher.find_from(data, cursor) {
        if m_end == m_start {
            // Zero-width match: nothing to report, just make progress.
            cursor = advance_one_char(data, m_start);
            continue;
        }

        line += count_newlines(&data[count_from..m_start]);
        count_from = m_start;

        if line == group.last_line_number() {
            let last = group.last().expect("reported line implies a match");
            let base = last.line_start as usize;
            let span_start = m_start - base;
            let span_end = (m_end - base).min(last.line.len());
            if span_end > span_start {
                group.extend_last((span_start, span_end));
            }
        } else {
            let start = line_start(data, m_start);
            let end = line_end(data, m_start);
            // A match that runs past the newline is highlighted to the end
            // of its first line.
            let span_end = m_end.min(end);
            group.push(Match {
                line_number: line,
                line_start: start as u64,
                line: String::from_utf8_lossy(&data[start..end]).into_owned(),
                spans: vec![(m_start - start, span_end - start)],
            });
        }

        cursor = m_end;
    }
}

/// Advances one position, then past any UTF-8 continuation bytes, so
/// zero-width recovery never lands inside a multi-byte character.
fn advance_one_char(data: &[u8], pos: usize) -> usize {
    let mut next = pos + 1;
    while next < data.len() && (data[next] & 0xC0) == 0x80 {
        next += 1;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegexEngine;
    use crate::search::matcher::PatternSpec;
    use crate::walker::FileKind;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn matcher(pattern: &str) -> PatternMatcher {
        PatternMatcher::new(&PatternSpec::new(pattern), RegexEngine::Default).unwrap()
    }

    fn scan(data: &[u8], pattern: &str) -> MatchGroup {
        let mut group = MatchGroup::new(PathBuf::from("test"));
        scan_buffer(data, &matcher(pattern), &mut group);
        group
    }

    #[test]
    fn test_basic_literal_scan() {
        let group = scan(b"alpha\nbeta alpha\ngamma\n", "alpha");
        let matches = group.matches();
        assert_eq!(matches.len(), 2);

        assert_eq!(matches[0].line_number, 1);
        assert_eq!(matches[0].line, "alpha");
        assert_eq!(matches[0].spans, vec![(0, 5)]);

        assert_eq!(matches[1].line_number, 2);
        assert_eq!(matches[1].line, "beta alpha");
        assert_eq!(matches[1].spans, vec![(5, 10)]);
    }

    #[test]
    fn test_same_line_matches_coalesce() {
        let group = scan(b"aaaa", "aa");
        let matches = group.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line_number, 1);
        assert_eq!(matches[0].spans, vec![(0, 2), (2, 4)]);
    }

    #[test]
    fn test_line_numbers_strictly_ascending() {
        let data = b"x\n\nx here\nnothing\nx again\n";
        let group = scan(data, "x");
        let lines: Vec<usize> = group.matches().iter().map(|m| m.line_number).collect();
        assert_eq!(lines, vec![1, 3, 5]);
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_line_start_offsets() {
        let group = scan(b"alpha\nbeta alpha\n", "alpha");
        let matches = group.matches();
        assert_eq!(matches[0].line_start, 0);
        assert_eq!(matches[1].line_start, 6);
    }

    #[test]
    fn test_no_trailing_newline() {
        let group = scan(b"last line alpha", "alpha");
        assert_eq!(group.matches()[0].line, "last line alpha");
        assert_eq!(group.matches()[0].spans, vec![(10, 15)]);
    }

    #[test]
    fn test_regex_scan_with_prefix_prefilter() {
        let data = b"error_1 ok\nnothing\nerror_23 error_4\n";
        let group = scan(data, r"error_\d+");
        let matches = group.matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].spans, vec![(0, 7)]);
        assert_eq!(matches[1].spans, vec![(0, 8), (9, 16)]);
    }

    #[test]
    fn test_match_crossing_newline_clamps_highlight() {
        // `.` does not cross lines but an explicit \n can.
        let group = scan(b"ab\ncd\n", r"b\nc");
        let matches = group.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line_number, 1);
        assert_eq!(matches[0].line, "ab");
        assert_eq!(matches[0].spans, vec![(1, 2)]);
    }

    #[test]
    fn test_zero_width_pattern_terminates() {
        // `x*` matches empty at every position of this input; only the
        // non-empty hits are reported and the loop must still terminate.
        let group = scan(b"ab\ncd", "x*");
        assert!(group.is_empty());
    }

    #[test]
    fn test_zero_width_recovery_skips_utf8_continuations() {
        // "é" is two bytes; recovering from the empty matches before it
        // must not plant the cursor mid-character.
        let data = "é x é x".as_bytes();
        let group = scan(data, "x*");
        assert_eq!(group.matches().len(), 1);
        assert_eq!(group.matches()[0].spans, vec![(3, 4), (8, 9)]);
    }

    #[test]
    fn test_process_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hit.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "needle in line one").unwrap();
        writeln!(f, "no match").unwrap();
        writeln!(f, "another needle").unwrap();

        let identity = FileIdentity {
            path: path.clone(),
            name: "hit.txt".to_string(),
            kind: FileKind::File,
            dev: 0,
            ino: 0,
            size: None,
        };
        let m = matcher("needle");
        let mut buf = Vec::new();
        let mut stats = ScanStats::default();
        let group = process_file(&identity, &m, &mut buf, &mut stats)
            .unwrap()
            .expect("matches expected");

        assert_eq!(group.matched_lines(), 2);
        assert_eq!(stats.files_scanned, 1);
        assert!(stats.bytes_read > 0);
    }

    #[test]
    fn test_empty_file_is_scanned_but_produces_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        File::create(&path).unwrap();

        let identity = FileIdentity {
            path,
            name: "empty.txt".to_string(),
            kind: FileKind::File,
            dev: 0,
            ino: 0,
            size: None,
        };
        let m = matcher("anything");
        let mut buf = Vec::new();
        let mut stats = ScanStats::default();
        let result = process_file(&identity, &m, &mut buf, &mut stats).unwrap();

        assert!(result.is_none());
        assert_eq!(stats.files_scanned, 1);
        assert_eq!(stats.bytes_read, 0);
    }

    #[test]
    fn test_missing_file_is_per_file_error() {
        let identity = FileIdentity {
            path: PathBuf::from("/nonexistent/file.txt"),
            name: "file.txt".to_string(),
            kind: FileKind::File,
            dev: 0,
            ino: 0,
            size: None,
        };
        let m = matcher("x");
        let mut buf = Vec::new();
        let mut stats = ScanStats::default();
        let err = process_file(&identity, &m, &mut buf, &mut stats).unwrap_err();
        assert!(err.is_per_file());
    }

    #[test]
    fn test_buffer_reused_across_files() {
        let dir = tempdir().unwrap();
        let m = matcher("x");
        let mut buf = Vec::new();
        let mut stats = ScanStats::default();

        for (name, content) in [("a.txt", "x marks\n"), ("b.txt", "no hits\n")] {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            let identity = FileIdentity {
                path,
                name: name.to_string(),
                kind: FileKind::File,
                dev: 0,
                ino: 0,
                size: None,
            };
            process_file(&identity, &m, &mut buf, &mut stats).unwrap();
        }
        assert_eq!(stats.files_scanned, 2);
        // The buffer holds the last file's bytes; capacity was reused.
        assert!(!buf.is_empty());
    }
}
