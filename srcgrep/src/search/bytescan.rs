//! Low-level byte scanning: newline counting and word-boundary tests.
//!
//! Newline counting is the hot inner loop of line-number tracking, so it is
//! multiversioned: a portable `memchr`-based counter and an SSE2 counter
//! that compares 16 bytes per step and popcounts the resulting movemask.
//! The CPU is probed exactly once and the winner is installed behind a
//! function value; per-call dispatch costs nothing after that.

use memchr::{memchr, memchr_iter, memrchr};
use once_cell::sync::Lazy;

type NewlineCountFn = fn(&[u8]) -> usize;

static NEWLINE_COUNTER: Lazy<NewlineCountFn> = Lazy::new(pick_newline_counter);

fn pick_newline_counter() -> NewlineCountFn {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("sse2") {
            return count_newlines_sse2_entry;
        }
    }
    count_newlines_portable
}

/// Counts `\n` bytes in `buf` using the implementation selected at
/// startup.
pub fn count_newlines(buf: &[u8]) -> usize {
    (*NEWLINE_COUNTER)(buf)
}

/// Portable fallback built on the platform's fast byte search.
pub fn count_newlines_portable(buf: &[u8]) -> usize {
    memchr_iter(b'\n', buf).count()
}

#[cfg(target_arch = "x86_64")]
fn count_newlines_sse2_entry(buf: &[u8]) -> usize {
    // Selection only happens after the sse2 probe succeeded.
    unsafe { count_newlines_sse2(buf) }
}

/// SSE2 counter: 16-byte compare, movemask, popcount.
///
/// # Safety
/// Caller must ensure the CPU supports SSE2.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn count_newlines_sse2(buf: &[u8]) -> usize {
    use std::arch::x86_64::{_mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi8};

    let needle = _mm_set1_epi8(b'\n' as i8);
    let mut count = 0usize;

    let mut chunks = buf.chunks_exact(16);
    for chunk in &mut chunks {
        let haystack = _mm_loadu_si128(chunk.as_ptr().cast());
        let eq = _mm_cmpeq_epi8(haystack, needle);
        let mask = _mm_movemask_epi8(eq) as u32;
        count += mask.count_ones() as usize;
    }

    count
        + chunks
            .remainder()
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
}

/// Offset of the end of the line containing `from` (the next `\n`, or the
/// buffer end).
pub fn line_end(buf: &[u8], from: usize) -> usize {
    memchr(b'\n', &buf[from..]).map_or(buf.len(), |pos| from + pos)
}

/// Offset of the start of the line containing `pos` (one past the previous
/// `\n`, or 0).
pub fn line_start(buf: &[u8], pos: usize) -> usize {
    memrchr(b'\n', &buf[..pos]).map_or(0, |nl| nl + 1)
}

/// ASCII word byte, matching the engine's `\b` with Unicode disabled.
pub fn is_word_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

/// True when `[start, end)` sits on word boundaries on both sides,
/// byte-for-byte what `\b…\b` would require.
pub fn word_bounded(hay: &[u8], start: usize, end: usize) -> bool {
    if start >= end {
        return false;
    }
    let before = start > 0 && is_word_byte(hay[start - 1]);
    let first = is_word_byte(hay[start]);
    let last = is_word_byte(hay[end - 1]);
    let after = end < hay.len() && is_word_byte(hay[end]);
    before != first && last != after
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_naive(buf: &[u8]) -> usize {
        buf.iter().filter(|&&b| b == b'\n').count()
    }

    #[test]
    fn test_counters_agree_on_fixed_inputs() {
        let cases: &[&[u8]] = &[
            b"",
            b"\n",
            b"no newlines at all",
            b"one\ntwo\nthree\n",
            b"\n\n\n\n\n\n\n\n\n\n\n\n\n\n\n\n",
            b"exactly sixteen b\nplus a remainder\n tail",
        ];
        for case in cases {
            let expected = count_naive(case);
            assert_eq!(count_newlines_portable(case), expected);
            assert_eq!(count_newlines(case), expected);
        }
    }

    #[test]
    fn test_counters_agree_on_generated_buffers() {
        // Deterministic pseudo-random fill, with sizes straddling the
        // 16-byte vector width.
        let mut state = 0x2545F491u32;
        for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 255, 256, 1000, 4096] {
            let mut buf = Vec::with_capacity(len);
            for _ in 0..len {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                buf.push((state >> 24) as u8);
            }
            let expected = count_naive(&buf);
            assert_eq!(count_newlines_portable(&buf), expected, "len={len}");
            assert_eq!(count_newlines(&buf), expected, "len={len}");
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_sse2_matches_portable() {
        if !std::is_x86_feature_detected!("sse2") {
            return;
        }
        let buf: Vec<u8> = (0..997u32).map(|i| (i % 11) as u8 + b'\n' - 1).collect();
        assert_eq!(
            unsafe { count_newlines_sse2(&buf) },
            count_newlines_portable(&buf)
        );
    }

    #[test]
    fn test_line_bounds() {
        let buf = b"alpha\nbeta\ngamma";
        assert_eq!(line_start(buf, 0), 0);
        assert_eq!(line_end(buf, 0), 5);
        assert_eq!(line_start(buf, 7), 6);
        assert_eq!(line_end(buf, 7), 10);
        assert_eq!(line_start(buf, 12), 11);
        assert_eq!(line_end(buf, 12), buf.len());
    }

    #[test]
    fn test_word_bounded() {
        let hay = b"cat concatenate cat.";
        assert!(word_bounded(hay, 0, 3));
        assert!(!word_bounded(hay, 7, 10)); // inside "concatenate"
        assert!(word_bounded(hay, 16, 19)); // followed by '.'

        // Boundary against buffer edges.
        assert!(word_bounded(b"cat", 0, 3));
        // Zero-width ranges are never word-bounded.
        assert!(!word_bounded(hay, 1, 1));
    }
}
