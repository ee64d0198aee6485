//! Pattern compilation and the matcher capability.
//!
//! A [`PatternMatcher`] wraps one of two strategies, chosen at compile
//! time from the pattern itself:
//!
//! - **Literal**: caseful patterns with no regex metacharacters (or forced
//!   literal with `-Q`) bypass the regex engine entirely and run a
//!   SIMD-backed substring search.
//! - **Regex**: everything else compiles with the selected backend. When
//!   the pattern still starts with a multi-byte literal run, that prefix
//!   drives a substring prefilter; failing that, a 256-entry bitmap of
//!   possible first bytes lets the scanner skip ahead cheaply.
//!
//! Matching is byte-oriented throughout: case folding and `\b` use ASCII
//! semantics, and the haystack is never required to be valid UTF-8.

use memchr::memmem;
use regex::bytes::{Regex, RegexBuilder};
use regex_syntax::hir::{Class, Hir, HirKind};
use regex_syntax::ParserBuilder;

use crate::config::RegexEngine;
use crate::errors::{SearchError, SearchResult};
use crate::search::bytescan::word_bounded;

/// The pattern plus the match-mode flags, as handed over by the CLI.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub pattern: String,
    pub ignore_case: bool,
    pub word_regexp: bool,
    pub literal: bool,
}

impl PatternSpec {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ignore_case: false,
            word_regexp: false,
            literal: false,
        }
    }
}

/// What static analysis learned about the pattern.
#[derive(Debug, Default)]
pub struct PatternAnalysis {
    /// The pattern matches exactly one byte string.
    pub is_literal: bool,
    /// Longest literal run every match must start with (empty if none).
    pub literal_prefix: Vec<u8>,
    /// Bytes that can begin a match, when that set is knowable.
    pub first_bytes: Option<Box<[bool; 256]>>,
}

#[derive(Debug)]
enum Strategy {
    Literal(LiteralMatcher),
    Regex(Regex),
}

#[derive(Debug)]
enum Prefilter {
    None,
    /// Skip to the next occurrence of the literal prefix.
    Prefix(memmem::Finder<'static>),
    /// Skip bytes that cannot begin a match.
    FirstBytes(Box<[bool; 256]>),
}

/// Compiled matcher: strategy plus prefilter, shared read-only across all
/// scanner workers.
#[derive(Debug)]
pub struct PatternMatcher {
    strategy: Strategy,
    prefilter: Prefilter,
    is_literal: bool,
}

impl PatternMatcher {
    pub fn new(spec: &PatternSpec, engine: RegexEngine) -> SearchResult<Self> {
        match engine {
            RegexEngine::Default => Self::with_default_engine(spec),
        }
    }

    fn with_default_engine(spec: &PatternSpec) -> SearchResult<Self> {
        if spec.pattern.is_empty() {
            return Err(SearchError::pattern_error("empty pattern"));
        }

        let analysis = analyze(spec);

        // The literal bypass is caseful only; a case-insensitive "literal"
        // still goes through the engine.
        if analysis.is_literal && !spec.ignore_case {
            let needle = if spec.literal {
                spec.pattern.as_bytes().to_vec()
            } else {
                // The source may spell the literal with escapes
                // (`foo\.bar`); the analysis holds the decoded bytes.
                analysis.literal_prefix.clone()
            };
            return Ok(Self {
                strategy: Strategy::Literal(LiteralMatcher::new(needle, spec.word_regexp)),
                prefilter: Prefilter::None,
                is_literal: true,
            });
        }

        let mut source = if spec.literal {
            regex::escape(&spec.pattern)
        } else {
            spec.pattern.clone()
        };
        if spec.word_regexp {
            source = format!(r"\b(?:{source})\b");
        }

        let regex = RegexBuilder::new(&source)
            .case_insensitive(spec.ignore_case)
            .unicode(false)
            .build()
            .map_err(|e| SearchError::Pattern(e.to_string()))?;

        let prefilter = if analysis.literal_prefix.len() >= 2 {
            Prefilter::Prefix(memmem::Finder::new(&analysis.literal_prefix).into_owned())
        } else if let Some(first_bytes) = analysis.first_bytes {
            Prefilter::FirstBytes(first_bytes)
        } else {
            Prefilter::None
        };

        Ok(Self {
            strategy: Strategy::Regex(regex),
            prefilter,
            is_literal: analysis.is_literal,
        })
    }

    /// True when the literal bypass is active.
    pub fn is_literal(&self) -> bool {
        self.is_literal
    }

    /// Finds the next match at or after `at`. Offsets are absolute within
    /// `hay`; successive calls with advancing `at` yield non-overlapping,
    /// ascending matches.
    pub fn find_from(&self, hay: &[u8], at: usize) -> Option<(usize, usize)> {
        if at > hay.len() {
            return None;
        }
        match &self.strategy {
            Strategy::Literal(lit) => lit.find_at(hay, at),
            Strategy::Regex(re) => {
                let start = match &self.prefilter {
                    Prefilter::Prefix(finder) => finder.find(&hay[at..])? + at,
                    Prefilter::FirstBytes(map) => {
                        let mut i = at;
                        while i < hay.len() && !map[hay[i] as usize] {
                            i += 1;
                        }
                        if i >= hay.len() {
                            return None;
                        }
                        i
                    }
                    Prefilter::None => at,
                };
                re.find_at(hay, start).map(|m| (m.start(), m.end()))
            }
        }
    }
}

/// Vectorized substring search with optional word-boundary screening of
/// candidates.
#[derive(Debug)]
struct LiteralMatcher {
    finder: memmem::Finder<'static>,
    len: usize,
    word: bool,
}

impl LiteralMatcher {
    fn new(needle: Vec<u8>, word: bool) -> Self {
        let len = needle.len();
        Self {
            finder: memmem::Finder::new(&needle).into_owned(),
            len,
            word,
        }
    }

    fn find_at(&self, hay: &[u8], mut at: usize) -> Option<(usize, usize)> {
        while at <= hay.len() {
            let pos = self.finder.find(&hay[at..])? + at;
            let end = pos + self.len;
            if self.word && !word_bounded(hay, pos, end) {
                at = pos + 1;
                continue;
            }
            return Some((pos, end));
        }
        None
    }
}

/// Regex metacharacters; their absence makes the source trivially literal.
fn source_is_literal(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|c| matches!(c, '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'))
}

/// Derives the literal facts used by the fast paths. Case-insensitive
/// patterns get no analysis: the engine's own folding handles them.
fn analyze(spec: &PatternSpec) -> PatternAnalysis {
    if spec.ignore_case {
        return PatternAnalysis::default();
    }

    if spec.literal {
        let bytes = spec.pattern.as_bytes().to_vec();
        let mut map = Box::new([false; 256]);
        if let Some(&b) = bytes.first() {
            map[b as usize] = true;
        }
        return PatternAnalysis {
            is_literal: true,
            literal_prefix: bytes,
            first_bytes: Some(map),
        };
    }

    let hir = match ParserBuilder::new()
        .utf8(false)
        .unicode(false)
        .build()
        .parse(&spec.pattern)
    {
        Ok(hir) => hir,
        // Compilation reports the error; nothing to analyze.
        Err(_) => return PatternAnalysis::default(),
    };

    let literal_prefix = literal_prefix(&hir);
    let is_literal = source_is_literal(&spec.pattern)
        || matches!(hir.kind(), HirKind::Literal(lit) if lit.0.len() == literal_prefix.len());

    let mut map = Box::new([false; 256]);
    let first_bytes = fill_first_bytes(&hir, &mut map).then_some(map);

    PatternAnalysis {
        is_literal,
        literal_prefix,
        first_bytes,
    }
}

/// Longest literal run at the start of the pattern.
fn literal_prefix(hir: &Hir) -> Vec<u8> {
    match hir.kind() {
        HirKind::Literal(lit) => lit.0.to_vec(),
        HirKind::Capture(cap) => literal_prefix(&cap.sub),
        HirKind::Concat(parts) => {
            let mut prefix = Vec::new();
            for part in parts {
                match part.kind() {
                    HirKind::Literal(lit) => prefix.extend_from_slice(&lit.0),
                    _ => break,
                }
            }
            prefix
        }
        _ => Vec::new(),
    }
}

/// Collects the set of bytes that can begin a match into `map`. Returns
/// false when the set cannot be determined (the prefilter is then
/// disabled rather than risk skipping a real match).
fn fill_first_bytes(hir: &Hir, map: &mut [bool; 256]) -> bool {
    match hir.kind() {
        HirKind::Literal(lit) => {
            map[lit.0[0] as usize] = true;
            true
        }
        HirKind::Class(Class::Bytes(class)) => {
            for range in class.ranges() {
                for b in range.start()..=range.end() {
                    map[b as usize] = true;
                }
            }
            true
        }
        // With Unicode mode off, classes lower to byte classes; a Unicode
        // class here means multi-byte encodings we cannot summarize.
        HirKind::Class(Class::Unicode(_)) => false,
        HirKind::Capture(cap) => fill_first_bytes(&cap.sub, map),
        HirKind::Concat(parts) => {
            for part in parts {
                // Lookarounds are zero-width; the first byte comes from
                // whatever follows them.
                if matches!(part.kind(), HirKind::Look(_)) {
                    continue;
                }
                return fill_first_bytes(part, map);
            }
            false
        }
        HirKind::Alternation(parts) => parts.iter().all(|p| fill_first_bytes(p, map)),
        HirKind::Repetition(rep) if rep.min > 0 => fill_first_bytes(&rep.sub, map),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(spec: PatternSpec) -> PatternMatcher {
        PatternMatcher::new(&spec, RegexEngine::Default).unwrap()
    }

    fn find_all(m: &PatternMatcher, hay: &[u8]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut at = 0;
        while let Some((s, e)) = m.find_from(hay, at) {
            out.push((s, e));
            at = if e > s { e } else { s + 1 };
        }
        out
    }

    #[test]
    fn test_literal_strategy_selected() {
        assert!(matcher(PatternSpec::new("alpha")).is_literal());
        assert!(!matcher(PatternSpec::new(r"alpha\d+")).is_literal());
        // Escaped metacharacters decode to a literal.
        assert!(matcher(PatternSpec::new(r"foo\.bar")).is_literal());
    }

    #[test]
    fn test_case_insensitive_disables_literal_bypass() {
        let mut spec = PatternSpec::new("alpha");
        spec.ignore_case = true;
        let m = matcher(spec);
        assert!(!m.is_literal());
        assert_eq!(find_all(&m, b"ALPHA alpha Alpha").len(), 3);
    }

    #[test]
    fn test_literal_and_regex_agree() {
        let hay = b"alpha\nbeta alpha\ngamma alphabet\n";
        let lit = matcher(PatternSpec::new("alpha"));
        // Force the engine path with an equivalent pattern.
        let re = matcher(PatternSpec::new("alph[a]"));
        assert!(lit.is_literal());
        assert!(!re.is_literal());
        assert_eq!(find_all(&lit, hay), find_all(&re, hay));
    }

    #[test]
    fn test_overlapping_literal_matches_do_not_overlap() {
        let m = matcher(PatternSpec::new("aa"));
        assert_eq!(find_all(&m, b"aaaa"), vec![(0, 2), (2, 4)]);
    }

    #[test]
    fn test_word_regexp_literal_adjacency() {
        let mut spec = PatternSpec::new("cat");
        spec.word_regexp = true;
        let m = matcher(spec);
        assert!(m.is_literal());
        assert_eq!(find_all(&m, b"cat concatenate cat."), vec![(0, 3), (16, 19)]);
    }

    #[test]
    fn test_word_regexp_matches_engine_boundaries() {
        let hay = b"cat concatenate cat. scattered cat";
        let mut lit_spec = PatternSpec::new("cat");
        lit_spec.word_regexp = true;
        let lit = matcher(lit_spec);

        let mut re_spec = PatternSpec::new("c[a]t");
        re_spec.word_regexp = true;
        let re = matcher(re_spec);

        assert_eq!(find_all(&lit, hay), find_all(&re, hay));
    }

    #[test]
    fn test_forced_literal_escapes_metacharacters() {
        let mut spec = PatternSpec::new("a.b");
        spec.literal = true;
        let m = matcher(spec);
        assert_eq!(find_all(&m, b"a.b axb a.b"), vec![(0, 3), (8, 11)]);
    }

    #[test]
    fn test_invalid_pattern_is_config_time_error() {
        let spec = PatternSpec::new("[unclosed");
        let err = PatternMatcher::new(&spec, RegexEngine::Default).unwrap_err();
        assert!(matches!(err, SearchError::Pattern(_)));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = PatternMatcher::new(&PatternSpec::new(""), RegexEngine::Default).unwrap_err();
        assert!(matches!(err, SearchError::Pattern(_)));
    }

    #[test]
    fn test_literal_prefix_extraction() {
        let spec = PatternSpec::new(r"error_\d+");
        let analysis = analyze(&spec);
        assert!(!analysis.is_literal);
        assert_eq!(analysis.literal_prefix, b"error_");
    }

    #[test]
    fn test_first_byte_bitmap_from_class() {
        let spec = PatternSpec::new(r"[abc]x");
        let analysis = analyze(&spec);
        let map = analysis.first_bytes.expect("class start should be knowable");
        assert!(map[b'a' as usize]);
        assert!(map[b'b' as usize]);
        assert!(map[b'c' as usize]);
        assert!(!map[b'x' as usize]);
    }

    #[test]
    fn test_first_byte_bitmap_from_alternation() {
        let spec = PatternSpec::new("foo|bar");
        let analysis = analyze(&spec);
        let map = analysis.first_bytes.expect("alternation starts are knowable");
        assert!(map[b'f' as usize]);
        assert!(map[b'b' as usize]);
        assert!(!map[b'o' as usize]);
    }

    #[test]
    fn test_prefilter_does_not_lose_matches() {
        // Prefix prefilter active ("err" >= 2 bytes).
        let m = matcher(PatternSpec::new(r"err(or)?s?"));
        let hay = b"no errors here, just err and error";
        let found = find_all(&m, hay);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_zero_width_matches_make_progress() {
        let m = matcher(PatternSpec::new(r"x*"));
        // find_all advances by one on empty matches; must terminate.
        let found = find_all(&m, b"axa");
        assert!(found.len() >= 3);
    }
}
