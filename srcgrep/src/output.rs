//! Result formatting.
//!
//! The printer consumes match groups one at a time, so a file's matches
//! always appear contiguously: a filename header, then one row per
//! matched line with the hits wrapped in the highlight style.

use std::io::{self, Write};

use crate::results::MatchGroup;

const STYLE_FILENAME: &str = "\x1b[1;32m";
const STYLE_LINENO: &str = "\x1b[1;33m";
const STYLE_MATCH: &str = "\x1b[1;31m";
const STYLE_RESET: &str = "\x1b[0m";

/// Writes match groups to `out`, optionally styled with ANSI escapes.
pub struct Printer<W: Write> {
    out: W,
    color: bool,
    groups_printed: usize,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            groups_printed: 0,
        }
    }

    /// Prints one file's matches: header line, then `lineno:content` rows.
    pub fn print_group(&mut self, group: &MatchGroup) -> io::Result<()> {
        if self.groups_printed > 0 {
            writeln!(self.out)?;
        }
        self.groups_printed += 1;

        if self.color {
            writeln!(
                self.out,
                "{STYLE_FILENAME}{}{STYLE_RESET}",
                group.path.display()
            )?;
        } else {
            writeln!(self.out, "{}", group.path.display())?;
        }

        for m in group.matches() {
            if self.color {
                write!(self.out, "{STYLE_LINENO}{}{STYLE_RESET}:", m.line_number)?;
                self.write_highlighted(&m.line, &m.spans)?;
            } else {
                writeln!(self.out, "{}:{}", m.line_number, m.line)?;
            }
        }
        Ok(())
    }

    fn write_highlighted(&mut self, line: &str, spans: &[(usize, usize)]) -> io::Result<()> {
        let bytes = line.as_bytes();
        let mut last = 0;
        for &(start, end) in spans {
            self.out.write_all(&bytes[last..start])?;
            write!(self.out, "{STYLE_MATCH}")?;
            self.out.write_all(&bytes[start..end])?;
            write!(self.out, "{STYLE_RESET}")?;
            last = end;
        }
        self.out.write_all(&bytes[last..])?;
        writeln!(self.out)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Match;
    use std::path::PathBuf;

    fn sample_group() -> MatchGroup {
        let mut group = MatchGroup::new(PathBuf::from("src/lib.rs"));
        group.push(Match {
            line_number: 3,
            line_start: 20,
            line: "let alpha = alpha();".to_string(),
            spans: vec![(4, 9), (12, 17)],
        });
        group.push(Match {
            line_number: 7,
            line_start: 90,
            line: "alpha".to_string(),
            spans: vec![(0, 5)],
        });
        group
    }

    #[test]
    fn test_plain_output() {
        let mut out = Vec::new();
        let mut printer = Printer::new(&mut out, false);
        printer.print_group(&sample_group()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "src/lib.rs\n3:let alpha = alpha();\n7:alpha\n"
        );
    }

    #[test]
    fn test_colored_output_wraps_spans() {
        let mut out = Vec::new();
        let mut printer = Printer::new(&mut out, true);
        printer.print_group(&sample_group()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[1;32msrc/lib.rs\x1b[0m"));
        assert!(text.contains("\x1b[1;31malpha\x1b[0m"));
        // Unmatched text stays unstyled.
        assert!(text.contains("let "));
    }

    #[test]
    fn test_groups_separated_by_blank_line() {
        let mut out = Vec::new();
        let mut printer = Printer::new(&mut out, false);
        printer.print_group(&sample_group()).unwrap();
        printer.print_group(&sample_group()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("7:alpha\n\nsrc/lib.rs\n"));
    }
}
