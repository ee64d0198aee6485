//! File-type classification.
//!
//! A *type* is a named bundle of filename filters; whether a file gets
//! scanned is decided entirely from its base name (plus, for a handful of
//! script types, the file's first line). Filters come in four kinds:
//!
//! - literal filename (`is:Makefile`)
//! - extension (`ext:c,h`)
//! - shell glob, include or exclude (`glob:*.min.js`)
//! - first-line regex (`firstlinematch:^#!.*\bpython`)
//!
//! Internally a filter spec is stored in a compact string encoding: an
//! extension starts with `.`, a first-line regex is wrapped in `/`, and
//! anything else is a literal filename. Globs are not stored in the type
//! map; they land directly in the ordered glob vectors at add time.
//!
//! `compile()` turns the active types into lookup tables sized for the hot
//! path: short extensions (up to 8 bytes) are packed into sorted `u64`s for
//! binary search, longer ones go into a hash set, literal names into
//! another, and globs into a pure-exclude vector plus an ordered
//! include/exclude vector where the last match wins.

use glob::Pattern;
use regex::bytes::RegexBuilder;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use crate::errors::{SearchError, SearchResult};

/// Internal type name used for `--ignore-file` specs.
const IGNORE_FILE_TYPE: &str = "IGNORE_FILE_TYPE";
/// Internal type name used for `--include` globs.
const INCLUDE_GLOB_TYPE: &str = "INCLUDE_GLOB_TYPE";

/// Built-in file types. Encoding per module docs: `.ext`, `/first-line
/// regex/`, or a literal filename.
const BUILTIN_TYPES: &[(&str, &[&str])] = &[
    ("actionscript", &[".as", ".mxml"]),
    ("ada", &[".ada", ".adb", ".ads"]),
    ("asm", &[".asm", ".s", ".S"]),
    ("asp", &[".asp"]),
    ("aspx", &[".master", ".ascx", ".asmx", ".aspx", ".svc"]),
    ("autoconf", &[".ac", ".in"]),
    ("automake", &[".am", ".in"]),
    ("awk", &[".awk"]),
    ("batch", &[".bat", ".cmd"]),
    ("cc", &[".c", ".h", ".xs"]),
    ("cfmx", &[".cfc", ".cfm", ".cfml"]),
    ("clojure", &[".clj"]),
    ("cmake", &["CMakeLists.txt", ".cmake"]),
    ("coffeescript", &[".coffee"]),
    (
        "cpp",
        &[".cpp", ".cc", ".cxx", ".m", ".hpp", ".hh", ".h", ".hxx"],
    ),
    ("csharp", &[".cs"]),
    ("css", &[".css"]),
    ("dart", &[".dart"]),
    (
        "delphi",
        &[
            ".pas", ".int", ".dfm", ".nfm", ".dof", ".dpk", ".dproj", ".groupproj", ".bdsgroup",
            ".bdsproj",
        ],
    ),
    ("elisp", &[".el"]),
    ("elixir", &[".ex", ".exs"]),
    ("erlang", &[".erl", ".hrl"]),
    (
        "fortran",
        &[".f", ".f77", ".f90", ".f95", ".f03", ".for", ".ftn", ".fpp"],
    ),
    ("go", &[".go"]),
    ("groovy", &[".groovy", ".gtmpl", ".gpp", ".grunit", ".gradle"]),
    ("haskell", &[".hs", ".lhs"]),
    ("hh", &[".h"]),
    ("html", &[".htm", ".html"]),
    ("jade", &[".jade"]),
    ("java", &[".java", ".properties"]),
    ("js", &[".js"]),
    ("json", &[".json"]),
    ("jsp", &[".jsp", ".jspx", ".jhtm", ".jhtml"]),
    ("less", &[".less"]),
    ("lisp", &[".lisp", ".lsp"]),
    ("lua", &[".lua", r"/^#!.*\blua(jit)?/"]),
    ("m4", &[".m4"]),
    (
        "make",
        &[
            ".mk",
            ".mak",
            "makefile",
            "Makefile",
            "Makefile.Debug",
            "Makefile.Release",
        ],
    ),
    ("matlab", &[".m"]),
    ("objc", &[".m", ".h"]),
    ("objcpp", &[".mm", ".h"]),
    ("ocaml", &[".ml", ".mli"]),
    (
        "parrot",
        &[".pir", ".pasm", ".pmc", ".ops", ".pod", ".pg", ".tg"],
    ),
    (
        "perl",
        &[".pl", ".pm", ".pod", ".t", ".psgi", r"/^#!.*\bperl/"],
    ),
    ("perltest", &[".t"]),
    (
        "php",
        &[
            ".php",
            ".phpt",
            ".php3",
            ".php4",
            ".php5",
            ".phtml",
            r"/^#!.*\bphp/",
        ],
    ),
    ("plone", &[".pt", ".cpt", ".metadata", ".cpy", ".py"]),
    ("python", &[".py", r"/^#!.*\bpython/"]),
    ("rake", &["Rakefile"]),
    ("rr", &[".R"]),
    ("rst", &[".rst"]),
    (
        "ruby",
        &[
            ".rb",
            ".rhtml",
            ".rjs",
            ".rxml",
            ".erb",
            ".rake",
            ".spec",
            "Rakefile",
            r"/^#!.*\bruby/",
        ],
    ),
    ("rust", &[".rs"]),
    ("sass", &[".sass", ".scss"]),
    ("scala", &[".scala"]),
    ("scheme", &[".scm", ".ss"]),
    (
        "shell",
        &[
            ".sh",
            ".bash",
            ".csh",
            ".tcsh",
            ".ksh",
            ".zsh",
            ".fish",
            r"/^#!.*\b(?:ba|t?c|k|z|fi)?sh\b/",
        ],
    ),
    ("smalltalk", &[".st"]),
    ("smarty", &[".tpl"]),
    ("sql", &[".sql", ".ctl"]),
    ("stylus", &[".styl"]),
    ("tcl", &[".tcl", ".itcl", ".itk"]),
    ("tex", &[".tex", ".cls", ".sty"]),
    ("text", &[".txt", "ChangeLog", "README"]),
    ("tt", &[".tt", ".tt2", ".ttml"]),
    ("vb", &[".bas", ".cls", ".frm", ".ctl", ".vb", ".resx"]),
    ("verilog", &[".v", ".vh", ".sv"]),
    ("vhdl", &[".vhd", ".vhdl"]),
    ("vim", &[".vim"]),
    ("xml", &[".xml", ".dtd", ".xsl", ".xslt", ".ent", r"/<[?]xml/"]),
    ("yaml", &[".yaml", ".yml"]),
    ("miscellaneous", &[".qbk", ".w", ".ipp", ".patch", "configure"]),
];

/// Verdict for a base name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    Scan,
    Skip,
    /// No name-based filter claimed the file, but an active type carries a
    /// first-line regex; the caller must read the first line and consult
    /// [`TypeManager::first_line_matches`].
    FirstLine,
}

#[derive(Debug, Default)]
pub struct TypeManager {
    /// Every known type, builtin and user-defined, keyed by name.
    all_types: BTreeMap<String, Vec<String>>,
    /// The currently active subset.
    active: BTreeMap<String, Vec<String>>,
    /// Filter specs suppressed by `--notype` / `--ignore-file`. A spec
    /// shared between types (`.h` lives in `cc`, `cpp`, `hh`, ...) stays
    /// suppressed until a later `--type` un-removes it.
    removed_filters: HashSet<String>,
    /// Set once the first enable arrives; switches from "default
    /// allow-list" to "only the named types".
    first_enable_seen: bool,

    /// Exclude globs, uncompiled, in the order they were added.
    exclude_glob_sources: Vec<String>,
    /// Include/exclude globs in command-line order; `true` = include.
    ordered_glob_sources: Vec<(String, bool)>,

    // Compiled lookup tables, valid after `compile()`.
    include_names: HashSet<String>,
    small_exts: Vec<u64>,
    long_exts: HashSet<String>,
    first_line_regexes: Vec<regex::bytes::Regex>,
    exclude_globs: Vec<Pattern>,
    ordered_globs: Vec<(Pattern, bool)>,
    compiled: bool,
}

/// Packs an extension of up to 8 bytes into a `u64` for the sorted
/// fast-lookup table. Longer extensions use the hash set instead.
fn pack_ext(ext: &str) -> Option<u64> {
    let bytes = ext.as_bytes();
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut packed = 0u64;
    for &b in bytes {
        packed = (packed << 8) | u64::from(b);
    }
    Some(packed)
}

/// Splits off the extension after the last dot. A leading dot (dotfiles)
/// does not start an extension.
fn ext_of(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(pos) if pos > 0 => Some(&name[pos + 1..]),
        _ => None,
    }
}

impl TypeManager {
    /// Creates a manager with the built-in type table, all types active.
    pub fn new() -> Self {
        let mut manager = Self::default();
        for (name, specs) in BUILTIN_TYPES {
            let specs: Vec<String> = specs.iter().map(|s| (*s).to_string()).collect();
            manager.all_types.insert((*name).to_string(), specs.clone());
            manager.active.insert((*name).to_string(), specs);
        }
        manager
    }

    /// Resolves a possibly-abbreviated type name. An exact match wins;
    /// otherwise the prefix must identify exactly one type.
    fn resolve_name(&self, name_or_prefix: &str) -> SearchResult<String> {
        if self.all_types.contains_key(name_or_prefix) {
            return Ok(name_or_prefix.to_string());
        }
        let candidates = self.matching_type_names(name_or_prefix);
        match candidates.len() {
            0 => Err(SearchError::UnknownType(name_or_prefix.to_string())),
            1 => Ok(candidates.into_iter().next().unwrap()),
            _ => Err(SearchError::AmbiguousType {
                prefix: name_or_prefix.to_string(),
                candidates,
            }),
        }
    }

    /// Type names starting with `prefix`, in sorted order. Used by the CLI
    /// to disambiguate abbreviations.
    pub fn matching_type_names(&self, prefix: &str) -> Vec<String> {
        self.all_types
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// `--type=NAME`: activates a type. The first activation clears the
    /// default allow-list.
    pub fn enable(&mut self, name_or_prefix: &str) -> SearchResult<()> {
        let name = self.resolve_name(name_or_prefix)?;
        self.enable_exact(&name);
        Ok(())
    }

    fn enable_exact(&mut self, name: &str) {
        if !self.first_enable_seen {
            self.active.clear();
            self.first_enable_seen = true;
        }
        if let Some(specs) = self.all_types.get(name) {
            // Un-remove: a filter previously suppressed by --notype comes
            // back when its type is explicitly re-enabled, so
            // `--notype=cpp --type=hh` still matches .h files.
            for spec in specs {
                self.removed_filters.remove(spec);
            }
            self.active.insert(name.to_string(), specs.clone());
        }
    }

    /// `--notype=NAME`: deactivates a type and suppresses its filter specs
    /// everywhere they appear.
    pub fn disable(&mut self, name_or_prefix: &str) -> SearchResult<()> {
        let name = self.resolve_name(name_or_prefix)?;
        if let Some(specs) = self.all_types.get(&name) {
            for spec in specs {
                self.removed_filters.insert(spec.clone());
            }
        }
        self.active.remove(&name);
        Ok(())
    }

    /// `--type-del=NAME`: forgets a type entirely. Deleting an unknown
    /// type is a no-op.
    pub fn delete(&mut self, name: &str) {
        self.all_types.remove(name);
        self.active.remove(name);
    }

    /// Adds a `NAME:KIND:ARGS` filter spec (`--type-add`, or `--type-set`
    /// when `delete_previous` is set).
    pub fn add_spec(&mut self, spec: &str, delete_previous: bool) -> SearchResult<()> {
        let mut parts = spec.splitn(3, ':');
        let (name, kind, args) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(kind), Some(args)) if !name.is_empty() && !args.is_empty() => {
                (name.to_string(), kind.to_string(), args.to_string())
            }
            _ => return Err(SearchError::FilterSpec(spec.to_string())),
        };

        if delete_previous {
            self.delete(&name);
        }
        self.add_filter(&name, &kind, &args)
            .map_err(|_| SearchError::FilterSpec(spec.to_string()))
    }

    fn add_filter(&mut self, type_name: &str, kind: &str, args: &str) -> SearchResult<()> {
        match kind {
            "is" => self.push_type_spec(type_name, args.to_string()),
            "ext" => {
                for ext in args.split(',') {
                    if ext.is_empty() {
                        return Err(SearchError::FilterSpec(args.to_string()));
                    }
                    self.push_type_spec(type_name, format!(".{ext}"));
                }
            }
            "glob" => {
                self.ordered_glob_sources.push((args.to_string(), true));
                // An include glob activates its type, clearing the default
                // allow-list if this is the first include option.
                self.all_types.entry(type_name.to_string()).or_default();
                self.enable_exact(type_name);
            }
            "globx" | "glob-exclude" => {
                self.exclude_glob_sources.push(args.to_string());
                self.ordered_glob_sources.push((args.to_string(), false));
            }
            "firstlinematch" => self.push_type_spec(type_name, format!("/{args}/")),
            _ => return Err(SearchError::FilterSpec(kind.to_string())),
        }
        Ok(())
    }

    fn push_type_spec(&mut self, type_name: &str, encoded: String) {
        self.all_types
            .entry(type_name.to_string())
            .or_default()
            .push(encoded.clone());
        self.active
            .entry(type_name.to_string())
            .or_default()
            .push(encoded);
    }

    /// `--ignore-file=KIND:ARGS`: attaches the spec to a nameless type and
    /// suppresses it, so matching files are never scanned.
    pub fn add_anonymous_ignore(&mut self, spec: &str) -> SearchResult<()> {
        let mut parts = spec.splitn(2, ':');
        let (kind, args) = match (parts.next(), parts.next()) {
            (Some(kind), Some(args)) if !args.is_empty() => (kind.to_string(), args.to_string()),
            _ => return Err(SearchError::FilterSpec(spec.to_string())),
        };
        self.all_types.entry(IGNORE_FILE_TYPE.to_string()).or_default();
        self.add_filter(IGNORE_FILE_TYPE, &kind, &args)
            .map_err(|_| SearchError::FilterSpec(spec.to_string()))?;
        self.disable(IGNORE_FILE_TYPE)
    }

    /// `--include=GLOB`: scan only files matching the glob (the first
    /// include clears the default allow-list).
    pub fn add_anonymous_include(&mut self, glob: &str) -> SearchResult<()> {
        self.add_filter(INCLUDE_GLOB_TYPE, "glob", glob)
    }

    /// `--exclude=GLOB`: never scan files matching the glob.
    pub fn add_exclude_glob(&mut self, glob: &str) -> SearchResult<()> {
        self.add_filter(IGNORE_FILE_TYPE, "globx", glob)
    }

    /// Builds the fast lookup tables. Must be called once, after every
    /// filter spec is known and before the first `should_scan`.
    pub fn compile(&mut self) -> SearchResult<()> {
        let mut small = HashSet::new();

        self.include_names.clear();
        self.long_exts.clear();
        self.first_line_regexes.clear();

        for specs in self.active.values() {
            for spec in specs {
                if self.removed_filters.contains(spec) {
                    continue;
                }
                if let Some(ext) = spec.strip_prefix('.') {
                    if let Some(packed) = pack_ext(ext) {
                        small.insert(packed);
                    } else {
                        self.long_exts.insert(ext.to_string());
                    }
                } else if spec.starts_with('/') && spec.ends_with('/') && spec.len() > 1 {
                    let source = &spec[1..spec.len() - 1];
                    let re = RegexBuilder::new(source)
                        .unicode(false)
                        .build()
                        .map_err(|e| {
                            SearchError::Pattern(format!("first-line regex '{source}': {e}"))
                        })?;
                    self.first_line_regexes.push(re);
                } else {
                    self.include_names.insert(spec.clone());
                }
            }
        }

        self.small_exts = small.into_iter().collect();
        self.small_exts.sort_unstable();

        self.exclude_globs = self
            .exclude_glob_sources
            .iter()
            .map(|g| Pattern::new(g).map_err(|_| SearchError::FilterSpec(g.clone())))
            .collect::<SearchResult<_>>()?;
        self.ordered_globs = self
            .ordered_glob_sources
            .iter()
            .map(|(g, inc)| {
                Pattern::new(g)
                    .map(|p| (p, *inc))
                    .map_err(|_| SearchError::FilterSpec(g.clone()))
            })
            .collect::<SearchResult<_>>()?;

        self.compiled = true;
        Ok(())
    }

    fn excluded_by_any_glob(&self, name: &str) -> bool {
        self.exclude_globs.iter().any(|g| g.matches(name))
    }

    /// Decides whether a file with this base name should be scanned.
    ///
    /// A file is scanned iff at least one include filter matches, no
    /// exclude glob matches, and any interleaved include/exclude glob
    /// sequence resolves in favor of inclusion (later entries override
    /// earlier ones).
    pub fn should_scan(&self, base_name: &str) -> ScanDecision {
        debug_assert!(self.compiled, "TypeManager used before compile()");

        if let Some(ext) = ext_of(base_name) {
            let included = match pack_ext(ext) {
                Some(packed) => self.small_exts.binary_search(&packed).is_ok(),
                None => self.long_exts.contains(ext),
            };
            if included {
                return if self.excluded_by_any_glob(base_name) {
                    ScanDecision::Skip
                } else {
                    ScanDecision::Scan
                };
            }
        }

        if self.include_names.contains(base_name) {
            return if self.excluded_by_any_glob(base_name) {
                ScanDecision::Skip
            } else {
                ScanDecision::Scan
            };
        }

        // Interleaved include/exclude globs: every pattern is consulted and
        // the last match wins.
        let mut verdict = None;
        for (pattern, include) in &self.ordered_globs {
            if pattern.matches(base_name) {
                verdict = Some(*include);
            }
        }
        match verdict {
            Some(true) => ScanDecision::Scan,
            Some(false) => ScanDecision::Skip,
            None if !self.first_line_regexes.is_empty() => ScanDecision::FirstLine,
            None => ScanDecision::Skip,
        }
    }

    /// True when some active type carries a first-line regex.
    pub fn has_first_line_filters(&self) -> bool {
        !self.first_line_regexes.is_empty()
    }

    /// Tests the first line of a file against the active first-line
    /// regexes.
    pub fn first_line_matches(&self, first_line: &[u8]) -> bool {
        self.first_line_regexes
            .iter()
            .any(|re| re.is_match(first_line))
    }

    /// Renders the known type table, for `--help-types`.
    pub fn describe_types(&self) -> String {
        let mut out = String::new();
        for (name, specs) in &self.all_types {
            if name == IGNORE_FILE_TYPE || name == INCLUDE_GLOB_TYPE {
                continue;
            }
            let mut extensions = Vec::new();
            let mut names = Vec::new();
            for spec in specs {
                if spec.starts_with('.') {
                    extensions.push(spec.as_str());
                } else if !spec.starts_with('/') {
                    names.push(spec.as_str());
                }
            }
            let _ = write!(out, "  {name:<15}{}", extensions.join(" "));
            if !extensions.is_empty() && !names.is_empty() {
                out.push_str("; ");
            }
            out.push_str(&names.join(" "));
            out.push('\n');
        }
        out
    }
}
