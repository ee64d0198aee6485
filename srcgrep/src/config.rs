use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// When to style output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    /// Style unless the `NO_COLOR` environment variable is set.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    /// Resolves the choice against the environment. `NO_COLOR` disables
    /// styling regardless of the configured value.
    pub fn enabled(self) -> bool {
        if std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        !matches!(self, ColorChoice::Never)
    }
}

/// Which regex backend compiles the pattern. The core only talks to the
/// abstract matcher, so adding a backend means adding a variant here and a
/// constructor in `search::matcher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexEngine {
    #[default]
    Default,
}

impl FromStr for RegexEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "regex" => Ok(RegexEngine::Default),
            other => Err(format!(
                "unknown regex engine '{other}' (available: default)"
            )),
        }
    }
}

/// Fully-populated options record consumed by the search engine.
///
/// The CLI builds one of these from command-line flags merged over an
/// optional YAML config file; tests construct them directly through the
/// builder methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// The search pattern (regex unless `literal` is set).
    #[serde(default)]
    pub pattern: String,

    /// Root paths to search. Directories are walked; files named here are
    /// scanned unconditionally.
    #[serde(default = "default_paths")]
    pub paths: Vec<PathBuf>,

    /// Case-insensitive matching.
    #[serde(default)]
    pub ignore_case: bool,

    /// Only match on word boundaries.
    #[serde(default)]
    pub word_regexp: bool,

    /// Treat the pattern as a literal string, not a regex.
    #[serde(default)]
    pub literal: bool,

    /// Descend into subdirectories.
    #[serde(default = "default_true")]
    pub recurse: bool,

    /// Follow symbolic links during traversal.
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Scanner worker count. Defaults to the logical CPU count.
    #[serde(default = "default_scan_jobs")]
    pub jobs: NonZeroUsize,

    /// Traversal worker count.
    #[serde(default = "default_dir_jobs")]
    pub dir_jobs: NonZeroUsize,

    /// `--type=NAME`: types to enable. The first one switches the type
    /// manager from its default allow-list to "only these types".
    #[serde(default)]
    pub types: Vec<String>,

    /// `--notype=NAME`: types to disable.
    #[serde(default)]
    pub no_types: Vec<String>,

    /// `--type-set=NAME:KIND:ARGS`: replace a type definition.
    #[serde(default)]
    pub type_sets: Vec<String>,

    /// `--type-add=NAME:KIND:ARGS`: extend a type definition.
    #[serde(default)]
    pub type_adds: Vec<String>,

    /// `--type-del=NAME`: remove a type entirely.
    #[serde(default)]
    pub type_dels: Vec<String>,

    /// `--include=GLOB`: scan only files matching these globs.
    #[serde(default)]
    pub includes: Vec<String>,

    /// `--exclude=GLOB`: never scan files matching these globs.
    #[serde(default)]
    pub excludes: Vec<String>,

    /// `--ignore-file=KIND:ARGS`: filter specs for files to ignore.
    #[serde(default)]
    pub ignore_files: Vec<String>,

    /// `--ignore-dir=NAME`: extra directory base names to prune.
    #[serde(default)]
    pub ignore_dirs: Vec<String>,

    #[serde(default)]
    pub color: ColorChoice,

    #[serde(default)]
    pub regex_engine: RegexEngine,
}

fn default_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_true() -> bool {
    true
}

fn default_scan_jobs() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::new(1).unwrap())
}

fn default_dir_jobs() -> NonZeroUsize {
    NonZeroUsize::new(4).unwrap()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            paths: default_paths(),
            ignore_case: false,
            word_regexp: false,
            literal: false,
            recurse: true,
            follow_symlinks: false,
            jobs: default_scan_jobs(),
            dir_jobs: default_dir_jobs(),
            types: Vec::new(),
            no_types: Vec::new(),
            type_sets: Vec::new(),
            type_adds: Vec::new(),
            type_dels: Vec::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
            ignore_files: Vec::new(),
            ignore_dirs: Vec::new(),
            color: ColorChoice::Auto,
            regex_engine: RegexEngine::Default,
        }
    }
}

impl SearchConfig {
    /// Creates a config for `pattern` rooted at `path` with all defaults.
    pub fn new(pattern: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            paths: vec![path.into()],
            ..Default::default()
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = NonZeroUsize::new(jobs.max(1)).unwrap();
        self
    }

    pub fn with_dir_jobs(mut self, jobs: usize) -> Self {
        self.dir_jobs = NonZeroUsize::new(jobs.max(1)).unwrap();
        self
    }

    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    pub fn with_ignore_case(mut self, yes: bool) -> Self {
        self.ignore_case = yes;
        self
    }

    pub fn with_word_regexp(mut self, yes: bool) -> Self {
        self.word_regexp = yes;
        self
    }

    pub fn with_literal(mut self, yes: bool) -> Self {
        self.literal = yes;
        self
    }

    pub fn with_follow_symlinks(mut self, yes: bool) -> Self {
        self.follow_symlinks = yes;
        self
    }

    /// Loads configuration from the default locations.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    ///
    /// Lookup order (later sources win): global
    /// `$XDG_CONFIG_HOME/srcgrep/config.yaml`, local `.srcgrep.yaml`,
    /// then the explicit `config_path`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("srcgrep/config.yaml")),
            Some(PathBuf::from(".srcgrep.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments over config-file values. CLI values win
    /// wherever they differ from the defaults.
    pub fn merge_with_cli(mut self, cli: SearchConfig) -> Self {
        if !cli.pattern.is_empty() {
            self.pattern = cli.pattern;
        }
        if cli.paths != default_paths() {
            self.paths = cli.paths;
        }
        self.ignore_case |= cli.ignore_case;
        self.word_regexp |= cli.word_regexp;
        self.literal |= cli.literal;
        if !cli.recurse {
            self.recurse = false;
        }
        self.follow_symlinks |= cli.follow_symlinks;
        if cli.jobs != default_scan_jobs() {
            self.jobs = cli.jobs;
        }
        if cli.dir_jobs != default_dir_jobs() {
            self.dir_jobs = cli.dir_jobs;
        }
        if !cli.types.is_empty() {
            self.types = cli.types;
        }
        if !cli.no_types.is_empty() {
            self.no_types = cli.no_types;
        }
        if !cli.type_sets.is_empty() {
            self.type_sets = cli.type_sets;
        }
        if !cli.type_adds.is_empty() {
            self.type_adds = cli.type_adds;
        }
        if !cli.type_dels.is_empty() {
            self.type_dels = cli.type_dels;
        }
        if !cli.includes.is_empty() {
            self.includes = cli.includes;
        }
        if !cli.excludes.is_empty() {
            self.excludes = cli.excludes;
        }
        if !cli.ignore_files.is_empty() {
            self.ignore_files = cli.ignore_files;
        }
        if !cli.ignore_dirs.is_empty() {
            self.ignore_dirs = cli.ignore_dirs;
        }
        if cli.color != ColorChoice::Auto {
            self.color = cli.color;
        }
        self.regex_engine = cli.regex_engine;
        self
    }
}
