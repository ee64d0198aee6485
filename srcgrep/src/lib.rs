//! Parallel, recursive, regex-based source code search.
//!
//! The engine is a three-stage pipeline over bounded channels: a pool of
//! directory workers walks the roots and filters candidates by file type,
//! a pool of scanner workers reads and matches file contents, and a single
//! collector drains finished per-file match groups. See
//! [`search::search_with`] for the entry point.

pub mod config;
pub mod errors;
pub mod filters;
pub mod output;
pub mod queue;
pub mod results;
pub mod search;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use config::{ColorChoice, RegexEngine, SearchConfig};
pub use errors::{SearchError, SearchResult};
pub use results::{Match, MatchGroup};
pub use search::{search, search_with, SearchSummary};

/// Program name used to prefix user-visible error messages.
pub const PROGRAM_NAME: &str = "srcgrep";
