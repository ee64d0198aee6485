//! The scanning half of the pipeline: pattern compilation, the byte-level
//! fast paths, the scanner workers, and the stage orchestration.

pub mod bytescan;
pub mod engine;
pub mod matcher;
pub mod processor;

pub use engine::{search, search_with, SearchSummary};
pub use matcher::{PatternMatcher, PatternSpec};
pub use processor::scan_buffer;
