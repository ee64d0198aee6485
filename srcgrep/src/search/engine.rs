//! Pipeline orchestration.
//!
//! `search_with` wires the three stages together: traversal workers feed
//! the file channel, scanner workers feed the group channel, and the
//! calling thread plays output collector, draining groups in arrival
//! order. Both channels are bounded, so a slow stage back-pressures its
//! producers instead of buffering without limit.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::errors::SearchResult;
use crate::filters::DirFilter;
use crate::queue::stage;
use crate::results::MatchGroup;
use crate::search::matcher::{PatternMatcher, PatternSpec};
use crate::search::processor::{spawn_scanners, ScanStats};
use crate::types::TypeManager;
use crate::walker::{FileIdentity, Traverser, WalkStats};
use crate::PROGRAM_NAME;

/// Capacity of the traverser → scanner channel.
const FILE_QUEUE_CAP: usize = 1024;
/// Capacity of the scanner → collector channel.
const GROUP_QUEUE_CAP: usize = 256;

/// End-of-run accounting across all three stages.
#[derive(Debug, Default, Clone)]
pub struct SearchSummary {
    pub files_with_matches: usize,
    pub matched_lines: usize,
    /// Total highlight spans (several per line are possible).
    pub total_matches: usize,
    pub walk: WalkStats,
    pub scan: ScanStats,
    pub elapsed: Duration,
}

impl SearchSummary {
    pub fn any_matches(&self) -> bool {
        self.files_with_matches > 0
    }
}

/// Builds the directory filter from the config.
fn build_dir_filter(config: &SearchConfig) -> DirFilter {
    let mut filter = DirFilter::new();
    filter.add_exclusions(config.ignore_dirs.iter().cloned());
    filter.compile();
    filter
}

/// Builds and compiles the type manager from the config's type options.
fn build_type_manager(config: &SearchConfig) -> SearchResult<TypeManager> {
    let mut types = TypeManager::new();
    for spec in &config.type_sets {
        types.add_spec(spec, true)?;
    }
    for spec in &config.type_adds {
        types.add_spec(spec, false)?;
    }
    for name in &config.type_dels {
        types.delete(name);
    }
    for name in &config.types {
        types.enable(name)?;
    }
    for name in &config.no_types {
        types.disable(name)?;
    }
    for glob in &config.includes {
        types.add_anonymous_include(glob)?;
    }
    for glob in &config.excludes {
        types.add_exclude_glob(glob)?;
    }
    for spec in &config.ignore_files {
        types.add_anonymous_ignore(spec)?;
    }
    types.compile()?;
    Ok(types)
}

/// Runs a search, handing each finished [`MatchGroup`] to `sink` on the
/// calling thread. Groups arrive in the order their scans complete; the
/// matches inside each group are line-ascending.
///
/// All configuration and pattern errors surface here, before any worker
/// thread is launched. Per-file I/O errors during the run are reported to
/// stderr and skipped.
pub fn search_with<F>(config: &SearchConfig, mut sink: F) -> SearchResult<SearchSummary>
where
    F: FnMut(MatchGroup),
{
    let started = Instant::now();

    if config.pattern.is_empty() {
        debug!("no search pattern provided, returning empty result");
        return Ok(SearchSummary::default());
    }

    info!(pattern = %config.pattern, paths = config.paths.len(), "starting search");

    // Everything that can fail at configuration time happens before the
    // first thread starts.
    let spec = PatternSpec {
        pattern: config.pattern.clone(),
        ignore_case: config.ignore_case,
        word_regexp: config.word_regexp,
        literal: config.literal,
    };
    let matcher = Arc::new(PatternMatcher::new(&spec, config.regex_engine)?);
    let dir_filter = Arc::new(build_dir_filter(config));
    let types = Arc::new(build_type_manager(config)?);

    // Seeding pushes explicit file roots straight into the file channel,
    // so leave room for them even before the scanners start draining.
    let file_cap = FILE_QUEUE_CAP.max(config.paths.len() + 1);
    let (file_tx, file_rx) = stage::<FileIdentity>(file_cap);
    let (group_tx, group_rx) = stage::<MatchGroup>(GROUP_QUEUE_CAP);

    let traverser = Traverser::new(config, dir_filter, Arc::clone(&types));
    let walk_handle = traverser.start(&config.paths, file_tx)?;

    let scanners = spawn_scanners(
        config.jobs.get(),
        Arc::clone(&matcher),
        file_rx,
        group_tx,
    )?;

    // Single consumer: groups print contiguously by construction.
    let mut summary = SearchSummary::default();
    while let Some(group) = group_rx.recv() {
        summary.files_with_matches += 1;
        summary.matched_lines += group.matched_lines();
        summary.total_matches += group.total_spans();
        sink(group);
    }

    for scanner in scanners {
        match scanner.join() {
            Ok(stats) => summary.scan.merge(&stats),
            Err(_) => eprintln!("{PROGRAM_NAME}: a scanner worker panicked"),
        }
    }
    summary.walk = walk_handle.join();
    summary.elapsed = started.elapsed();

    info!(
        files = summary.walk.files_scanned,
        matched = summary.files_with_matches,
        lines = summary.matched_lines,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "search complete"
    );

    Ok(summary)
}

/// Convenience wrapper that buffers every group. Handy for tests and for
/// callers that need the result set in memory.
pub fn search(config: &SearchConfig) -> SearchResult<(Vec<MatchGroup>, SearchSummary)> {
    let mut groups = Vec::new();
    let summary = search_with(config, |group| groups.push(group))?;
    Ok((groups, summary))
}
