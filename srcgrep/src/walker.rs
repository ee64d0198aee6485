//! Concurrent directory traversal.
//!
//! A pool of directory workers shares one work queue. Each worker pulls a
//! directory, lists it, filters the entries, pushes accepted subdirectories
//! back onto the queue and batches accepted files out to the scanner stage.
//! A shared `(device, inode)` set guarantees every directory is descended
//! at most once, even through symlink cycles and hard links.

use dashmap::DashSet;
use std::fs::{self, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::SearchConfig;
use crate::errors::{SearchError, SearchResult};
use crate::filters::DirFilter;
use crate::queue::{DirQueue, DirQueueHandle, DirTask, StageSender, WorkGuard};
use crate::types::{ScanDecision, TypeManager};
use crate::PROGRAM_NAME;

/// How long a worker waits on the queue before re-checking the completion
/// barrier.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Accepted files are buffered per worker and flushed in batches to cut
/// contention on the output channel.
const FILE_BATCH_SIZE: usize = 64;

/// Bytes read when probing a file's first line for a first-line type
/// filter.
const FIRST_LINE_PROBE_LEN: usize = 512;

/// The `(device, inode)` pair identifying a filesystem object; equality on
/// this pair defines the "already visited" set.
pub type DeviceInodePair = (u64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// Handle describing one filesystem entity, produced by the traverser and
/// consumed by exactly one scanner worker.
#[derive(Debug)]
pub struct FileIdentity {
    pub path: PathBuf,
    /// Base name, used by the name filters.
    pub name: String,
    pub kind: FileKind,
    pub dev: u64,
    pub ino: u64,
    /// Size when a stat was already paid for; `None` otherwise.
    pub size: Option<u64>,
}

/// Traversal telemetry. Each worker accumulates its own copy; the totals
/// are summed once at shutdown.
#[derive(Debug, Default, Clone)]
pub struct WalkStats {
    pub dirs_found: u64,
    pub dirs_rejected: u64,
    pub dotdirs_found: u64,
    pub dotdirs_rejected: u64,
    pub files_found: u64,
    pub files_rejected: u64,
    /// Files handed to the scanner stage.
    pub files_scanned: u64,
    /// Extra stat/open calls the filesystem forced on us.
    pub stats_required: u64,
    /// Entries whose kind came straight from the directory listing.
    pub stats_avoided: u64,
    /// First-line probes performed for first-line type filters.
    pub first_line_probes: u64,
    pub walk_errors: u64,
}

impl WalkStats {
    pub fn merge(&mut self, other: &WalkStats) {
        self.dirs_found += other.dirs_found;
        self.dirs_rejected += other.dirs_rejected;
        self.dotdirs_found += other.dotdirs_found;
        self.dotdirs_rejected += other.dotdirs_rejected;
        self.files_found += other.files_found;
        self.files_rejected += other.files_rejected;
        self.files_scanned += other.files_scanned;
        self.stats_required += other.stats_required;
        self.stats_avoided += other.stats_avoided;
        self.first_line_probes += other.first_line_probes;
        self.walk_errors += other.walk_errors;
    }
}

#[cfg(unix)]
fn dev_inode(meta: &Metadata, _path: &Path) -> DeviceInodePair {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn dev_inode(_meta: &Metadata, path: &Path) -> DeviceInodePair {
    // No inode numbers; fall back to a stable hash of the path so the
    // visited set still deduplicates repeated roots.
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (0, hasher.finish())
}

/// The concurrent traverser. Walks the root paths with `dir_jobs` workers
/// and emits accepted [`FileIdentity`] records on the file channel.
pub struct Traverser {
    recurse: bool,
    follow_symlinks: bool,
    dir_jobs: usize,
    dir_filter: Arc<DirFilter>,
    types: Arc<TypeManager>,
}

/// Running traversal; join to collect the summed statistics.
pub struct TraverserHandle {
    workers: Vec<JoinHandle<WalkStats>>,
    seed_stats: WalkStats,
}

impl TraverserHandle {
    pub fn join(self) -> WalkStats {
        let mut stats = self.seed_stats;
        for worker in self.workers {
            match worker.join() {
                Ok(worker_stats) => stats.merge(&worker_stats),
                Err(_) => {
                    eprintln!("{PROGRAM_NAME}: a traversal worker panicked");
                    stats.walk_errors += 1;
                }
            }
        }
        info!(
            dirs = stats.dirs_found,
            files = stats.files_found,
            scanned = stats.files_scanned,
            "traversal complete"
        );
        stats
    }
}

impl Traverser {
    pub fn new(
        config: &SearchConfig,
        dir_filter: Arc<DirFilter>,
        types: Arc<TypeManager>,
    ) -> Self {
        Self {
            recurse: config.recurse,
            follow_symlinks: config.follow_symlinks,
            dir_jobs: config.dir_jobs.get(),
            dir_filter,
            types,
        }
    }

    /// Seeds the work queue from `roots` and launches the worker pool.
    ///
    /// Root paths that cannot be stat-ed are setup errors and fail the
    /// whole run, unlike per-entry errors encountered during the walk.
    /// The file channel closes once every worker has drained its share of
    /// the queue and dropped its sender.
    pub fn start(
        &self,
        roots: &[PathBuf],
        file_tx: StageSender<FileIdentity>,
    ) -> SearchResult<TraverserHandle> {
        let queue = DirQueue::new();
        let visited: Arc<DashSet<DeviceInodePair>> = Arc::new(DashSet::new());
        let mut seed_stats = WalkStats::default();

        for root in roots {
            let meta = fs::metadata(root).map_err(|e| SearchError::file_io(root, e))?;
            seed_stats.stats_required += 1;
            if meta.is_dir() {
                seed_stats.dirs_found += 1;
                if visited.insert(dev_inode(&meta, root)) {
                    queue.push(DirTask { path: root.clone() });
                } else {
                    seed_stats.dirs_rejected += 1;
                }
            } else if meta.is_file() {
                // A file named on the command line is scanned
                // unconditionally; name filters only apply to walked
                // entries.
                seed_stats.files_found += 1;
                seed_stats.files_scanned += 1;
                let (dev, ino) = dev_inode(&meta, root);
                file_tx.send(FileIdentity {
                    path: root.clone(),
                    name: base_name(root),
                    kind: FileKind::File,
                    dev,
                    ino,
                    size: Some(meta.len()),
                });
            }
        }

        info!(workers = self.dir_jobs, roots = roots.len(), "starting traversal");

        let mut workers = Vec::with_capacity(self.dir_jobs);
        for id in 0..self.dir_jobs {
            let worker = DirWorker {
                id,
                recurse: self.recurse,
                follow_symlinks: self.follow_symlinks,
                dir_filter: Arc::clone(&self.dir_filter),
                types: Arc::clone(&self.types),
                visited: Arc::clone(&visited),
                queue: queue.handle(),
                file_tx: file_tx.clone(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("walk-{id}"))
                .spawn(move || worker.run())?;
            workers.push(handle);
        }
        // Workers now own the only long-lived senders; dropping ours makes
        // worker-exit the close signal for the scanner stage.
        drop(file_tx);

        Ok(TraverserHandle {
            workers,
            seed_stats,
        })
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

struct DirWorker {
    id: usize,
    recurse: bool,
    follow_symlinks: bool,
    dir_filter: Arc<DirFilter>,
    types: Arc<TypeManager>,
    visited: Arc<DashSet<DeviceInodePair>>,
    queue: DirQueueHandle,
    file_tx: StageSender<FileIdentity>,
}

impl DirWorker {
    fn run(self) -> WalkStats {
        let mut stats = WalkStats::default();
        let mut batch: Vec<FileIdentity> = Vec::with_capacity(FILE_BATCH_SIZE);

        loop {
            match self.queue.recv_timeout(QUEUE_POLL_INTERVAL) {
                Some(task) => {
                    let _guard = WorkGuard::new(&self.queue);
                    self.process_directory(&task, &mut stats, &mut batch);
                    self.flush(&mut batch);
                }
                None => {
                    if self.queue.is_complete() {
                        break;
                    }
                }
            }
        }

        debug!(
            worker = self.id,
            dirs = stats.dirs_found,
            files = stats.files_found,
            "walk worker finished"
        );
        stats
    }

    fn process_directory(&self, task: &DirTask, stats: &mut WalkStats, batch: &mut Vec<FileIdentity>) {
        trace!(worker = self.id, path = %task.path.display(), "listing directory");

        let entries = match fs::read_dir(&task.path) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("{PROGRAM_NAME}: {}: {e}", task.path.display());
                stats.walk_errors += 1;
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    eprintln!("{PROGRAM_NAME}: {}: {e}", task.path.display());
                    stats.walk_errors += 1;
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            // Most filesystems report the entry kind in the listing
            // itself; only fall back to a stat when they don't.
            let file_type = match entry.file_type() {
                Ok(ft) => {
                    stats.stats_avoided += 1;
                    ft
                }
                Err(_) => {
                    stats.stats_required += 1;
                    match fs::symlink_metadata(&path) {
                        Ok(meta) => meta.file_type(),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "cannot determine entry kind");
                            stats.walk_errors += 1;
                            continue;
                        }
                    }
                }
            };

            if file_type.is_symlink() {
                self.handle_symlink(&path, name, stats, batch);
            } else if file_type.is_dir() {
                self.handle_dir(&path, &name, None, stats);
            } else if file_type.is_file() {
                self.handle_file(path, name, None, stats, batch);
            }
            // Sockets, fifos, devices: ignored.
        }
    }

    fn handle_symlink(
        &self,
        path: &Path,
        name: String,
        stats: &mut WalkStats,
        batch: &mut Vec<FileIdentity>,
    ) {
        if !self.follow_symlinks {
            stats.files_found += 1;
            stats.files_rejected += 1;
            return;
        }

        // Resolve the target; dangling links are skipped, not fatal.
        stats.stats_required += 1;
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "dangling symlink");
                stats.walk_errors += 1;
                return;
            }
        };

        if meta.is_dir() {
            self.handle_dir(path, &name, Some(&meta), stats);
        } else if meta.is_file() {
            self.handle_file(path.to_path_buf(), name, Some(&meta), stats, batch);
        }
    }

    fn handle_dir(&self, path: &Path, name: &str, meta: Option<&Metadata>, stats: &mut WalkStats) {
        let dot = name.starts_with('.');
        stats.dirs_found += 1;
        if dot {
            stats.dotdirs_found += 1;
        }

        if !self.recurse || self.dir_filter.should_exclude(name) {
            stats.dirs_rejected += 1;
            if dot {
                stats.dotdirs_rejected += 1;
            }
            return;
        }

        // Directories always pay a stat: the visited set needs (dev, ino).
        let owned_meta;
        let meta = match meta {
            Some(meta) => meta,
            None => {
                stats.stats_required += 1;
                match fs::symlink_metadata(path) {
                    Ok(m) => {
                        owned_meta = m;
                        &owned_meta
                    }
                    Err(e) => {
                        eprintln!("{PROGRAM_NAME}: {}: {e}", path.display());
                        stats.walk_errors += 1;
                        return;
                    }
                }
            }
        };

        if self.visited.insert(dev_inode(meta, path)) {
            self.queue.push(DirTask {
                path: path.to_path_buf(),
            });
        } else {
            // Already visited through another link; cycle guard.
            trace!(path = %path.display(), "directory already visited");
            stats.dirs_rejected += 1;
        }
    }

    fn handle_file(
        &self,
        path: PathBuf,
        name: String,
        meta: Option<&Metadata>,
        stats: &mut WalkStats,
        batch: &mut Vec<FileIdentity>,
    ) {
        stats.files_found += 1;

        let accepted = match self.types.should_scan(&name) {
            ScanDecision::Scan => true,
            ScanDecision::Skip => false,
            ScanDecision::FirstLine => {
                stats.first_line_probes += 1;
                match read_first_line(&path) {
                    Ok(line) => self.types.first_line_matches(&line),
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "first-line probe failed");
                        stats.walk_errors += 1;
                        false
                    }
                }
            }
        };

        if !accepted {
            stats.files_rejected += 1;
            return;
        }

        let (dev, ino, size) = match meta {
            Some(meta) => {
                let (dev, ino) = dev_inode(meta, &path);
                (dev, ino, Some(meta.len()))
            }
            None => (0, 0, None),
        };

        stats.files_scanned += 1;
        batch.push(FileIdentity {
            path,
            name,
            kind: FileKind::File,
            dev,
            ino,
            size,
        });
        if batch.len() >= FILE_BATCH_SIZE {
            self.flush(batch);
        }
    }

    fn flush(&self, batch: &mut Vec<FileIdentity>) {
        for identity in batch.drain(..) {
            if !self.file_tx.send(identity) {
                // Scanner stage is gone; the run is tearing down.
                return;
            }
        }
    }
}

/// Reads the first line (up to a fixed probe length) of a file.
fn read_first_line(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut buf = [0u8; FIRST_LINE_PROBE_LEN];
    let mut filled = 0;
    // Short reads are possible; keep going until the buffer is full or EOF.
    loop {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    let line_end = memchr::memchr(b'\n', &buf[..filled]).unwrap_or(filled);
    Ok(buf[..line_end].to_vec())
}
