//! Channel plumbing between the pipeline stages.
//!
//! Two flavors:
//!
//! - [`stage`] builds a bounded inter-stage channel whose close signal is
//!   sender-drop: once every producer has released its [`StageSender`],
//!   `recv` on the drained channel returns `None`. Closing is therefore
//!   monotonic and idempotent, and a full channel blocks producers
//!   (back-pressure).
//! - [`DirQueue`] is the traversal work queue. Directory workers both
//!   consume from and produce into it, so sender-drop cannot signal
//!   completion; instead an active-worker count forms the termination
//!   barrier: the walk is complete only when the queue is empty *and* no
//!   worker is mid-directory.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sending half of a bounded inter-stage channel.
pub struct StageSender<T> {
    sender: Sender<T>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> StageSender<T> {
    /// Blocking push. Returns `false` if the consumers are gone, which
    /// only happens when the run is being torn down.
    pub fn send(&self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }
}

/// Receiving half of a bounded inter-stage channel.
pub struct StageReceiver<T> {
    receiver: Receiver<T>,
}

impl<T> Clone for StageReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> StageReceiver<T> {
    /// Blocking pop. `None` means closed-and-empty: every producer has
    /// finished and the backlog is drained.
    pub fn recv(&self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

/// Creates a bounded stage channel with the given capacity.
pub fn stage<T>(capacity: usize) -> (StageSender<T>, StageReceiver<T>) {
    let (sender, receiver) = bounded(capacity);
    (StageSender { sender }, StageReceiver { receiver })
}

/// One directory to list.
#[derive(Debug)]
pub struct DirTask {
    pub path: PathBuf,
}

/// Counters for the traversal work queue.
#[derive(Debug, Default)]
pub struct DirQueueStats {
    pub enqueued: AtomicU64,
    pub dequeued: AtomicU64,
}

/// The traversal work queue shared by all directory workers.
pub struct DirQueue {
    sender: Sender<DirTask>,
    receiver: Receiver<DirTask>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<DirQueueStats>,
}

impl DirQueue {
    /// The queue is unbounded: its producers are also its consumers, so a
    /// blocking bounded push could deadlock the whole pool. Back-pressure
    /// lives on the inter-stage channels instead.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            active_workers: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(DirQueueStats::default()),
        }
    }

    pub fn push(&self, task: DirTask) {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        // Send on an unbounded channel we hold a receiver for cannot fail.
        let _ = self.sender.send(task);
    }

    /// Creates a worker handle (one per directory worker thread).
    pub fn handle(&self) -> DirQueueHandle {
        DirQueueHandle {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            active_workers: Arc::clone(&self.active_workers),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn stats(&self) -> Arc<DirQueueStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for DirQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-worker handle to the traversal queue.
#[derive(Clone)]
pub struct DirQueueHandle {
    sender: Sender<DirTask>,
    receiver: Receiver<DirTask>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<DirQueueStats>,
}

impl DirQueueHandle {
    /// Polls for the next directory. Workers use a short timeout so they
    /// can periodically re-check the completion barrier.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DirTask> {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(task)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn push(&self, task: DirTask) {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(task);
    }

    /// The termination barrier. Emptiness alone is not enough: a worker
    /// still listing a directory may be about to push children.
    pub fn is_complete(&self) -> bool {
        self.receiver.is_empty() && self.active_workers.load(Ordering::SeqCst) == 0
    }

    fn begin_work(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn end_work(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard holding a worker's slot in the active count while it
/// processes one directory.
pub struct WorkGuard<'a> {
    handle: &'a DirQueueHandle,
}

impl<'a> WorkGuard<'a> {
    pub fn new(handle: &'a DirQueueHandle) -> Self {
        handle.begin_work();
        Self { handle }
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        self.handle.end_work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_close_on_sender_drop() {
        let (tx, rx) = stage::<u32>(4);
        let tx2 = tx.clone();
        assert!(tx.send(1));
        assert!(tx2.send(2));
        drop(tx);
        drop(tx2);

        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), Some(2));
        // Closed and empty.
        assert_eq!(rx.recv(), None);
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn test_stage_backpressure_blocks() {
        let (tx, rx) = stage::<u32>(1);
        assert!(tx.send(1));

        let handle = std::thread::spawn(move || {
            // This send blocks until the consumer drains the slot.
            tx.send(2)
        });
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(rx.recv(), Some(1));
        assert!(handle.join().unwrap());
        assert_eq!(rx.recv(), Some(2));
    }

    #[test]
    fn test_dir_queue_completion_barrier() {
        let queue = DirQueue::new();
        let handle = queue.handle();

        // Empty queue, no active workers: complete.
        assert!(handle.is_complete());

        queue.push(DirTask {
            path: PathBuf::from("/a"),
        });
        assert!(!handle.is_complete());

        let task = handle.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(task.path, PathBuf::from("/a"));

        {
            let _guard = WorkGuard::new(&handle);
            // Queue drained but a worker is mid-directory: not complete.
            assert!(!handle.is_complete());
        }
        assert!(handle.is_complete());
    }

    #[test]
    fn test_dir_queue_stats() {
        let queue = DirQueue::new();
        let handle = queue.handle();
        queue.push(DirTask {
            path: PathBuf::from("/a"),
        });
        handle.push(DirTask {
            path: PathBuf::from("/b"),
        });
        handle.recv_timeout(Duration::from_millis(10)).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.dequeued.load(Ordering::Relaxed), 1);
    }
}
