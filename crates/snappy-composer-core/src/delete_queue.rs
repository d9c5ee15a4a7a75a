//! Background removal of source files.
//!
//! Producers hand `DeleteTask`s to a single consumer thread over a channel so
//! that slow deletions never hold up archiving. Tasks run strictly in the
//! order they were enqueued. Closing the channel is the shutdown signal: the
//! consumer drains everything already accepted, then exits.

use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default)]
pub struct DeleteTask {
    pub files: BTreeSet<PathBuf>,
    /// Skipped when present in `files`.
    pub keep: Option<PathBuf>,
}

impl DeleteTask {
    pub fn new(files: BTreeSet<PathBuf>) -> Self {
        Self { files, keep: None }
    }

    pub fn keeping(files: BTreeSet<PathBuf>, keep: PathBuf) -> Self {
        Self {
            files,
            keep: Some(keep),
        }
    }
}

/// Outcome counts accumulated by the consumer thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteStats {
    pub tasks: usize,
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
    /// Ids returned by `enqueue`, in the order the tasks ran.
    pub completed: Vec<u64>,
}

/// Cloneable producer side, handed to worker threads.
#[derive(Debug, Clone)]
pub struct DeleteSender {
    tx: Sender<(u64, DeleteTask)>,
    next_id: Arc<AtomicU64>,
}

impl DeleteSender {
    /// Queue `task` and return immediately with its id, or `None` once the
    /// consumer is gone.
    pub fn enqueue(&self, task: DeleteTask) -> Option<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match self.tx.send((id, task)) {
            Ok(()) => Some(id),
            Err(err) => {
                error!(
                    "Delete queue is closed, dropping {} files",
                    err.into_inner().1.files.len()
                );
                None
            }
        }
    }
}

pub struct DeleteQueue {
    sender: DeleteSender,
    handle: JoinHandle<DeleteStats>,
}

impl DeleteQueue {
    pub fn start() -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<(u64, DeleteTask)>();
        let handle = thread::Builder::new()
            .name("delete-queue".to_string())
            .spawn(move || run_worker(rx))?;
        Ok(Self {
            sender: DeleteSender {
                tx,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            handle,
        })
    }

    pub fn sender(&self) -> DeleteSender {
        self.sender.clone()
    }

    pub fn enqueue(&self, task: DeleteTask) -> Option<u64> {
        self.sender.enqueue(task)
    }

    /// Tasks accepted but not yet picked up by the consumer.
    pub fn depth(&self) -> usize {
        self.sender.tx.len()
    }

    /// Close the queue and block until the backlog is drained.
    ///
    /// Every `DeleteSender` handed out must be dropped first, otherwise the
    /// channel stays open and this call waits for them.
    pub fn shutdown(self) -> DeleteStats {
        let DeleteQueue { sender, handle } = self;
        drop(sender);
        match handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                error!("Delete queue worker panicked");
                DeleteStats::default()
            }
        }
    }
}

fn run_worker(rx: Receiver<(u64, DeleteTask)>) -> DeleteStats {
    let mut stats = DeleteStats::default();

    for (id, task) in rx.iter() {
        execute(&task, &mut stats);
        stats.tasks += 1;
        stats.completed.push(id);
        debug!(task = id, queue_depth = rx.len(), "Delete task finished");
    }

    info!(
        "Delete queue drained: {} tasks, {} removed, {} kept, {} failed",
        stats.tasks, stats.removed, stats.kept, stats.failed
    );
    stats
}

fn execute(task: &DeleteTask, stats: &mut DeleteStats) {
    for path in &task.files {
        if task.keep.as_ref() == Some(path) {
            info!(
                "Keeping first file of set: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );
            stats.kept += 1;
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                stats.removed += 1;
            }
            Err(err) => {
                error!("Error removing file {}: {}", path.display(), err);
                stats.failed += 1;
            }
        }
    }
}
