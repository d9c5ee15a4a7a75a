use crossbeam_channel::Sender;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use crate::scanner::FileSet;
use crate::task::{self, TaskContext};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub succeeded: usize,
    pub failed: usize,
    /// Most sets ever in progress at the same time.
    pub peak_in_flight: usize,
}

/// Fixed set of worker threads fed through a rendezvous channel.
///
/// `dispatch` only returns once an idle worker has taken the set, so at most
/// `workers` sets are ever in progress and the caller is held back while the
/// pool is saturated.
pub struct WorkerPool {
    tx: Option<Sender<FileSet>>,
    handles: Vec<JoinHandle<PoolStats>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn start(workers: usize, ctx: TaskContext) -> io::Result<Self> {
        let worker_count = workers.max(1);
        let (tx, rx) = crossbeam_channel::bounded::<FileSet>(0);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_idx in 0..worker_count {
            let rx = rx.clone();
            let ctx = ctx.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);

            let handle = thread::Builder::new()
                .name(format!("set-worker-{worker_idx}"))
                .spawn(move || {
                    let mut stats = PoolStats::default();
                    for set in rx.iter() {
                        let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(running, Ordering::SeqCst);
                        let ok = panic::catch_unwind(AssertUnwindSafe(|| {
                            task::run_set(&ctx, &set)
                        }))
                        .unwrap_or_else(|_| {
                            error!(
                                run = set.run,
                                set_start = set.set_start,
                                "Worker panicked while processing set"
                            );
                            false
                        });
                        in_flight.fetch_sub(1, Ordering::SeqCst);

                        if ok {
                            stats.succeeded += 1;
                        } else {
                            stats.failed += 1;
                        }
                    }
                    debug!("set-worker-{} exiting", worker_idx);
                    stats
                })?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            handles,
            in_flight,
            peak,
        })
    }

    /// Hand `set` to the next idle worker, blocking while all are busy.
    pub fn dispatch(&self, set: FileSet) -> bool {
        match &self.tx {
            Some(tx) => tx.send(set).is_ok(),
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting sets and wait for the running ones to finish.
    pub fn join(mut self) -> PoolStats {
        self.join_workers()
    }

    fn join_workers(&mut self) -> PoolStats {
        // Workers leave their loop once the channel is closed.
        drop(self.tx.take());

        let mut total = PoolStats::default();
        for handle in self.handles.drain(..) {
            match handle.join() {
                Ok(stats) => {
                    total.succeeded += stats.succeeded;
                    total.failed += stats.failed;
                }
                Err(_) => error!("Set worker thread panicked"),
            }
        }
        total.peak_in_flight = self.peak.load(Ordering::SeqCst);
        total
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.join_workers();
        }
    }
}
