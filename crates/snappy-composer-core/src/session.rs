use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::compress::{Compressor, SnappyCompressor};
use crate::config::WatchConfig;
use crate::delete_queue::{DeleteQueue, DeleteStats};
use crate::error::Error;
use crate::pattern::FilePattern;
use crate::pool::{PoolStats, WorkerPool};
use crate::progress::{SilentReporter, WatchReporter};
use crate::scanner::{self, SetKey};
use crate::task::TaskContext;

/// Sleep granularity while waiting for the next poll.
const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Sets seen during this session. Owned by the control thread only.
#[derive(Debug, Default)]
pub struct ProcessingRegistry {
    processed: HashSet<SetKey>,
    incomplete: HashSet<SetKey>,
}

impl ProcessingRegistry {
    pub fn is_processed(&self, key: &SetKey) -> bool {
        self.processed.contains(key)
    }

    pub fn mark_processed(&mut self, key: SetKey) {
        self.incomplete.remove(&key);
        self.processed.insert(key);
    }

    /// Returns true the first time `key` is seen incomplete.
    pub fn mark_incomplete(&mut self, key: SetKey) -> bool {
        self.incomplete.insert(key)
    }

    pub fn is_incomplete(&self, key: &SetKey) -> bool {
        self.incomplete.contains(key)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn incomplete_count(&self) -> usize {
        self.incomplete.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Scanning,
    Dispatching,
    Waiting,
    Stopping,
    Stopped,
}

/// Cloneable flag that asks a running session to stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one scan/dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub sets_found: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub incomplete: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub sets_dispatched: usize,
    pub sets_skipped: usize,
    pub tasks: PoolStats,
    pub deletions: DeleteStats,
}

/// One watch over a directory: the registry, the worker pool and the delete
/// queue all live here and are torn down together.
pub struct WatchSession {
    config: WatchConfig,
    pattern: FilePattern,
    extension: String,
    registry: ProcessingRegistry,
    reporter: Arc<dyn WatchReporter>,
    pool: Option<WorkerPool>,
    delete_queue: Option<DeleteQueue>,
    stop: StopHandle,
    state: SessionState,
    summary: SessionSummary,
}

impl WatchSession {
    pub fn new(config: WatchConfig) -> Result<Self, Error> {
        Self::with_parts(config, Arc::new(SnappyCompressor), Arc::new(SilentReporter))
    }

    /// Fails if the configuration is invalid or the output directory cannot be created.
    pub fn with_parts(
        config: WatchConfig,
        compressor: Arc<dyn Compressor>,
        reporter: Arc<dyn WatchReporter>,
    ) -> Result<Self, Error> {
        let pattern = config.validate()?;

        info!("Starting directory monitor on: {}", config.watch_dir.display());
        info!("Output directory: {}", config.output_dir.display());
        info!("File pattern: {}", pattern.template());
        info!("Set size: {} files", config.set_size);
        info!("Poll interval: {} seconds", config.poll_interval_secs);
        info!("Max tasks: {}", config.max_tasks);

        fs::create_dir_all(&config.output_dir).map_err(|e| {
            error!(
                "Error creating output directory {}: {}",
                config.output_dir.display(),
                e
            );
            e
        })?;

        let delete_queue = DeleteQueue::start()?;
        let extension = compressor.extension().to_string();
        let ctx = TaskContext {
            output_dir: config.output_dir.clone(),
            compressor,
            delete: config.delete_after.then(|| delete_queue.sender()),
            reporter: Arc::clone(&reporter),
        };
        let pool = WorkerPool::start(config.max_tasks, ctx)?;

        Ok(Self {
            config,
            pattern,
            extension,
            registry: ProcessingRegistry::default(),
            reporter,
            pool: Some(pool),
            delete_queue: Some(delete_queue),
            stop: StopHandle::default(),
            state: SessionState::Scanning,
            summary: SessionSummary::default(),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn registry(&self) -> &ProcessingRegistry {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// One scan of the watch directory, dispatching every new complete set.
    pub fn run_once(&mut self) -> ScanReport {
        let mut report = ScanReport::default();

        self.set_state(SessionState::Scanning);
        info!("Scanning directory: {}", self.config.watch_dir.display());
        let sets = match scanner::scan_and_group(
            &self.config.watch_dir,
            &self.pattern,
            self.config.set_size,
        ) {
            Ok(sets) => sets,
            Err(e) => {
                error!("Error scanning directory: {}", e);
                Vec::new()
            }
        };
        report.sets_found = sets.len();
        info!("Found {} file sets", sets.len());
        self.reporter.on_scan(sets.len());

        self.set_state(SessionState::Dispatching);
        for set in sets {
            let key = set.key();
            if self.registry.is_processed(&key) {
                continue;
            }

            if !set.is_complete(self.config.set_size) {
                let found = set.files.len();
                if self.registry.mark_incomplete(key) {
                    debug!(run = key.run, set_start = key.set_start, "New incomplete set");
                }
                info!(
                    "Set incomplete: run {}, set {} ({}/{} files)",
                    key.run, key.set_start, found, self.config.set_size
                );
                self.reporter
                    .on_set_incomplete(key, found, self.config.set_size);
                report.incomplete += 1;
                continue;
            }

            let Some(output_path) = set.output_path(&self.config.output_dir, &self.extension)
            else {
                error!(
                    "Set run {}, set {} is complete but has no first file",
                    key.run, key.set_start
                );
                continue;
            };

            if output_path.exists() {
                info!(
                    "Set already processed: run {}, set {}",
                    key.run, key.set_start
                );
                self.registry.mark_processed(key);
                self.reporter.on_set_skipped(key);
                report.skipped += 1;
                continue;
            }

            let Some(pool) = &self.pool else {
                break;
            };
            info!(
                "Starting processing of set: run {}, set {}",
                key.run, key.set_start
            );
            let files = set.files.len();
            // Marked before completion: a set is never dispatched twice,
            // even if its task later fails.
            self.registry.mark_processed(key);
            if pool.dispatch(set) {
                self.reporter.on_set_dispatched(key, files);
                report.dispatched += 1;
            } else {
                error!(
                    "Worker pool is closed, set run {}, set {} not dispatched",
                    key.run, key.set_start
                );
            }
        }

        if let Some(pool) = &self.pool {
            debug!("{} sets in flight", pool.in_flight());
        }
        if let Some(queue) = &self.delete_queue {
            let depth = queue.depth();
            info!(queue_depth = depth, "Delete queue size: {}", depth);
        }

        self.summary.sets_dispatched += report.dispatched;
        self.summary.sets_skipped += report.skipped;
        report
    }

    /// Poll until the stop handle is raised, then drain and shut down.
    pub fn run(mut self) -> SessionSummary {
        while !self.stop.is_stopped() {
            self.run_once();

            self.set_state(SessionState::Waiting);
            let mut waited = Duration::ZERO;
            while waited < self.config.poll_interval() && !self.stop.is_stopped() {
                let step = STOP_CHECK_INTERVAL.min(self.config.poll_interval() - waited);
                thread::sleep(step);
                waited += step;
            }
        }
        self.shutdown()
    }

    /// Wait for in-flight sets, then for the delete queue backlog.
    pub fn shutdown(mut self) -> SessionSummary {
        self.finish()
    }

    fn finish(&mut self) -> SessionSummary {
        self.set_state(SessionState::Stopping);

        if let Some(pool) = self.pool.take() {
            info!("Waiting for remaining tasks to complete...");
            self.summary.tasks = pool.join();
        }
        if let Some(queue) = self.delete_queue.take() {
            info!("Waiting for delete queue to finish...");
            self.summary.deletions = queue.shutdown();
        }

        self.set_state(SessionState::Stopped);
        info!("Monitor stopped.");
        self.summary.clone()
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped {
            self.finish();
        }
    }
}
