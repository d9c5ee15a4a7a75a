use std::path::Path;
use std::time::Duration;

use crate::scanner::SetKey;

/// Trait for observing a watch session.
///
/// The CLI implements it to print per-set outcomes. Worker threads call the
/// set methods, so implementations must be thread safe. All methods have
/// default no-op implementations.
pub trait WatchReporter: Send + Sync {
    fn on_scan(&self, _sets_found: usize) {}
    fn on_set_dispatched(&self, _key: SetKey, _files: usize) {}
    fn on_set_skipped(&self, _key: SetKey) {}
    fn on_set_incomplete(&self, _key: SetKey, _found: usize, _expected: u32) {}
    fn on_set_archived(&self, _key: SetKey, _artifact: &Path, _elapsed: Duration) {}
    fn on_set_failed(&self, _key: SetKey, _error: &str) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl WatchReporter for SilentReporter {}
