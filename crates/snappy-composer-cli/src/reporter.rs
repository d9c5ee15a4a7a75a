use colored::*;
use std::path::Path;
use std::time::Duration;

use snappy_composer_core::scanner::SetKey;
use snappy_composer_core::WatchReporter;

/// Prints one line per finished set to stderr.
pub struct CliReporter;

impl WatchReporter for CliReporter {
    fn on_set_archived(&self, key: SetKey, artifact: &Path, elapsed: Duration) {
        eprintln!(
            "  {} run {} set {} -> {} ({} ms)",
            "✓".green(),
            key.run,
            key.set_start,
            artifact
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .bold(),
            elapsed.as_millis()
        );
    }

    fn on_set_failed(&self, key: SetKey, error: &str) {
        eprintln!(
            "  {} run {} set {}: {}",
            "✗".red(),
            key.run,
            key.set_start,
            error
        );
    }
}
