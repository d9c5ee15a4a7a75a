use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::archive::TarBuilder;
use crate::compress::Compressor;
use crate::delete_queue::{DeleteSender, DeleteTask};
use crate::error::Error;
use crate::progress::WatchReporter;
use crate::scanner::FileSet;

/// Everything a worker needs to turn a set into an artifact.
#[derive(Clone)]
pub struct TaskContext {
    pub output_dir: PathBuf,
    pub compressor: Arc<dyn Compressor>,
    /// `None` leaves the sources in place.
    pub delete: Option<DeleteSender>,
    pub reporter: Arc<dyn WatchReporter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Archived {
        artifact: PathBuf,
        files: usize,
        elapsed: Duration,
    },
    /// The artifact already existed when the worker picked the set up.
    AlreadyArchived(PathBuf),
}

/// Archive, compress and write one set, copy its first file next to the
/// artifact, then queue the sources for deletion.
pub fn process_set(ctx: &TaskContext, set: &FileSet) -> Result<SetOutcome, Error> {
    let start = Instant::now();

    let output_path = set
        .output_path(&ctx.output_dir, ctx.compressor.extension())
        .ok_or_else(|| {
            Error::Other(format!(
                "run {} set {} has no first file",
                set.run, set.set_start
            ))
        })?;

    if output_path.exists() {
        info!("Skipping already processed set: {}", output_path.display());
        return Ok(SetOutcome::AlreadyArchived(output_path));
    }

    info!(
        run = set.run,
        set_start = set.set_start,
        files = set.files.len(),
        "Processing file set"
    );

    let mut tar = TarBuilder::new();
    let mut archived = 0;
    for path in &set.files {
        match tar.add_file(path) {
            Ok(()) => archived += 1,
            Err(e) => error!("Failed to add file to tar: {}", e),
        }
    }
    let archive = tar.finish();

    let compressed = ctx.compressor.compress(&archive)?;
    debug!(
        "Compressed {} bytes to {} bytes",
        archive.len(),
        compressed.len()
    );

    fs::create_dir_all(&ctx.output_dir)?;
    fs::write(&output_path, &compressed)?;

    if let Some(first_file) = &set.first_file {
        copy_first_file(first_file, &ctx.output_dir);
    }

    if let Some(delete) = &ctx.delete {
        delete.enqueue(DeleteTask::new(set.files.clone()));
    }

    let elapsed = start.elapsed();
    info!(
        "Created: {} - Processing time: {} ms",
        output_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy(),
        elapsed.as_millis()
    );

    Ok(SetOutcome::Archived {
        artifact: output_path,
        files: archived,
        elapsed,
    })
}

/// Runs `process_set` and reports the outcome. Errors end here.
pub fn run_set(ctx: &TaskContext, set: &FileSet) -> bool {
    match process_set(ctx, set) {
        Ok(SetOutcome::Archived {
            artifact, elapsed, ..
        }) => {
            ctx.reporter.on_set_archived(set.key(), &artifact, elapsed);
            true
        }
        Ok(SetOutcome::AlreadyArchived(_)) => {
            ctx.reporter.on_set_skipped(set.key());
            true
        }
        Err(e) => {
            error!(
                run = set.run,
                set_start = set.set_start,
                "Error processing file set: {}",
                e
            );
            ctx.reporter.on_set_failed(set.key(), &e.to_string());
            false
        }
    }
}

/// Preview copy of the first file; a failure is logged and does not fail the set.
fn copy_first_file(first_file: &Path, output_dir: &Path) {
    let Some(name) = first_file.file_name() else {
        return;
    };
    let dest = output_dir.join(name);

    if is_same_file(first_file, &dest) {
        debug!(
            "First file {} already lives in the output directory",
            first_file.display()
        );
        return;
    }

    let result = (|| -> std::io::Result<()> {
        if dest.exists() {
            fs::remove_file(&dest)?;
        }
        fs::copy(first_file, &dest)?;
        Ok(())
    })();

    match result {
        Ok(()) => info!(
            "Copied first file to output directory: {}",
            name.to_string_lossy()
        ),
        Err(e) => error!("Error copying first file {}: {}", first_file.display(), e),
    }
}

/// True when both paths resolve to the same existing file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
