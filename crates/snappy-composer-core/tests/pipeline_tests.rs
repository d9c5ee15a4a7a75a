use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

use snappy_composer_core::compress::{Compressor, SnappyCompressor};
use snappy_composer_core::scanner::SetKey;
use snappy_composer_core::{Error, SilentReporter, WatchConfig, WatchReporter, WatchSession};

fn write_run(dir: &Path, prefix: &str, run: u32, indices: std::ops::RangeInclusive<u32>) {
    for i in indices {
        let name = format!("{}_{:02}_{:05}.tif", prefix, run, i);
        fs::write(dir.join(name), format!("frame {} of run {}", i, run)).unwrap();
    }
}

fn config_for(watch: &Path, output: &Path, set_size: u32, max_tasks: usize) -> WatchConfig {
    WatchConfig {
        watch_dir: watch.to_path_buf(),
        output_dir: output.to_path_buf(),
        file_pattern: "img_##_#####.tif".to_string(),
        set_size,
        poll_interval_secs: 1,
        max_tasks,
        delete_after: true,
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Counts calls and tracks the peak number of concurrent compress calls.
#[derive(Default)]
struct InstrumentedCompressor {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl Compressor for InstrumentedCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.current.fetch_sub(1, Ordering::SeqCst);
        SnappyCompressor.compress(data)
    }

    fn extension(&self) -> &str {
        "snappy"
    }
}

struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, _data: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::Compress("injected failure".to_string()))
    }

    fn extension(&self) -> &str {
        "snappy"
    }
}

#[derive(Default)]
struct RecordingReporter {
    archived: Mutex<Vec<PathBuf>>,
    failed: Mutex<Vec<SetKey>>,
    incomplete: Mutex<Vec<(SetKey, usize)>>,
}

impl WatchReporter for RecordingReporter {
    fn on_set_incomplete(&self, key: SetKey, found: usize, _expected: u32) {
        self.incomplete.lock().unwrap().push((key, found));
    }

    fn on_set_archived(&self, _key: SetKey, artifact: &Path, _elapsed: Duration) {
        self.archived.lock().unwrap().push(artifact.to_path_buf());
    }

    fn on_set_failed(&self, key: SetKey, _error: &str) {
        self.failed.lock().unwrap().push(key);
    }
}

#[test]
fn test_full_set_end_to_end() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_run(watch.path(), "img", 1, 1..=100);

    let mut session =
        WatchSession::new(config_for(watch.path(), output.path(), 100, 4)).unwrap();
    let report = session.run_once();
    assert_eq!(report.sets_found, 1);
    assert_eq!(report.dispatched, 1);
    let summary = session.shutdown();

    assert_eq!(
        file_names(output.path()),
        vec!["img_01_00001.snappy".to_string(), "img_01_00001.tif".to_string()]
    );
    assert!(file_names(watch.path()).is_empty());
    assert_eq!(summary.tasks.succeeded, 1);
    assert_eq!(summary.deletions.removed, 100);

    let compressed = fs::read(output.path().join("img_01_00001.snappy")).unwrap();
    let tar = snap::raw::Decoder::new().decompress_vec(&compressed).unwrap();
    let per_entry = 512 + 512;
    assert_eq!(tar.len(), 100 * per_entry + 1024);
    assert_eq!(
        fs::read_to_string(output.path().join("img_01_00001.tif")).unwrap(),
        "frame 1 of run 1"
    );
}

#[test]
fn test_incomplete_set_is_left_alone() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_run(watch.path(), "img", 1, 1..=10);
    write_run(watch.path(), "img", 1, 12..=15);

    let reporter = Arc::new(RecordingReporter::default());
    let mut session = WatchSession::with_parts(
        config_for(watch.path(), output.path(), 10, 2),
        Arc::new(SnappyCompressor),
        reporter.clone(),
    )
    .unwrap();

    let report = session.run_once();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.incomplete, 1);
    let incomplete_key = SetKey {
        run: 1,
        set_start: 11,
    };
    assert!(session.registry().is_incomplete(&incomplete_key));

    // Filling the gap completes the set on the next pass.
    write_run(watch.path(), "img", 1, 11..=11);
    write_run(watch.path(), "img", 1, 16..=20);
    let report = session.run_once();
    assert_eq!(report.dispatched, 1);
    assert!(session.registry().is_processed(&incomplete_key));
    assert!(!session.registry().is_incomplete(&incomplete_key));
    session.shutdown();

    assert_eq!(reporter.incomplete.lock().unwrap()[0], (incomplete_key, 4));
    assert_eq!(reporter.archived.lock().unwrap().len(), 2);
    assert!(output.path().join("img_01_00011.snappy").exists());
}

#[test]
fn test_existing_artifact_is_not_reprocessed() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_run(watch.path(), "img", 2, 1..=5);

    let mut session_one =
        WatchSession::new(config_for(watch.path(), output.path(), 5, 2)).unwrap();
    session_one.run_once();
    session_one.shutdown();
    let artifact = output.path().join("img_02_00001.snappy");
    let first_bytes = fs::read(&artifact).unwrap();

    // Sources reappear; a fresh session must only mark the set processed.
    write_run(watch.path(), "img", 2, 1..=5);
    let compressor = Arc::new(InstrumentedCompressor::default());
    let mut session_two = WatchSession::with_parts(
        config_for(watch.path(), output.path(), 5, 2),
        compressor.clone(),
        Arc::new(SilentReporter),
    )
    .unwrap();
    let report = session_two.run_once();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.dispatched, 0);
    assert!(session_two.registry().is_processed(&SetKey { run: 2, set_start: 1 }));
    let summary = session_two.shutdown();

    assert_eq!(compressor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.deletions.tasks, 0);
    assert_eq!(file_names(watch.path()).len(), 5);
    assert_eq!(fs::read(&artifact).unwrap(), first_bytes);
}

#[test]
fn test_processed_set_is_dispatched_once() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_run(watch.path(), "img", 1, 1..=3);

    let mut config = config_for(watch.path(), output.path(), 3, 1);
    config.delete_after = false;
    let compressor = Arc::new(InstrumentedCompressor::default());
    let mut session =
        WatchSession::with_parts(config, compressor.clone(), Arc::new(SilentReporter)).unwrap();

    assert_eq!(session.run_once().dispatched, 1);
    // Sources are still there, but the key is already registered.
    assert_eq!(session.run_once().dispatched, 0);
    assert_eq!(session.run_once().dispatched, 0);
    let summary = session.shutdown();

    assert_eq!(compressor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.sets_dispatched, 1);
    assert_eq!(file_names(watch.path()).len(), 3);
}

#[test]
fn test_concurrency_never_exceeds_max_tasks() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    for run in 1..=3 {
        write_run(watch.path(), "img", run, 1..=8);
    }

    let compressor = Arc::new(InstrumentedCompressor {
        delay: Duration::from_millis(100),
        ..Default::default()
    });
    let mut session = WatchSession::with_parts(
        config_for(watch.path(), output.path(), 2, 3),
        compressor.clone(),
        Arc::new(SilentReporter),
    )
    .unwrap();

    let report = session.run_once();
    assert_eq!(report.dispatched, 12);
    let summary = session.shutdown();

    let peak = compressor.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrent compressions {} exceeded 3", peak);
    assert!(peak >= 1);
    // Whole per-set tasks, not just the compression step.
    let peak_tasks = summary.tasks.peak_in_flight;
    assert!(peak_tasks <= 3, "peak tasks in flight {} exceeded 3", peak_tasks);
    assert!(peak_tasks >= peak);
    assert_eq!(compressor.calls.load(Ordering::SeqCst), 12);
    assert_eq!(summary.tasks.succeeded, 12);
    assert_eq!(file_names(output.path()).len(), 24);
}

#[test]
fn test_failed_task_is_not_retried() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_run(watch.path(), "img", 1, 1..=4);

    let reporter = Arc::new(RecordingReporter::default());
    let mut session = WatchSession::with_parts(
        config_for(watch.path(), output.path(), 4, 2),
        Arc::new(FailingCompressor),
        reporter.clone(),
    )
    .unwrap();

    assert_eq!(session.run_once().dispatched, 1);
    // Let the worker fail before scanning again.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(session.run_once().dispatched, 0);
    let summary = session.shutdown();

    assert_eq!(summary.tasks.failed, 1);
    assert_eq!(reporter.failed.lock().unwrap().len(), 1);
    assert!(file_names(output.path()).is_empty());
    // Nothing was archived, so nothing was deleted.
    assert_eq!(file_names(watch.path()).len(), 4);
}

#[test]
fn test_unreadable_watch_dir_is_transient() {
    let root = tempdir().unwrap();
    let watch = root.path().join("not_yet");
    let output = root.path().join("out");

    let mut session = WatchSession::new(config_for(&watch, &output, 2, 1)).unwrap();
    assert_eq!(session.run_once().sets_found, 0);

    fs::create_dir(&watch).unwrap();
    write_run(&watch, "img", 1, 1..=2);
    assert_eq!(session.run_once().dispatched, 1);
    session.shutdown();
    assert!(output.join("img_01_00001.snappy").exists());
}

#[test]
fn test_invalid_config_is_fatal() {
    let tmp = tempdir().unwrap();
    let mut config = config_for(tmp.path(), tmp.path(), 0, 1);
    assert!(WatchSession::new(config.clone()).is_err());

    config.set_size = 1;
    config.file_pattern = "img.tif".to_string();
    assert!(matches!(WatchSession::new(config), Err(Error::Pattern(_))));
}

#[test]
fn test_run_until_stopped() {
    let watch = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_run(watch.path(), "img", 1, 1..=4);

    let session = WatchSession::new(config_for(watch.path(), output.path(), 2, 2)).unwrap();
    let stop = session.stop_handle();
    let runner = thread::spawn(move || session.run());

    thread::sleep(Duration::from_millis(300));
    stop.stop();
    let summary = runner.join().unwrap();

    assert_eq!(summary.sets_dispatched, 2);
    assert_eq!(summary.tasks.succeeded, 2);
    assert_eq!(summary.deletions.removed, 4);
    assert!(file_names(watch.path()).is_empty());
}

#[test]
fn test_shared_watch_and_output_dir_keeps_sources() {
    let dir = tempdir().unwrap();
    write_run(dir.path(), "img", 1, 1..=2);

    let mut config = config_for(dir.path(), dir.path(), 2, 1);
    config.delete_after = false;
    let mut session = WatchSession::new(config).unwrap();
    assert_eq!(session.run_once().dispatched, 1);
    let summary = session.shutdown();

    assert_eq!(summary.tasks.succeeded, 1);
    assert_eq!(
        file_names(dir.path()),
        vec![
            "img_01_00001.snappy".to_string(),
            "img_01_00001.tif".to_string(),
            "img_01_00002.tif".to_string(),
        ]
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("img_01_00001.tif")).unwrap(),
        "frame 1 of run 1"
    );
}
