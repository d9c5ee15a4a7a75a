use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use snappy_composer_core::WatchConfig;

#[derive(Debug, Parser)]
#[command(name = "snappy-composer")]
#[command(about = "Packs completed sets of numbered frames into snappy-compressed tar archives", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the directory and archive sets until stopped
    Watch(WatchArgs),
    /// Scan once, archive every complete set, wait for cleanup and exit
    Once(OverrideArgs),
    /// Print configuration values
    PrintConfig(OverrideArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Stop when Enter is pressed
    #[arg(long)]
    pub stop_on_enter: bool,
}

/// Command line values that take precedence over `Composer.toml` and the environment.
#[derive(Debug, Args)]
pub struct OverrideArgs {
    /// Directory the acquisition process writes frames into
    #[arg(long)]
    pub watch_dir: Option<PathBuf>,

    /// Directory receiving archives and first-file copies
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File name template, `##` for the run and `#####` for the index
    #[arg(long)]
    pub pattern: Option<String>,

    /// Number of files per set
    #[arg(long)]
    pub set_size: Option<u32>,

    /// Seconds between directory scans
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Maximum number of sets processed at once
    #[arg(long)]
    pub max_tasks: Option<usize>,

    /// Leave source files in place after archiving
    #[arg(long)]
    pub keep_sources: bool,
}

impl OverrideArgs {
    pub fn apply(&self, config: &mut WatchConfig) {
        if let Some(dir) = &self.watch_dir {
            config.watch_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(pattern) = &self.pattern {
            config.file_pattern = pattern.clone();
        }
        if let Some(set_size) = self.set_size {
            config.set_size = set_size;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(max_tasks) = self.max_tasks {
            config.max_tasks = max_tasks;
        }
        if self.keep_sources {
            config.delete_after = false;
        }
    }
}
