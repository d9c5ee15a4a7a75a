use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::pattern::FilePattern;

/// Placeholder used by the acquisition host for both directories.
const DEFAULT_DIR: &str = "Z:";
const DEFAULT_PATTERN: &str = "test_##_#####.tif";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub watch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub file_pattern: String,
    pub set_size: u32,
    pub poll_interval_secs: u64,
    pub max_tasks: usize,
    pub delete_after: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(DEFAULT_DIR),
            output_dir: PathBuf::from(DEFAULT_DIR),
            file_pattern: DEFAULT_PATTERN.to_string(),
            set_size: 100,
            poll_interval_secs: 1,
            max_tasks: 4,
            delete_after: true,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check the values that would otherwise only fail once the session is running.
    pub fn validate(&self) -> Result<FilePattern, Error> {
        if self.set_size == 0 {
            return Err(Error::InvalidConfig("set_size must be at least 1".into()));
        }
        if self.max_tasks == 0 {
            return Err(Error::InvalidConfig("max_tasks must be at least 1".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        FilePattern::parse(&self.file_pattern)
    }
}

/// Defaults, then `Composer.toml` if present, then `COMPOSER_*` environment variables.
pub fn load_configuration() -> Result<WatchConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Composer").required(false))
        .add_source(Environment::with_prefix("COMPOSER").try_parsing(true))
        .build()?;
    builder.try_deserialize::<WatchConfig>()
}
