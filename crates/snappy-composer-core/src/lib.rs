pub mod archive;
pub mod compress;
pub mod config;
pub mod delete_queue;
pub mod error;
pub mod pattern;
pub mod pool;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod task;

pub use crate::config::WatchConfig;
pub use error::Error;
pub use progress::{SilentReporter, WatchReporter};
pub use session::{SessionSummary, StopHandle, WatchSession};
