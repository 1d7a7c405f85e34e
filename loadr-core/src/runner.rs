mod context;
mod dispatch;
mod error;
mod modes;
mod pool;
mod stats;

pub use context::{CancelFlag, Counter, PROGRESS_INTERVAL_MS, RunContext, unix_ms};
pub use dispatch::{Dispatcher, IndexedHook};
pub use error::{Error, Result};
pub use modes::{ModeRun, drain, run};
pub use pool::{CompletionHook, Dispatched, TaskError, WorkerPool};
pub use stats::{RunReport, StatsCollector};
