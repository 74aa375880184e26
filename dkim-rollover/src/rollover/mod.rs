mod engine;
mod lock;
mod runner;

pub use engine::{RolloverEngine, RolloverError, RunReport, StatePaths};
pub use lock::{LockError, RunLock};
pub use runner::{run, run_at, status};
