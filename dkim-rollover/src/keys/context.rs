use std::path::PathBuf;

use super::{KeyTypeRegistry, Lifetimes, MonthIndex};

/// Settings shared by every key operation of one run.
///
/// Built once by the engine and passed by reference; keys never read global state.
#[derive(Debug, Clone)]
pub struct KeyContext {
    /// Directory new key and record files are written to.
    pub key_dir: PathBuf,
    /// Retired files are moved here. `None` unlinks them instead.
    pub archive_dir: Option<PathBuf>,
    pub lifetimes: Lifetimes,
    /// The month ages are computed against.
    pub current_month: MonthIndex,
    pub registry: KeyTypeRegistry,
}
