mod config_toml;
mod domain;
mod log_level;
mod toml_merge;

pub use config_toml::{
    CommandToml, ConfigReadError, ConfigToml, GeneralToml, LoggingToml, StateToml, DEFAULT_CONFIG,
    SAMPLE_CONFIG,
};
pub use domain::Domain;
pub use log_level::{LogLevel, TargetLevel};
pub use toml_merge::MergeError;
