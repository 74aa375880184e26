//! DKIM signing key lifecycle manager.
//!
//! Keys move through `future`, `active` and `expired` collections as months
//! pass. A run creates keys ahead of time, promotes them, keeps retired keys'
//! DNS records published for a while and finally archives or deletes them.

pub mod config;
pub mod hooks;
pub mod keys;
pub mod rollover;
pub mod tracing;

pub use config::{ConfigReadError, ConfigToml};
pub use rollover::{RolloverEngine, RolloverError, RunReport};
