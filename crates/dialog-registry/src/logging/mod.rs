//! Logging setup
//!
//! The registry itself only emits `tracing` events. Conditions that point at
//! a protocol or consistency anomaly are logged at `ERROR` with a
//! `critical = true` field, so a subscriber can route them separately.
//! Processes embedding the registry may install a subscriber through
//! [`setup_logging`].

pub mod setup;

pub use setup::{log_startup, parse_log_level, setup_logging, LogFormat, LoggingConfig};
