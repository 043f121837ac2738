//! Error types for dialog-registry
//!
//! This module defines the error type shared by the dialog table, the profile
//! registry and the persistence glue. Lookups never fail with an error: a
//! missing dialog is an ordinary `None`.

pub mod registry_errors;

// Re-export main error types
pub use registry_errors::{RegistryError, RegistryResult};
