//! Registry error definitions
//!
//! Errors fall in two groups:
//!
//! - **Initialization**: lock set, table or profile construction failures.
//!   These are fatal, the caller must refuse to start.
//! - **Steady state**: a single insert/attach/timer operation failed. The
//!   operation reports the failure and the caller decides what to do with the
//!   request; the registry never retries on its own.

use thiserror::Error;

use crate::dialog::DialogKey;

/// Result type used throughout the registry
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced by the dialog registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Not even the minimum number of bucket locks could be allocated
    #[error("unable to allocate at least {min} locks for the dialog table")]
    LockAllocation { min: usize },

    /// Memory for a cell, link or table could not be reserved
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Profile names must be non-empty and alphanumeric
    #[error("bad profile name <{name}>: {reason}")]
    InvalidProfileName { name: String, reason: String },

    /// Profile bucket counts must be powers of two
    #[error("profile size {0} is not a power of 2")]
    InvalidProfileSize(u32),

    /// A profile with the same name is already registered
    #[error("duplicate dialog profile registered <{0}>")]
    DuplicateProfile(String),

    /// No profile with that name exists
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// A value-grouped profile was used without a value
    #[error("profile <{0}> groups by value but no value was given")]
    MissingProfileValue(String),

    /// The dialog is gone (or was never there)
    #[error("dialog {0} not found")]
    DialogNotFound(DialogKey),

    /// An operation needed the request's current dialog but there is none
    #[error("no current dialog for this request")]
    NoCurrentDialog,

    /// External dialog identifier could not be parsed or is out of range
    #[error("invalid dialog key: {0}")]
    InvalidKey(String),

    /// Leg data that would move the dialog out of its home bucket
    #[error("dialog {key}: {reason}")]
    InvalidLegInfo { key: DialogKey, reason: String },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence collaborator failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Timer collaborator failure
    #[error("timer error: {0}")]
    Timer(String),
}

impl RegistryError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a timer error
    pub fn timer(message: impl Into<String>) -> Self {
        Self::Timer(message.into())
    }

    /// Create a resource exhaustion error
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    /// Whether this error only reports that something was absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DialogNotFound(_) | Self::ProfileNotFound(_) | Self::NoCurrentDialog
        )
    }

    /// Whether this error must stop the server from starting
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LockAllocation { .. }
                | Self::InvalidProfileName { .. }
                | Self::InvalidProfileSize(_)
                | Self::DuplicateProfile(_)
                | Self::Config(_)
        )
    }
}
