//! Registry configuration
//!
//! [`RegistryConfig`] carries every startup parameter of the registry: table
//! and profile sizing, the profile definitions, the default dialog lifetime
//! and the persistence policy. It deserializes from TOML with every field
//! optional.
//!
//! ## Examples
//!
//! ```rust
//! use rvoip_dialog_registry::config::RegistryConfig;
//!
//! let config = RegistryConfig::default()
//!     .with_hash_size(1024)
//!     .with_profiles_with_value("caller;callee")
//!     .with_profiles_no_value("calls");
//! assert!(config.validate().is_ok());
//! ```
//!
//! ```rust
//! use rvoip_dialog_registry::config::RegistryConfig;
//! use rvoip_dialog_registry::persistence::PersistenceMode;
//!
//! let config = RegistryConfig::from_toml_str(r#"
//!     hash_size = 512
//!     profiles_no_value = "inbound;outbound"
//!
//!     [persistence]
//!     mode = "delayed"
//!     update_period = 30
//! "#).unwrap();
//! assert_eq!(config.hash_size, 512);
//! assert_eq!(config.persistence.mode, PersistenceMode::Delayed);
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{RegistryError, RegistryResult};
use crate::persistence::PersistenceConfig;
use crate::profile::PROFILE_HASH_SIZE;
use crate::table::DEFAULT_TIMEOUT;

/// Default number of dialog table buckets
pub const DEFAULT_HASH_SIZE: u32 = 4096;

/// Startup configuration of the dialog registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of dialog table buckets
    pub hash_size: u32,
    /// Number of buckets of every profile (power of two)
    pub profile_hash_size: u32,
    /// `;` separated names of profiles grouping dialogs by value
    pub profiles_with_value: String,
    /// `;` separated names of profiles without value
    pub profiles_no_value: String,
    /// Dialog lifetime in seconds, used when arming a timer without one
    pub default_timeout: u32,
    /// Storage of dialogs across restarts
    pub persistence: PersistenceConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            profile_hash_size: PROFILE_HASH_SIZE,
            profiles_with_value: String::new(),
            profiles_no_value: String::new(),
            default_timeout: DEFAULT_TIMEOUT,
            persistence: PersistenceConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Parse a TOML document, then validate it
    pub fn from_toml_str(input: &str) -> RegistryResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| RegistryError::config(format!("invalid registry configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_hash_size(mut self, size: u32) -> Self {
        self.hash_size = size;
        self
    }

    pub fn with_profile_hash_size(mut self, size: u32) -> Self {
        self.profile_hash_size = size;
        self
    }

    pub fn with_profiles_with_value(mut self, names: impl Into<String>) -> Self {
        self.profiles_with_value = names.into();
        self
    }

    pub fn with_profiles_no_value(mut self, names: impl Into<String>) -> Self {
        self.profiles_no_value = names.into();
        self
    }

    pub fn with_default_timeout(mut self, seconds: u32) -> Self {
        self.default_timeout = seconds;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    /// Check the values that would otherwise fail later at startup
    pub fn validate(&self) -> RegistryResult<()> {
        if self.hash_size == 0 {
            return Err(RegistryError::config("hash_size must be at least 1"));
        }
        if !self.profile_hash_size.is_power_of_two() {
            return Err(RegistryError::config(format!(
                "profile_hash_size {} is not a power of 2",
                self.profile_hash_size
            )));
        }
        if self.default_timeout == 0 {
            return Err(RegistryError::config("default_timeout must be at least 1 second"));
        }
        self.persistence.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceMode;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.hash_size, 4096);
        assert_eq!(config.profile_hash_size, 16);
        assert_eq!(config.default_timeout, 43200);
        assert_eq!(config.persistence.mode, PersistenceMode::None);
        assert_eq!(config.persistence.update_period, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(RegistryConfig::from_toml_str("").unwrap(), RegistryConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        assert!(RegistryConfig::default().with_hash_size(0).validate().is_err());
        assert!(RegistryConfig::default().with_profile_hash_size(12).validate().is_err());
        assert!(RegistryConfig::default().with_default_timeout(0).validate().is_err());

        let err = RegistryConfig::from_toml_str("hash_size = \"big\"").unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }
}
