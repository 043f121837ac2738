//! Startup-time profile list and management queries

use std::sync::Arc;

use tracing::info;

use super::profile_table::DialogProfile;
use crate::config::RegistryConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::introspection::DialogSnapshot;
use crate::table::DialogTable;

/// All profiles known to the process.
///
/// Built once during startup; lookups afterwards need no locking.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: Vec<Arc<DialogProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profiles named in the configuration
    pub fn from_config(config: &RegistryConfig) -> RegistryResult<Self> {
        Self::from_definitions(
            &config.profiles_with_value,
            &config.profiles_no_value,
            config.profile_hash_size,
        )
    }

    /// Parse two `;` separated name lists
    pub fn from_definitions(with_value: &str, no_value: &str, size: u32) -> RegistryResult<Self> {
        let mut registry = Self::new();
        registry.add_definitions(with_value, true, size)?;
        registry.add_definitions(no_value, false, size)?;
        Ok(registry)
    }

    /// Register every name of a `;` separated list. Blank entries are skipped.
    pub fn add_definitions(&mut self, list: &str, has_value: bool, size: u32) -> RegistryResult<()> {
        for name in list.split(';').map(str::trim).filter(|name| !name.is_empty()) {
            self.register(name, size, has_value)?;
        }
        Ok(())
    }

    /// Create and append a profile
    pub fn register(&mut self, name: &str, size: u32, has_value: bool) -> RegistryResult<Arc<DialogProfile>> {
        let profile = Arc::new(DialogProfile::new(name, size, has_value)?);
        if self.search(name).is_some() {
            return Err(RegistryError::DuplicateProfile(name.to_string()));
        }

        info!(profile = name, size, has_value, "dialog profile registered");
        self.profiles.push(Arc::clone(&profile));
        Ok(profile)
    }

    pub fn search(&self, name: &str) -> Option<&Arc<DialogProfile>> {
        self.profiles.iter().find(|p| p.name() == name)
    }

    /// Like [`search`](Self::search) but a missing profile is an error
    pub fn get(&self, name: &str) -> RegistryResult<&Arc<DialogProfile>> {
        self.search(name)
            .ok_or_else(|| RegistryError::ProfileNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.profiles.iter().map(|p| p.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DialogProfile>> + '_ {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Number of memberships of a profile, optionally for one value
    pub fn profile_size(&self, name: &str, value: Option<&str>) -> RegistryResult<usize> {
        Ok(self.get(name)?.count(value))
    }

    /// Snapshots of the dialogs tagged with a profile.
    ///
    /// A dialog destroyed between the profile walk and its snapshot is left
    /// out.
    pub fn profile_list(
        &self,
        table: &DialogTable,
        name: &str,
        value: Option<&str>,
    ) -> RegistryResult<Vec<DialogSnapshot>> {
        let keys = self.get(name)?.dialogs(value);
        Ok(keys
            .into_iter()
            .filter_map(|key| table.snapshot(key, false))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_definitions() {
        let registry = ProfileRegistry::from_definitions(" caller ; callee;", "calls", 16).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["caller", "callee", "calls"]);
        assert!(registry.search("caller").unwrap().has_value());
        assert!(!registry.search("calls").unwrap().has_value());
        assert!(registry.search("missing").is_none());
    }

    #[test]
    fn test_duplicate_profile_rejected() {
        let result = ProfileRegistry::from_definitions("caller", "caller", 16);
        assert_eq!(result.err(), Some(RegistryError::DuplicateProfile("caller".to_string())));
    }

    #[test]
    fn test_unknown_profile_is_not_found() {
        let registry = ProfileRegistry::new();
        assert_eq!(
            registry.profile_size("nope", None),
            Err(RegistryError::ProfileNotFound("nope".to_string()))
        );
    }
}
