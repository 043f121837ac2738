//! Process-wide entry point
//!
//! [`DialogRegistry`] builds the table, the observer list and the profiles
//! out of one [`RegistryConfig`] and hands them out to the protocol layer.

use std::sync::Arc;

use tracing::info;

use crate::config::RegistryConfig;
use crate::errors::RegistryResult;
use crate::events::CallbackDispatcher;
use crate::persistence::{load_from_store, DialogStore};
#[cfg(feature = "persistence")]
use crate::persistence::{PersistenceHandle, PersistenceWorker};
use crate::profile::{DialogProfile, ProfileRegistry, RequestContext};
use crate::table::DialogTable;
use crate::timer::DialogTimer;

/// The dialog table, its observers and its profiles
#[derive(Debug)]
pub struct DialogRegistry {
    config: RegistryConfig,
    callbacks: Arc<CallbackDispatcher>,
    table: Arc<DialogTable>,
    profiles: ProfileRegistry,
}

impl DialogRegistry {
    /// Build a registry without timer service
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        Self::build(config, None)
    }

    /// Build a registry whose dialogs can be armed with lifetime timers
    pub fn with_timer(config: RegistryConfig, timer: Arc<dyn DialogTimer>) -> RegistryResult<Self> {
        Self::build(config, Some(timer))
    }

    fn build(config: RegistryConfig, timer: Option<Arc<dyn DialogTimer>>) -> RegistryResult<Self> {
        config.validate()?;

        let callbacks = Arc::new(CallbackDispatcher::new());
        let mut table = DialogTable::from_config(&config, Arc::clone(&callbacks))?;
        if let Some(timer) = timer {
            table = table.with_timer(timer);
        }
        let profiles = ProfileRegistry::from_config(&config)?;

        info!(
            hash_size = config.hash_size,
            locks = table.locks_count(),
            profiles = profiles.len(),
            persistence = ?config.persistence.mode,
            "dialog registry ready"
        );

        Ok(Self {
            config,
            callbacks,
            table: Arc::new(table),
            profiles,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<DialogTable> {
        &self.table
    }

    pub fn callbacks(&self) -> &Arc<CallbackDispatcher> {
        &self.callbacks
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Option<&Arc<DialogProfile>> {
        self.profiles.search(name)
    }

    /// Fresh per-worker request state
    pub fn request_context(&self) -> RequestContext<'_> {
        RequestContext::new(&self.table)
    }

    /// Restore stored dialogs; see [`load_from_store`]
    pub async fn load(&self, store: &dyn DialogStore) -> RegistryResult<usize> {
        load_from_store(&self.table, store).await
    }

    /// Start writing dialogs to `store` according to the configured mode
    #[cfg(feature = "persistence")]
    pub fn start_persistence(&self, store: Arc<dyn DialogStore>) -> RegistryResult<PersistenceHandle> {
        PersistenceWorker::start(Arc::clone(&self.table), store, &self.config.persistence)
    }
}
