//! Dialog persistence
//!
//! Dialogs can be written to a [`DialogStore`] so a restarted process picks
//! them up again. The registry never blocks signaling on storage: writes are
//! queued to a background [`PersistenceWorker`](worker::PersistenceWorker)
//! and failures are only logged.
//!
//! | mode       | saved                           | removed on destroy |
//! |------------|---------------------------------|--------------------|
//! | `none`     | never                           | no                 |
//! | `realtime` | on creation and on every state change | yes          |
//! | `delayed`  | NEW/CHANGED dialogs every `update_period` seconds | yes |
//! | `shutdown` | every live dialog, once, at shutdown | no            |

pub mod record;
pub mod store;
#[cfg(feature = "persistence")]
pub mod worker;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{RegistryError, RegistryResult};
use crate::introspection::DialogSnapshot;
use crate::table::DialogTable;

pub use record::DialogRecord;
pub use store::{DialogStore, InMemoryDialogStore};
#[cfg(feature = "persistence")]
pub use worker::{PersistenceHandle, PersistenceWorker};

/// Default flush period of the delayed mode, in seconds
pub const DEFAULT_UPDATE_PERIOD: u32 = 60;

/// When dialogs are written to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    #[default]
    None,
    Realtime,
    Delayed,
    Shutdown,
}

impl PersistenceMode {
    /// Whether destroyed dialogs are removed from storage right away
    pub fn removes_on_destroy(self) -> bool {
        matches!(self, PersistenceMode::Realtime | PersistenceMode::Delayed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mode: PersistenceMode,
    /// Seconds between two flushes in delayed mode
    pub update_period: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::None,
            update_period: DEFAULT_UPDATE_PERIOD,
        }
    }
}

impl PersistenceConfig {
    pub fn new(mode: PersistenceMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_update_period(mut self, seconds: u32) -> Self {
        self.update_period = seconds;
        self
    }

    pub fn validate(&self) -> RegistryResult<()> {
        if self.mode == PersistenceMode::Delayed && self.update_period == 0 {
            return Err(RegistryError::config("update_period must be at least 1 second in delayed mode"));
        }
        Ok(())
    }
}

/// Restore every stored dialog into `table`.
///
/// Records in DELETED state are dropped, malformed records are skipped with a
/// warning. Returns the number of dialogs restored.
pub async fn load_from_store(table: &DialogTable, store: &dyn DialogStore) -> RegistryResult<usize> {
    let records = store
        .load_all()
        .await
        .map_err(|e| RegistryError::persistence(format!("unable to load dialogs: {:#}", e)))?;

    let mut restored = 0;
    for record in records {
        let key = record.key();
        if record.is_deleted() {
            debug!(dialog = %key, "skipping deleted dialog from storage");
            continue;
        }

        match DialogSnapshot::try_from(record).and_then(|snapshot| table.restore(snapshot)) {
            Ok(_) => restored += 1,
            Err(e) => warn!(dialog = %key, "skipping stored dialog: {}", e),
        }
    }

    info!(restored, "dialogs loaded from storage");
    Ok(restored)
}
