//! Table counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters kept by a [`DialogTable`](super::DialogTable)
#[derive(Debug, Default)]
pub struct TableStats {
    created: AtomicU64,
    destroyed: AtomicU64,
    invalid_transitions: AtomicU64,
    ref_anomalies: AtomicU64,
}

/// Plain copy of [`TableStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStatsSnapshot {
    pub created: u64,
    pub destroyed: u64,
    pub invalid_transitions: u64,
    pub ref_anomalies: u64,
}

impl TableStats {
    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalid_transition(&self) {
        self.invalid_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ref_anomaly(&self) {
        self.ref_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TableStatsSnapshot {
        TableStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            invalid_transitions: self.invalid_transitions.load(Ordering::Relaxed),
            ref_anomalies: self.ref_anomalies.load(Ordering::Relaxed),
        }
    }
}
