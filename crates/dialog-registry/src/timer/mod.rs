//! Dialog timer contract
//!
//! Expiry scheduling belongs to an external timer service. The registry only
//! keeps the association between a dialog and its [`TimerHandle`]:
//!
//! - `DialogTable::start_timer` takes one reference for the timer and schedules it
//! - `DialogTable::stop_timer` cancels it and hands the reference back
//! - the service calls `DialogTable::on_timer_expired` when the deadline passes
//!
//! A timer may fire before `schedule` has even returned. The cell is marked
//! [`TimerSlot::Arming`] while `schedule` runs, and an expiry that clears the
//! mark leaves nothing for `start_timer` to store.
//!
//! ```text
//!  DialogTable ──schedule(key, deadline)──▶ DialogTimer
//!       ▲                                       │
//!       └────────── on_timer_expired(key) ◀─────┘
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::dialog::DialogKey;

/// Opaque handle returned by the timer service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

/// Timer association of a linked dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSlot {
    /// `schedule` is in flight; the timer's reference is already held
    Arming,
    Armed(TimerHandle),
}

impl TimerSlot {
    pub fn handle(self) -> Option<TimerHandle> {
        match self {
            TimerSlot::Arming => None,
            TimerSlot::Armed(handle) => Some(handle),
        }
    }
}

/// External timer service
pub trait DialogTimer: Send + Sync {
    /// Arm a timer firing `on_timer_expired(key)` at `deadline`
    fn schedule(&self, key: DialogKey, deadline: Instant) -> anyhow::Result<TimerHandle>;

    /// Disarm a timer. `Ok(false)` means it already fired or was never armed.
    fn cancel(&self, handle: TimerHandle) -> anyhow::Result<bool>;
}
