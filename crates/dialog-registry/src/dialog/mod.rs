//! Core dialog types
//!
//! - [`DialogKey`]: stable `(bucket, local_id)` identifier of a dialog
//! - [`DialogCell`]: the per-call entity stored in the dialog table
//! - [`DialogState`] / [`DialogEvent`]: lifecycle states and protocol events
//! - [`state_machine`]: the pure transition function
//!
//! ## Dialog Lifecycle
//!
//! ```text
//! UNCONFIRMED → EARLY → CONFIRMED_NA → CONFIRMED
//!      │          │          │             │
//!      └──────────┴────┬─────┴─────────────┘
//!                      ▼
//!                   DELETED ──(late 2xx, no BYE seen)──▶ CONFIRMED_NA
//! ```

pub mod dialog_cell;
pub mod dialog_key;
pub mod dialog_state;
pub mod state_machine;

// Re-export main types
pub use dialog_cell::{DialogCell, DialogIdentity, Leg, LegInfo};
pub use dialog_key::{DialogKey, KEY_SEPARATOR};
pub use dialog_state::{DialogEvent, DialogFlags, DialogState};
pub use state_machine::{next_state, Transition};
