//! The dialog table
//!
//! - [`DialogTable`]: the sharded store, one lock per stripe of buckets
//! - [`DialogRef`]: a counted handle on one dialog
//! - [`hash`]: stable hashing of call identifiers into buckets
//!
//! ## Reference counting
//!
//! ```text
//! insert ──▶ 1 (table) + holders
//! lookup ──▶ +1, owned by the returned DialogRef
//! start_timer ──▶ +1, owned by the timer
//! release(n) ──▶ -n; reaching 0 unlinks, runs Destroyed observers,
//!                 drops profile memberships
//! ```

pub mod dialog_ref;
pub mod dialog_table;
pub mod hash;
pub mod stats;

pub use dialog_ref::DialogRef;
pub use dialog_table::{DialogTable, StateChange, DEFAULT_TIMEOUT};
pub use stats::{TableStats, TableStatsSnapshot};
