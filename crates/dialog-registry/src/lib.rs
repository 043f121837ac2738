//! # Dialog-Registry - Concurrent SIP Dialog State for RVoIP
//!
//! This crate keeps the in-memory state of every SIP dialog a proxy or B2BUA
//! is tracking, and lets many worker threads read and update it at once.
//!
//! - [`table`]: the sharded, lock-striped dialog table with reference
//!   counted cells
//! - [`dialog`]: dialog keys, cells and the pure state machine
//! - [`profile`]: named secondary indices (profiles) over dialogs
//! - [`events`]: lifecycle observers
//! - [`persistence`]: storage of dialogs across restarts
//! - [`timer`]: the contract with an external lifetime timer service
//!
//! ## Example
//!
//! ```rust
//! use rvoip_dialog_registry::{DialogEvent, DialogIdentity, DialogRegistry, DialogState, RegistryConfig};
//!
//! let registry = DialogRegistry::new(
//!     RegistryConfig::default().with_hash_size(256).with_profiles_with_value("caller"),
//! ).unwrap();
//! let table = registry.table();
//!
//! // one reference for the table, one for the pending INVITE transaction
//! let key = table
//!     .insert(DialogIdentity::new("a84b4c76e66710", "sip:alice@atlanta.com", "sip:bob@biloxi.com", "1928301774"), 1)
//!     .unwrap();
//!
//! let dialog = table.lookup(key).unwrap();
//! let caller = registry.profile("caller").unwrap();
//! rvoip_dialog_registry::profile::attach(&dialog, caller, Some("alice")).unwrap();
//!
//! table.process_event(key, DialogEvent::SuccessResponse);
//! assert_eq!(dialog.state(), Some(DialogState::ConfirmedNa));
//! assert_eq!(registry.profiles().profile_size("caller", Some("alice")).unwrap(), 1);
//! ```

pub mod config;
pub mod dialog;
pub mod errors;
pub mod events;
pub mod introspection;
pub mod locking;
pub mod logging;
pub mod persistence;
pub mod profile;
pub mod registry;
pub mod routing;
pub mod table;
pub mod timer;

pub use config::RegistryConfig;
pub use dialog::{DialogEvent, DialogFlags, DialogIdentity, DialogKey, DialogState, Leg, LegInfo};
pub use errors::{RegistryError, RegistryResult};
pub use events::{CallbackDispatcher, CallbackTypes, DialogNotification, DialogObserver};
pub use introspection::DialogSnapshot;
pub use profile::{DialogProfile, ProfileRegistry, RequestContext};
pub use registry::DialogRegistry;
pub use routing::Direction;
pub use table::{DialogRef, DialogTable, StateChange};
pub use timer::{DialogTimer, TimerHandle, TimerSlot};
