//! Dialog profiles
//!
//! A profile is a named secondary index from an optional value to the set of
//! dialogs tagged with it. Profiles are defined once at startup
//! ([`ProfileRegistry`]) and never removed.
//!
//! ## Two indices per membership
//!
//! Every membership exists twice:
//!
//! - as a [`ProfileLink`] on the dialog cell, guarded by the dialog's bucket lock
//! - as a member entry in the profile bucket, guarded by the profile lock
//!
//! Both sides carry the same link id. The bucket lock and the profile lock are
//! never held at the same time. Attach fills the profile side first and the
//! dialog side second; detach and dialog cleanup empty the dialog side first
//! and the profile side second. A link reachable from a dialog is therefore
//! always present in its profile.

pub mod context;
pub mod membership;
pub mod profile_table;
pub mod registry;

pub use context::RequestContext;
pub use membership::{attach, detach, is_member};
pub use profile_table::{DialogProfile, LinkId, ProfileLink, PROFILE_HASH_SIZE};
pub use registry::ProfileRegistry;
