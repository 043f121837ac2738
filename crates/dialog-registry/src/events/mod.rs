//! Dialog lifecycle callbacks
//!
//! Observers are notified at fixed points of a dialog's life:
//!
//! - **Created**: right after the dialog was linked into the table
//! - **StateChanged**: after a state machine transition changed the state
//! - **Destroyed**: once the last reference is gone, before the cell is freed
//! - **Introspect**: while a management snapshot is being rendered
//!
//! Process-wide observers live in the [`CallbackDispatcher`]; observers tied
//! to a single dialog are stored on the cell and run after the global ones.

pub mod dispatcher;

pub use dispatcher::{
    CallbackDispatcher, CallbackTypes, DialogNotification, DialogObserver, RegisteredObserver,
};
