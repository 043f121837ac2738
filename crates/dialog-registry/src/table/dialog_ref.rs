//! Counted dialog handle

use std::fmt;
use std::mem;

use super::dialog_table::{DialogTable, StateChange};
use crate::dialog::{DialogEvent, DialogKey, DialogState};
use crate::introspection::DialogSnapshot;

/// One reference on a dialog, released when dropped.
///
/// Lookups hand these out. Collaborators that keep a reference outside of
/// any Rust scope (a transaction callback, a timer) turn it into a bare key
/// with [`into_raw`](Self::into_raw) and give it back with
/// [`from_raw`](Self::from_raw) or [`DialogTable::release`].
pub struct DialogRef<'t> {
    table: &'t DialogTable,
    key: DialogKey,
}

impl<'t> DialogRef<'t> {
    /// Wrap a reference the caller already took
    pub(crate) fn adopt(table: &'t DialogTable, key: DialogKey) -> Self {
        Self { table, key }
    }

    /// Take ownership of a reference previously leaked with
    /// [`into_raw`](Self::into_raw) or granted at insert time.
    pub fn from_raw(table: &'t DialogTable, key: DialogKey) -> Self {
        Self { table, key }
    }

    /// Keep the reference without the guard
    pub fn into_raw(self) -> DialogKey {
        let key = self.key;
        mem::forget(self);
        key
    }

    pub fn key(&self) -> DialogKey {
        self.key
    }

    pub fn table(&self) -> &'t DialogTable {
        self.table
    }

    /// Take one more reference on the same dialog
    pub fn try_clone(&self) -> Option<DialogRef<'t>> {
        self.table
            .ref_dialog(self.key, 1)
            .then(|| DialogRef::adopt(self.table, self.key))
    }

    pub fn state(&self) -> Option<DialogState> {
        self.table.state(self.key)
    }

    pub fn snapshot(&self) -> Option<DialogSnapshot> {
        self.table.snapshot(self.key, false)
    }

    /// See [`DialogTable::process_event`]
    pub fn process_event(&self, event: DialogEvent) -> Option<StateChange> {
        self.table.process_event(self.key, event)
    }
}

impl Drop for DialogRef<'_> {
    fn drop(&mut self) {
        self.table.release(self.key, 1);
    }
}

impl fmt::Debug for DialogRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DialogRef").field(&self.key).finish()
    }
}
