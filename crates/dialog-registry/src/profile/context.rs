//! Per-request profile state
//!
//! Scripts may tag a request with profiles before the dialog it belongs to
//! exists. [`RequestContext`] keeps those tags pending and attaches them once
//! the dialog is set for the same request; for any other request they are
//! dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use super::membership::{attach, detach, is_member};
use super::profile_table::DialogProfile;
use crate::errors::{RegistryError, RegistryResult};
use crate::table::{DialogRef, DialogTable};

#[derive(Debug)]
struct PendingLink {
    profile: Arc<DialogProfile>,
    value: Option<String>,
}

/// Profile state of the request a worker is currently processing.
///
/// One context per worker, never shared. Dropping it releases the current
/// dialog reference.
#[derive(Debug)]
pub struct RequestContext<'t> {
    table: &'t DialogTable,
    request_id: Option<u64>,
    current: Option<DialogRef<'t>>,
    pending: Vec<PendingLink>,
}

impl<'t> RequestContext<'t> {
    pub fn new(table: &'t DialogTable) -> Self {
        Self {
            table,
            request_id: None,
            current: None,
            pending: Vec::new(),
        }
    }

    pub fn table(&self) -> &'t DialogTable {
        self.table
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    /// Switch to `request_id`. Leaving another request drops its dialog
    /// reference and its pending profiles.
    pub fn begin_request(&mut self, request_id: u64) {
        if self.request_id != Some(request_id) {
            self.reset();
            self.request_id = Some(request_id);
        }
    }

    /// Forget the current request
    pub fn reset(&mut self) {
        self.request_id = None;
        self.current = None;
        self.discard_pending();
    }

    pub fn current_dialog(&self) -> Option<&DialogRef<'t>> {
        self.current.as_ref()
    }

    /// Make `dialog` the current dialog of `request_id`.
    ///
    /// Profiles set earlier during the same request are attached now; those
    /// of another request are discarded.
    pub fn set_current_dialog(&mut self, request_id: u64, dialog: DialogRef<'t>) {
        if self.request_id == Some(request_id) {
            for pending in self.pending.drain(..) {
                if let Err(e) = attach(&dialog, &pending.profile, pending.value.as_deref()) {
                    warn!(dialog = %dialog.key(), profile = %pending.profile.name(), "failed to attach pending profile: {}", e);
                }
            }
        } else {
            self.discard_pending();
            self.request_id = Some(request_id);
        }
        self.current = Some(dialog);
    }

    /// Tag the current dialog, or remember the tag until there is one
    pub fn set_profile(&mut self, profile: &Arc<DialogProfile>, value: Option<&str>) -> RegistryResult<()> {
        if profile.has_value() && value.is_none() {
            return Err(RegistryError::MissingProfileValue(profile.name().to_string()));
        }

        match &self.current {
            Some(dialog) => attach(dialog, profile, value),
            None => {
                self.pending.push(PendingLink {
                    profile: Arc::clone(profile),
                    value: value.filter(|_| profile.has_value()).map(str::to_string),
                });
                Ok(())
            }
        }
    }

    /// Remove a tag from the current dialog
    pub fn unset_profile(&mut self, profile: &DialogProfile, value: Option<&str>) -> RegistryResult<bool> {
        let dialog = self.current.as_ref().ok_or(RegistryError::NoCurrentDialog)?;
        Ok(detach(dialog, profile, value))
    }

    /// Whether the current dialog carries the tag. Pending tags do not count.
    pub fn is_in_profile(&self, profile: &DialogProfile, value: Option<&str>) -> bool {
        self.current
            .as_ref()
            .is_some_and(|dialog| is_member(dialog, profile, value))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "discarding pending profiles");
            self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::DialogIdentity;
    use crate::events::CallbackDispatcher;

    fn setup() -> (DialogTable, Arc<DialogProfile>) {
        let table = DialogTable::new(16, Arc::new(CallbackDispatcher::new())).unwrap();
        let profile = Arc::new(DialogProfile::new("user", 16, true).unwrap());
        (table, profile)
    }

    #[test]
    fn test_pending_profiles_flush_on_same_request() {
        let (table, profile) = setup();
        let key = table
            .insert(DialogIdentity::new("abc", "sip:a@x", "sip:b@x", "t1"), 0)
            .unwrap();

        let mut ctx = RequestContext::new(&table);
        ctx.begin_request(1);
        ctx.set_profile(&profile, Some("alice")).unwrap();
        assert_eq!(ctx.pending_len(), 1);
        assert_eq!(profile.count(None), 0);

        ctx.set_current_dialog(1, table.lookup(key).unwrap());
        assert_eq!(ctx.pending_len(), 0);
        assert!(ctx.is_in_profile(&profile, Some("alice")));
        assert_eq!(table.ref_count(key), Some(2));

        drop(ctx);
        assert_eq!(table.ref_count(key), Some(1));
    }

    #[test]
    fn test_pending_profiles_dropped_for_other_request() {
        let (table, profile) = setup();
        let key = table
            .insert(DialogIdentity::new("abc", "sip:a@x", "sip:b@x", "t1"), 0)
            .unwrap();

        let mut ctx = RequestContext::new(&table);
        ctx.begin_request(1);
        ctx.set_profile(&profile, Some("alice")).unwrap();

        ctx.set_current_dialog(2, table.lookup(key).unwrap());
        assert_eq!(ctx.pending_len(), 0);
        assert!(!ctx.is_in_profile(&profile, Some("alice")));
        assert_eq!(ctx.request_id(), Some(2));
    }

    #[test]
    fn test_unset_without_dialog() {
        let (table, profile) = setup();
        let mut ctx = RequestContext::new(&table);
        assert_eq!(
            ctx.unset_profile(&profile, Some("alice")),
            Err(RegistryError::NoCurrentDialog)
        );
        assert!(!ctx.is_in_profile(&profile, Some("alice")));
    }

    #[test]
    fn test_new_request_releases_dialog() {
        let (table, _) = setup();
        let key = table
            .insert(DialogIdentity::new("abc", "sip:a@x", "sip:b@x", "t1"), 0)
            .unwrap();

        let mut ctx = RequestContext::new(&table);
        ctx.set_current_dialog(7, table.lookup(key).unwrap());
        assert_eq!(table.ref_count(key), Some(2));

        ctx.begin_request(7);
        assert_eq!(table.ref_count(key), Some(2));
        ctx.begin_request(8);
        assert_eq!(table.ref_count(key), Some(1));
        assert!(ctx.current_dialog().is_none());
    }
}
