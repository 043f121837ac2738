//! Attaching dialogs to profiles

use std::sync::Arc;

use tracing::{debug, error};

use super::profile_table::DialogProfile;
use crate::errors::{RegistryError, RegistryResult};
use crate::table::DialogRef;

/// Tag `dialog` with `profile` (and `value`, for value profiles).
///
/// A dialog may be tagged with the same profile and value several times;
/// every attach creates a distinct membership.
pub fn attach(
    dialog: &DialogRef<'_>,
    profile: &Arc<DialogProfile>,
    value: Option<&str>,
) -> RegistryResult<()> {
    let key = dialog.key();
    let link = profile.new_link(key, value)?;

    profile.insert_member(&link, key);

    if let Err(link) = dialog.table().push_profile_link(key, link) {
        // only reachable if the reference held by `dialog` was over-released
        error!(critical = true, dialog = %key, profile = %profile.name(), "dialog vanished while linking profile");
        profile.remove_member(&link);
        return Err(RegistryError::DialogNotFound(key));
    }

    debug!(dialog = %key, profile = %profile.name(), value, "dialog attached to profile");
    Ok(())
}

/// Remove one membership of `dialog` in `profile` matching `value`.
///
/// Returns `false` when there was none.
pub fn detach(dialog: &DialogRef<'_>, profile: &DialogProfile, value: Option<&str>) -> bool {
    let key = dialog.key();
    match dialog.table().take_profile_link(key, profile, value) {
        Some(link) => {
            link.profile().remove_member(&link);
            debug!(dialog = %key, profile = %profile.name(), value, "dialog detached from profile");
            true
        }
        None => false,
    }
}

/// Whether `dialog` holds a membership in `profile` matching `value`.
///
/// For profiles without value, `value` is ignored.
pub fn is_member(dialog: &DialogRef<'_>, profile: &DialogProfile, value: Option<&str>) -> bool {
    dialog.table().has_profile_link(dialog.key(), profile, value)
}
