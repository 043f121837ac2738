//! Profile structure and membership links

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::error;

use crate::dialog::DialogKey;
use crate::errors::{RegistryError, RegistryResult};
use crate::table::hash::{core_hash, key_hash};

/// Default number of buckets per profile
pub const PROFILE_HASH_SIZE: u32 = 16;

/// Identifier shared by both sides of one membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

/// One membership of a dialog in a profile, as held by the dialog cell
#[derive(Clone)]
pub struct ProfileLink {
    id: LinkId,
    profile: Arc<DialogProfile>,
    value: Option<String>,
    hash: u32,
}

impl ProfileLink {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn profile(&self) -> &Arc<DialogProfile> {
        &self.profile
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Profile bucket the membership lives in
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Same profile and, for value profiles, the exact same value
    pub fn matches(&self, profile: &DialogProfile, value: Option<&str>) -> bool {
        if !std::ptr::eq(Arc::as_ptr(&self.profile), profile) {
            return false;
        }
        !profile.has_value || self.value.as_deref() == value
    }
}

impl fmt::Debug for ProfileLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileLink")
            .field("id", &self.id)
            .field("profile", &self.profile.name)
            .field("value", &self.value)
            .field("hash", &self.hash)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Member {
    link: LinkId,
    dialog: DialogKey,
    value: Option<String>,
}

#[derive(Debug, Default)]
struct ProfileBucket {
    // insertion order is kept, new members go to the tail
    members: VecDeque<Member>,
}

/// A named secondary index over dialogs
pub struct DialogProfile {
    name: String,
    has_value: bool,
    size: u32,
    next_link: AtomicU64,
    buckets: Mutex<Vec<ProfileBucket>>,
}

impl DialogProfile {
    /// Validate and allocate a profile.
    pub(crate) fn new(name: &str, size: u32, has_value: bool) -> RegistryResult<Self> {
        if name.is_empty() {
            return Err(RegistryError::InvalidProfileName {
                name: name.to_string(),
                reason: "empty name".to_string(),
            });
        }
        if let Some(bad) = name.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(RegistryError::InvalidProfileName {
                name: name.to_string(),
                reason: format!("char {:?} - use only alphanumerical characters", bad),
            });
        }
        if !size.is_power_of_two() {
            return Err(RegistryError::InvalidProfileSize(size));
        }

        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(size as usize)
            .map_err(|_| RegistryError::exhausted(format!("profile <{}> buckets", name)))?;
        buckets.resize_with(size as usize, ProfileBucket::default);

        Ok(Self {
            name: name.to_string(),
            has_value,
            size,
            next_link: AtomicU64::new(1),
            buckets: Mutex::new(buckets),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bucket for a membership: the value for value profiles, the dialog's
    /// stable key otherwise.
    pub fn bucket_for(&self, value: Option<&str>, dialog: DialogKey) -> u32 {
        match (self.has_value, value) {
            (true, Some(value)) => core_hash(value, None, self.size),
            _ => key_hash(dialog, self.size),
        }
    }

    /// Build the dialog-side half of a new membership
    pub(crate) fn new_link(
        self: &Arc<Self>,
        dialog: DialogKey,
        value: Option<&str>,
    ) -> RegistryResult<ProfileLink> {
        let value = if self.has_value {
            let value = value.ok_or_else(|| RegistryError::MissingProfileValue(self.name.clone()))?;
            Some(value.to_string())
        } else {
            None
        };

        let id = LinkId(self.next_link.fetch_add(1, Ordering::Relaxed));
        let hash = self.bucket_for(value.as_deref(), dialog);

        Ok(ProfileLink {
            id,
            profile: Arc::clone(self),
            value,
            hash,
        })
    }

    /// Add the profile-side half of a membership
    pub(crate) fn insert_member(&self, link: &ProfileLink, dialog: DialogKey) {
        let mut buckets = self.buckets.lock();
        buckets[link.hash as usize].members.push_back(Member {
            link: link.id,
            dialog,
            value: link.value.clone(),
        });
    }

    /// Remove the profile-side half of a membership
    pub(crate) fn remove_member(&self, link: &ProfileLink) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = &mut buckets[link.hash as usize];

        match bucket.members.iter().position(|m| m.link == link.id) {
            Some(pos) => {
                bucket.members.remove(pos);
                true
            }
            None => {
                error!(
                    critical = true,
                    profile = %self.name,
                    link = ?link.id,
                    hash = link.hash,
                    "profile member missing from its bucket"
                );
                false
            }
        }
    }

    /// Number of memberships, optionally restricted to one value
    pub fn count(&self, value: Option<&str>) -> usize {
        let buckets = self.buckets.lock();
        match self.value_filter(value) {
            None => buckets.iter().map(|b| b.members.len()).sum(),
            Some(value) => {
                let hash = core_hash(value, None, self.size) as usize;
                buckets[hash]
                    .members
                    .iter()
                    .filter(|m| m.value.as_deref() == Some(value))
                    .count()
            }
        }
    }

    /// Dialogs holding a membership, optionally restricted to one value.
    ///
    /// A dialog tagged several times appears once per membership.
    pub fn dialogs(&self, value: Option<&str>) -> Vec<DialogKey> {
        let filter = self.value_filter(value);
        let buckets = self.buckets.lock();
        buckets
            .iter()
            .flat_map(|b| b.members.iter())
            .filter(|m| filter.is_none() || m.value.as_deref() == filter)
            .map(|m| m.dialog)
            .collect()
    }

    /// Per-bucket membership counts
    pub fn bucket_counts(&self) -> Vec<usize> {
        self.buckets.lock().iter().map(|b| b.members.len()).collect()
    }

    fn value_filter<'v>(&self, value: Option<&'v str>) -> Option<&'v str> {
        if self.has_value { value } else { None }
    }
}

impl fmt::Debug for DialogProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogProfile")
            .field("name", &self.name)
            .field("has_value", &self.has_value)
            .field("size", &self.size)
            .finish()
    }
}
