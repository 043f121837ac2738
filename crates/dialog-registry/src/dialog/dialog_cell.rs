//! The per-call entity stored in the dialog table
//!
//! A [`DialogCell`] is owned by its bucket for as long as it is linked. Every
//! field is read and written with the bucket lock held; code outside the table
//! only ever sees a cell by reference inside a table callback, or by value once
//! it has been unlinked for destruction.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dialog_key::DialogKey;
use super::dialog_state::{DialogFlags, DialogState};
use crate::events::RegisteredObserver;
use crate::profile::ProfileLink;
use crate::timer::{TimerHandle, TimerSlot};

/// One side of a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    Caller = 0,
    Callee = 1,
}

impl Leg {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> Leg {
        match self {
            Leg::Caller => Leg::Callee,
            Leg::Callee => Leg::Caller,
        }
    }
}

/// Mutable per-leg data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegInfo {
    /// From-tag (caller) or To-tag (callee)
    pub tag: String,
    /// Contact URI of the leg
    pub contact: String,
    /// Record-Route set as seen on the wire
    pub route_set: String,
    /// Last CSeq number seen on the leg
    pub cseq: String,
    /// Local socket the leg was seen on
    pub bind_addr: Option<String>,
}

impl LegInfo {
    pub fn new(tag: impl Into<String>, contact: impl Into<String>, cseq: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            contact: contact.into(),
            cseq: cseq.into(),
            ..Default::default()
        }
    }

    pub fn with_route_set(mut self, route_set: impl Into<String>) -> Self {
        self.route_set = route_set.into();
        self
    }

    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = Some(bind_addr.into());
        self
    }
}

/// Identifiers of a new call, as seen on its initial request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogIdentity {
    pub call_id: String,
    pub from_uri: String,
    pub to_uri: String,
    pub from_tag: String,
}

impl DialogIdentity {
    pub fn new(
        call_id: impl Into<String>,
        from_uri: impl Into<String>,
        to_uri: impl Into<String>,
        from_tag: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            from_uri: from_uri.into(),
            to_uri: to_uri.into(),
            from_tag: from_tag.into(),
        }
    }
}

/// A dialog tracked by the registry
pub struct DialogCell {
    pub(crate) key: DialogKey,
    pub(crate) call_id: String,
    pub(crate) from_uri: String,
    pub(crate) to_uri: String,
    pub(crate) legs: [LegInfo; 2],
    pub(crate) state: DialogState,
    pub(crate) flags: DialogFlags,
    pub(crate) ref_count: u32,
    pub(crate) start_ts: DateTime<Utc>,
    pub(crate) timeout: u32,
    pub(crate) profile_links: Vec<ProfileLink>,
    pub(crate) timer: Option<TimerSlot>,
    pub(crate) observers: Vec<RegisteredObserver>,
    /// Bumped on every change a store or observer may see
    pub(crate) version: u64,
}

impl DialogCell {
    /// Build an unlinked cell in UNCONFIRMED state
    pub(crate) fn new(key: DialogKey, identity: DialogIdentity, timeout: u32) -> Self {
        let DialogIdentity {
            call_id,
            from_uri,
            to_uri,
            from_tag,
        } = identity;

        let caller = LegInfo {
            tag: from_tag,
            ..Default::default()
        };

        Self {
            key,
            call_id,
            from_uri,
            to_uri,
            legs: [caller, LegInfo::default()],
            state: DialogState::Unconfirmed,
            flags: DialogFlags::NEW,
            ref_count: 0,
            start_ts: Utc::now(),
            timeout,
            profile_links: Vec::new(),
            timer: None,
            observers: Vec::new(),
            version: 0,
        }
    }

    pub fn key(&self) -> DialogKey {
        self.key
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn from_uri(&self) -> &str {
        &self.from_uri
    }

    pub fn to_uri(&self) -> &str {
        &self.to_uri
    }

    pub fn leg(&self, leg: Leg) -> &LegInfo {
        &self.legs[leg.index()]
    }

    pub fn tag(&self, leg: Leg) -> &str {
        &self.legs[leg.index()].tag
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn flags(&self) -> DialogFlags {
        self.flags
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn start_ts(&self) -> DateTime<Utc> {
        self.start_ts
    }

    /// Lifetime in seconds
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn profile_links(&self) -> &[ProfileLink] {
        &self.profile_links
    }

    /// Handle of an armed timer. `None` while `schedule` is still running.
    pub fn timer(&self) -> Option<TimerHandle> {
        self.timer.and_then(TimerSlot::handle)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.flags.insert(DialogFlags::CHANGED);
    }

    /// Replace all per-leg data.
    ///
    /// The caller tag picks the home bucket of the dialog, so it cannot change
    /// once the dialog is linked. An empty tag keeps the current one.
    pub(crate) fn set_leg_info(&mut self, leg: Leg, mut info: LegInfo) -> Result<(), String> {
        if leg == Leg::Caller {
            let current = &self.legs[Leg::Caller.index()].tag;
            if info.tag.is_empty() {
                info.tag = current.clone();
            } else if info.tag != *current {
                return Err(format!("caller tag is fixed to {:?}, got {:?}", current, info.tag));
            }
        }
        self.legs[leg.index()] = info;
        self.touch();
        Ok(())
    }

    pub(crate) fn update_cseq(&mut self, leg: Leg, cseq: &str) {
        let slot = &mut self.legs[leg.index()].cseq;
        slot.clear();
        slot.push_str(cseq);
        self.touch();
    }
}

impl fmt::Debug for DialogCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogCell")
            .field("key", &self.key)
            .field("call_id", &self.call_id)
            .field("caller_tag", &self.legs[0].tag)
            .field("callee_tag", &self.legs[1].tag)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("ref_count", &self.ref_count)
            .field("profile_links", &self.profile_links.len())
            .field("timer", &self.timer)
            .field("observers", &self.observers.len())
            .field("version", &self.version)
            .finish()
    }
}
