//! Dialog states, protocol events and cell flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a dialog
///
/// The numeric codes are the ones persisted in the `state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    /// Initial request seen, no response yet
    Unconfirmed,
    /// Provisional response received
    Early,
    /// 2xx received, ACK not yet seen
    ConfirmedNa,
    /// 2xx acknowledged
    Confirmed,
    /// Torn down, waiting for the last reference to go away
    Deleted,
}

impl DialogState {
    /// Numeric code used by the persistence layer
    pub fn code(self) -> u8 {
        match self {
            DialogState::Unconfirmed => 1,
            DialogState::Early => 2,
            DialogState::ConfirmedNa => 3,
            DialogState::Confirmed => 4,
            DialogState::Deleted => 5,
        }
    }

    /// Inverse of [`DialogState::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DialogState::Unconfirmed),
            2 => Some(DialogState::Early),
            3 => Some(DialogState::ConfirmedNa),
            4 => Some(DialogState::Confirmed),
            5 => Some(DialogState::Deleted),
            _ => None,
        }
    }

    pub fn is_deleted(self) -> bool {
        self == DialogState::Deleted
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, DialogState::ConfirmedNa | DialogState::Confirmed)
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialogState::Unconfirmed => "UNCONFIRMED",
            DialogState::Early => "EARLY",
            DialogState::ConfirmedNa => "CONFIRMED_NA",
            DialogState::Confirmed => "CONFIRMED",
            DialogState::Deleted => "DELETED",
        };
        f.write_str(name)
    }
}

/// Protocol events driving the dialog state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogEvent {
    /// The transaction that created the dialog was destroyed
    TransactionDestroyed,
    /// 1xx response
    ProvisionalResponse,
    /// 3xx-6xx response
    FailureResponse,
    /// 2xx response
    SuccessResponse,
    /// In-dialog ACK
    RequestAck,
    /// In-dialog BYE
    RequestBye,
    /// In-dialog PRACK
    RequestPrack,
    /// Any other in-dialog request
    Request,
}

impl DialogEvent {
    /// All events, in the column order of the transition table
    pub const ALL: [DialogEvent; 8] = [
        DialogEvent::TransactionDestroyed,
        DialogEvent::ProvisionalResponse,
        DialogEvent::FailureResponse,
        DialogEvent::SuccessResponse,
        DialogEvent::RequestAck,
        DialogEvent::RequestBye,
        DialogEvent::RequestPrack,
        DialogEvent::Request,
    ];
}

impl fmt::Display for DialogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialogEvent::TransactionDestroyed => "transaction-destroyed",
            DialogEvent::ProvisionalResponse => "provisional-response",
            DialogEvent::FailureResponse => "failure-response",
            DialogEvent::SuccessResponse => "success-response",
            DialogEvent::RequestAck => "request-ACK",
            DialogEvent::RequestBye => "request-BYE",
            DialogEvent::RequestPrack => "request-PRACK",
            DialogEvent::Request => "request",
        };
        f.write_str(name)
    }
}

/// Bitset of per-cell flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogFlags(u32);

impl DialogFlags {
    pub const NONE: DialogFlags = DialogFlags(0);
    /// Never written to the store
    pub const NEW: DialogFlags = DialogFlags(1 << 0);
    /// Stored copy is stale
    pub const CHANGED: DialogFlags = DialogFlags(1 << 1);
    /// A BYE was processed; blocks the late-2xx revival
    pub const HAS_BYE: DialogFlags = DialogFlags(1 << 2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: DialogFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: DialogFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: DialogFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DialogFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for DialogFlags {
    type Output = DialogFlags;

    fn bitor(self, rhs: DialogFlags) -> DialogFlags {
        DialogFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DialogFlags {
    fn bitor_assign(&mut self, rhs: DialogFlags) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_roundtrip() {
        for state in [
            DialogState::Unconfirmed,
            DialogState::Early,
            DialogState::ConfirmedNa,
            DialogState::Confirmed,
            DialogState::Deleted,
        ] {
            assert_eq!(DialogState::from_code(state.code()), Some(state));
        }
        assert_eq!(DialogState::from_code(0), None);
        assert_eq!(DialogState::from_code(6), None);
    }

    #[test]
    fn test_flags() {
        let mut flags = DialogFlags::NEW;
        assert!(flags.contains(DialogFlags::NEW));
        assert!(!flags.contains(DialogFlags::HAS_BYE));

        flags |= DialogFlags::HAS_BYE;
        assert!(flags.contains(DialogFlags::NEW | DialogFlags::HAS_BYE));
        assert!(flags.intersects(DialogFlags::CHANGED | DialogFlags::NEW));

        flags.remove(DialogFlags::NEW);
        assert!(!flags.intersects(DialogFlags::NEW | DialogFlags::CHANGED));
        assert!(flags.contains(DialogFlags::HAS_BYE));
    }
}
