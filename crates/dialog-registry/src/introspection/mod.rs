//! Read-only dialog views for management and introspection
//!
//! The registry does not render management replies. It hands out
//! [`DialogSnapshot`]s, serializable copies of a cell taken under its bucket
//! lock, and lets introspection observers add their own entries to the
//! snapshot's `context` map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dialog::{DialogCell, DialogFlags, DialogKey, DialogState, Leg, LegInfo};

/// Point-in-time copy of a dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogSnapshot {
    /// External key, `"<bucket>.<local_id>"`
    pub hash: DialogKey,
    pub state: DialogState,
    pub flags: DialogFlags,
    pub timestart: DateTime<Utc>,
    pub timeout: u32,
    pub callid: String,
    pub from_uri: String,
    pub to_uri: String,
    pub caller: LegInfo,
    pub callee: LegInfo,
    /// Change counter of the cell when the copy was taken
    #[serde(default)]
    pub version: u64,
    /// Entries added by introspection observers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl DialogSnapshot {
    pub fn from_cell(cell: &DialogCell) -> Self {
        Self {
            hash: cell.key(),
            state: cell.state(),
            flags: cell.flags(),
            timestart: cell.start_ts(),
            timeout: cell.timeout(),
            callid: cell.call_id().to_string(),
            from_uri: cell.from_uri().to_string(),
            to_uri: cell.to_uri().to_string(),
            caller: cell.leg(Leg::Caller).clone(),
            callee: cell.leg(Leg::Callee).clone(),
            version: cell.version(),
            context: None,
        }
    }

    pub fn key(&self) -> DialogKey {
        self.hash
    }

    pub fn leg(&self, leg: Leg) -> &LegInfo {
        match leg {
            Leg::Caller => &self.caller,
            Leg::Callee => &self.callee,
        }
    }

    pub fn from_tag(&self) -> &str {
        &self.caller.tag
    }

    pub fn to_tag(&self) -> &str {
        &self.callee.tag
    }
}
