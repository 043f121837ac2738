//! Stored form of a dialog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialog::{DialogFlags, DialogKey, DialogState, LegInfo};
use crate::errors::{RegistryError, RegistryResult};
use crate::introspection::DialogSnapshot;

/// One row of the dialog table in storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogRecord {
    pub hash_entry: u32,
    pub hash_id: u32,
    pub callid: String,
    pub from_uri: String,
    pub from_tag: String,
    pub to_uri: String,
    pub to_tag: String,
    /// Numeric state code, 1 (UNCONFIRMED) to 5 (DELETED)
    pub state: u8,
    /// Unix timestamp, seconds
    pub start_time: i64,
    /// Lifetime in seconds
    pub timeout: u32,
    pub caller_cseq: String,
    pub callee_cseq: String,
    pub caller_route_set: String,
    pub callee_route_set: String,
    pub caller_contact: String,
    pub callee_contact: String,
    #[serde(default)]
    pub caller_sock: Option<String>,
    #[serde(default)]
    pub callee_sock: Option<String>,
}

impl DialogRecord {
    pub fn key(&self) -> DialogKey {
        DialogKey::new(self.hash_entry, self.hash_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.state == DialogState::Deleted.code()
    }
}

impl From<&DialogSnapshot> for DialogRecord {
    fn from(snapshot: &DialogSnapshot) -> Self {
        Self {
            hash_entry: snapshot.hash.bucket,
            hash_id: snapshot.hash.local_id,
            callid: snapshot.callid.clone(),
            from_uri: snapshot.from_uri.clone(),
            from_tag: snapshot.caller.tag.clone(),
            to_uri: snapshot.to_uri.clone(),
            to_tag: snapshot.callee.tag.clone(),
            state: snapshot.state.code(),
            start_time: snapshot.timestart.timestamp(),
            timeout: snapshot.timeout,
            caller_cseq: snapshot.caller.cseq.clone(),
            callee_cseq: snapshot.callee.cseq.clone(),
            caller_route_set: snapshot.caller.route_set.clone(),
            callee_route_set: snapshot.callee.route_set.clone(),
            caller_contact: snapshot.caller.contact.clone(),
            callee_contact: snapshot.callee.contact.clone(),
            caller_sock: snapshot.caller.bind_addr.clone(),
            callee_sock: snapshot.callee.bind_addr.clone(),
        }
    }
}

impl TryFrom<DialogRecord> for DialogSnapshot {
    type Error = RegistryError;

    fn try_from(record: DialogRecord) -> RegistryResult<Self> {
        let key = record.key();
        let state = DialogState::from_code(record.state).ok_or_else(|| {
            RegistryError::persistence(format!("{}: unknown state code {}", key, record.state))
        })?;
        let timestart = DateTime::<Utc>::from_timestamp(record.start_time, 0).ok_or_else(|| {
            RegistryError::persistence(format!("{}: bad start time {}", key, record.start_time))
        })?;
        if record.callid.is_empty() {
            return Err(RegistryError::persistence(format!("{}: empty callid", key)));
        }

        Ok(DialogSnapshot {
            hash: key,
            state,
            flags: DialogFlags::NONE,
            timestart,
            timeout: record.timeout,
            callid: record.callid,
            from_uri: record.from_uri,
            to_uri: record.to_uri,
            caller: LegInfo {
                tag: record.from_tag,
                contact: record.caller_contact,
                route_set: record.caller_route_set,
                cseq: record.caller_cseq,
                bind_addr: record.caller_sock,
            },
            callee: LegInfo {
                tag: record.to_tag,
                contact: record.callee_contact,
                route_set: record.callee_route_set,
                cseq: record.callee_cseq,
                bind_addr: record.callee_sock,
            },
            version: 0,
            context: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DialogRecord {
        DialogRecord {
            hash_entry: 3,
            hash_id: 7,
            callid: "abc@host".to_string(),
            from_uri: "sip:alice@example.com".to_string(),
            from_tag: "t1".to_string(),
            to_uri: "sip:bob@example.com".to_string(),
            to_tag: "t2".to_string(),
            state: 4,
            start_time: 1_700_000_000,
            timeout: 3600,
            caller_cseq: "1".to_string(),
            callee_cseq: "0".to_string(),
            caller_route_set: String::new(),
            callee_route_set: "<sip:proxy;lr>".to_string(),
            caller_contact: "sip:alice@10.0.0.1".to_string(),
            callee_contact: "sip:bob@10.0.0.2".to_string(),
            caller_sock: Some("udp:10.0.0.10:5060".to_string()),
            callee_sock: None,
        }
    }

    #[test]
    fn test_record_to_snapshot() {
        let snapshot = DialogSnapshot::try_from(record()).unwrap();
        assert_eq!(snapshot.hash, DialogKey::new(3, 7));
        assert_eq!(snapshot.state, DialogState::Confirmed);
        assert_eq!(snapshot.to_tag(), "t2");
        assert_eq!(snapshot.callee.route_set, "<sip:proxy;lr>");
        assert_eq!(snapshot.timestart.timestamp(), 1_700_000_000);
        assert_eq!(DialogRecord::from(&snapshot), record());
    }

    #[test]
    fn test_malformed_records() {
        let mut bad_state = record();
        bad_state.state = 9;
        assert!(matches!(
            DialogSnapshot::try_from(bad_state),
            Err(RegistryError::Persistence(_))
        ));

        let mut no_callid = record();
        no_callid.callid.clear();
        assert!(DialogSnapshot::try_from(no_callid).is_err());
    }
}
