//! Dialog Matching Logic for SIP Request Routing
//!
//! According to RFC 3261 Section 12.2, a dialog is identified by the Call-ID
//! and the two endpoint tags. Either side may send the next request, so the
//! From/To tags of a request can show up in either orientation relative to the
//! caller/callee tags stored on the dialog.

use serde::{Deserialize, Serialize};

use crate::dialog::{DialogCell, Leg};

/// Orientation of a request relative to the dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Caller to callee: From-tag is the caller tag
    Downstream,
    /// Callee to caller: From-tag is the callee tag
    Upstream,
}

/// Match a request's identifiers against a dialog, trying both orientations.
pub fn match_dialog(cell: &DialogCell, call_id: &str, from_tag: &str, to_tag: &str) -> Option<Direction> {
    if cell.call_id() != call_id {
        return None;
    }

    let caller = cell.tag(Leg::Caller);
    let callee = cell.tag(Leg::Callee);

    if from_tag == caller && to_tag == callee {
        Some(Direction::Downstream)
    } else if from_tag == callee && to_tag == caller {
        Some(Direction::Upstream)
    } else {
        None
    }
}

/// Match on Call-ID and, when given, the caller tag only.
pub fn match_downstream(cell: &DialogCell, call_id: &str, from_tag: Option<&str>) -> bool {
    cell.call_id() == call_id && from_tag.map_or(true, |tag| tag == cell.tag(Leg::Caller))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{DialogIdentity, DialogKey, LegInfo};

    fn cell() -> DialogCell {
        let mut cell = DialogCell::new(
            DialogKey::new(0, 0),
            DialogIdentity::new("abc", "sip:a@x", "sip:b@x", "t1"),
            60,
        );
        cell.set_leg_info(Leg::Callee, LegInfo::new("t2", "sip:b@y", "1")).unwrap();
        cell
    }

    #[test]
    fn test_both_orientations() {
        let cell = cell();
        assert_eq!(match_dialog(&cell, "abc", "t1", "t2"), Some(Direction::Downstream));
        assert_eq!(match_dialog(&cell, "abc", "t2", "t1"), Some(Direction::Upstream));
        assert_eq!(match_dialog(&cell, "abc", "t1", "t1"), None);
        assert_eq!(match_dialog(&cell, "other", "t1", "t2"), None);
    }

    #[test]
    fn test_downstream_match() {
        let cell = cell();
        assert!(match_downstream(&cell, "abc", None));
        assert!(match_downstream(&cell, "abc", Some("t1")));
        assert!(!match_downstream(&cell, "abc", Some("t2")));
    }
}
