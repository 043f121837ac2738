//! Dialog lookup by identifiers

use std::sync::Arc;

use rvoip_dialog_registry::{
    CallbackDispatcher, DialogEvent, DialogIdentity, DialogKey, DialogTable, Direction, Leg,
    LegInfo,
};

fn answered(table: &DialogTable, call_id: &str, caller_tag: &str, callee_tag: &str) -> DialogKey {
    let key = table
        .insert(DialogIdentity::new(call_id, "sip:alice@atlanta.com", "sip:bob@biloxi.com", caller_tag), 0)
        .unwrap();
    table
        .set_leg_info(key, Leg::Callee, LegInfo::new(callee_tag, "sip:bob@192.0.2.4", "1"))
        .unwrap();
    table.process_event(key, DialogEvent::SuccessResponse).unwrap();
    key
}

#[test]
fn test_both_orientations_find_the_dialog() {
    // many buckets so the two tags usually hash apart
    let table = DialogTable::new(1024, Arc::new(CallbackDispatcher::new())).unwrap();
    let key = answered(&table, "a84b4c76e66710", "1928301774", "a6c85cf");

    let (dialog, direction) = table.lookup_by_identity("a84b4c76e66710", "1928301774", "a6c85cf").unwrap();
    assert_eq!(dialog.key(), key);
    assert_eq!(direction, Direction::Downstream);
    drop(dialog);

    let (dialog, direction) = table.lookup_by_identity("a84b4c76e66710", "a6c85cf", "1928301774").unwrap();
    assert_eq!(dialog.key(), key);
    assert_eq!(direction, Direction::Upstream);
    drop(dialog);

    assert_eq!(table.ref_count(key), Some(1));
}

#[test]
fn test_mismatched_identifiers_are_not_found() {
    let table = DialogTable::new(64, Arc::new(CallbackDispatcher::new())).unwrap();
    answered(&table, "abc", "t1", "t2");

    assert!(table.lookup_by_identity("abc", "t1", "other").is_none());
    assert!(table.lookup_by_identity("abc", "t2", "t2").is_none());
    assert!(table.lookup_by_identity("xyz", "t1", "t2").is_none());
}

#[test]
fn test_identity_lookup_stops_at_deleted() {
    let table = DialogTable::new(64, Arc::new(CallbackDispatcher::new())).unwrap();
    let key = answered(&table, "abc", "t1", "t2");

    // an extra reference keeps the deleted cell linked
    assert!(table.ref_dialog(key, 1));
    table.process_event(key, DialogEvent::RequestBye).unwrap();
    assert_eq!(table.ref_count(key), Some(1));

    assert!(table.lookup_by_identity("abc", "t1", "t2").is_none());
    assert!(table.lookup_by_identity("abc", "t2", "t1").is_none());
    assert!(table.lookup_downstream("abc", Some("t1")).is_none());

    table.release(key, 1);
    assert!(table.is_empty());
}

#[test]
fn test_every_bucket_size_resolves_both_orientations() {
    for size in [1, 2, 3, 7, 16, 255] {
        let table = DialogTable::new(size, Arc::new(CallbackDispatcher::new())).unwrap();
        let keys: Vec<_> = (0..20)
            .map(|i| answered(&table, &format!("call{}", i), &format!("from{}", i), &format!("to{}", i)))
            .collect();

        for (i, key) in keys.iter().enumerate() {
            let (call_id, from, to) = (format!("call{}", i), format!("from{}", i), format!("to{}", i));
            let (down, _) = table.lookup_by_identity(&call_id, &from, &to).unwrap();
            let (up, _) = table.lookup_by_identity(&call_id, &to, &from).unwrap();
            assert_eq!(down.key(), *key, "size {}", size);
            assert_eq!(up.key(), *key, "size {}", size);
        }
    }
}

#[test]
fn test_lookup_downstream() {
    let table = DialogTable::new(128, Arc::new(CallbackDispatcher::new())).unwrap();
    let key = answered(&table, "abc", "t1", "t2");

    assert_eq!(table.lookup_downstream("abc", Some("t1")).unwrap().key(), key);
    assert_eq!(table.lookup_downstream("abc", None).unwrap().key(), key);
    assert!(table.lookup_downstream("abc", Some("t2")).is_none());
    assert!(table.lookup_downstream("zzz", None).is_none());
    assert_eq!(table.ref_count(key), Some(1));
}
