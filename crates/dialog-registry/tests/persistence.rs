//! Persistence modes against the in-memory store

#![cfg(feature = "persistence")]

use std::sync::Arc;
use std::time::Duration;

use rvoip_dialog_registry::persistence::{
    DialogRecord, InMemoryDialogStore, PersistenceConfig, PersistenceMode,
};
use rvoip_dialog_registry::{
    CallbackTypes, DialogEvent, DialogIdentity, DialogKey, DialogRegistry, DialogState, Leg,
    LegInfo, RegistryConfig,
};

fn registry(persistence: PersistenceConfig) -> DialogRegistry {
    DialogRegistry::new(
        RegistryConfig::default()
            .with_hash_size(32)
            .with_persistence(persistence),
    )
    .unwrap()
}

fn confirmed(registry: &DialogRegistry, call_id: &str) -> DialogKey {
    let table = registry.table();
    let key = table
        .insert(DialogIdentity::new(call_id, "sip:alice@atlanta.com", "sip:bob@biloxi.com", "1928301774"), 0)
        .unwrap();
    table
        .set_leg_info(key, Leg::Callee, LegInfo::new("a6c85cf", "sip:bob@192.0.2.4", "1"))
        .unwrap();
    table.process_event(key, DialogEvent::SuccessResponse).unwrap();
    key
}

#[tokio::test]
async fn test_realtime_writes_every_change() {
    let registry = registry(PersistenceConfig::new(PersistenceMode::Realtime));
    let store = Arc::new(InMemoryDialogStore::new());
    let handle = registry.start_persistence(store.clone()).unwrap();

    let live = confirmed(&registry, "live");
    let failed = registry
        .table()
        .insert(DialogIdentity::new("failed", "sip:a@x", "sip:b@x", "t1"), 0)
        .unwrap();
    registry.table().process_event(failed, DialogEvent::FailureResponse).unwrap();
    assert!(registry.table().state(failed).is_none());

    handle.shutdown().await.unwrap();

    assert_eq!(store.len(), 1);
    let record = store.get(live).unwrap();
    assert_eq!(record.state, DialogState::ConfirmedNa.code());
    assert_eq!(record.to_tag, "a6c85cf");
    assert_eq!(record.callee_contact, "sip:bob@192.0.2.4");
    assert!(store.get(failed).is_none());
}

#[tokio::test]
async fn test_realtime_destroy_racing_creation_leaves_no_record() {
    let registry = registry(PersistenceConfig::new(PersistenceMode::Realtime));

    // runs ahead of the persistence observer and tears the dialog down from
    // another thread before the creation is queued
    let table = Arc::downgrade(registry.table());
    registry.callbacks().register_fn(CallbackTypes::CREATED, move |dialog, _| {
        let table = table.upgrade().ok_or_else(|| anyhow::anyhow!("table gone"))?;
        let key = dialog.key();
        std::thread::spawn(move || table.process_event(key, DialogEvent::FailureResponse))
            .join()
            .map_err(|_| anyhow::anyhow!("teardown thread panicked"))?;
        Ok(())
    });

    let store = Arc::new(InMemoryDialogStore::new());
    let handle = registry.start_persistence(store.clone()).unwrap();

    let key = registry
        .table()
        .insert(DialogIdentity::new("raced", "sip:a@x", "sip:b@x", "t1"), 0)
        .unwrap();
    assert!(registry.table().state(key).is_none());

    handle.shutdown().await.unwrap();
    assert!(store.get(key).is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_shutdown_mode_saves_live_dialogs_once() {
    let registry = registry(PersistenceConfig::new(PersistenceMode::Shutdown));
    let store = Arc::new(InMemoryDialogStore::new());
    let handle = registry.start_persistence(store.clone()).unwrap();

    let live = confirmed(&registry, "live");
    let ended = confirmed(&registry, "ended");
    // the pending BYE transaction keeps the deleted dialog linked
    assert!(registry.table().ref_dialog(ended, 1));
    registry.table().process_event(ended, DialogEvent::RequestBye).unwrap();
    assert_eq!(registry.table().state(ended), Some(DialogState::Deleted));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.is_empty());

    handle.shutdown().await.unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.get(live).is_some());
    assert!(store.get(ended).is_none());
}

#[tokio::test]
async fn test_delayed_flushes_changed_dialogs_periodically() {
    let registry = registry(PersistenceConfig::new(PersistenceMode::Delayed).with_update_period(1));
    let store = Arc::new(InMemoryDialogStore::new());
    let handle = registry.start_persistence(store.clone()).unwrap();

    let key = confirmed(&registry, "delayed");
    assert!(store.is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.get(key).unwrap().state, DialogState::ConfirmedNa.code());
    // flushed dialogs are clean until they change again
    assert!(registry.table().take_dirty().is_empty());

    registry.table().release(key, 1);
    handle.shutdown().await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_load_restores_live_records() {
    let saved = registry(PersistenceConfig::new(PersistenceMode::Shutdown));
    let store = Arc::new(InMemoryDialogStore::new());
    let handle = saved.start_persistence(store.clone()).unwrap();
    let key = confirmed(&saved, "restored");
    handle.shutdown().await.unwrap();

    let mut deleted = store.get(key).unwrap();
    deleted.hash_id += 100;
    deleted.state = DialogState::Deleted.code();
    store.insert(deleted);

    let malformed = DialogRecord {
        hash_id: key.local_id + 200,
        state: 9,
        ..store.get(key).unwrap()
    };
    store.insert(malformed);
    assert_eq!(store.len(), 3);

    let restarted = registry(PersistenceConfig::default());
    assert_eq!(restarted.load(store.as_ref()).await.unwrap(), 1);

    let table = restarted.table();
    let snapshot = table.snapshot(key, false).unwrap();
    assert_eq!(snapshot.state, DialogState::ConfirmedNa);
    assert_eq!(snapshot.callee.tag, "a6c85cf");
    assert_eq!(table.ref_count(key), Some(1));

    let dialog = table.lookup_by_identity("restored", "a6c85cf", "1928301774").unwrap().0;
    assert_eq!(dialog.key(), key);
    drop(dialog);

    // new dialogs in the same bucket never reuse a restored id
    let next = table
        .insert(DialogIdentity::new("restored", "sip:a@x", "sip:b@x", "1928301774"), 0)
        .unwrap();
    assert_eq!(next.bucket, key.bucket);
    assert!(next.local_id > key.local_id);

    // a second load finds the dialog already linked
    assert_eq!(restarted.load(store.as_ref()).await.unwrap(), 0);
}
