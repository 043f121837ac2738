//! Concurrent access tests
//!
//! Many threads inserting into one bucket, and many threads taking and
//! dropping references on one dialog.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rvoip_dialog_registry::{CallbackDispatcher, CallbackTypes, DialogIdentity, DialogTable};

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

#[test]
fn test_concurrent_inserts_into_one_bucket_get_unique_increasing_ids() {
    // a single bucket forces every insert through the same lock
    let table = Arc::new(DialogTable::new(1, Arc::new(CallbackDispatcher::new())).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let table = table.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|i| {
                        let call_id = format!("call-{}-{}", t, i);
                        table.insert(DialogIdentity::new(call_id, "sip:a@x", "sip:b@x", "tag"), 0).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let keys = handle.join().unwrap();
        assert!(keys.windows(2).all(|w| w[0].local_id < w[1].local_id));
        for key in keys {
            assert_eq!(key.bucket, 0);
            assert!(all.insert(key), "duplicate key {}", key);
        }
    }
    assert_eq!(all.len(), THREADS * PER_THREAD);

    // bucket order follows local_id
    let snapshots = table.snapshot_all(false);
    assert!(snapshots.windows(2).all(|w| w[0].hash.local_id < w[1].hash.local_id));
    assert_eq!(snapshots.len(), THREADS * PER_THREAD);
}

#[test]
fn test_concurrent_references_destroy_exactly_once() {
    let callbacks = Arc::new(CallbackDispatcher::new());
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = destroyed.clone();
    callbacks.register_fn(CallbackTypes::DESTROYED, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let table = Arc::new(DialogTable::new(64, callbacks).unwrap());
    let key = table
        .insert(DialogIdentity::new("abc", "sip:a@x", "sip:b@x", "t1"), 0)
        .unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = table.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    let dialog = table.lookup(key).expect("dialog alive while the table holds it");
                    let extra = dialog.try_clone().unwrap();
                    drop(dialog);
                    // hand the reference over as a raw key and take it back
                    let raw = extra.into_raw();
                    table.release(raw, 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.ref_count(key), Some(1));
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    table.release(key, 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(table.is_empty());
    assert_eq!(table.stats().snapshot().ref_anomalies, 0);
}

#[test]
fn test_concurrent_lifecycles_across_buckets() {
    use rvoip_dialog_registry::DialogEvent;

    let table = Arc::new(DialogTable::new(32, Arc::new(CallbackDispatcher::new())).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let table = table.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let from_tag = format!("ft{}", i);
                    let key = table
                        .insert(DialogIdentity::new(format!("c{}-{}", t, i), "sip:a@x", "sip:b@x", from_tag), 1)
                        .unwrap();
                    table.process_event(key, DialogEvent::SuccessResponse).unwrap();
                    table.process_event(key, DialogEvent::RequestAck).unwrap();
                    table.process_event(key, DialogEvent::RequestBye).unwrap();
                    table.process_event(key, DialogEvent::TransactionDestroyed).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = table.stats().snapshot();
    assert!(table.is_empty());
    assert_eq!(stats.created, (THREADS * PER_THREAD) as u64);
    assert_eq!(stats.destroyed, stats.created);
    assert_eq!(stats.invalid_transitions, 0);
    assert_eq!(stats.ref_anomalies, 0);
}
