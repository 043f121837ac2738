//! Sharded dialog table
//!
//! The table is a fixed array of buckets. A bucket keeps its cells ordered by
//! `local_id`; the lock guarding it comes from a [`LockSet`] so many buckets
//! share one mutex. Cells stay linked until their reference count drops to
//! zero. A DELETED cell may linger for a while; every lookup skips it.
//!
//! Nothing outside the table ever runs with a bucket lock held: observers,
//! the timer service and profile locks are all reached after the guard has
//! been dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{MappedMutexGuard, MutexGuard};
use serde_json::Map;
use tracing::{debug, error, info, trace, warn};

use super::dialog_ref::DialogRef;
use super::hash::core_hash;
use super::stats::TableStats;
use crate::config::RegistryConfig;
use crate::dialog::{
    self, DialogCell, DialogEvent, DialogFlags, DialogIdentity, DialogKey, DialogState, Leg,
    LegInfo,
};
use crate::errors::{RegistryError, RegistryResult};
use crate::events::{
    CallbackDispatcher, CallbackTypes, DialogNotification, DialogObserver, RegisteredObserver,
};
use crate::introspection::DialogSnapshot;
use crate::locking::{stripe_len, LockSet};
use crate::profile::{DialogProfile, ProfileLink};
use crate::routing::{match_dialog, match_downstream, Direction};
use crate::timer::{DialogTimer, TimerHandle, TimerSlot};

/// Default dialog lifetime, in seconds
pub const DEFAULT_TIMEOUT: u32 = 43200;

#[derive(Debug, Default)]
struct Bucket {
    cells: BTreeMap<u32, DialogCell>,
    next_id: u32,
}

/// Buckets guarded by one lock of the set
#[derive(Debug)]
struct Stripe {
    buckets: Vec<Bucket>,
}

impl Stripe {
    fn new(len: usize) -> RegistryResult<Self> {
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(len)
            .map_err(|_| RegistryError::exhausted(format!("{} dialog buckets", len)))?;
        buckets.resize_with(len, Bucket::default);
        Ok(Self { buckets })
    }
}

/// Outcome of feeding one event to a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub old: DialogState,
    pub new: DialogState,
    /// References the caller must release
    pub unref: u32,
}

impl StateChange {
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}

/// Observers to notify once the bucket lock is gone
type Pending = Option<(DialogSnapshot, Vec<RegisteredObserver>)>;

/// The concurrent dialog store
pub struct DialogTable {
    size: u32,
    default_timeout: u32,
    locks: LockSet<Stripe>,
    callbacks: Arc<CallbackDispatcher>,
    timer: Option<Arc<dyn DialogTimer>>,
    stats: TableStats,
}

impl DialogTable {
    /// Build a table of `size` buckets.
    ///
    /// Fails if no lock set can be allocated or the buckets cannot be
    /// reserved. Both are startup errors.
    pub fn new(size: u32, callbacks: Arc<CallbackDispatcher>) -> RegistryResult<Self> {
        if size == 0 {
            return Err(RegistryError::config("dialog table size must be at least 1"));
        }

        let buckets = size as usize;
        let locks = LockSet::new(buckets, |index, count| {
            Stripe::new(stripe_len(buckets, index, count))
        })?;

        info!(size, locks = locks.len(), "dialog table initialized");

        Ok(Self {
            size,
            default_timeout: DEFAULT_TIMEOUT,
            locks,
            callbacks,
            timer: None,
            stats: TableStats::default(),
        })
    }

    pub fn from_config(
        config: &RegistryConfig,
        callbacks: Arc<CallbackDispatcher>,
    ) -> RegistryResult<Self> {
        Ok(Self::new(config.hash_size, callbacks)?.with_default_timeout(config.default_timeout))
    }

    /// Attach the timer service used by [`start_timer`](Self::start_timer)
    pub fn with_timer(mut self, timer: Arc<dyn DialogTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_default_timeout(mut self, seconds: u32) -> Self {
        self.default_timeout = seconds;
        self
    }

    /// Number of buckets
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of bucket locks actually allocated
    pub fn locks_count(&self) -> usize {
        self.locks.len()
    }

    pub fn default_timeout(&self) -> u32 {
        self.default_timeout
    }

    pub fn callbacks(&self) -> &Arc<CallbackDispatcher> {
        &self.callbacks
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    /// Linked cells, DELETED ones included
    pub fn len(&self) -> usize {
        (0..self.locks.len())
            .map(|index| {
                let stripe = self.locks.lock_at(index);
                stripe.buckets.iter().map(|b| b.cells.len()).sum::<usize>()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket(&self, bucket: u32) -> Option<MappedMutexGuard<'_, Bucket>> {
        if bucket >= self.size {
            return None;
        }
        let index = bucket as usize;
        let slot = self.locks.slot_index(index);
        let stripe = self.locks.lock(index);
        Some(MutexGuard::map(stripe, |stripe| &mut stripe.buckets[slot]))
    }

    fn with_cell<R>(&self, key: DialogKey, f: impl FnOnce(&mut DialogCell) -> R) -> Option<R> {
        let mut entry = self.bucket(key.bucket)?;
        entry.cells.get_mut(&key.local_id).map(f)
    }

    /// Link a new dialog and return its key.
    ///
    /// The dialog starts with one reference for the table plus `holders`
    /// references for collaborators that already track it (pending
    /// transaction callbacks, usually).
    pub fn insert(&self, identity: DialogIdentity, holders: u32) -> RegistryResult<DialogKey> {
        let bucket = core_hash(&identity.call_id, Some(&identity.from_tag), self.size);
        let want_created = self.callbacks.wants(CallbackTypes::CREATED);

        let mut entry = self
            .bucket(bucket)
            .ok_or_else(|| RegistryError::InvalidKey(format!("bucket {} out of range", bucket)))?;

        let local_id = entry.next_id;
        let next = match local_id.checked_add(1) {
            Some(next) if !entry.cells.contains_key(&local_id) => next,
            _ => {
                warn!(bucket, "no dialog id left in bucket");
                return Err(RegistryError::exhausted(format!("dialog ids of bucket {}", bucket)));
            }
        };

        let key = DialogKey::new(bucket, local_id);
        let mut cell = DialogCell::new(key, identity, self.default_timeout);
        cell.ref_count = holders.saturating_add(1);
        let snapshot = want_created.then(|| DialogSnapshot::from_cell(&cell));

        entry.cells.insert(local_id, cell);
        entry.next_id = next;
        drop(entry);

        self.stats.record_created();
        debug!(dialog = %key, bucket, local_id, holders, "new dialog linked");

        if let Some(snapshot) = snapshot {
            self.callbacks
                .dispatch(&[], &snapshot, &mut DialogNotification::Created);
        }

        Ok(key)
    }

    /// Link a dialog at a known key, as read back from storage.
    ///
    /// The restored cell holds the table reference only. The bucket's id
    /// sequence is moved past the restored id. No Created observer runs.
    pub fn restore(&self, snapshot: DialogSnapshot) -> RegistryResult<DialogKey> {
        let key = snapshot.hash;
        let mut entry = self
            .bucket(key.bucket)
            .ok_or_else(|| RegistryError::InvalidKey(format!("{}: bucket out of range", key)))?;

        if entry.cells.contains_key(&key.local_id) {
            return Err(RegistryError::InvalidKey(format!("{}: already linked", key)));
        }

        let identity = DialogIdentity::new(
            snapshot.callid,
            snapshot.from_uri,
            snapshot.to_uri,
            snapshot.caller.tag.clone(),
        );
        let mut cell = DialogCell::new(key, identity, snapshot.timeout);
        cell.legs = [snapshot.caller, snapshot.callee];
        cell.state = snapshot.state;
        cell.flags = snapshot.flags;
        cell.flags.remove(DialogFlags::NEW | DialogFlags::CHANGED);
        cell.start_ts = snapshot.timestart;
        cell.ref_count = 1;

        entry.cells.insert(key.local_id, cell);
        entry.next_id = entry.next_id.max(key.local_id.saturating_add(1));
        drop(entry);

        self.stats.record_created();
        debug!(dialog = %key, "dialog restored");
        Ok(key)
    }

    /// Whether `key` is still linked, DELETED included
    pub fn is_linked(&self, key: DialogKey) -> bool {
        self.with_cell(key, |_| ()).is_some()
    }

    /// Find a live dialog by key, taking one reference for the caller
    pub fn lookup(&self, key: DialogKey) -> Option<DialogRef<'_>> {
        let found = self
            .with_cell(key, |cell| {
                if cell.state.is_deleted() {
                    return false;
                }
                cell.ref_count += 1;
                true
            })
            .unwrap_or(false);

        if found {
            trace!(dialog = %key, "dialog found");
            Some(DialogRef::adopt(self, key))
        } else {
            debug!(dialog = %key, "no dialog for key");
            None
        }
    }

    /// Find a live dialog by Call-ID and both tags, in either orientation.
    ///
    /// The home bucket of a dialog is chosen by the caller's tag, so a request
    /// from the callee side lands there only through the To-tag retry.
    pub fn lookup_by_identity(
        &self,
        call_id: &str,
        from_tag: &str,
        to_tag: &str,
    ) -> Option<(DialogRef<'_>, Direction)> {
        let first = core_hash(call_id, Some(from_tag), self.size);
        if let Some(found) = self.find_match(first, call_id, from_tag, to_tag) {
            return Some(found);
        }

        let second = core_hash(call_id, Some(to_tag), self.size);
        if second == first {
            return None;
        }
        self.find_match(second, call_id, from_tag, to_tag)
    }

    fn find_match(
        &self,
        bucket: u32,
        call_id: &str,
        from_tag: &str,
        to_tag: &str,
    ) -> Option<(DialogRef<'_>, Direction)> {
        let mut entry = self.bucket(bucket)?;
        let (cell, direction) = entry.cells.values_mut().find_map(|cell| {
            let direction = match_dialog(cell, call_id, from_tag, to_tag)?;
            Some((cell, direction))
        })?;

        if cell.state.is_deleted() {
            debug!(dialog = %cell.key, call_id, "dialog matched but already deleted");
            return None;
        }
        cell.ref_count += 1;
        let key = cell.key;
        drop(entry);

        trace!(dialog = %key, ?direction, "dialog matched");
        Some((DialogRef::adopt(self, key), direction))
    }

    /// Find a live dialog by Call-ID and, when given, the caller's tag.
    ///
    /// Without a tag the home bucket is unknown and every bucket is searched.
    pub fn lookup_downstream(&self, call_id: &str, from_tag: Option<&str>) -> Option<DialogRef<'_>> {
        match from_tag {
            Some(tag) => {
                let bucket = core_hash(call_id, Some(tag), self.size);
                self.find_downstream(bucket, call_id, from_tag).flatten()
            }
            None => (0..self.size)
                .filter_map(|bucket| self.find_downstream(bucket, call_id, None))
                .next()
                .flatten(),
        }
    }

    /// `None` when nothing in the bucket matches, `Some(None)` when the match
    /// is DELETED.
    fn find_downstream(
        &self,
        bucket: u32,
        call_id: &str,
        from_tag: Option<&str>,
    ) -> Option<Option<DialogRef<'_>>> {
        let mut entry = self.bucket(bucket)?;
        let cell = entry
            .cells
            .values_mut()
            .find(|cell| match_downstream(cell, call_id, from_tag))?;

        if cell.state.is_deleted() {
            return Some(None);
        }
        cell.ref_count += 1;
        let key = cell.key;
        drop(entry);

        Some(Some(DialogRef::adopt(self, key)))
    }

    /// Add `count` references to a linked dialog.
    ///
    /// Returns `false` when the dialog is not linked.
    pub fn ref_dialog(&self, key: DialogKey, count: u32) -> bool {
        let linked = self
            .with_cell(key, |cell| {
                cell.ref_count = cell.ref_count.saturating_add(count);
                trace!(dialog = %key, ref_count = cell.ref_count, "dialog referenced");
            })
            .is_some();

        if !linked {
            error!(critical = true, dialog = %key, count, "reference taken on unknown dialog");
            self.stats.record_ref_anomaly();
        }
        linked
    }

    /// Drop `count` references. The last one unlinks and destroys the dialog.
    pub fn release(&self, key: DialogKey, count: u32) {
        if count == 0 {
            return;
        }

        let Some(mut entry) = self.bucket(key.bucket) else {
            error!(critical = true, dialog = %key, "release on out of range bucket");
            self.stats.record_ref_anomaly();
            return;
        };

        let Some(cell) = entry.cells.get_mut(&key.local_id) else {
            drop(entry);
            error!(critical = true, dialog = %key, count, "release of unknown dialog");
            self.stats.record_ref_anomaly();
            return;
        };

        if count > cell.ref_count {
            error!(
                critical = true,
                dialog = %key,
                ref_count = cell.ref_count,
                count,
                "bogus release, dialog reference count would go negative"
            );
            self.stats.record_ref_anomaly();
        }
        cell.ref_count = cell.ref_count.saturating_sub(count);
        let remaining = cell.ref_count;
        trace!(dialog = %key, ref_count = remaining, "dialog unreferenced");

        if remaining > 0 {
            return;
        }

        let removed = entry.cells.remove(&key.local_id);
        drop(entry);

        if let Some(cell) = removed {
            self.destroy(cell);
        }
    }

    /// Final teardown of an unlinked cell
    fn destroy(&self, mut cell: DialogCell) {
        let key = cell.key;
        debug!(dialog = %key, call_id = %cell.call_id, state = %cell.state, "destroying dialog");

        // the final snapshot outranks every one taken while linked
        cell.version += 1;

        if let Some(TimerSlot::Armed(handle)) = cell.timer.take() {
            match self.timer.as_ref().map(|timer| timer.cancel(handle)) {
                Some(Ok(true)) => debug!(dialog = %key, ?handle, "pending dialog timer cancelled"),
                Some(Ok(false)) | None => {
                    debug!(dialog = %key, ?handle, "dialog timer expired or not armed")
                }
                Some(Err(e)) => error!(
                    critical = true,
                    dialog = %key,
                    ?handle,
                    "unable to unlink the dialog timer: {:#}", e
                ),
            }
        }

        let local = std::mem::take(&mut cell.observers);
        if self.callbacks.wants(CallbackTypes::DESTROYED)
            || local.iter().any(|o| o.types().intersects(CallbackTypes::DESTROYED))
        {
            let snapshot = DialogSnapshot::from_cell(&cell);
            self.callbacks
                .dispatch(&local, &snapshot, &mut DialogNotification::Destroyed);
        }

        for link in cell.profile_links.drain(..) {
            link.profile().remove_member(&link);
        }

        self.stats.record_destroyed();
    }

    /// Run the state machine for `event` without notifying observers.
    ///
    /// The caller owns the returned `unref` references and must release them.
    /// An event that is invalid in the current state is logged, counted and
    /// reported as an unchanged state with nothing to release. `None` means
    /// the dialog is no longer linked.
    pub fn next_state(&self, key: DialogKey, event: DialogEvent) -> Option<StateChange> {
        self.apply_event(key, event, false).map(|(change, _)| change)
    }

    /// Run the state machine for `event`, notify state change observers,
    /// then release the references the transition gave up.
    pub fn process_event(&self, key: DialogKey, event: DialogEvent) -> Option<StateChange> {
        let notify = self.callbacks.wants(CallbackTypes::STATE_CHANGED);
        let (change, pending) = self.apply_event(key, event, notify)?;

        if let Some((snapshot, local)) = pending {
            self.callbacks.dispatch(
                &local,
                &snapshot,
                &mut DialogNotification::StateChanged {
                    old: change.old,
                    new: change.new,
                    event,
                },
            );
        }

        self.release(key, change.unref);
        Some(change)
    }

    fn apply_event(
        &self,
        key: DialogKey,
        event: DialogEvent,
        global_observers: bool,
    ) -> Option<(StateChange, Pending)> {
        let outcome = self.with_cell(key, |cell| {
            let old = cell.state;
            let Some(transition) = dialog::next_state(old, cell.flags, event) else {
                error!(
                    critical = true,
                    dialog = %key,
                    call_id = %cell.call_id,
                    caller_tag = %cell.tag(Leg::Caller),
                    callee_tag = %cell.tag(Leg::Callee),
                    %event,
                    state = %old,
                    "bogus event in dialog state"
                );
                self.stats.record_invalid_transition();
                let change = StateChange {
                    old,
                    new: old,
                    unref: 0,
                };
                return (change, None);
            };

            cell.state = transition.state;
            if transition.set_bye {
                cell.flags.insert(DialogFlags::HAS_BYE);
            }
            if transition.reclaim {
                cell.ref_count += 1;
            }

            let change = StateChange {
                old,
                new: transition.state,
                unref: transition.unref,
            };

            let mut pending = None;
            if change.changed() {
                cell.touch();
                let wanted = global_observers
                    || cell
                        .observers
                        .iter()
                        .any(|o| o.types().intersects(CallbackTypes::STATE_CHANGED));
                if wanted {
                    pending = Some((DialogSnapshot::from_cell(cell), cell.observers.clone()));
                }
            }
            (change, pending)
        });

        match &outcome {
            Some((change, _)) if change.changed() => debug!(
                dialog = %key,
                %event,
                old = %change.old,
                new = %change.new,
                unref = change.unref,
                "dialog state changed"
            ),
            Some(_) => {}
            None => debug!(dialog = %key, %event, "event for unknown dialog"),
        }
        outcome
    }

    /// Current state, DELETED included
    pub fn state(&self, key: DialogKey) -> Option<DialogState> {
        self.with_cell(key, |cell| cell.state)
    }

    pub fn ref_count(&self, key: DialogKey) -> Option<u32> {
        self.with_cell(key, |cell| cell.ref_count)
    }

    pub fn flags(&self, key: DialogKey) -> Option<DialogFlags> {
        self.with_cell(key, |cell| cell.flags)
    }

    /// Replace the per-leg data of a dialog.
    ///
    /// The caller tag cannot change: it picks the dialog's home bucket. Pass
    /// it unchanged or leave it empty.
    pub fn set_leg_info(&self, key: DialogKey, leg: Leg, info: LegInfo) -> RegistryResult<()> {
        self.with_cell(key, |cell| cell.set_leg_info(leg, info))
            .ok_or(RegistryError::DialogNotFound(key))?
            .map_err(|reason| {
                warn!(dialog = %key, "rejected leg info: {}", reason);
                RegistryError::InvalidLegInfo { key, reason }
            })
    }

    pub fn update_cseq(&self, key: DialogKey, leg: Leg, cseq: &str) -> RegistryResult<()> {
        self.with_cell(key, |cell| cell.update_cseq(leg, cseq))
            .ok_or(RegistryError::DialogNotFound(key))
    }

    /// Attach an observer to one dialog. It runs after the global observers
    /// for state changes, destruction and introspection of that dialog.
    pub fn register_dialog_callback(
        &self,
        key: DialogKey,
        types: CallbackTypes,
        observer: Arc<dyn DialogObserver>,
    ) -> RegistryResult<()> {
        self.with_cell(key, |cell| {
            cell.observers.push(RegisteredObserver::new(types, observer))
        })
        .ok_or(RegistryError::DialogNotFound(key))
    }

    /// Arm the lifetime timer of a dialog.
    ///
    /// The timer owns one reference until it fires or is stopped. `None`
    /// uses the dialog's own timeout; an explicit duration replaces it.
    /// If the timer fires before `schedule` returns, the handle is not kept
    /// and the dialog is free to be armed again.
    pub fn start_timer(&self, key: DialogKey, timeout: Option<Duration>) -> RegistryResult<TimerHandle> {
        let timer = self
            .timer
            .as_ref()
            .ok_or_else(|| RegistryError::timer("no timer service configured"))?;

        let armed = self.with_cell(key, |cell| {
            if cell.state.is_deleted() {
                return Err(RegistryError::DialogNotFound(key));
            }
            if cell.timer.is_some() {
                return Err(RegistryError::timer(format!("dialog {} already has a timer", key)));
            }
            if let Some(timeout) = timeout {
                cell.timeout = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
                cell.touch();
            }
            cell.timer = Some(TimerSlot::Arming);
            cell.ref_count += 1;
            Ok(cell.timeout)
        });
        let seconds = armed.ok_or(RegistryError::DialogNotFound(key))??;

        let lifetime = timeout.unwrap_or_else(|| Duration::from_secs(u64::from(seconds)));
        match timer.schedule(key, Instant::now() + lifetime) {
            Ok(handle) => {
                let stored = self
                    .with_cell(key, |cell| {
                        if cell.timer != Some(TimerSlot::Arming) {
                            return false;
                        }
                        cell.timer = Some(TimerSlot::Armed(handle));
                        true
                    })
                    .unwrap_or(false);

                if stored {
                    debug!(dialog = %key, ?handle, seconds = lifetime.as_secs(), "dialog timer armed");
                } else {
                    debug!(dialog = %key, ?handle, "dialog timer fired while being armed");
                }
                Ok(handle)
            }
            Err(e) => {
                error!(dialog = %key, "failed to insert into timer: {:#}", e);
                let reclaimed = self
                    .with_cell(key, |cell| {
                        if cell.timer != Some(TimerSlot::Arming) {
                            return false;
                        }
                        cell.timer = None;
                        true
                    })
                    .unwrap_or(false);
                if reclaimed {
                    self.release(key, 1);
                } else {
                    error!(critical = true, dialog = %key, "timer reference changed hands during a failed schedule");
                    self.stats.record_ref_anomaly();
                }
                Err(RegistryError::timer(e.to_string()))
            }
        }
    }

    /// Disarm the dialog timer.
    ///
    /// Returns `true` when the timer was still pending; its reference has then
    /// been released. When it already fired, the association stays in place
    /// and the expiry path releases it. A timer still being armed cannot be
    /// stopped yet.
    pub fn stop_timer(&self, key: DialogKey) -> bool {
        let Some(timer) = self.timer.as_ref() else {
            return false;
        };
        let Some(handle) = self.with_cell(key, |cell| cell.timer()).flatten() else {
            return false;
        };

        match timer.cancel(handle) {
            Ok(true) => {
                let cleared = self
                    .with_cell(key, |cell| {
                        if cell.timer != Some(TimerSlot::Armed(handle)) {
                            return false;
                        }
                        cell.timer = None;
                        true
                    })
                    .unwrap_or(false);
                if !cleared {
                    error!(critical = true, dialog = %key, ?handle, "cancelled timer no longer attached to dialog");
                    self.stats.record_ref_anomaly();
                    return false;
                }
                debug!(dialog = %key, ?handle, "dialog timer stopped");
                self.release(key, 1);
                true
            }
            Ok(false) => {
                debug!(dialog = %key, ?handle, "dialog timer already fired");
                false
            }
            Err(e) => {
                error!(critical = true, dialog = %key, ?handle, "unable to stop dialog timer: {:#}", e);
                false
            }
        }
    }

    /// Expiry entry point for the timer service.
    ///
    /// Releases the timer's reference only when the dialog has a timer armed
    /// or being armed. Any other expiry is a duplicate and is only logged.
    pub fn on_timer_expired(&self, key: DialogKey) {
        let Some(slot) = self.with_cell(key, |cell| cell.timer.take()).flatten() else {
            error!(critical = true, dialog = %key, "timer expired for a dialog without timer");
            self.stats.record_ref_anomaly();
            return;
        };
        debug!(dialog = %key, handle = ?slot.handle(), "dialog timer expired");
        self.release(key, 1);
    }

    /// Copy one dialog, DELETED included.
    ///
    /// With `with_context`, introspection observers fill the snapshot's
    /// context map after the bucket lock has been dropped.
    pub fn snapshot(&self, key: DialogKey, with_context: bool) -> Option<DialogSnapshot> {
        let (snapshot, local) = self.with_cell(key, |cell| {
            let local = if with_context { cell.observers.clone() } else { Vec::new() };
            (DialogSnapshot::from_cell(cell), local)
        })?;

        Some(self.finish_snapshot(snapshot, &local, with_context))
    }

    /// Copy every linked dialog, bucket by bucket in `local_id` order
    pub fn snapshot_all(&self, with_context: bool) -> Vec<DialogSnapshot> {
        let mut collected = Vec::new();
        for bucket in 0..self.size {
            let Some(entry) = self.bucket(bucket) else {
                continue;
            };
            for cell in entry.cells.values() {
                let local = if with_context { cell.observers.clone() } else { Vec::new() };
                collected.push((DialogSnapshot::from_cell(cell), local));
            }
        }

        collected
            .into_iter()
            .map(|(snapshot, local)| self.finish_snapshot(snapshot, &local, with_context))
            .collect()
    }

    fn finish_snapshot(
        &self,
        mut snapshot: DialogSnapshot,
        local: &[RegisteredObserver],
        with_context: bool,
    ) -> DialogSnapshot {
        if with_context {
            let mut context = Map::new();
            self.callbacks.dispatch(
                local,
                &snapshot,
                &mut DialogNotification::Introspect {
                    context: &mut context,
                },
            );
            snapshot.context = Some(context);
        }
        snapshot
    }

    /// Visit every linked cell under its bucket lock.
    ///
    /// `f` must not call back into the table.
    pub fn for_each_dialog(&self, mut f: impl FnMut(&DialogCell)) {
        for bucket in 0..self.size {
            if let Some(entry) = self.bucket(bucket) {
                entry.cells.values().for_each(&mut f);
            }
        }
    }

    /// Snapshots of live dialogs whose stored copy is missing or stale.
    ///
    /// NEW and CHANGED are cleared on every returned dialog.
    pub fn take_dirty(&self) -> Vec<DialogSnapshot> {
        let dirty = DialogFlags::NEW | DialogFlags::CHANGED;
        let mut collected = Vec::new();

        for bucket in 0..self.size {
            let Some(mut entry) = self.bucket(bucket) else {
                continue;
            };
            for cell in entry.cells.values_mut() {
                if cell.state.is_deleted() || !cell.flags.intersects(dirty) {
                    continue;
                }
                collected.push(DialogSnapshot::from_cell(cell));
                cell.flags.remove(dirty);
            }
        }
        collected
    }

    /// Record the dialog side of a profile membership.
    /// Hands the link back when the dialog is not linked.
    pub(crate) fn push_profile_link(&self, key: DialogKey, link: ProfileLink) -> Result<(), ProfileLink> {
        let Some(mut entry) = self.bucket(key.bucket) else {
            return Err(link);
        };
        match entry.cells.get_mut(&key.local_id) {
            Some(cell) => {
                cell.profile_links.push(link);
                Ok(())
            }
            None => Err(link),
        }
    }

    /// Unlink the dialog side of the first matching membership
    pub(crate) fn take_profile_link(
        &self,
        key: DialogKey,
        profile: &DialogProfile,
        value: Option<&str>,
    ) -> Option<ProfileLink> {
        self.with_cell(key, |cell| {
            let pos = cell
                .profile_links
                .iter()
                .position(|link| link.matches(profile, value))?;
            Some(cell.profile_links.remove(pos))
        })
        .flatten()
    }

    pub(crate) fn has_profile_link(
        &self,
        key: DialogKey,
        profile: &DialogProfile,
        value: Option<&str>,
    ) -> bool {
        self.with_cell(key, |cell| {
            cell.profile_links
                .iter()
                .any(|link| link.matches(profile, value))
        })
        .unwrap_or(false)
    }
}

impl std::fmt::Debug for DialogTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogTable")
            .field("size", &self.size)
            .field("locks", &self.locks.len())
            .field("default_timeout", &self.default_timeout)
            .field("timer", &self.timer.is_some())
            .finish()
    }
}
