//! Lock striping
//!
//! A [`LockSet`] bounds the number of mutexes used by a hash table while
//! keeping locking fine grained: bucket `i` is guarded by lock
//! `i % lock_count`. Each lock owns the data it guards, so the stripe for a
//! bucket is only reachable through its guard.
//!
//! The set is sized adaptively at startup. It first tries
//! `min(desired, MAX_LOCKS)` locks and walks down to [`MIN_LOCKS`] when memory
//! for the set cannot be reserved. Failing at the minimum is fatal. A table
//! smaller than `MIN_LOCKS` gets one lock per bucket and no retry, so every
//! lock guards at least one bucket.

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error};

use crate::errors::{RegistryError, RegistryResult};

/// Upper bound on the number of locks in a set
pub const MAX_LOCKS: usize = 2048;

/// Smallest lock set the table can live with
pub const MIN_LOCKS: usize = 2;

/// A bounded pool of mutexes shared by many buckets
pub struct LockSet<T> {
    locks: Box<[Mutex<T>]>,
}

impl<T> LockSet<T> {
    /// Allocate a lock set for `desired` buckets.
    ///
    /// `init` builds the data guarded by lock `index` out of `count` locks.
    /// Errors returned by `init` abort construction; only a failure to reserve
    /// the lock array itself triggers a retry with fewer locks.
    pub fn new<F>(desired: usize, mut init: F) -> RegistryResult<Self>
    where
        F: FnMut(usize, usize) -> RegistryResult<T>,
    {
        if desired == 0 {
            return Err(RegistryError::config("a lock set needs at least one bucket"));
        }
        let start = desired.min(MAX_LOCKS);
        let floor = MIN_LOCKS.min(start);

        for count in (floor..=start).rev() {
            let mut locks = Vec::new();
            if locks.try_reserve_exact(count).is_err() {
                debug!(count, "unable to reserve lock set, retrying with fewer locks");
                continue;
            }

            for index in 0..count {
                locks.push(Mutex::new(init(index, count)?));
            }

            debug!(count, desired, "lock set allocated");
            return Ok(Self {
                locks: locks.into_boxed_slice(),
            });
        }

        error!(min = floor, "unable to allocate the minimum lock set");
        Err(RegistryError::LockAllocation { min: floor })
    }

    /// Number of locks in the set
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Lock guarding `bucket`
    pub fn lock_index(&self, bucket: usize) -> usize {
        bucket % self.locks.len()
    }

    /// Position of `bucket` inside the stripe owned by its lock
    pub fn slot_index(&self, bucket: usize) -> usize {
        bucket / self.locks.len()
    }

    /// Acquire the lock guarding `bucket`
    pub fn lock(&self, bucket: usize) -> MutexGuard<'_, T> {
        self.locks[self.lock_index(bucket)].lock()
    }

    /// Acquire lock `index` directly
    pub fn lock_at(&self, index: usize) -> MutexGuard<'_, T> {
        self.locks[index].lock()
    }
}

/// Number of buckets out of `size` guarded by lock `index` of `count`
pub fn stripe_len(size: usize, index: usize, count: usize) -> usize {
    if index >= size {
        0
    } else {
        (size - index).div_ceil(count)
    }
}
