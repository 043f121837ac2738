//! Stable hashing for bucket selection
//!
//! Bucket indices are persisted alongside each dialog and reused after a
//! restart, so the hash has to be identical across processes and builds.
//! `std`'s `DefaultHasher` makes no such promise; this is a fixed 32-bit
//! FNV-1a.

use crate::dialog::DialogKey;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(mut state: u32, bytes: &[u8]) -> u32 {
    for byte in bytes {
        state ^= u32::from(*byte);
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

/// Hash one or two strings into `[0, size)`.
///
/// An empty second string hashes like an absent one.
pub fn core_hash(first: &str, second: Option<&str>, size: u32) -> u32 {
    debug_assert!(size > 0);
    let mut state = fnv1a(FNV_OFFSET, first.as_bytes());
    if let Some(second) = second.filter(|s| !s.is_empty()) {
        state = fnv1a(state, b" ");
        state = fnv1a(state, second.as_bytes());
    }
    state % size
}

/// Hash a dialog's stable key into `[0, size)`.
pub fn key_hash(key: DialogKey, size: u32) -> u32 {
    debug_assert!(size > 0);
    let state = fnv1a(FNV_OFFSET, &key.bucket.to_le_bytes());
    fnv1a(state, &key.local_id.to_le_bytes()) % size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_bounded() {
        let a = core_hash("abc", Some("t1"), 16);
        assert_eq!(a, core_hash("abc", Some("t1"), 16));
        assert!(a < 16);
        for size in [1, 2, 7, 4096] {
            assert!(core_hash("call-id@host", Some("tag"), size) < size);
        }
    }

    #[test]
    fn test_empty_tag_hashes_like_none() {
        assert_eq!(core_hash("abc", Some(""), 4096), core_hash("abc", None, 4096));
    }

    #[test]
    fn test_key_hash_spreads_keys() {
        let buckets: std::collections::HashSet<u32> =
            (0..64).map(|id| key_hash(DialogKey::new(1, id), 16)).collect();
        assert!(buckets.len() > 4);
    }
}
