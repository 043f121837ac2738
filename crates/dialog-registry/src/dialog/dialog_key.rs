//! Stable external identifier of a dialog
//!
//! A dialog is addressed by the bucket it hashed into and the bucket-scoped
//! sequence number it was given when linked. `local_id` alone is not unique,
//! only the pair is. The external text form is `"<bucket>.<local_id>"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::RegistryError;

/// Separator between bucket index and local id in the external key format
pub const KEY_SEPARATOR: char = '.';

/// `(bucket_index, local_id)` pair identifying one dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialogKey {
    /// Index of the dialog table bucket
    pub bucket: u32,
    /// Bucket-scoped sequence number
    pub local_id: u32,
}

impl DialogKey {
    pub fn new(bucket: u32, local_id: u32) -> Self {
        Self { bucket, local_id }
    }
}

impl fmt::Display for DialogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.bucket, KEY_SEPARATOR, self.local_id)
    }
}

impl FromStr for DialogKey {
    type Err = RegistryError;

    /// Parses `"<bucket>.<local_id>"`, splitting on the first separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, local_id) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| RegistryError::InvalidKey(s.to_string()))?;

        let bucket = bucket
            .parse::<u32>()
            .map_err(|_| RegistryError::InvalidKey(s.to_string()))?;
        let local_id = local_id
            .parse::<u32>()
            .map_err(|_| RegistryError::InvalidKey(s.to_string()))?;

        Ok(Self { bucket, local_id })
    }
}

impl Serialize for DialogKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DialogKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
