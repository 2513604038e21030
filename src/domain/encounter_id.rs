//! Storage-safe encounter identifier.
//!
//! The remote API hands out encounter ids as unsigned 64-bit integers, which
//! overflow SQLite's signed `INTEGER`. [`EncounterId`] keeps the raw value
//! and renders it as base64 of its 8 big-endian bytes, so every stored key is
//! exactly [`EncounterId::ENCODED_LEN`] characters wide.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};

/// Identifier of a single live wild encounter.
///
/// Unique per live encounter. Used as the primary key of the `pokemon`
/// table, the key of the normalized encounter mapping and the member type
/// of the notification recency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncounterId(u64);

impl EncounterId {
    /// Width of the encoded representation.
    pub const ENCODED_LEN: usize = 12;

    /// Wraps a raw encounter id as delivered by the remote API.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Returns the fixed-width storage encoding.
    #[must_use]
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for EncounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

/// Error returned when a stored key is not a valid encoded encounter id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid encounter id encoding: {0}")]
pub struct InvalidEncounterId(String);

impl FromStr for EncounterId {
    type Err = InvalidEncounterId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|_| InvalidEncounterId(s.to_string()))?;
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| InvalidEncounterId(s.to_string()))?;
        Ok(Self(u64::from_be_bytes(array)))
    }
}

impl From<u64> for EncounterId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl Serialize for EncounterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded())
    }
}
