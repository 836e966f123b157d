//! Tag identifiers.
//!
//! An [`Identifier`] is the fixed-width form of a tag UID as held by a reader
//! session. A [`RawIdentifier`] is what the protocol driver hands back for a
//! single read: the same fixed buffer plus the length the chip reported.
//!
//! Two comparisons exist:
//! - [`Identifier::equals`] compares all [`MAX_LEN`] bytes.
//! - [`Identifier::matches_raw`] compares only the reported-length prefix of
//!   a raw read and fails closed on unsupported lengths.
//!
//! Comparing over the reported length only means two tags of different chip
//! families can alias when one UID is a prefix of the stored value. Use
//! [`Identifier::equals`] on a captured identifier for an exact match.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

/// Maximum UID length in bytes (triple-size ISO 14443 UID).
pub const MAX_LEN: usize = 10;

/// UID lengths a reader may legitimately report (single, double, triple size).
pub const VALID_RAW_LENGTHS: [usize; 3] = [4, 7, 10];

/// Hex byte pairs, optionally separated by `:` or `-`.
static HEX_UID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}([:-]?[0-9A-Fa-f]{2}){0,9}$").expect("Invalid UID regex")
});

/// Errors produced while building or comparing identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The reported UID length is not one of 4, 7 or 10.
    #[error("Unsupported UID length {0}; expected one of 4, 7 or 10 bytes")]
    InvalidLength(usize),

    /// A textual identifier could not be parsed.
    #[error("Invalid identifier '{input}': expected 1 to 10 hex byte pairs (e.g. '04:A1:B2:C3')")]
    Parse {
        /// The rejected input.
        input: String,
    },
}

/// Returns `true` if `len` is a UID length a reader may report.
#[inline]
#[must_use]
pub fn is_valid_raw_length(len: usize) -> bool {
    VALID_RAW_LENGTHS.contains(&len)
}

/// A fixed-width tag identifier.
///
/// Shorter UIDs are stored zero-padded. Instances are replaced wholesale,
/// never patched byte by byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Identifier([u8; MAX_LEN]);

impl Identifier {
    /// The all-zero identifier, meaning "no companion configured".
    pub const ZERO: Self = Self([0; MAX_LEN]);

    /// Create an identifier from a full fixed-width buffer.
    #[must_use]
    pub const fn new(bytes: [u8; MAX_LEN]) -> Self {
        Self(bytes)
    }

    /// Create an identifier from up to [`MAX_LEN`] bytes, zero-padding the rest.
    ///
    /// Bytes beyond [`MAX_LEN`] are ignored.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut id = [0; MAX_LEN];
        let len = bytes.len().min(MAX_LEN);
        id[..len].copy_from_slice(&bytes[..len]);
        Self(id)
    }

    /// Capture the reported-length prefix of a raw read.
    #[must_use]
    pub fn from_raw(raw: &RawIdentifier) -> Self {
        Self::from_slice(raw.as_bytes())
    }

    /// The stored bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MAX_LEN] {
        &self.0
    }

    /// Returns `true` for [`Identifier::ZERO`].
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Byte-wise equality over the full fixed width.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.0 == other.0
    }

    /// Compare against a raw read over its reported length only.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidLength`] if the reported length is not
    /// one of [`VALID_RAW_LENGTHS`].
    pub fn try_matches_raw(&self, raw: &RawIdentifier) -> Result<bool, IdentifierError> {
        let len = raw.reported_len();
        if !is_valid_raw_length(len) {
            return Err(IdentifierError::InvalidLength(len));
        }
        Ok(self.0[..len] == raw.bytes[..len])
    }

    /// Fail-closed form of [`Identifier::try_matches_raw`].
    ///
    /// An unsupported length is logged as an anomaly and treated as a mismatch.
    #[must_use]
    pub fn matches_raw(&self, raw: &RawIdentifier) -> bool {
        match self.try_matches_raw(raw) {
            Ok(matched) => matched,
            Err(err) => {
                warn!(reported_len = raw.reported_len(), "Raw UID comparison anomaly: {err}");
                false
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !HEX_UID_REGEX.is_match(trimmed) {
            return Err(IdentifierError::Parse {
                input: s.to_string(),
            });
        }

        let digits: String = trimmed.chars().filter(|c| !matches!(c, ':' | '-')).collect();
        let bytes = hex::decode(digits).map_err(|_| IdentifierError::Parse {
            input: s.to_string(),
        })?;

        Ok(Self::from_slice(&bytes))
    }
}

impl Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A UID exactly as reported by the protocol driver.
///
/// The reported length is not trusted; it is validated before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawIdentifier {
    bytes: [u8; MAX_LEN],
    len: u8,
}

impl RawIdentifier {
    /// Create a raw identifier from a driver buffer and reported length.
    #[must_use]
    pub const fn new(bytes: [u8; MAX_LEN], len: u8) -> Self {
        Self { bytes, len }
    }

    /// Create a raw identifier whose reported length is the slice length.
    ///
    /// Slices longer than [`MAX_LEN`] keep the true length as reported length
    /// so validation rejects them.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = [0; MAX_LEN];
        let copied = bytes.len().min(MAX_LEN);
        buf[..copied].copy_from_slice(&bytes[..copied]);
        Self {
            bytes: buf,
            len: u8::try_from(bytes.len()).unwrap_or(u8::MAX),
        }
    }

    /// The length the chip reported.
    #[must_use]
    pub fn reported_len(&self) -> usize {
        usize::from(self.len)
    }

    /// Returns `true` if the reported length is one of [`VALID_RAW_LENGTHS`].
    #[must_use]
    pub fn has_valid_length(&self) -> bool {
        is_valid_raw_length(self.reported_len())
    }

    /// The reported-length prefix of the buffer, clamped to [`MAX_LEN`].
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.reported_len().min(MAX_LEN)]
    }
}
