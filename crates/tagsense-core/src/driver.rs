//! Interface to the external reader-protocol driver.
//!
//! The core never talks to the reader chip itself. A [`ReaderChannel`] wraps
//! one physical reader circuit and answers the handful of questions a poll
//! cycle asks: is a tag there, what is its UID, and what kind of chip is it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifier::RawIdentifier;

/// Hardware select lines addressing one reader circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Chip-select line.
    pub select_line: u8,
    /// Reset line.
    pub reset_line: u8,
}

impl ChannelConfig {
    /// Create a channel configuration.
    #[must_use]
    pub const fn new(select_line: u8, reset_line: u8) -> Self {
        Self {
            select_line,
            reset_line,
        }
    }
}

/// Failures while bringing a reader channel up.
///
/// Polling never produces these; per-cycle problems are reported through
/// [`ReadStatus`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The channel could not be opened on the given lines.
    #[error("Failed to open reader on select line {select_line}: {message}")]
    OpenFailed {
        /// Chip-select line of the channel.
        select_line: u8,
        /// Driver-provided detail.
        message: String,
    },

    /// The reader chip did not come up.
    #[error("Reader initialization failed: {message}")]
    InitFailed {
        /// Driver-provided detail.
        message: String,
    },
}

/// Outcome of a select/read round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The protocol exchange succeeded.
    Ok,
    /// The driver reported a timeout that in practice carries a good UID.
    ///
    /// Clone reader chips report this where genuine ones report success.
    ToleratedTimeout,
    /// Any other driver status code.
    HardFail(u8),
}

impl ReadStatus {
    /// Returns `true` for [`ReadStatus::Ok`] and [`ReadStatus::ToleratedTimeout`].
    #[inline]
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Ok | Self::ToleratedTimeout)
    }
}

/// Everything a single select/read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRead {
    /// Protocol status.
    pub status: ReadStatus,
    /// UID buffer and reported length.
    pub raw: RawIdentifier,
    /// Select-acknowledge byte used for chip type classification.
    pub signature: u8,
}

impl RawRead {
    /// SAK of a MIFARE Classic 1K, a common well-formed signature.
    pub const SAK_MIFARE_1K: u8 = 0x08;

    /// A successful read of `uid` with a MIFARE Classic 1K signature.
    #[must_use]
    pub fn ok(uid: &[u8]) -> Self {
        Self {
            status: ReadStatus::Ok,
            raw: RawIdentifier::from_slice(uid),
            signature: Self::SAK_MIFARE_1K,
        }
    }

    /// Same read with a different status.
    #[must_use]
    pub const fn with_status(mut self, status: ReadStatus) -> Self {
        self.status = status;
        self
    }

    /// Same read with a different signature.
    #[must_use]
    pub const fn with_signature(mut self, signature: u8) -> Self {
        self.signature = signature;
        self
    }
}

/// Chip family derived from the select-acknowledge byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    /// Unrecognized signature.
    Unknown,
    /// ISO/IEC 14443-4 compliant. MIFARE DESFire answers with this SAK too.
    Iso14443_4,
    /// ISO/IEC 18092 (NFC).
    Iso18092,
    /// MIFARE Classic Mini.
    MifareMini,
    /// MIFARE Classic 1K.
    Mifare1K,
    /// MIFARE Classic 4K.
    Mifare4K,
    /// MIFARE Ultralight or Ultralight C.
    MifareUltralight,
    /// MIFARE Plus.
    MifarePlus,
    /// MIFARE TNP3XXX.
    Tnp3xxx,
    /// Anticollision did not finish; the UID is not complete.
    NotComplete,
}

impl TagType {
    /// Decode a select-acknowledge byte.
    #[must_use]
    pub const fn from_signature(sak: u8) -> Self {
        // Bit 8 carries no type information.
        match sak & 0x7F {
            0x04 => Self::NotComplete,
            0x09 => Self::MifareMini,
            0x08 => Self::Mifare1K,
            0x18 => Self::Mifare4K,
            0x00 => Self::MifareUltralight,
            0x10 | 0x11 => Self::MifarePlus,
            0x01 => Self::Tnp3xxx,
            0x20 => Self::Iso14443_4,
            0x40 => Self::Iso18092,
            _ => Self::Unknown,
        }
    }

    /// Returns `false` for [`TagType::Unknown`] and [`TagType::NotComplete`].
    #[inline]
    #[must_use]
    pub const fn is_usable(self) -> bool {
        !matches!(self, Self::Unknown | Self::NotComplete)
    }
}

/// One physical reader channel, driven by an external protocol driver.
///
/// Each channel is owned by exactly one reader session. All calls are
/// expected to complete within a few register round trips.
pub trait ReaderChannel: Send {
    /// Open the channel on the given select lines.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::OpenFailed`] if the lines cannot be claimed.
    fn open(config: &ChannelConfig) -> Result<Self, DriverError>
    where
        Self: Sized;

    /// Bring the reader chip up. Called once, before the first poll.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InitFailed`] if the chip does not respond.
    fn initialize(&mut self) -> Result<(), DriverError>;

    /// Ask whether a new tag presence event is pending.
    ///
    /// This has side effects on the chip. Real hardware alternates between
    /// `true` and `false` while a tag rests on the antenna.
    fn has_new_presence_event(&mut self) -> bool;

    /// Select the tag in the field and fetch its UID.
    fn select_and_read(&mut self) -> RawRead;

    /// Classify the chip from its select-acknowledge byte.
    fn classify_tag_type(&self, signature: u8) -> TagType {
        TagType::from_signature(signature)
    }

    /// Reader firmware version, if the driver can report one.
    fn firmware_version(&self) -> Option<u8> {
        None
    }
}
