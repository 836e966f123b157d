//! Presence classification of a reader channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a reader currently sees.
///
/// The numeric codes are the one-byte values used in aggregate state rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Classification {
    /// No tag on the reader.
    #[default]
    Absent = 0,
    /// A tag that is not the reader's companion.
    PresentUnknown = 1,
    /// The reader's configured companion tag.
    PresentCompanion = 2,
}

impl Classification {
    /// The one-byte aggregate code.
    #[inline]
    #[must_use]
    pub const fn as_code(self) -> u8 {
        self as u8
    }

    /// Returns `true` if any tag is present.
    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

impl TryFrom<u8> for Classification {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Absent),
            1 => Ok(Self::PresentUnknown),
            2 => Ok(Self::PresentCompanion),
            other => Err(other),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::PresentUnknown => "present_unknown",
            Self::PresentCompanion => "present_companion",
        })
    }
}
