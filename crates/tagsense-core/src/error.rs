//! Unified error types for the tagsense core library.
//!
//! This module provides a unified error type [`TagsenseError`] covering every
//! failure mode of the library. Each module also has its own specific error
//! type (`IdentifierError`, `DriverError`, `RegistryError`, `ConfigError`).
//!
//! Polling itself never fails: misreads are absorbed by the session and only
//! show up in logs. The errors here come from setup and configuration.
//!
//! # Example
//!
//! ```rust
//! use tagsense_core::error::{Result, TagsenseError};
//!
//! fn require_readers(count: usize) -> Result<()> {
//!     if count == 0 {
//!         return Err(TagsenseError::ConfigValidationError("no readers configured".into()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::session::ReaderId;

/// The unified error type for all tagsense operations.
#[derive(Debug, Error)]
pub enum TagsenseError {
    // =========================================================================
    // READER ERRORS
    // =========================================================================
    /// A reader channel could not be opened.
    #[error("Reader on select line {select_line} could not be opened: {message}")]
    ReaderOpenFailed {
        /// Chip-select line.
        select_line: u8,
        /// Driver detail.
        message: String,
    },

    /// A reader chip did not initialize.
    #[error("Reader initialization failed: {0}. Check wiring and power of the reader board.")]
    ReaderInitFailed(String),

    /// The registry already holds the maximum number of readers.
    #[error("Reader limit reached ({0} readers)")]
    TooManyReaders(usize),

    /// No reader is registered under the ID.
    #[error("Unknown reader {0}")]
    UnknownReader(ReaderId),

    /// A caller-provided state buffer is too small.
    #[error("State buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Required length.
        needed: usize,
        /// Provided length.
        actual: usize,
    },

    // =========================================================================
    // IDENTIFIER ERRORS
    // =========================================================================
    /// A tag identifier was malformed.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while reading or writing a file.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for tagsense operations.
pub type Result<T> = std::result::Result<T, TagsenseError>;

/// Short alias for [`TagsenseError`].
pub type Error = TagsenseError;

impl TagsenseError {
    /// Returns `true` if this error comes from reader hardware setup.
    #[inline]
    #[must_use]
    pub fn is_driver_error(&self) -> bool {
        matches!(
            self,
            Self::ReaderOpenFailed { .. } | Self::ReaderInitFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigParseError(_)
                | Self::ConfigValidationError(_)
                | Self::InvalidIdentifier(_)
        )
    }

    /// Returns `true` if this error is related to registry bookkeeping.
    #[inline]
    #[must_use]
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            Self::TooManyReaders(_) | Self::UnknownReader(_) | Self::BufferTooSmall { .. }
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ReaderInitFailed(_) | Self::BufferTooSmall { .. }
        )
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ReaderOpenFailed { .. } => "READER_OPEN_FAILED",
            Self::ReaderInitFailed(_) => "READER_INIT_FAILED",
            Self::TooManyReaders(_) => "TOO_MANY_READERS",
            Self::UnknownReader(_) => "UNKNOWN_READER",
            Self::BufferTooSmall { .. } => "BUFFER_TOO_SMALL",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::driver::DriverError> for TagsenseError {
    fn from(err: crate::driver::DriverError) -> Self {
        use crate::driver::DriverError;
        match err {
            DriverError::OpenFailed {
                select_line,
                message,
            } => Self::ReaderOpenFailed {
                select_line,
                message,
            },
            DriverError::InitFailed { message } => Self::ReaderInitFailed(message),
        }
    }
}

impl From<crate::registry::RegistryError> for TagsenseError {
    fn from(err: crate::registry::RegistryError) -> Self {
        use crate::registry::RegistryError;
        match err {
            RegistryError::TooManyReaders { max } => Self::TooManyReaders(max),
            RegistryError::UnknownReader(id) => Self::UnknownReader(id),
            RegistryError::BufferTooSmall { needed, actual } => {
                Self::BufferTooSmall { needed, actual }
            }
            RegistryError::Driver(e) => e.into(),
        }
    }
}

impl From<crate::identifier::IdentifierError> for TagsenseError {
    fn from(err: crate::identifier::IdentifierError) -> Self {
        Self::InvalidIdentifier(err.to_string())
    }
}

impl From<crate::config::ConfigError> for TagsenseError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::LayerError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
