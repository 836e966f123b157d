//! # tagsense-core
//!
//! Debounced presence classification for contactless tag readers.
//!
//! Reader hardware is noisy: presence probes flicker while a tag rests on the
//! antenna and clone reader chips report timeouts on good reads. This crate
//! turns those raw reads into a stable per-reader classification and reports
//! each confirmed change exactly once.
//!
//! ## Architecture
//!
//! - [`identifier`] - Fixed-width tag UIDs and raw driver reads
//! - [`classification`] - Absent / unknown tag / companion tag
//! - [`driver`] - Interface to the external reader-protocol driver
//! - [`session`] - Per-reader poll, classify and debounce state machine
//! - [`registry`] - Ordered set of readers with an aggregate state table
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - `mock` - Scripted reader channel (tests and the `mock-reader` feature)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod classification;
pub mod config;
pub mod driver;
pub mod error;
pub mod identifier;
#[cfg(any(test, feature = "mock-reader"))]
pub mod mock;
pub mod registry;
pub mod session;

// Re-export primary types for convenience
pub use classification::Classification;
pub use config::{
    default_config_path, ConfigError, ConfigResult, DebounceConfig, DebouncePolicy,
    LoggingConfig, PollConfig, ReaderConfig, TagsenseConfig,
};
pub use driver::{ChannelConfig, DriverError, RawRead, ReadStatus, ReaderChannel, TagType};
pub use error::{Error, Result, TagsenseError};
pub use identifier::{Identifier, IdentifierError, RawIdentifier};
#[cfg(any(test, feature = "mock-reader"))]
pub use mock::{MockChannel, MockCycle};
pub use registry::{ReaderRegistry, RegistryError};
pub use session::{
    ReaderId, ReaderSession, Reading, RejectReason, Transition, TransitionHandler,
};
