//! Application state shared between the poll loop and readers of it.

use std::path::Path;
use std::sync::Arc;

use tagsense_core::{ReaderChannel, ReaderRegistry, TagsenseConfig, TagsenseError};
use tokio::sync::Mutex;

/// Shared application state.
///
/// The mutex is the one exclusion boundary around each `poll_all` and each
/// aggregate read; the registry has no locking of its own.
pub type SharedState<C> = Arc<Mutex<AppState<C>>>;

/// Everything the poll loop owns.
#[derive(Debug)]
pub struct AppState<C> {
    /// Reader sessions and their aggregate state table.
    pub registry: ReaderRegistry<C>,
    /// Configuration the registry was built from.
    pub config: TagsenseConfig,
}

impl<C: ReaderChannel> AppState<C> {
    /// Build the registry described by `config`.
    ///
    /// # Errors
    ///
    /// Returns the first reader that fails to open or initialize.
    pub fn new(config: TagsenseConfig) -> tagsense_core::Result<Self> {
        let registry = ReaderRegistry::from_config(&config)?;
        Ok(Self { registry, config })
    }

    /// Wrap in the shared lock.
    #[must_use]
    pub fn into_shared(self) -> SharedState<C> {
        Arc::new(Mutex::new(self))
    }
}

/// Load configuration from `path`, or defaults if the file is missing.
///
/// # Errors
///
/// Returns a configuration error if the file exists but is invalid.
pub fn load_config(path: &Path) -> tagsense_core::Result<TagsenseConfig> {
    Ok(TagsenseConfig::load_or_default(path)?)
}

/// Operator hint for a failed startup, chosen by error category.
#[must_use]
pub fn startup_hint(err: &TagsenseError) -> &'static str {
    if err.is_config_error() {
        "check the configuration file and any TAGSENSE__* overrides"
    } else if err.is_driver_error() {
        "check reader wiring, power and the configured select/reset lines"
    } else if err.is_registry_error() {
        "reduce the number of configured readers"
    } else {
        "check file permissions on the configuration directory"
    }
}
