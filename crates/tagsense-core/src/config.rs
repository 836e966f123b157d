//! Application configuration management.
//!
//! Handles loading, saving, and validating tagsense configuration:
//! - Reader channels and their companion tags
//! - Debounce threshold and policy
//! - Poll interval
//! - Log file location and per-cycle log level
//!
//! Files are TOML. [`TagsenseConfig::load`] layers `TAGSENSE__*` environment
//! variables on top of the file, e.g. `TAGSENSE__POLL__INTERVAL_MS=20`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::driver::ChannelConfig;
use crate::identifier::Identifier;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TAGSENSE";

/// Consecutive disagreeing cycles required before a change is confirmed.
pub const DEFAULT_DEBOUNCE_THRESHOLD: u8 = 5;

/// Default delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default prefix of the daily log files.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "tagsense";

/// Levels accepted for `logging.cycle_level`.
pub const CYCLE_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Reader IDs are one byte wide.
pub const MAX_READERS: usize = u8::MAX as usize + 1;

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Layering file and environment sources failed.
    #[error("Failed to assemble configuration: {0}")]
    LayerError(#[from] ::config::ConfigError),

    /// The TOML could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// More than one field is invalid.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// How the debounce counter treats a cycle that agrees with the confirmed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebouncePolicy {
    /// Agreement resets the counter; only consecutive disagreement confirms.
    #[default]
    ResetOnAgreement,
    /// Agreement leaves the counter alone; disagreement accumulates.
    Accumulate,
}

/// Debounce filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Disagreeing cycles needed to confirm a change.
    pub threshold: u8,
    /// Counter behavior on agreeing cycles.
    pub policy: DebouncePolicy,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DEBOUNCE_THRESHOLD,
            policy: DebouncePolicy::default(),
        }
    }
}

impl DebounceConfig {
    /// Smallest threshold a session runs with.
    pub const MIN_THRESHOLD: u8 = 1;

    /// Copy with the threshold raised to at least [`Self::MIN_THRESHOLD`].
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            threshold: self.threshold.max(Self::MIN_THRESHOLD),
            ..self
        }
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Milliseconds between poll cycles.
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Log output settings for the host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for production log files. Unset uses the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// File name prefix of the daily log files.
    pub file_prefix: String,

    /// Level applied to per-cycle reader session logs.
    pub cycle_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            cycle_level: "info".to_string(),
        }
    }
}

/// One reader channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Optional human-readable label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Chip-select line.
    pub select_line: u8,

    /// Reset line.
    pub reset_line: u8,

    /// Companion tag UID, e.g. `"04:A1:B2:C3"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion: Option<Identifier>,
}

impl ReaderConfig {
    /// The hardware lines of this reader.
    #[must_use]
    pub const fn channel(&self) -> ChannelConfig {
        ChannelConfig::new(self.select_line, self.reset_line)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsenseConfig {
    /// Reader channels in registration order.
    pub readers: Vec<ReaderConfig>,

    /// Debounce filter settings.
    pub debounce: DebounceConfig,

    /// Poll loop settings.
    pub poll: PollConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl TagsenseConfig {
    /// Load configuration from a TOML file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to disk, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Check every field, collecting all violations.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.debounce.threshold == 0 {
            errors.push(invalid("debounce.threshold", "must be at least 1"));
        }
        if self.poll.interval_ms == 0 {
            errors.push(invalid("poll.interval_ms", "must be at least 1"));
        }
        if self.readers.len() > MAX_READERS {
            errors.push(invalid(
                "readers",
                &format!("at most {MAX_READERS} readers are supported"),
            ));
        }

        let prefix = &self.logging.file_prefix;
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            errors.push(invalid(
                "logging.file_prefix",
                "must be a non-empty file name without path separators",
            ));
        }
        if !CYCLE_LEVELS.contains(&self.logging.cycle_level.as_str()) {
            errors.push(invalid(
                "logging.cycle_level",
                &format!("must be one of {}", CYCLE_LEVELS.join(", ")),
            ));
        }

        for (index, reader) in self.readers.iter().enumerate() {
            if reader.select_line == reader.reset_line {
                errors.push(invalid(
                    &format!("readers[{index}].reset_line"),
                    "must differ from select_line",
                ));
            }
            let shared = self.readers[..index]
                .iter()
                .any(|earlier| earlier.select_line == reader.select_line);
            if shared {
                errors.push(invalid(
                    &format!("readers[{index}].select_line"),
                    &format!("line {} is already used by another reader", reader.select_line),
                ));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Default configuration file location.
///
/// On Linux: `/etc/tagsense/config.toml`.
/// Elsewhere: the platform config directory, e.g. `~/.config/tagsense/`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/tagsense/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "tagsense").map_or_else(
            || PathBuf::from("tagsense.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[debounce]
threshold = 3
policy = "accumulate"

[poll]
interval_ms = 25

[[readers]]
name = "desk"
select_line = 10
reset_line = 9
companion = "04:A1:B2:C3"

[[readers]]
select_line = 8
reset_line = 7
"#;

    #[test]
    fn test_parse_sample() {
        let config = TagsenseConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.debounce.threshold, 3);
        assert_eq!(config.debounce.policy, DebouncePolicy::Accumulate);
        assert_eq!(config.poll.interval_ms, 25);
        assert_eq!(config.readers.len(), 2);
        assert_eq!(config.readers[0].name.as_deref(), Some("desk"));
        assert_eq!(
            config.readers[0].companion,
            Some(Identifier::from_slice(&[0x04, 0xA1, 0xB2, 0xC3]))
        );
        assert_eq!(config.readers[1].companion, None);
        assert_eq!(config.readers[1].channel(), ChannelConfig::new(8, 7));
    }

    #[test]
    fn test_defaults() {
        let config = TagsenseConfig::from_toml_str("").unwrap();
        assert!(config.readers.is_empty());
        assert_eq!(config.debounce.threshold, DEFAULT_DEBOUNCE_THRESHOLD);
        assert_eq!(config.debounce.policy, DebouncePolicy::ResetOnAgreement);
        assert_eq!(config.poll.interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_invalid_companion_is_parse_error() {
        let toml = "[[readers]]\nselect_line = 1\nreset_line = 2\ncompanion = \"xyz\"\n";
        assert!(matches!(
            TagsenseConfig::from_toml_str(toml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_debounce_clamped() {
        let zero = DebounceConfig {
            threshold: 0,
            policy: DebouncePolicy::Accumulate,
        };
        assert_eq!(zero.clamped().threshold, 1);
        assert_eq!(zero.clamped().policy, DebouncePolicy::Accumulate);
        assert_eq!(DebounceConfig::default().clamped(), DebounceConfig::default());
    }

    #[test]
    fn test_logging_section() {
        let config = TagsenseConfig::from_toml_str(
            "[logging]\ndirectory = \"/srv/tagsense/logs\"\nfile_prefix = \"door\"\ncycle_level = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/srv/tagsense/logs"))
        );
        assert_eq!(config.logging.file_prefix, "door");
        assert_eq!(config.logging.cycle_level, "debug");

        let defaults = TagsenseConfig::default();
        assert_eq!(defaults.logging.file_prefix, DEFAULT_LOG_FILE_PREFIX);
        assert!(defaults.logging.directory.is_none());
    }

    #[test]
    fn test_bad_logging_section_rejected() {
        let mut config = TagsenseConfig::default();
        config.logging.file_prefix = "logs/tagsense".into();
        config.logging.cycle_level = "loud".into();

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                let text: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert!(text.iter().any(|e| e.contains("logging.file_prefix")));
                assert!(text.iter().any(|e| e.contains("logging.cycle_level")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = TagsenseConfig::default();
        config.debounce.threshold = 0;
        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "debounce.threshold");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_collects_all_violations() {
        let toml = r"
[poll]
interval_ms = 0

[[readers]]
select_line = 4
reset_line = 4

[[readers]]
select_line = 4
reset_line = 5
";
        match TagsenseConfig::from_toml_str(toml) {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = TagsenseConfig::load(&path).unwrap();
        assert_eq!(config.readers.len(), 2);
        assert_eq!(config.readers[0].select_line, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(
            TagsenseConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(
            TagsenseConfig::load_or_default(&path).unwrap(),
            TagsenseConfig::default()
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = TagsenseConfig::from_toml_str(SAMPLE).unwrap();

        config.save(&path).unwrap();
        assert_eq!(TagsenseConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_default_config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }
}
