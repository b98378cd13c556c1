//! Configuration management for committee-trees
//!
//! This module handles loading, validating, and providing access to the tree
//! configuration. It supports loading configuration from TOML files,
//! environment variables, and programmatic overrides. Tree parameters
//! (per-subsystem address widths, the digest algorithm identifier) are part
//! of the compatibility contract with external verifiers, so they are always
//! explicit configuration rather than process-wide state.

mod error;
pub mod validation;

#[cfg(test)]
#[path = "tests/config_mod_tests.rs"]
mod config_mod_tests;

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod validation_tests;

use std::{env, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::types::{DuplicatePolicy, HashAlgorithm, LogLevel, MalformedPolicy};

/// Re-export the error type
pub use error::ConfigError;

/// The environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "CT_";

/// Main configuration structure for the committee tree system.
///
/// This struct holds all configuration options. It can be loaded from a TOML
/// file, environment variables, or created programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Tree definitions, one per named subsystem ("vaults", "orders", ...)
    #[serde(rename = "subsystem")]
    pub subsystems: Vec<SubsystemConfig>,

    /// Digest function configuration
    #[serde(default)]
    pub hash: HashConfig,

    /// Record ingestion configuration
    #[serde(default)]
    pub records: RecordsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Definition of one named subsystem tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubsystemConfig {
    /// Name used to select this tree ("vaults", "orders", ...)
    pub name: String,
    /// Address width of the tree in bits; keys must fit in `tree_height` bits.
    pub tree_height: u8,
}

/// Digest function configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct HashConfig {
    /// Digest function identifier; part of the root compatibility contract.
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

/// Record ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RecordsConfig {
    /// Policy for a key repeating within one load.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Policy for unparsable rows.
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,
    /// Whether to log to console
    #[serde(default = "default_true")]
    pub console: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
        }
    }
}

impl Default for Config {
    /// Creates a default configuration matching the observed committee
    /// deployment: a height-31 vault tree and a height-63 order tree.
    fn default() -> Self {
        Config {
            subsystems: vec![
                SubsystemConfig {
                    name: "vaults".to_string(),
                    tree_height: 31,
                },
                SubsystemConfig {
                    name: "orders".to_string(),
                    tree_height: 63,
                },
            ],
            hash: HashConfig::default(),
            records: RecordsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the specified path.
    ///
    /// If the file does not exist, built-in defaults are used (with a
    /// warning). Environment variables prefixed with `CT_` are applied on
    /// top, and the result is validated before being returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or parsed, or if the resulting configuration fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(config_str) => {
                let mut config: Config = toml::from_str(&config_str)?;

                config.apply_env_vars()?;
                config.validate()?;

                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config file not found at {}, using defaults", path.display());
                let mut config = Self::default();
                config.apply_env_vars()?;
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::file_not_found(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// Environment variables are prefixed with `CT_` and use `_` as a
    /// separator. For example, `CT_LOGGING_LEVEL=debug` or
    /// `CT_HASH_ALGORITHM=blake3`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override value cannot be parsed.
    pub fn apply_env_vars(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                if value.trim().is_empty() {
                    continue;
                }

                match stripped.to_lowercase().as_str() {
                    "logging_level" => {
                        self.logging.level = value.parse().map_err(|_| {
                            ConfigError::invalid_value("logging.level", &value, "Invalid log level")
                        })?;
                    }
                    "hash_algorithm" => {
                        self.hash.algorithm = value.parse().map_err(|_| {
                            ConfigError::invalid_value(
                                "hash.algorithm",
                                &value,
                                "Invalid hash algorithm",
                            )
                        })?;
                    }
                    "records_duplicate_policy" => {
                        self.records.duplicate_policy = value.parse().map_err(|_| {
                            ConfigError::invalid_value(
                                "records.duplicate_policy",
                                &value,
                                "Invalid duplicate policy",
                            )
                        })?;
                    }
                    "records_on_malformed" => {
                        self.records.on_malformed = value.parse().map_err(|_| {
                            ConfigError::invalid_value(
                                "records.on_malformed",
                                &value,
                                "Invalid malformed-row policy",
                            )
                        })?;
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }

    /// Looks up the tree definition for a named subsystem.
    pub fn subsystem(&self, name: &str) -> Option<&SubsystemConfig> {
        self.subsystems.iter().find(|s| s.name == name)
    }
}
