//! Configuration validation for committee-trees
//!
//! This module contains functions for validating the tree configuration to
//! ensure all values are within acceptable ranges and consistent with each
//! other before any tree is constructed from them.

use std::collections::HashSet;

use super::error::ConfigError;
use super::{Config, SubsystemConfig};

/// Maximum supported address width in bits. Keys are 64-bit identifiers.
pub const MAX_TREE_HEIGHT: u8 = 64;

/// Validates the application configuration.
///
/// # Errors
///
/// Returns a `ConfigError` if any validation check fails.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_subsystems(&config.subsystems)?;
    Ok(())
}

/// Validates the subsystem tree definitions.
fn validate_subsystems(subsystems: &[SubsystemConfig]) -> Result<(), ConfigError> {
    if subsystems.is_empty() {
        return Err(ConfigError::missing_value(
            "subsystem: at least one subsystem tree must be defined",
        ));
    }

    let mut seen_names = HashSet::new();
    for subsystem in subsystems {
        if subsystem.name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "subsystem.name",
                &subsystem.name,
                "Subsystem name must not be empty",
            ));
        }

        if !seen_names.insert(subsystem.name.as_str()) {
            return Err(ConfigError::invalid_value(
                "subsystem.name",
                &subsystem.name,
                "Subsystem names must be unique",
            ));
        }

        if subsystem.tree_height == 0 {
            return Err(ConfigError::invalid_value(
                format!("subsystem.{}.tree_height", subsystem.name),
                subsystem.tree_height,
                "Tree height must be greater than 0",
            ));
        }

        if subsystem.tree_height > MAX_TREE_HEIGHT {
            return Err(ConfigError::invalid_value(
                format!("subsystem.{}.tree_height", subsystem.name),
                subsystem.tree_height,
                format!("Tree height must not exceed {} bits", MAX_TREE_HEIGHT),
            ));
        }
    }

    Ok(())
}
