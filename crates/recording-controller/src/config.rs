//! Recording controller configuration.
//!
//! Loaded from environment variables with sensible defaults; a fresh
//! `Config::default()` is what an unconfigured deployment gets.

use crate::errors::ConfigError;
use crate::sink::DEFAULT_METADATA_FILENAME;
use std::collections::HashMap;
use std::env;

/// Default sub-channel id the remote side creates for notifications.
pub const DEFAULT_CONTROL_CHANNEL_SID: u16 = 0;

/// Environment variable overriding the metadata file name.
pub const ENV_METADATA_FILENAME: &str = "RECORDING_METADATA_FILENAME";

/// Environment variable overriding the control sub-channel id.
pub const ENV_CONTROL_CHANNEL_SID: &str = "RECORDING_CONTROL_CHANNEL_SID";

/// Recording session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Metadata file name inside each session's output directory
    /// (default: "metadata.json"; collisions get numeric suffixes).
    pub metadata_filename: String,

    /// Sub-channel id of the control channel (default: 0).
    pub control_channel_sid: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_filename: DEFAULT_METADATA_FILENAME.to_string(),
            control_channel_sid: DEFAULT_CONTROL_CHANNEL_SID,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from an explicit variable map (testable).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let metadata_filename = vars
            .get(ENV_METADATA_FILENAME)
            .cloned()
            .unwrap_or_else(|| DEFAULT_METADATA_FILENAME.to_string());

        let control_channel_sid = match vars.get(ENV_CONTROL_CHANNEL_SID) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_CONTROL_CHANNEL_SID,
                value: raw.clone(),
            })?,
            None => DEFAULT_CONTROL_CHANNEL_SID,
        };

        Ok(Self {
            metadata_filename,
            control_channel_sid,
        })
    }
}
