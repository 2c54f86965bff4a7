//! # Handshake Configuration
//!
//! Controller-wide handshake settings and TOML loading.
//!
//! ```toml
//! [handshake]
//! version_order = [4, 1]
//! use_version_bitmap = true
//! device_connection_rate_limit_per_min = 0
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{CapabilitySet, ProtocolVersion};

/// Handshake settings shared by every connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Supported versions, highest first.
    pub version_order: Vec<u8>,
    /// Negotiate through HELLO version bitmaps when the peer sends one.
    pub use_version_bitmap: bool,
    /// New devices admitted per minute; 0 disables the limit.
    pub device_connection_rate_limit_per_min: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            version_order: vec![ProtocolVersion::OF13.as_u8(), ProtocolVersion::OF10.as_u8()],
            use_version_bitmap: true,
            device_connection_rate_limit_per_min: 0,
        }
    }
}

impl HandshakeConfig {
    /// Create config for testing.
    pub fn for_testing() -> Self {
        Self {
            version_order: vec![4, 1, 0],
            use_version_bitmap: true,
            device_connection_rate_limit_per_min: 0,
        }
    }

    /// Validated capability set.
    ///
    /// # Errors
    ///
    /// Fails on an empty order, or one that is not strictly descending.
    pub fn capability_set(&self) -> Result<CapabilitySet, ConfigError> {
        if self.version_order.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(ConfigError::UnorderedVersions(self.version_order.clone()));
        }

        CapabilitySet::from_descending(
            self.version_order.iter().copied().map(ProtocolVersion).collect(),
        )
        .ok_or(ConfigError::EmptyVersionOrder)
    }
}

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read {path}: {error}")]
    Io {
        /// Config file path
        path: String,
        /// I/O error text
        error: String,
    },

    /// TOML parsing error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// No supported version configured.
    #[error("version_order must not be empty")]
    EmptyVersionOrder,

    /// Duplicate or ascending entries.
    #[error("version_order must be strictly descending: {0:?}")]
    UnorderedVersions(Vec<u8>),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    handshake: HandshakeConfig,
}

/// TOML-based configuration provider.
#[derive(Clone, Debug)]
pub struct TomlConfigProvider {
    config: HandshakeConfig,
}

impl TomlConfigProvider {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error on malformed TOML or an invalid version order.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        // Reject bad orders at load time rather than on the first connection
        file.handshake.capability_set()?;

        Ok(Self {
            config: file.handshake,
        })
    }

    /// Loaded settings.
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }
}
