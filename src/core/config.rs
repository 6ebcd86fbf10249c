//! Link configuration
//!
//! Every threshold the protocol depends on (framing markers, retry budget,
//! handshake timeout) lives here instead of in protocol constants, so the
//! codec and managers stay injectable.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::types::{Role, Tick};
use crate::protocol::catalog::ConfirmationPolicy;
use crate::protocol::{DEFAULT_FOOTER, DEFAULT_HEADER};

/// Upper bound on retransmissions of a single message
pub const MAX_RETRY_LIMIT: u32 = 32;

/// Top-level configuration for one end of the link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Local role
    pub role: Role,
    /// Frame delimiters
    #[serde(default)]
    pub framing: FramingConfig,
    /// Confirmation and retransmission settings
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    /// Handshake settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Serial port settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Interval between driver polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Frame delimiters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Byte sequence opening every frame
    pub header: Vec<u8>,
    /// Byte sequence closing every frame
    pub footer: Vec<u8>,
}

/// Confirmation and retransmission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Ticks to wait for a confirmation before retransmitting
    pub confirmation_timeout: Tick,
    /// Retransmissions attempted before a delivery failure is reported
    pub max_retries: u32,
    /// Which message classes must be confirmed
    #[serde(default)]
    pub policy: ConfirmationPolicy,
}

/// Handshake settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Ticks a half-open handshake may wait before it is restarted
    pub sync_timeout: Tick,
    /// Whether the driver sends a sync request as soon as it starts
    pub auto_connect: bool,
}

/// Serial port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    20
}

impl Default for FramingConfig {
    fn default() -> Self {
        FramingConfig {
            header: DEFAULT_HEADER.to_vec(),
            footer: DEFAULT_FOOTER.to_vec(),
        }
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        ReliabilityConfig {
            confirmation_timeout: 500,
            max_retries: 5,
            policy: ConfirmationPolicy::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            sync_timeout: 2000,
            auto_connect: true,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: super::DEFAULT_BAUD_RATE,
            timeout_ms: 10,
        }
    }
}

impl LinkConfig {
    /// Creates a default configuration for the given role
    pub fn new(role: Role) -> Self {
        LinkConfig {
            role,
            framing: FramingConfig::default(),
            reliability: ReliabilityConfig::default(),
            sync: SyncConfig::default(),
            serial: SerialConfig::default(),
            poll_interval_ms: default_poll_interval(),
        }
    }

    /// Loads and validates a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read config: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the link cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.framing.header.is_empty() {
            return Err(Error::config("Frame header must not be empty"));
        }
        if self.framing.footer.is_empty() {
            return Err(Error::config("Frame footer must not be empty"));
        }
        if self.reliability.confirmation_timeout == 0 {
            return Err(Error::config("Confirmation timeout must be non-zero"));
        }
        if self.reliability.max_retries > MAX_RETRY_LIMIT {
            return Err(Error::config(format!(
                "max_retries {} exceeds limit {}",
                self.reliability.max_retries, MAX_RETRY_LIMIT
            )));
        }
        if self.sync.sync_timeout == 0 {
            return Err(Error::config("Sync timeout must be non-zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("Poll interval must be non-zero"));
        }
        Ok(())
    }
}
