//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind hostname
    pub hostname: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Modem discovery and probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Directory holding serial device nodes
    pub device_dir: PathBuf,
    /// Directory where `<IMEI>` aliases are published
    pub alias_dir: PathBuf,
    /// Substring a device name must contain to be considered a modem
    pub interface_marker: String,
    /// Serial line speed
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Deadline for obtaining the IMEI, in seconds
    pub imei_timeout_secs: u64,
    /// Deadline for obtaining the IMSI, in seconds
    pub imsi_timeout_secs: u64,
    /// Pause between failed probe attempts, in milliseconds
    pub retry_interval_ms: u64,
    /// Upper bound on the bytes collected for one response
    pub response_buffer_size: usize,
    /// Log every byte sent and received
    pub debug_uart: bool,
    /// Probe device nodes already present at startup
    pub coldplug: bool,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            alias_dir: PathBuf::from("/dev"),
            interface_marker: "USB".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 500,
            imei_timeout_secs: 10,
            imsi_timeout_secs: 20,
            retry_interval_ms: 100,
            response_buffer_size: 512,
            debug_uart: false,
            coldplug: true,
        }
    }
}

impl ModemConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn imei_timeout(&self) -> Duration {
        Duration::from_secs(self.imei_timeout_secs)
    }

    pub fn imsi_timeout(&self) -> Duration {
        Duration::from_secs(self.imsi_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Static configuration for the fessbox daemon.
///
/// Located at `~/.config/fessbox/config.toml` by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticConfig {
    /// Server configuration (hostname, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Modem discovery configuration
    #[serde(default)]
    pub modem: ModemConfig,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
