//! Error types for the fessbox system

use thiserror::Error;

/// Core error type for modem management operations
#[derive(Error, Debug)]
pub enum FessboxError {
    /// The device node could not be opened (missing, permission denied, busy)
    #[error("Port unavailable: {path}: {reason}")]
    PortUnavailable { path: String, reason: String },

    /// I/O was attempted on a channel that has not been opened
    #[error("Port not open: {0}")]
    NotOpen(String),

    /// The modem answered without the success marker
    #[error("Command rejected: {command} (response: {:?})", String::from_utf8_lossy(.response))]
    CommandRejected { command: String, response: Vec<u8> },

    /// Probing finished without a complete IMEI/IMSI pair
    #[error("No identity obtained from {path} during {phase} phase")]
    NoIdentity { path: String, phase: String },

    /// Two ports claim the same IMEI and neither encodes a comparable ordinal
    #[error("Unresolvable tie for IMEI {imei}: {existing} vs {candidate}")]
    UnresolvableTie {
        imei: String,
        existing: String,
        candidate: String,
    },

    /// No admitted modem matches the identifier
    #[error("No device found: {0}")]
    NoDeviceFound(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Alias publication errors
    #[error("Alias error for {alias}: {reason}")]
    Alias { alias: String, reason: String },

    /// Device notification source errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for fessbox operations
pub type Result<T> = std::result::Result<T, FessboxError>;

impl From<serde_json::Error> for FessboxError {
    fn from(err: serde_json::Error) -> Self {
        FessboxError::Serialization(err.to_string())
    }
}

impl FessboxError {
    /// Whether a probe loop may retry after this error
    ///
    /// Only a rejected command or a timed out exchange is retried. Anything
    /// else (the port vanished, permissions changed) ends the probe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FessboxError::CommandRejected { .. } | FessboxError::Timeout(_)
        )
    }
}
