//! Fessbox Core Library
//!
//! Shared types, errors, AT command vocabulary and configuration for the
//! GSM dongle manager. Used by both the hardware crate and the daemon.

pub mod api;
pub mod at;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    default_config_path, resolve_config_path, ModemConfig, StaticConfig, CONFIG_ENV,
};
pub use error::*;
pub use types::*;
