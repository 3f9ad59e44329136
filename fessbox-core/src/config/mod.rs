//! Configuration types for fessbox
//!
//! [`StaticConfig`] holds server and modem settings. It is loaded once at
//! startup and stays read-only while the daemon runs; modem identity is
//! always rediscovered, never persisted.

mod paths;
mod static_config;

pub use paths::{default_config_path, resolve_config_path, CONFIG_ENV};
pub use static_config::{ModemConfig, ServerConfig, StaticConfig};
