//! Configuration file location
//!
//! The daemon resolves its config file as `--config`, then the
//! `FESSBOX_CONFIG` environment variable, then [`default_config_path`].

use std::path::PathBuf;

/// Environment variable that overrides the default config location
pub const CONFIG_ENV: &str = "FESSBOX_CONFIG";

/// Per-user config file, `<config dir>/fessbox/config.toml`.
///
/// `<config dir>` is `~/.config` on Linux; without a home directory the
/// system-wide `/etc/fessbox/config.toml` is used.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("fessbox")
        .join("config.toml")
}

/// Config path from an explicit flag, the override variable, or the default
pub fn resolve_config_path(flag: Option<PathBuf>, env: Option<String>) -> PathBuf {
    flag.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}
