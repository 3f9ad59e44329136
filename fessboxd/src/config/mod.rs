//! Configuration loading
//!
//! Reads the static TOML configuration once at startup, writing a default
//! file when none exists yet.

use fessbox_core::{FessboxError, Result, StaticConfig};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Load static config from `path`, creating it with defaults if missing.
pub(crate) async fn load_config(path: &Path) -> Result<StaticConfig> {
    if !path.exists() {
        info!(
            "Config not found at {}. Creating with defaults.",
            path.display()
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                FessboxError::Config(format!(
                    "Failed to create config directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let config = StaticConfig::default();
        let toml_str = config
            .to_toml()
            .map_err(|e| FessboxError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, &toml_str)
            .await
            .map_err(|e| FessboxError::Config(format!("Failed to write config file: {}", e)))?;

        return Ok(config);
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| FessboxError::Config(format!("Failed to read config file: {}", e)))?;

    let config = StaticConfig::from_toml(&content)
        .map_err(|e| FessboxError::Config(format!("Failed to parse config file: {}", e)))?;
    debug!("Loaded config: {:?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = load_config(&config_path).await.unwrap();

        assert!(config_path.exists());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.modem.interface_marker, "USB");

        // the written file loads back to the same values
        let reloaded = load_config(&config_path).await.unwrap();
        assert_eq!(reloaded.modem.imsi_timeout_secs, 20);
    }

    #[tokio::test]
    async fn test_load_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[modem]\nalias_dir = \"/run/fessbox\"\nimei_timeout_secs = 5\n",
        )
        .await
        .unwrap();

        let config = load_config(&config_path).await.unwrap();

        assert_eq!(config.modem.alias_dir, PathBuf::from("/run/fessbox"));
        assert_eq!(config.modem.imei_timeout_secs, 5);
        assert_eq!(config.modem.device_dir, PathBuf::from("/dev"));
        assert_eq!(config.server.hostname, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_load_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[modem\nbroken").await.unwrap();

        let result = load_config(&config_path).await;
        assert!(matches!(result, Err(FessboxError::Config(_))));
    }
}
