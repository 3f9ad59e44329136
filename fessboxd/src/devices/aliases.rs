//! `<IMEI>` alias publication
//!
//! For every serving modem a symlink named after its IMEI points at the
//! serving device path. Publishing is serialized and always works from a
//! fresh registry snapshot, so the last publish reflects the latest state.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fessbox_core::{FessboxError, Result};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::modem_registry::ModemRegistry;

/// Maintains IMEI symlinks in one directory
pub struct AliasPublisher {
    dir: PathBuf,
    /// Aliases this process created; guards publication order too
    published: Mutex<HashSet<String>>,
}

impl AliasPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            published: Mutex::new(HashSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the alias for `imei`
    pub fn alias_path(&self, imei: &str) -> PathBuf {
        self.dir.join(imei)
    }

    /// Bring the aliases in line with the registry.
    ///
    /// Failures are collected and returned; they never abort the remaining
    /// aliases and never touch the registry.
    pub async fn publish(&self, registry: &ModemRegistry) -> Vec<FessboxError> {
        let mut published = self.published.lock().await;
        let modems = registry.snapshot().await;
        let mut errors = Vec::new();
        let mut current = HashSet::new();

        for modem in &modems {
            current.insert(modem.imei.clone());
            match self.link(&modem.imei, &modem.serving_path).await {
                Ok(()) => {
                    published.insert(modem.imei.clone());
                }
                Err(e) => {
                    warn!("Failed to publish alias for {}: {}", modem.imei, e);
                    errors.push(e);
                }
            }
        }

        let stale: Vec<String> = published.difference(&current).cloned().collect();
        for imei in stale {
            published.remove(&imei);
            if let Err(e) = self.unlink(&imei).await {
                warn!("Failed to remove alias for {}: {}", imei, e);
                errors.push(e);
            }
        }

        errors
    }

    /// Point `<dir>/<imei>` at `target`, replacing an older symlink
    async fn link(&self, imei: &str, target: &str) -> Result<()> {
        let alias = self.alias_path(imei);

        match fs::symlink_metadata(&alias).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                if fs::read_link(&alias).await? == Path::new(target) {
                    return Ok(());
                }
                fs::remove_file(&alias).await?;
            }
            Ok(_) => {
                return Err(alias_error(&alias, "exists and is not a symlink"));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::symlink(target, &alias)
            .await
            .map_err(|e| alias_error(&alias, &e.to_string()))?;
        debug!("Alias {} -> {}", alias.display(), target);
        Ok(())
    }

    /// Remove `<dir>/<imei>` if it is still a symlink
    async fn unlink(&self, imei: &str) -> Result<()> {
        let alias = self.alias_path(imei);
        match fs::symlink_metadata(&alias).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(&alias).await?;
                debug!("Removed alias {}", alias.display());
                Ok(())
            }
            Ok(_) => Err(alias_error(&alias, "not a symlink, left in place")),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn alias_error(alias: &Path, reason: &str) -> FessboxError {
    FessboxError::Alias {
        alias: alias.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fessbox_core::Modem;
    use tempfile::TempDir;

    const IMEI: &str = "123456789012345";

    fn modem(path: &str) -> Modem {
        Modem::new(IMEI, "640020123456789", path)
    }

    #[tokio::test]
    async fn test_publish_creates_alias() {
        let dir = TempDir::new().unwrap();
        let publisher = AliasPublisher::new(dir.path());
        let registry = ModemRegistry::new();
        registry.admit(modem("/dev/ttyUSB0")).await.unwrap();

        let errors = publisher.publish(&registry).await;

        assert!(errors.is_empty());
        let target = std::fs::read_link(dir.path().join(IMEI)).unwrap();
        assert_eq!(target, PathBuf::from("/dev/ttyUSB0"));
    }

    #[tokio::test]
    async fn test_publish_repoints_alias() {
        let dir = TempDir::new().unwrap();
        let publisher = AliasPublisher::new(dir.path());
        let registry = ModemRegistry::new();
        registry.admit(modem("/dev/ttyUSB1")).await.unwrap();
        publisher.publish(&registry).await;

        registry.admit(modem("/dev/ttyUSB0")).await.unwrap();
        let errors = publisher.publish(&registry).await;

        assert!(errors.is_empty());
        let target = std::fs::read_link(publisher.alias_path(IMEI)).unwrap();
        assert_eq!(target, PathBuf::from("/dev/ttyUSB0"));
    }

    #[tokio::test]
    async fn test_publish_removes_stale_alias() {
        let dir = TempDir::new().unwrap();
        let publisher = AliasPublisher::new(dir.path());
        let registry = ModemRegistry::new();
        registry.admit(modem("/dev/ttyUSB0")).await.unwrap();
        publisher.publish(&registry).await;

        registry.remove_path("/dev/ttyUSB0").await;
        let errors = publisher.publish(&registry).await;

        assert!(errors.is_empty());
        assert!(std::fs::symlink_metadata(dir.path().join(IMEI)).is_err());
    }

    #[tokio::test]
    async fn test_publish_refuses_to_replace_regular_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(IMEI), "keep me").unwrap();
        let publisher = AliasPublisher::new(dir.path());
        let registry = ModemRegistry::new();
        registry.admit(modem("/dev/ttyUSB0")).await.unwrap();

        let errors = publisher.publish(&registry).await;

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], FessboxError::Alias { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(IMEI)).unwrap(),
            "keep me"
        );
        // registry is untouched by alias failures
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_publish_leaves_foreign_symlinks_alone() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/dev/null", dir.path().join("999")).unwrap();
        let publisher = AliasPublisher::new(dir.path());
        let registry = ModemRegistry::new();

        let errors = publisher.publish(&registry).await;

        assert!(errors.is_empty());
        assert!(std::fs::symlink_metadata(dir.path().join("999")).is_ok());
    }
}
