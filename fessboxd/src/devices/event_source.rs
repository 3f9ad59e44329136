//! Device notification source
//!
//! Watches the device directory with `notify` and turns node creation and
//! removal into `add`/`remove` events on a single ordered channel.

use fessbox_core::{DeviceAction, DeviceEvent, FessboxError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Live subscription to device node changes in one directory
///
/// Notifications stop when this value is dropped.
pub struct DevEventSource {
    _watcher: RecommendedWatcher,
}

impl DevEventSource {
    /// Start watching `dir`, forwarding events to `tx`.
    ///
    /// With `coldplug`, nodes already present are reported as `add` events,
    /// in name order, after the watch is in place.
    pub async fn subscribe(
        dir: impl Into<PathBuf>,
        coldplug: bool,
        tx: UnboundedSender<DeviceEvent>,
    ) -> Result<Self> {
        let dir = dir.into();

        let live_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for device_event in translate(&event) {
                    // receiver gone means the manager is shutting down
                    let _ = live_tx.send(device_event);
                }
            }
            Err(e) => warn!("Device watcher error: {}", e),
        })
        .map_err(watcher_error)?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(watcher_error)?;
        info!("Watching {} for device changes", dir.display());

        if coldplug {
            let existing = scan(&dir).await?;
            debug!("Coldplug: {} existing nodes in {}", existing.len(), dir.display());
            for path in existing {
                let _ = tx.send(DeviceEvent::add(path));
            }
        }

        Ok(Self { _watcher: watcher })
    }
}

fn watcher_error(err: notify::Error) -> FessboxError {
    FessboxError::Watcher(err.to_string())
}

/// Map a filesystem notification onto device events
pub fn translate(event: &Event) -> Vec<DeviceEvent> {
    let action = match event.kind {
        EventKind::Create(_) => DeviceAction::Add,
        EventKind::Remove(_) => DeviceAction::Remove,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| path.to_str())
        .map(|path| DeviceEvent {
            action,
            device_path: path.to_string(),
        })
        .collect()
}

/// Entries currently in `dir`, sorted
async fn scan(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(path) = entry.path().to_str() {
            paths.push(path.to_string());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[test]
    fn test_translate_create_and_remove() {
        let create = Event::new(EventKind::Create(CreateKind::Any))
            .add_path(PathBuf::from("/dev/ttyUSB0"));
        let remove = Event::new(EventKind::Remove(RemoveKind::Any))
            .add_path(PathBuf::from("/dev/ttyUSB0"));

        assert_eq!(translate(&create), vec![DeviceEvent::add("/dev/ttyUSB0")]);
        assert_eq!(translate(&remove), vec![DeviceEvent::remove("/dev/ttyUSB0")]);
    }

    #[test]
    fn test_translate_ignores_other_kinds() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/dev/ttyUSB0"));
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/dev/ttyUSB0"));

        assert!(translate(&modify).is_empty());
        assert!(translate(&access).is_empty());
    }

    #[tokio::test]
    async fn test_coldplug_reports_existing_nodes_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ttyUSB1"), "").unwrap();
        std::fs::write(dir.path().join("ttyUSB0"), "").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _source = DevEventSource::subscribe(dir.path(), true, tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.action, DeviceAction::Add);
        assert!(first.device_path.ends_with("ttyUSB0"));
        assert!(second.device_path.ends_with("ttyUSB1"));
    }

    #[tokio::test]
    async fn test_live_create_is_reported() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _source = DevEventSource::subscribe(dir.path(), false, tx).await.unwrap();

        std::fs::write(dir.path().join("ttyUSB4"), "").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.action == DeviceAction::Add {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        assert!(event.device_path.ends_with("ttyUSB4"));
    }

    #[tokio::test]
    async fn test_subscribe_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = DevEventSource::subscribe(dir.path().join("missing"), false, tx).await;
        assert!(matches!(result, Err(FessboxError::Watcher(_))));
    }
}
