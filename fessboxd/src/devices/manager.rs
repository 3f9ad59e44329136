//! Modem manager
//!
//! Owns the registry, the alias publisher and the hotplug watcher, and
//! exposes the read/exec interface used by the HTTP layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fessbox_core::{DeviceEvent, DeviceState, FessboxError, ModemConfig, ModemMap, Result};
use fessbox_hardware::{
    ChannelFactory, CommandSession, IdentityProber, ProbeConfig, SerialChannelFactory,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::aliases::AliasPublisher;
use super::event_source::DevEventSource;
use super::modem_registry::ModemRegistry;
use super::watcher;

/// State shared between the manager facade and the watcher tasks
pub(super) struct Shared {
    pub(super) registry: ModemRegistry,
    pub(super) aliases: AliasPublisher,
    pub(super) factory: Arc<dyn ChannelFactory>,
    pub(super) prober: IdentityProber,
    pub(super) states: RwLock<HashMap<String, DeviceState>>,
    pub(super) interface_marker: String,
    pub(super) response_buffer_size: usize,
    /// Set once shutdown begins; no probe starts afterwards
    pub(super) stopping: AtomicBool,
    /// One owner per port: held by a probe or an exec session while it
    /// has the channel open
    port_owners: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Shared {
    pub(super) async fn set_state(&self, path: &str, state: DeviceState) {
        debug!("{} -> {}", path, state.as_str());
        self.states.write().await.insert(path.to_string(), state);
    }

    pub(super) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Ownership token for the port at `path`
    pub(super) async fn port_owner(&self, path: &str) -> Arc<Mutex<()>> {
        self.port_owners
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .clone()
    }
}

struct Control {
    stop: oneshot::Sender<()>,
    drain: JoinHandle<()>,
    source: Option<DevEventSource>,
}

/// Hotplug-driven modem manager
pub struct ModemManager {
    shared: Arc<Shared>,
    control: Mutex<Option<Control>>,
}

impl ModemManager {
    /// Subscribe to device notifications and start managing modems.
    ///
    /// Fails only when the notification source cannot be subscribed.
    pub async fn init(config: &ModemConfig) -> Result<Self> {
        let factory: Arc<dyn ChannelFactory> = Arc::new(SerialChannelFactory::from(config));
        let prober = IdentityProber::new(ProbeConfig::from(config));

        let (tx, rx) = mpsc::unbounded_channel();
        let source = DevEventSource::subscribe(config.device_dir.clone(), config.coldplug, tx)
            .await
            .map_err(|e| {
                warn!("Cannot subscribe to {}: {}", config.device_dir.display(), e);
                e
            })?;

        Ok(Self::start(config, prober, factory, rx, Some(source)))
    }

    /// Manager fed from an arbitrary event stream
    pub fn with_events(
        config: &ModemConfig,
        prober: IdentityProber,
        factory: Arc<dyn ChannelFactory>,
        events: UnboundedReceiver<DeviceEvent>,
    ) -> Self {
        Self::start(config, prober, factory, events, None)
    }

    fn start(
        config: &ModemConfig,
        prober: IdentityProber,
        factory: Arc<dyn ChannelFactory>,
        events: UnboundedReceiver<DeviceEvent>,
        source: Option<DevEventSource>,
    ) -> Self {
        let shared = Arc::new(Shared {
            registry: ModemRegistry::new(),
            aliases: AliasPublisher::new(config.alias_dir.clone()),
            factory,
            prober,
            states: RwLock::new(HashMap::new()),
            interface_marker: config.interface_marker.clone(),
            response_buffer_size: config.response_buffer_size,
            stopping: AtomicBool::new(false),
            port_owners: Mutex::new(HashMap::new()),
        });

        let (stop, stop_rx) = oneshot::channel();
        let drain = tokio::spawn(watcher::drain(shared.clone(), events, stop_rx));
        info!(
            "Modem manager started (marker {:?}, aliases in {})",
            config.interface_marker,
            shared.aliases.dir().display()
        );

        Self {
            shared,
            control: Mutex::new(Some(Control {
                stop,
                drain,
                source,
            })),
        }
    }

    /// Serving modems keyed by IMEI
    pub async fn list(&self) -> ModemMap {
        self.shared.registry.list().await
    }

    pub async fn modem_count(&self) -> usize {
        self.shared.registry.len().await
    }

    /// Lifecycle state of every candidate path seen so far
    pub async fn states(&self) -> HashMap<String, DeviceState> {
        self.shared.states.read().await.clone()
    }

    /// Run `command` on the modem matching `identifier` and return the raw
    /// response.
    ///
    /// `identifier` is an IMEI, a serving path or its base name. Waits for
    /// any probe currently holding the same port.
    pub async fn exec(&self, identifier: &str, command: &str) -> Result<Vec<u8>> {
        if command.trim().is_empty() {
            return Err(FessboxError::InvalidInput("empty command".to_string()));
        }

        let modem = self
            .shared
            .registry
            .find(identifier)
            .await
            .ok_or_else(|| FessboxError::NoDeviceFound(identifier.to_string()))?;
        debug!("Exec {:?} on {} ({})", command, modem.serving_path, modem.imei);

        let owner = self.shared.port_owner(&modem.serving_path).await;
        let _port = owner.lock().await;
        let mut channel = self.shared.factory.channel(&modem.serving_path);
        CommandSession::new(channel.as_mut())
            .with_buffer_size(self.shared.response_buffer_size)
            .run(command)
            .await
    }

    /// Stop processing device events.
    ///
    /// Returns once the draining task has acknowledged the stop and every
    /// in-flight probe has finished. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let Some(control) = self.control.lock().await.take() else {
            return;
        };

        info!("Stopping modem manager...");
        self.shared.stopping.store(true, Ordering::SeqCst);
        drop(control.source);
        // the drain task may already be gone if its stream ended
        let _ = control.stop.send(());

        if let Err(e) = control.drain.await {
            warn!("Device event task ended abnormally: {}", e);
        }
        info!("Modem manager stopped");
    }
}
