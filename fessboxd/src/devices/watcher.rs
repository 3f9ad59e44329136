//! Hotplug watcher
//!
//! One task drains the device event stream and hands each candidate path's
//! actions to a dedicated worker. Different paths are handled concurrently;
//! actions for the same path run in arrival order. A worker exits after
//! handling a removal.

use std::collections::HashMap;
use std::sync::Arc;

use fessbox_core::{is_candidate_device, DeviceAction, DeviceEvent, DeviceState};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::manager::Shared;
use super::modem_registry::Removal;

/// Queue feeding the worker of one path
struct PathQueue {
    actions: UnboundedSender<DeviceAction>,
    /// Resolves once the worker has exited
    done: oneshot::Receiver<()>,
}

/// Drain `events` until stopped, then wait for all path workers.
///
/// Completion of this future is the shutdown acknowledgement.
pub(super) async fn drain(
    shared: Arc<Shared>,
    mut events: UnboundedReceiver<DeviceEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut queues: HashMap<String, PathQueue> = HashMap::new();
    // workers whose path was removed, still finishing their queue
    let mut retiring: HashMap<String, oneshot::Receiver<()>> = HashMap::new();
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                debug!("Device event drain received stop");
                break;
            }
            event = events.recv() => match event {
                Some(event) => dispatch(&shared, event, &mut queues, &mut retiring, &mut workers),
                None => {
                    debug!("Device event stream closed");
                    break;
                }
            },
            Some(result) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = result {
                    warn!("Device worker failed: {}", e);
                }
            }
        }
    }

    // closing the queues lets each worker finish what it holds and exit
    drop(queues);
    if !workers.is_empty() {
        debug!("Waiting for {} device workers", workers.len());
    }
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            warn!("Device worker failed: {}", e);
        }
    }
}

fn dispatch(
    shared: &Arc<Shared>,
    event: DeviceEvent,
    queues: &mut HashMap<String, PathQueue>,
    retiring: &mut HashMap<String, oneshot::Receiver<()>>,
    workers: &mut JoinSet<()>,
) {
    if !is_candidate_device(&event.device_path, &shared.interface_marker) {
        return;
    }
    debug!("Device event: {} {}", event.action, event.device_path);

    retiring.retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));

    let path = event.device_path;
    let queue = queues.entry(path.clone()).or_insert_with(|| {
        let (actions, rx) = mpsc::unbounded_channel();
        let (done_tx, done) = oneshot::channel();
        let previous = retiring.remove(&path);
        workers.spawn(run_worker(shared.clone(), path.clone(), rx, previous, done_tx));
        PathQueue { actions, done }
    });
    if queue.actions.send(event.action).is_err() {
        warn!("Worker for {} is gone, dropping {}", path, event.action);
    }

    // the worker exits once the removal is handled; a later add starts a
    // new one that waits for it
    if event.action == DeviceAction::Remove {
        if let Some(queue) = queues.remove(&path) {
            retiring.insert(path, queue.done);
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    path: String,
    mut actions: UnboundedReceiver<DeviceAction>,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    while let Some(action) = actions.recv().await {
        match action {
            DeviceAction::Add if shared.is_stopping() => {
                debug!("Shutting down, not probing {}", path);
            }
            DeviceAction::Add => shared.attach(&path).await,
            DeviceAction::Remove => shared.detach(&path).await,
        }
    }
    debug!("Worker for {} finished", path);
}

impl Shared {
    /// Probe `path` and admit the modem behind it
    async fn attach(&self, path: &str) {
        self.set_state(path, DeviceState::Probing).await;

        let probed = {
            let owner = self.port_owner(path).await;
            let _port = owner.lock().await;
            self.prober.probe(self.factory.channel(path)).await
        };
        let outcome = match probed {
            Ok(modem) => self.registry.admit(modem).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(admission) => {
                if !admission.changes_serving() {
                    info!("{} is a secondary port, kept on standby", path);
                }
                self.publish().await;
                self.set_state(path, DeviceState::Admitted).await;
            }
            Err(e) => {
                warn!("Rejected {}: {}", path, e);
                // no registry entry may outlive a failed probe of its path
                if self.registry.remove_path(path).await != Removal::Unknown {
                    self.publish().await;
                }
                self.set_state(path, DeviceState::Rejected).await;
            }
        }
    }

    /// Forget `path`; a no-op when nothing is registered under it
    async fn detach(&self, path: &str) {
        match self.registry.remove_path(path).await {
            Removal::Unknown => {
                debug!("Detached {} was not registered", path);
            }
            Removal::Serving { modem, promoted } => {
                info!(
                    "Modem {} detached from {}{}",
                    modem.imei,
                    path,
                    promoted
                        .as_ref()
                        .map(|m| format!(", now served by {}", m.serving_path))
                        .unwrap_or_default()
                );
                self.publish().await;
                self.set_state(path, DeviceState::Removed).await;
            }
            Removal::Standby { modem } => {
                debug!("Standby port {} of {} detached", path, modem.imei);
                self.set_state(path, DeviceState::Removed).await;
            }
        }
    }

    async fn publish(&self) {
        let errors = self.aliases.publish(&self.registry).await;
        if !errors.is_empty() {
            warn!("{} alias(es) could not be published", errors.len());
        }
    }
}
