//! Modem registry with tie-break admission
//!
//! Maps each IMEI to the device path currently serving it. When several
//! tty nodes of one modem answer with the same IMEI, a [`TieBreakPolicy`]
//! picks the serving one; the others are kept on standby so that a detach
//! of the serving path can hand over to the next best port.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use fessbox_core::{tty_ordinal, FessboxError, Modem, ModemMap, Result};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Decides which of two ports answering the same IMEI is the control port
///
/// This is a heuristic: USB modems do not say which interface takes AT
/// commands, so implementations guess from the device naming.
pub trait TieBreakPolicy: Send + Sync {
    /// `Less` when `a` is the better serving path, `None` when undecidable
    fn compare(&self, a: &str, b: &str) -> Option<Ordering>;
}

/// Prefers the lowest trailing tty number (`ttyUSB0` over `ttyUSB1`)
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestOrdinal;

impl TieBreakPolicy for LowestOrdinal {
    fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        Some(tty_ordinal(a)?.cmp(&tty_ordinal(b)?))
    }
}

/// Outcome of a successful admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First port seen for this IMEI
    Inserted,
    /// Candidate took over from a worse serving port, now on standby
    Replaced { previous: Modem },
    /// The serving port was probed again
    Refreshed,
    /// Candidate lost the tie-break and waits on standby
    Standby { serving_path: String },
}

impl Admission {
    /// Whether the serving view (and therefore the aliases) changed
    pub fn changes_serving(&self) -> bool {
        !matches!(self, Admission::Standby { .. })
    }
}

/// Outcome of removing a device path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The path served a modem; `promoted` took over if a standby existed
    Serving {
        modem: Modem,
        promoted: Option<Modem>,
    },
    /// The path was a standby port
    Standby { modem: Modem },
    /// Nothing registered under this path
    Unknown,
}

#[derive(Default)]
struct RegistryInner {
    serving: HashMap<String, Modem>,
    standby: HashMap<String, Vec<Modem>>,
}

/// Thread-safe IMEI → serving modem map
///
/// The lock is only held for map mutations, never across device I/O.
pub struct ModemRegistry {
    inner: RwLock<RegistryInner>,
    policy: Box<dyn TieBreakPolicy>,
}

impl ModemRegistry {
    /// Create an empty registry using [`LowestOrdinal`]
    pub fn new() -> Self {
        Self::with_policy(Box::new(LowestOrdinal))
    }

    pub fn with_policy(policy: Box<dyn TieBreakPolicy>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            policy,
        }
    }

    /// Admit a freshly probed modem.
    ///
    /// Fails with `UnresolvableTie` when the IMEI is already served by
    /// another path and the policy cannot compare the two; the existing
    /// entry is kept and the candidate is not recorded.
    pub async fn admit(&self, candidate: Modem) -> Result<Admission> {
        let mut inner = self.inner.write().await;
        let path = candidate.serving_path.clone();

        inner.forget_standby(&path);
        let stale_imei = inner
            .serving
            .values()
            .find(|m| m.serving_path == path && m.imei != candidate.imei)
            .map(|m| m.imei.clone());
        if let Some(stale_imei) = stale_imei {
            warn!("{} now reports IMEI {}, dropping {}", path, candidate.imei, stale_imei);
            self.remove_serving(&mut inner, &stale_imei);
        }

        let Some(existing) = inner.serving.get(&candidate.imei) else {
            info!("Admitted IMEI {} on {}", candidate.imei, path);
            inner.serving.insert(candidate.imei.clone(), candidate);
            return Ok(Admission::Inserted);
        };

        if existing.serving_path == path {
            debug!("Refreshed IMEI {} on {}", candidate.imei, path);
            inner.serving.insert(candidate.imei.clone(), candidate);
            return Ok(Admission::Refreshed);
        }

        match self.policy.compare(&path, &existing.serving_path) {
            Some(Ordering::Less) => {
                let imei = candidate.imei.clone();
                let previous = inner
                    .serving
                    .insert(imei.clone(), candidate)
                    .ok_or_else(|| FessboxError::Other(format!("IMEI {} vanished", imei)))?;
                info!(
                    "IMEI {} moved from {} to {}",
                    imei, previous.serving_path, path
                );
                inner.standby.entry(imei).or_default().push(previous.clone());
                Ok(Admission::Replaced { previous })
            }
            Some(_) => {
                let serving_path = existing.serving_path.clone();
                debug!(
                    "IMEI {} stays on {}, {} on standby",
                    candidate.imei, serving_path, path
                );
                inner
                    .standby
                    .entry(candidate.imei.clone())
                    .or_default()
                    .push(candidate);
                Ok(Admission::Standby { serving_path })
            }
            None => {
                warn!(
                    "Cannot decide between {} and {} for IMEI {}",
                    existing.serving_path, path, candidate.imei
                );
                Err(FessboxError::UnresolvableTie {
                    imei: candidate.imei,
                    existing: existing.serving_path.clone(),
                    candidate: path,
                })
            }
        }
    }

    /// Remove whatever `path` is registered as.
    ///
    /// Removing a serving path promotes the best standby port, if any.
    pub async fn remove_path(&self, path: &str) -> Removal {
        let mut inner = self.inner.write().await;

        let serving_imei = inner
            .serving
            .values()
            .find(|m| m.serving_path == path)
            .map(|m| m.imei.clone());
        if let Some(imei) = serving_imei {
            return match self.remove_serving(&mut inner, &imei) {
                Some((modem, promoted)) => Removal::Serving { modem, promoted },
                None => Removal::Unknown,
            };
        }

        match inner.forget_standby(path) {
            Some(modem) => Removal::Standby { modem },
            None => Removal::Unknown,
        }
    }

    /// Drop the serving entry for `imei` and promote its best standby
    fn remove_serving(
        &self,
        inner: &mut RegistryInner,
        imei: &str,
    ) -> Option<(Modem, Option<Modem>)> {
        let modem = inner.serving.remove(imei)?;

        let promoted = match inner.standby.get_mut(imei) {
            Some(candidates) if !candidates.is_empty() => {
                let mut best = 0;
                for (idx, m) in candidates.iter().enumerate().skip(1) {
                    let order = self
                        .policy
                        .compare(&m.serving_path, &candidates[best].serving_path);
                    if order == Some(Ordering::Less) {
                        best = idx;
                    }
                }
                Some(candidates.remove(best))
            }
            _ => None,
        };
        if inner.standby.get(imei).is_some_and(|c| c.is_empty()) {
            inner.standby.remove(imei);
        }

        if let Some(ref next) = promoted {
            info!(
                "IMEI {} moved from {} to standby port {}",
                imei, modem.serving_path, next.serving_path
            );
            inner.serving.insert(imei.to_string(), next.clone());
        } else {
            info!("IMEI {} removed with {}", imei, modem.serving_path);
        }

        Some((modem, promoted))
    }

    /// Resolve an identifier to a serving modem.
    ///
    /// Matches by IMEI, by full serving path, or by the serving path's base
    /// name (`ttyUSB0`).
    pub async fn find(&self, identifier: &str) -> Option<Modem> {
        let inner = self.inner.read().await;
        if let Some(modem) = inner.serving.get(identifier) {
            return Some(modem.clone());
        }
        inner
            .serving
            .values()
            .find(|m| {
                m.serving_path == identifier
                    || Path::new(&m.serving_path)
                        .file_name()
                        .is_some_and(|name| name == identifier)
            })
            .cloned()
    }

    /// Read-only snapshot keyed by IMEI
    pub async fn list(&self) -> ModemMap {
        let inner = self.inner.read().await;
        inner
            .serving
            .iter()
            .map(|(imei, modem)| (imei.clone(), modem.summary()))
            .collect()
    }

    /// Serving modems, cloned
    pub async fn snapshot(&self) -> Vec<Modem> {
        self.inner.read().await.serving.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.serving.len()
    }

    /// Number of standby ports across all IMEIs
    pub async fn standby_len(&self) -> usize {
        self.inner.read().await.standby.values().map(Vec::len).sum()
    }
}

impl Default for ModemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryInner {
    /// Remove `path` from every standby list
    fn forget_standby(&mut self, path: &str) -> Option<Modem> {
        let mut removed = None;
        for candidates in self.standby.values_mut() {
            if let Some(idx) = candidates.iter().position(|m| m.serving_path == path) {
                removed = Some(candidates.remove(idx));
            }
        }
        self.standby.retain(|_, candidates| !candidates.is_empty());
        removed
    }
}
