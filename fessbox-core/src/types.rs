//! Core types for GSM dongle management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A fully identified modem.
///
/// Only complete identity tuples exist: a `Modem` is built once both IMEI
/// and IMSI were probed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modem {
    /// Equipment identity, digits only
    pub imei: String,
    /// Subscriber identity of the inserted SIM, digits only
    pub imsi: String,
    /// Manufacturer string reported by the modem, if it answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Device path of the control interface serving this modem
    pub serving_path: String,
}

impl Modem {
    /// Create a modem without manufacturer information
    pub fn new(
        imei: impl Into<String>,
        imsi: impl Into<String>,
        serving_path: impl Into<String>,
    ) -> Self {
        Self {
            imei: imei.into(),
            imsi: imsi.into(),
            manufacturer: None,
            serving_path: serving_path.into(),
        }
    }

    /// Attach a manufacturer string
    pub fn with_manufacturer(mut self, manufacturer: Option<String>) -> Self {
        self.manufacturer = manufacturer;
        self
    }

    /// Read-only view handed to the HTTP layer
    pub fn summary(&self) -> ModemSummary {
        ModemSummary {
            manufacturer: self.manufacturer.clone(),
            serving_path: self.serving_path.clone(),
        }
    }
}

/// Public view of a registry entry, keyed by IMEI in listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    pub serving_path: String,
}

/// Snapshot of all admitted modems keyed by IMEI
pub type ModemMap = HashMap<String, ModemSummary>;

/// Action carried by an OS device notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAction {
    Add,
    Remove,
}

impl DeviceAction {
    /// Parse the textual action of a notification.
    ///
    /// Returns `None` for actions this subsystem does not act upon
    /// (`change`, `bind`, ...).
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "add" => Some(DeviceAction::Add),
            "remove" => Some(DeviceAction::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceAction::Add => "add",
            DeviceAction::Remove => "remove",
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single attach/detach notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub action: DeviceAction,
    pub device_path: String,
}

impl DeviceEvent {
    pub fn add(device_path: impl Into<String>) -> Self {
        Self {
            action: DeviceAction::Add,
            device_path: device_path.into(),
        }
    }

    pub fn remove(device_path: impl Into<String>) -> Self {
        Self {
            action: DeviceAction::Remove,
            device_path: device_path.into(),
        }
    }
}

/// Lifecycle of a device path as seen by the hotplug watcher
///
/// `Unknown` is represented by the absence of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Identity probe in flight
    Probing,
    /// Identified and registered (serving or standby)
    Admitted,
    /// Probe failed or admission refused; waits for the next attach
    Rejected,
    /// Detached after having been admitted
    Removed,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Probing => "probing",
            DeviceState::Admitted => "admitted",
            DeviceState::Rejected => "rejected",
            DeviceState::Removed => "removed",
        }
    }
}

/// Check that a probed identity is a non-empty run of ASCII digits
pub fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Extract the trailing integer of a tty device name.
///
/// `/dev/ttyUSB3` yields `Some(3)`; names without a trailing number yield
/// `None`.
pub fn tty_ordinal(path: &str) -> Option<u32> {
    let name = Path::new(path).file_name()?.to_str()?;
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[stem.len()..];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Whether a device node name looks like a candidate modem interface
pub fn is_candidate_device(path: &str, interface_marker: &str) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.contains(interface_marker))
        .unwrap_or(false)
}
