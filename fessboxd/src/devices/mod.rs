//! Modem device management
//!
//! - [`modem_registry`] - IMEI to serving path map with tie-break admission
//! - [`aliases`] - `<IMEI>` symlink publication
//! - [`event_source`] - device node notifications from `notify`
//! - [`manager`] - the [`ModemManager`] facade used by the API
//!
//! The hotplug watcher itself is private to this module.

pub mod aliases;
pub mod event_source;
pub mod manager;
pub mod modem_registry;
mod watcher;

pub use manager::ModemManager;
