//! fessbox-hardware
//!
//! Hardware crate containing the serial channel, the AT command session and
//! the identity prober. The daemon builds its modem registry and hotplug
//! watcher on top of these.
//!
//! Public API:
//! - `serial_driver::SerialChannel` - open/read/write/flush/close over one port
//! - `serial_driver::Connection` - `tokio-serial` backed channel
//! - `session::CommandSession` - one AT exchange with automatic port lifecycle
//! - `prober::IdentityProber` - IMEI/IMSI discovery with per-phase deadlines

pub mod prober;
pub mod serial_driver;
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use prober::{IdentityProber, ProbeConfig};
pub use serial_driver::{
    ChannelFactory, Connection, SerialChannel, SerialChannelFactory, SerialConfig,
};
pub use session::{clean_result, CommandSession};
