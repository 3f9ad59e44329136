//! Serial channel for low-level modem communication
//!
//! A [`Connection`] owns at most one OS port handle at a time. Opening is
//! explicit and closing is idempotent, so callers can run a fresh
//! open/close cycle per command without leaking descriptors.

use async_trait::async_trait;
use fessbox_core::{FessboxError, ModemConfig, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, warn};

/// Trait for serial channel abstraction
///
/// This trait enables testing of the command session and prober without
/// real hardware by allowing mock implementations.
#[async_trait]
pub trait SerialChannel: Send {
    /// Device path this channel talks to
    fn path(&self) -> &str;

    /// Whether an OS handle is currently held
    fn is_open(&self) -> bool;

    /// Acquire the OS serial resource
    ///
    /// Opening an already open channel is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Write all bytes to the line
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read available bytes into `buf`
    ///
    /// Returns `Ok(0)` when nothing arrives within the read timeout.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discard any buffered input
    fn flush(&mut self) -> Result<()>;

    /// Release the OS handle; calling it on a closed channel does nothing
    fn close(&mut self);
}

/// Identifies one OS serial device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout,
        }
    }
}

/// Serial channel backed by a `tokio-serial` stream
pub struct Connection {
    config: SerialConfig,
    port: Option<SerialStream>,
    debug_uart: bool,
}

impl Connection {
    /// Create a closed connection for the given device
    pub fn new(config: SerialConfig, debug_uart: bool) -> Self {
        Self {
            config,
            port: None,
            debug_uart,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream> {
        let path = &self.config.path;
        self.port
            .as_mut()
            .ok_or_else(|| FessboxError::NotOpen(path.clone()))
    }
}

#[async_trait]
impl SerialChannel for Connection {
    fn path(&self) -> &str {
        &self.config.path
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        debug!("Opening serial port: {}", self.config.path);

        let port = tokio_serial::new(&self.config.path, self.config.baud_rate)
            .timeout(self.config.read_timeout)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                warn!("Failed to open serial port {}: {}", self.config.path, e);
                FessboxError::PortUnavailable {
                    path: self.config.path.clone(),
                    reason: e.to_string(),
                }
            })?;

        self.port = Some(port);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let debug_uart = self.debug_uart;
        let write_timeout = self.config.read_timeout;
        let port = self.port_mut()?;

        if debug_uart {
            debug!("TX: {:?}", String::from_utf8_lossy(bytes));
        }

        timeout(write_timeout, port.write_all(bytes))
            .await
            .map_err(|_| {
                error!("Write timeout");
                FessboxError::Timeout("Write operation timed out".to_string())
            })?
            .map_err(|e| {
                error!("Write failed: {}", e);
                FessboxError::Serial(format!("Write failed: {}", e))
            })?;

        timeout(write_timeout, port.flush())
            .await
            .map_err(|_| FessboxError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| FessboxError::Serial(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let debug_uart = self.debug_uart;
        let read_timeout = self.config.read_timeout;
        let port = self.port_mut()?;

        match timeout(read_timeout, port.read(buf)).await {
            Err(_) => Ok(0),
            Ok(Ok(n)) => {
                if debug_uart && n > 0 {
                    debug!("RX: {:?}", String::from_utf8_lossy(&buf[..n]));
                }
                Ok(n)
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Ok(Err(e)) => {
                error!("Read error: {}", e);
                Err(FessboxError::Serial(format!("Read error: {}", e)))
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.port.as_mut() {
            Some(port) => port
                .clear(tokio_serial::ClearBuffer::Input)
                .map_err(|e| FessboxError::Serial(format!("Failed to clear buffer: {}", e))),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port: {}", self.config.path);
        }
    }
}

/// Builds a fresh channel for a device path
///
/// Every probing unit and every exec call gets its own channel instance, so
/// no channel is ever shared between two concurrent users.
pub trait ChannelFactory: Send + Sync {
    fn channel(&self, path: &str) -> Box<dyn SerialChannel>;
}

/// Factory producing real serial connections
#[derive(Debug, Clone)]
pub struct SerialChannelFactory {
    baud_rate: u32,
    read_timeout: Duration,
    debug_uart: bool,
}

impl SerialChannelFactory {
    pub fn new(baud_rate: u32, read_timeout: Duration, debug_uart: bool) -> Self {
        Self {
            baud_rate,
            read_timeout,
            debug_uart,
        }
    }
}

impl From<&ModemConfig> for SerialChannelFactory {
    fn from(config: &ModemConfig) -> Self {
        Self::new(config.baud_rate, config.read_timeout(), config.debug_uart)
    }
}

impl ChannelFactory for SerialChannelFactory {
    fn channel(&self, path: &str) -> Box<dyn SerialChannel> {
        Box::new(Connection::new(
            SerialConfig::new(path, self.baud_rate, self.read_timeout),
            self.debug_uart,
        ))
    }
}
