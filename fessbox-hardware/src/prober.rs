//! Identity prober
//!
//! Drives command sessions over one channel until the modem reports a
//! well-formed IMEI and then a well-formed IMSI. Each phase is a retry loop
//! with an explicit deadline check per iteration.

use fessbox_core::at::{IMEI_COMMAND, IMSI_COMMAND, MANUFACTURER_COMMAND};
use fessbox_core::{is_digits, FessboxError, Modem, ModemConfig, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::serial_driver::SerialChannel;
use crate::session::{clean_result, CommandSession, DEFAULT_RESPONSE_BUFFER_SIZE};

/// Timing and sizing used while probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Deadline for the IMEI phase
    pub imei_timeout: Duration,
    /// Deadline for the IMSI phase
    pub imsi_timeout: Duration,
    /// Pause between failed attempts
    pub retry_interval: Duration,
    /// Response buffer bound handed to each session
    pub response_buffer_size: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            imei_timeout: Duration::from_secs(10),
            imsi_timeout: Duration::from_secs(20),
            retry_interval: Duration::from_millis(100),
            response_buffer_size: DEFAULT_RESPONSE_BUFFER_SIZE,
        }
    }
}

impl From<&ModemConfig> for ProbeConfig {
    fn from(config: &ModemConfig) -> Self {
        Self {
            imei_timeout: config.imei_timeout(),
            imsi_timeout: config.imsi_timeout(),
            retry_interval: config.retry_interval(),
            response_buffer_size: config.response_buffer_size,
        }
    }
}

/// Obtains a complete identity for one channel
#[derive(Debug, Clone, Default)]
pub struct IdentityProber {
    config: ProbeConfig,
}

impl IdentityProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe the modem behind `channel`.
    ///
    /// Returns a `Modem` only when both IMEI and IMSI were obtained; any
    /// phase timing out yields `NoIdentity`. The channel is closed when this
    /// returns.
    pub async fn probe(&self, mut channel: Box<dyn SerialChannel>) -> Result<Modem> {
        let path = channel.path().to_string();
        debug!("Probing identity on {}", path);

        let imei = query_until(
            channel.as_mut(),
            IMEI_COMMAND,
            self.config.imei_timeout,
            &self.config,
            is_digits,
        )
        .await?
        .ok_or_else(|| no_identity(&path, "imei"))?;
        debug!("{} reported IMEI {}", path, imei);

        // The IMSI phase owns the channel in its own task; its deadline holds
        // regardless of what the caller is doing.
        let config = self.config.clone();
        let known_imei = imei.clone();
        let imsi_task = tokio::spawn(async move {
            let result = query_until(
                channel.as_mut(),
                IMSI_COMMAND,
                config.imsi_timeout,
                &config,
                |value| is_digits(value) && value != known_imei,
            )
            .await;
            (channel, result)
        });

        let (mut channel, imsi) = imsi_task
            .await
            .map_err(|e| FessboxError::Other(format!("IMSI probe task failed: {}", e)))?;
        let imsi = imsi?.ok_or_else(|| no_identity(&path, "imsi"))?;

        let manufacturer = self.manufacturer(channel.as_mut()).await;
        channel.close();

        info!(
            "Identified modem on {}: IMEI {} IMSI {}{}",
            path,
            imei,
            imsi,
            manufacturer
                .as_ref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );

        Ok(Modem::new(imei, imsi, path).with_manufacturer(manufacturer))
    }

    /// Single best-effort manufacturer query
    async fn manufacturer(&self, channel: &mut dyn SerialChannel) -> Option<String> {
        let mut session =
            CommandSession::new(channel).with_buffer_size(self.config.response_buffer_size);
        match session.run(MANUFACTURER_COMMAND).await {
            Ok(raw) => Some(clean_result(&raw)).filter(|m| !m.is_empty()),
            Err(e) => {
                debug!("Manufacturer query failed: {}", e);
                None
            }
        }
    }
}

fn no_identity(path: &str, phase: &str) -> FessboxError {
    FessboxError::NoIdentity {
        path: path.to_string(),
        phase: phase.to_string(),
    }
}

/// Issue `command` until `accept` approves a cleaned response.
///
/// Returns `Ok(None)` once `timeout` elapses without an accepted value.
/// Errors that are not retryable abort the loop immediately.
async fn query_until<F>(
    channel: &mut dyn SerialChannel,
    command: &str,
    timeout: Duration,
    config: &ProbeConfig,
    accept: F,
) -> Result<Option<String>>
where
    F: Fn(&str) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        let now = Instant::now();
        if now >= deadline {
            warn!(
                "{} on {} gave no valid answer after {} attempts",
                command,
                channel.path(),
                attempts
            );
            return Ok(None);
        }

        attempts += 1;
        let mut session =
            CommandSession::new(&mut *channel).with_buffer_size(config.response_buffer_size);
        match session.run(command).await {
            Ok(raw) => {
                let value = clean_result(&raw);
                if accept(&value) {
                    return Ok(Some(value));
                }
                debug!("{} on {}: discarding {:?}", command, channel.path(), value);
            }
            Err(e) if e.is_retryable() => {
                debug!("{} on {} attempt {}: {}", command, channel.path(), attempts, e);
            }
            Err(e) => return Err(e),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(config.retry_interval.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ModemScript, ScriptedChannel};

    fn fast_config() -> ProbeConfig {
        ProbeConfig {
            imei_timeout: Duration::from_millis(300),
            imsi_timeout: Duration::from_millis(300),
            retry_interval: Duration::from_millis(5),
            response_buffer_size: 256,
        }
    }

    fn boxed(path: &str, script: ModemScript) -> (Box<dyn SerialChannel>, crate::mock::MockHandle) {
        let channel = ScriptedChannel::new(path, script);
        let handle = channel.handle();
        (Box::new(channel), handle)
    }

    #[tokio::test]
    async fn test_probe_success() {
        let script = ModemScript::identity("123456789012345", "640020123456789")
            .reply("AT+CGMI", "AT+CGMI\r\r\nhuawei\r\n\r\nOK\r\n");
        let (channel, handle) = boxed("/dev/ttyUSB0", script);

        let modem = IdentityProber::new(fast_config()).probe(channel).await.unwrap();

        assert_eq!(modem.imei, "123456789012345");
        assert_eq!(modem.imsi, "640020123456789");
        assert_eq!(modem.manufacturer.as_deref(), Some("huawei"));
        assert_eq!(modem.serving_path, "/dev/ttyUSB0");
        assert!(!handle.is_open());
        assert_eq!(handle.open_count(), handle.close_count());
    }

    #[tokio::test]
    async fn test_probe_without_manufacturer() {
        let (channel, _) = boxed(
            "/dev/ttyUSB0",
            ModemScript::identity("123456789012345", "640020123456789"),
        );

        let modem = IdentityProber::new(fast_config()).probe(channel).await.unwrap();
        assert!(modem.manufacturer.is_none());
    }

    #[tokio::test]
    async fn test_probe_retries_until_digits() {
        let script = ModemScript::identity("123456789012345", "640020123456789")
            .queue("\r\nERROR\r\n")
            .queue("\r\n+CME ERROR: 10\r\n")
            .queue("\r\nRING\r\n\r\nOK\r\n");
        let (channel, handle) = boxed("/dev/ttyUSB0", script);

        let modem = IdentityProber::new(fast_config()).probe(channel).await.unwrap();

        assert_eq!(modem.imei, "123456789012345");
        let imei_attempts = handle
            .writes()
            .iter()
            .filter(|w| w.as_str() == "AT+GSN\r")
            .count();
        assert_eq!(imei_attempts, 4);
        // one open/close cycle per attempt
        assert_eq!(handle.open_count(), handle.close_count());
    }

    #[tokio::test]
    async fn test_probe_never_ok_is_no_identity() {
        let script = ModemScript::new().default_reply("\r\nERROR\r\n");
        let (channel, handle) = boxed("/dev/ttyUSB2", script);

        let started = Instant::now();
        let result = IdentityProber::new(fast_config()).probe(channel).await;

        assert!(matches!(
            result,
            Err(FessboxError::NoIdentity { ref path, ref phase })
                if path == "/dev/ttyUSB2" && phase == "imei"
        ));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(handle.writes().len() > 1);
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_probe_imsi_equal_to_imei_is_discarded() {
        let script = ModemScript::identity("123456789012345", "123456789012345");
        let (channel, _) = boxed("/dev/ttyUSB1", script);

        let result = IdentityProber::new(fast_config()).probe(channel).await;

        assert!(matches!(
            result,
            Err(FessboxError::NoIdentity { ref phase, .. }) if phase == "imsi"
        ));
    }

    #[tokio::test]
    async fn test_probe_imsi_timeout_fails_whole_probe() {
        let script = ModemScript::new()
            .reply("AT+GSN", "\r\n123456789012345\r\n\r\nOK\r\n")
            .reply("AT+CIMI", "\r\n+CME ERROR: SIM not inserted\r\n");
        let (channel, _) = boxed("/dev/ttyUSB0", script);

        let result = IdentityProber::new(fast_config()).probe(channel).await;

        assert!(matches!(
            result,
            Err(FessboxError::NoIdentity { ref phase, .. }) if phase == "imsi"
        ));
    }

    #[tokio::test]
    async fn test_probe_port_unavailable_aborts_immediately() {
        let (channel, handle) = boxed("/dev/ttyUSB7", ModemScript::new().fail_open());

        let started = Instant::now();
        let result = IdentityProber::new(fast_config()).probe(channel).await;

        assert!(matches!(result, Err(FessboxError::PortUnavailable { .. })));
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(handle.open_count(), 0);
    }

    #[test]
    fn test_probe_config_from_modem_config() {
        let config = ProbeConfig::from(&ModemConfig::default());
        assert_eq!(config.imei_timeout, Duration::from_secs(10));
        assert_eq!(config.imsi_timeout, Duration::from_secs(20));
        assert_eq!(config.response_buffer_size, 512);
    }
}
