//! AT command session
//!
//! Runs one command/response exchange over a [`SerialChannel`]. The channel
//! is opened on demand and always flushed and closed afterwards, whatever the
//! outcome, so a wedged device gets a fresh open on the next attempt.

use fessbox_core::at::{COMMAND_TERMINATOR, ECHO_PREFIX, ERROR_MARKER, OK_MARKER};
use fessbox_core::{FessboxError, Result};
use tracing::debug;

use crate::serial_driver::SerialChannel;

/// Default upper bound on a collected response
pub const DEFAULT_RESPONSE_BUFFER_SIZE: usize = 512;

const READ_CHUNK_SIZE: usize = 64;

/// One-shot command executor borrowing a channel
pub struct CommandSession<'a> {
    channel: &'a mut dyn SerialChannel,
    buffer_size: usize,
}

impl<'a> CommandSession<'a> {
    pub fn new(channel: &'a mut dyn SerialChannel) -> Self {
        Self {
            channel,
            buffer_size: DEFAULT_RESPONSE_BUFFER_SIZE,
        }
    }

    /// Override the response buffer bound
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Send `command` and return the raw response
    ///
    /// Fails with `CommandRejected` when the response lacks `OK`. The port is
    /// flushed and closed before returning in every case.
    pub async fn run(&mut self, command: &str) -> Result<Vec<u8>> {
        let result = self.exchange(command).await;

        if let Err(e) = self.channel.flush() {
            debug!(
                "Flush after {} on {} failed: {}",
                command,
                self.channel.path(),
                e
            );
        }
        self.channel.close();

        result
    }

    async fn exchange(&mut self, command: &str) -> Result<Vec<u8>> {
        if !self.channel.is_open() {
            self.channel.open()?;
        }
        self.channel.flush()?;

        let line = format!("{}{}", command, COMMAND_TERMINATOR);
        self.channel.write(line.as_bytes()).await?;

        let response = self.read_response().await?;
        if !contains(&response, OK_MARKER.as_bytes()) {
            debug!(
                "{} rejected on {}: {:?}",
                command,
                self.channel.path(),
                String::from_utf8_lossy(&response)
            );
            return Err(FessboxError::CommandRejected {
                command: command.to_string(),
                response,
            });
        }

        Ok(response)
    }

    /// Collect bytes until a final status line, a silent read, or the bound
    async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::with_capacity(self.buffer_size);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while response.len() < self.buffer_size {
            let room = (self.buffer_size - response.len()).min(READ_CHUNK_SIZE);
            let n = self.channel.read(&mut chunk[..room]).await?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n]);
            if has_final_status(&response) {
                break;
            }
        }

        Ok(response)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Whether the last line received is a final result code
fn has_final_status(response: &[u8]) -> bool {
    let text = String::from_utf8_lossy(response);
    let last_line = text
        .trim_end()
        .rsplit(|c: char| c == '\r' || c == '\n')
        .next()
        .unwrap_or("");
    last_line == OK_MARKER || last_line.contains(ERROR_MARKER)
}

/// Extract the payload of a successful response.
///
/// Takes the text before the final `OK`, trims it, and, when it starts with a
/// letter, drops an echoed `AT...` command line. Works the same whether or
/// not the modem echoes.
pub fn clean_result(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let before = match text.rfind(OK_MARKER) {
        Some(idx) => &text[..idx],
        None => &text[..],
    };

    let head = before.trim_start();
    if head.starts_with(|c: char| c.is_alphabetic()) {
        if let Some(echo) = find_echo(head) {
            if let Some(cr) = head[echo..].find('\r') {
                return head[echo + cr + 1..].trim().to_string();
            }
        }
    }

    before.trim().to_string()
}

/// Position of an `AT` prefix starting a line
fn find_echo(text: &str) -> Option<usize> {
    text.match_indices(ECHO_PREFIX)
        .map(|(idx, _)| idx)
        .find(|&idx| idx == 0 || matches!(text.as_bytes()[idx - 1], b'\r' | b'\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ModemScript, ScriptedChannel};

    #[test]
    fn test_clean_result_plain_digits() {
        let raw = b"\r\n123456789012345\r\n\r\nOK\r\n";
        assert_eq!(clean_result(raw), "123456789012345");
    }

    #[test]
    fn test_clean_result_strips_echo() {
        let echoed = b"AT+GSN\r\r\n123456789012345\r\n\r\nOK\r\n";
        let plain = b"\r\n123456789012345\r\n\r\nOK\r\n";

        let a = clean_result(echoed);
        let b = clean_result(plain);
        assert_eq!(a, "123456789012345");
        assert_eq!(a, b);
    }

    #[test]
    fn test_clean_result_echo_only() {
        assert_eq!(clean_result(b"AT+GSN \rOK\r\n"), "");
    }

    #[test]
    fn test_clean_result_echo_after_noise() {
        let raw = b"RING\r\nAT+CIMI\r\r\n640020123456789\r\n\r\nOK\r\n";
        assert_eq!(clean_result(raw), "640020123456789");
    }

    #[test]
    fn test_clean_result_keeps_words_containing_at() {
        let raw = b"\r\nQUALCOMM INCORPORATED\r\n\r\nOK\r\n";
        assert_eq!(clean_result(raw), "QUALCOMM INCORPORATED");
    }

    #[test]
    fn test_clean_result_echo_with_text_payload() {
        let raw = b"AT+CGMI\r\r\nhuawei\r\n\r\nOK\r\n";
        assert_eq!(clean_result(raw), "huawei");
    }

    #[test]
    fn test_clean_result_without_marker() {
        assert_eq!(clean_result(b"  \r\n12345\r\n"), "12345");
    }

    #[test]
    fn test_has_final_status() {
        assert!(has_final_status(b"\r\n123\r\n\r\nOK\r\n"));
        assert!(has_final_status(b"\r\nERROR\r\n"));
        assert!(has_final_status(b"\r\n+CME ERROR: 10\r\n"));
        assert!(!has_final_status(b"\r\n1234"));
        assert!(!has_final_status(b"\r\nNOKIA\r\n"));
    }

    #[tokio::test]
    async fn test_run_success_returns_raw_and_closes() {
        let script = ModemScript::new().reply("AT+GSN", "\r\n123456789012345\r\n\r\nOK\r\n");
        let mut channel = ScriptedChannel::new("/dev/ttyUSB0", script);
        let handle = channel.handle();

        let raw = CommandSession::new(&mut channel).run("AT+GSN").await.unwrap();

        assert_eq!(clean_result(&raw), "123456789012345");
        assert_eq!(handle.writes(), vec!["AT+GSN\r".to_string()]);
        assert!(!channel.is_open());
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_run_without_ok_is_rejected_and_closes() {
        let script = ModemScript::new().reply("AT+GSN", "\r\nERROR\r\n");
        let mut channel = ScriptedChannel::new("/dev/ttyUSB2", script);

        let result = CommandSession::new(&mut channel).run("AT+GSN").await;

        match result {
            Err(FessboxError::CommandRejected { command, response }) => {
                assert_eq!(command, "AT+GSN");
                assert_eq!(response, b"\r\nERROR\r\n".to_vec());
            }
            other => panic!("Expected CommandRejected, got {:?}", other),
        }
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_run_silent_modem_is_rejected() {
        let mut channel = ScriptedChannel::new("/dev/ttyUSB2", ModemScript::new());

        let result = CommandSession::new(&mut channel).run("AT+GSN").await;

        assert!(matches!(
            result,
            Err(FessboxError::CommandRejected { ref response, .. }) if response.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_run_open_failure_is_port_unavailable() {
        let mut channel = ScriptedChannel::new("/dev/ttyUSB9", ModemScript::new().fail_open());

        let result = CommandSession::new(&mut channel).run("AT").await;

        assert!(matches!(result, Err(FessboxError::PortUnavailable { .. })));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_response_is_bounded() {
        let noise = "A".repeat(4096);
        let script = ModemScript::new().reply("AT+GSN", noise);
        let mut channel = ScriptedChannel::new("/dev/ttyUSB0", script);

        let result = CommandSession::new(&mut channel)
            .with_buffer_size(100)
            .run("AT+GSN")
            .await;

        match result {
            Err(FessboxError::CommandRejected { response, .. }) => {
                assert_eq!(response.len(), 100)
            }
            other => panic!("Expected CommandRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stops_reading_at_final_status() {
        // Bytes after the status line are left unread and flushed
        let script = ModemScript::new().reply("AT", "\r\nOK\r\n").chunk_size(4);
        let mut channel = ScriptedChannel::new("/dev/ttyUSB0", script);
        let handle = channel.handle();

        let raw = CommandSession::new(&mut channel).run("AT").await.unwrap();
        assert_eq!(raw, b"\r\nOK".to_vec());
        assert!(handle.flush_count() >= 2);
    }
}
