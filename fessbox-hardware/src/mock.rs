//! Scripted serial channels for tests
//!
//! A [`ScriptedChannel`] answers each written command from a [`ModemScript`]
//! and records what happened to it, so tests can assert on opens, closes and
//! written bytes after the channel has been moved into a probe.

use async_trait::async_trait;
use fessbox_core::at::{COMMAND_TERMINATOR, IMEI_COMMAND, IMSI_COMMAND};
use fessbox_core::{FessboxError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::serial_driver::{ChannelFactory, SerialChannel};

/// How a fake modem answers
#[derive(Debug, Clone, Default)]
pub struct ModemScript {
    replies: HashMap<String, Vec<u8>>,
    queued: VecDeque<Vec<u8>>,
    default_reply: Option<Vec<u8>>,
    fail_open: bool,
    chunk_size: Option<usize>,
    read_delay: Option<Duration>,
}

impl ModemScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A well-behaved modem that echoes commands and reports its identity
    pub fn identity(imei: &str, imsi: &str) -> Self {
        Self::new()
            .reply(
                IMEI_COMMAND,
                format!("{}\r\r\n{}\r\n\r\nOK\r\n", IMEI_COMMAND, imei),
            )
            .reply(
                IMSI_COMMAND,
                format!("{}\r\r\n{}\r\n\r\nOK\r\n", IMSI_COMMAND, imsi),
            )
    }

    /// Fixed answer to `command`
    pub fn reply(mut self, command: &str, response: impl AsRef<[u8]>) -> Self {
        self.replies
            .insert(command.to_string(), response.as_ref().to_vec());
        self
    }

    /// One-shot answer consumed by the next write, ahead of fixed replies
    pub fn queue(mut self, response: impl AsRef<[u8]>) -> Self {
        self.queued.push_back(response.as_ref().to_vec());
        self
    }

    /// Answer for commands without a fixed reply
    pub fn default_reply(mut self, response: impl AsRef<[u8]>) -> Self {
        self.default_reply = Some(response.as_ref().to_vec());
        self
    }

    /// Refuse every open, as a missing or busy node would
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Deliver responses in pieces of at most `size` bytes
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Sleep before every read, like a slow line
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    open: bool,
    open_count: usize,
    close_count: usize,
    flush_count: usize,
    writes: Vec<String>,
    pending: VecDeque<u8>,
    queued: VecDeque<Vec<u8>>,
}

/// Inspection handle shared with a [`ScriptedChannel`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<ChannelState>>,
}

impl MockHandle {
    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open_count
    }

    /// Number of closes that actually released a handle
    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().unwrap().flush_count
    }

    /// Every write, decoded lossily, terminator included
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }
}

/// In-memory channel driven by a [`ModemScript`]
pub struct ScriptedChannel {
    path: String,
    script: ModemScript,
    state: Arc<Mutex<ChannelState>>,
}

impl ScriptedChannel {
    pub fn new(path: impl Into<String>, script: ModemScript) -> Self {
        let state = ChannelState {
            queued: script.queued.clone(),
            ..ChannelState::default()
        };
        Self {
            path: path.into(),
            script,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }

    fn ensure_open(&self, state: &ChannelState) -> Result<()> {
        if state.open {
            Ok(())
        } else {
            Err(FessboxError::NotOpen(self.path.clone()))
        }
    }
}

#[async_trait]
impl SerialChannel for ScriptedChannel {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn open(&mut self) -> Result<()> {
        if self.script.fail_open {
            return Err(FessboxError::PortUnavailable {
                path: self.path.clone(),
                reason: "No such file or directory".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if !state.open {
            state.open = true;
            state.open_count += 1;
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.ensure_open(&state)?;

        let text = String::from_utf8_lossy(bytes).to_string();
        let command = text.trim_end_matches(COMMAND_TERMINATOR).to_string();
        state.writes.push(text);

        let reply = match state.queued.pop_front() {
            Some(queued) => Some(queued),
            None => self
                .script
                .replies
                .get(&command)
                .or(self.script.default_reply.as_ref())
                .cloned(),
        };
        if let Some(reply) = reply {
            state.pending.extend(reply);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open(&self.state.lock().unwrap())?;

        if let Some(delay) = self.script.read_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let limit = self.script.chunk_size.unwrap_or(buf.len()).min(buf.len());
        let mut n = 0;
        while n < limit {
            match state.pending.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.flush_count += 1;
        state.pending.clear();
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.open {
            state.open = false;
            state.close_count += 1;
        }
    }
}

/// Factory handing out scripted channels per device path
///
/// Paths without a script behave like missing device nodes.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<String, ModemScript>>,
    handles: Mutex<HashMap<String, Vec<MockHandle>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, script: ModemScript) -> Self {
        self.insert(path, script);
        self
    }

    pub fn insert(&self, path: &str, script: ModemScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), script);
    }

    /// Handles of every channel created for `path`, oldest first
    pub fn handles(&self, path: &str) -> Vec<MockHandle> {
        self.handles
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

impl ChannelFactory for ScriptedFactory {
    fn channel(&self, path: &str) -> Box<dyn SerialChannel> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| ModemScript::new().fail_open());
        let channel = ScriptedChannel::new(path, script);
        self.handles
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(channel.handle());
        Box::new(channel)
    }
}
