//! Scripted transports for unit tests.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use regex::bytes::Regex;

use crate::channel::ByteChannel;
use crate::device::Device;
use crate::error::{ChannelError, Result, TransportError};
use crate::transport::{
    ExpectMatch, ShellChannel, SshClient, SshConfig, SshConnector, TelnetClient,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Route `log` output through the test harness; `RUST_LOG` picks the level.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn linux_device(prompt: &str) -> Arc<Device> {
    Arc::new(Device::new("linux", "user", "user", prompt).with_hostname("linux-user"))
}

#[derive(Debug, Default)]
struct ChannelScript {
    available: VecDeque<Vec<u8>>,
    batches: VecDeque<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    recv_calls: usize,
    fail_recv_after: Option<usize>,
    fail_sends: bool,
    closed: bool,
    close_calls: usize,
    timeout: Option<Duration>,
}

/// In-memory channel. Clones share the same script.
///
/// `available` chunks are ready immediately. `batches` become available
/// one at a time, each on the readiness check after the previous one ran
/// dry, which mimics output trickling in between flush cycles.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedChannel {
    script: Arc<Mutex<ChannelScript>>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_available(&self, data: &[u8]) {
        lock(&self.script).available.push_back(data.to_vec());
    }

    pub(crate) fn push_batch(&self, data: &[u8]) {
        lock(&self.script).batches.push_back(data.to_vec());
    }

    /// Make `data` available after the next `send`.
    pub(crate) fn reply_on_send(&self, data: &[u8]) {
        lock(&self.script).replies.push_back(data.to_vec());
    }

    pub(crate) fn fail_recv_after(&self, successes: usize) {
        lock(&self.script).fail_recv_after = Some(successes);
    }

    pub(crate) fn fail_sends(&self) {
        lock(&self.script).fail_sends = true;
    }

    pub(crate) fn set_closed(&self, closed: bool) {
        lock(&self.script).closed = closed;
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.script).sent.clone()
    }

    pub(crate) fn recv_calls(&self) -> usize {
        lock(&self.script).recv_calls
    }

    pub(crate) fn close_calls(&self) -> usize {
        lock(&self.script).close_calls
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        lock(&self.script).timeout
    }

    pub(crate) fn has_available(&self) -> bool {
        !lock(&self.script).available.is_empty()
    }

    pub(crate) fn pending_batches(&self) -> usize {
        lock(&self.script).batches.len()
    }
}

impl ByteChannel for ScriptedChannel {
    fn recv_ready(&mut self) -> bool {
        let mut script = lock(&self.script);
        if !script.available.is_empty() {
            return true;
        }
        if let Some(batch) = script.batches.pop_front() {
            script.available.push_back(batch);
        }
        false
    }

    async fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut script = lock(&self.script);
        script.recv_calls += 1;
        if script
            .fail_recv_after
            .is_some_and(|limit| script.recv_calls > limit)
        {
            return Err(ChannelError::Closed.into());
        }

        match script.available.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max_bytes {
                    let rest = chunk.split_off(max_bytes);
                    script.available.push_front(rest);
                }
                Ok(chunk)
            }
            None if script.closed => Err(ChannelError::Closed.into()),
            None => Err(ChannelError::Timeout(script.timeout.unwrap_or_default()).into()),
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut script = lock(&self.script);
        if script.fail_sends || script.closed {
            return Err(ChannelError::Closed.into());
        }
        script.sent.push(data.to_vec());
        if let Some(reply) = script.replies.pop_front() {
            script.available.push_back(reply);
        }
        Ok(())
    }
}

impl ShellChannel for ScriptedChannel {
    fn is_closed(&self) -> bool {
        lock(&self.script).closed
    }

    fn set_timeout(&mut self, timeout: Duration) {
        lock(&self.script).timeout = Some(timeout);
    }

    async fn close(&mut self) -> Result<()> {
        let mut script = lock(&self.script);
        script.closed = true;
        script.close_calls += 1;
        Ok(())
    }
}

#[derive(Debug)]
struct ClientState {
    active: bool,
    failing_shell: bool,
    close_calls: usize,
}

/// SSH client handing out one shared [`ScriptedChannel`].
#[derive(Debug, Clone)]
pub(crate) struct MockClient {
    state: Arc<Mutex<ClientState>>,
    channel: ScriptedChannel,
}

impl MockClient {
    pub(crate) fn new(channel: ScriptedChannel) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClientState {
                active: false,
                failing_shell: false,
                close_calls: 0,
            })),
            channel,
        }
    }

    pub(crate) fn failing_shell(self) -> Self {
        lock(&self.state).failing_shell = true;
        self
    }

    pub(crate) fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub(crate) fn set_active(&self, active: bool) {
        lock(&self.state).active = active;
    }

    pub(crate) fn close_calls(&self) -> usize {
        lock(&self.state).close_calls
    }
}

impl SshClient for MockClient {
    type Channel = ScriptedChannel;

    fn is_active(&self) -> bool {
        MockClient::is_active(self)
    }

    async fn invoke_shell(&mut self, _config: &SshConfig) -> Result<ScriptedChannel> {
        if lock(&self.state).failing_shell {
            return Err(ChannelError::ShellRequestFailed("shell request rejected".into()).into());
        }
        self.channel.set_closed(false);
        Ok(self.channel.clone())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.active = false;
        state.close_calls += 1;
        Ok(())
    }
}

/// Connection parameters seen by [`MockConnector`].
#[derive(Debug, Clone)]
pub(crate) struct ConnectAttempt {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) username: String,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    client: MockClient,
    fail_auth: bool,
    attempts: Arc<Mutex<Vec<ConnectAttempt>>>,
}

impl MockConnector {
    pub(crate) fn new(client: MockClient) -> Self {
        Self {
            client,
            fail_auth: false,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn failing_auth(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    pub(crate) fn last_attempt(&self) -> Option<ConnectAttempt> {
        lock(&self.attempts).last().cloned()
    }
}

impl SshConnector for MockConnector {
    type Client = MockClient;

    async fn connect(&self, config: &SshConfig) -> Result<MockClient> {
        lock(&self.attempts).push(ConnectAttempt {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            timeout: config.timeout,
        });
        if self.fail_auth {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }
        self.client.set_active(true);
        Ok(self.client.clone())
    }
}

#[derive(Debug, Default)]
struct TelnetScript {
    expect_results: VecDeque<ExpectMatch>,
    read_until_results: VecDeque<Vec<u8>>,
    read_until_calls: Vec<Vec<u8>>,
    opened: Vec<(String, u16)>,
    open_error: bool,
    connected: bool,
    probe_error: bool,
    linger: bool,
    close_calls: usize,
}

/// Telnet client replaying scripted prompt matches. Raw reads and writes go
/// through an inner [`ScriptedChannel`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTelnet {
    script: Arc<Mutex<TelnetScript>>,
    channel: ScriptedChannel,
}

impl MockTelnet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn channel(&self) -> ScriptedChannel {
        self.channel.clone()
    }

    pub(crate) fn expect_match(&self, index: usize, consumed: &[u8]) {
        lock(&self.script).expect_results.push_back(ExpectMatch {
            index: Some(index),
            matched: consumed.to_vec(),
            consumed: consumed.to_vec(),
        });
    }

    pub(crate) fn expect_no_match(&self, consumed: &[u8]) {
        lock(&self.script).expect_results.push_back(ExpectMatch {
            index: None,
            matched: Vec::new(),
            consumed: consumed.to_vec(),
        });
    }

    pub(crate) fn read_until_returns(&self, data: &[u8]) {
        lock(&self.script).read_until_results.push_back(data.to_vec());
    }

    pub(crate) fn read_until_calls(&self) -> Vec<Vec<u8>> {
        lock(&self.script).read_until_calls.clone()
    }

    pub(crate) fn opened(&self) -> Vec<(String, u16)> {
        lock(&self.script).opened.clone()
    }

    pub(crate) fn fail_open(&self) {
        lock(&self.script).open_error = true;
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        lock(&self.script).connected = connected;
    }

    pub(crate) fn fail_probe(&self) {
        lock(&self.script).probe_error = true;
    }

    /// Keep the socket reporting healthy after `close`.
    pub(crate) fn linger_on_close(&self) {
        lock(&self.script).linger = true;
    }

    pub(crate) fn close_calls(&self) -> usize {
        lock(&self.script).close_calls
    }
}

impl ByteChannel for MockTelnet {
    fn recv_ready(&mut self) -> bool {
        self.channel.recv_ready()
    }

    async fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        self.channel.recv(max_bytes).await
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.channel.send(data).await
    }
}

impl TelnetClient for MockTelnet {
    async fn open(&mut self, host: &str, port: u16, _timeout: Duration) -> Result<()> {
        let mut script = lock(&self.script);
        if script.open_error {
            return Err(TransportError::ConnectionFailed {
                host: host.to_string(),
                port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }
            .into());
        }
        script.opened.push((host.to_string(), port));
        script.connected = true;
        Ok(())
    }

    async fn expect(&mut self, _patterns: &[Regex], _timeout: Duration) -> Result<ExpectMatch> {
        Ok(lock(&self.script)
            .expect_results
            .pop_front()
            .unwrap_or(ExpectMatch {
                index: None,
                matched: Vec::new(),
                consumed: Vec::new(),
            }))
    }

    async fn read_until(&mut self, expected: &[u8], _timeout: Duration) -> Result<Vec<u8>> {
        let mut script = lock(&self.script);
        script.read_until_calls.push(expected.to_vec());
        Ok(script.read_until_results.pop_front().unwrap_or_default())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        ShellChannel::set_timeout(&mut self.channel, timeout);
    }

    async fn close(&mut self) -> Result<()> {
        let mut script = lock(&self.script);
        script.close_calls += 1;
        if !script.linger {
            script.connected = false;
        }
        Ok(())
    }

    fn probe_socket(&self) -> io::Result<SocketAddr> {
        let script = lock(&self.script);
        if script.probe_error {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        if !script.connected {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        Ok(SocketAddr::from(([192, 168, 56, 2], 23)))
    }
}
