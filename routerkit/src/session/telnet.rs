//! Telnet session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use regex::bytes::Regex;
use secrecy::ExposeSecret;

use super::{Occupancy, Session, SessionState, exchange};
use crate::channel::{LOGIN_PROMPTS, PASSWORD_PROMPTS, compile_patterns, drain, flush, flush_deep};
use crate::device::Device;
use crate::error::{ChannelError, Error, NegotiationStage, Protocol, Result, SessionError};
use crate::transport::{SessionConfig, TelnetClient, TelnetStream};

/// Session over Telnet.
///
/// Telnet sends credentials in clear text. It is kept for devices that
/// offer nothing else; prefer [`SshSession`](super::SshSession).
pub struct TelnetSession<T: TelnetClient = TelnetStream> {
    client: T,
    state: SessionState,
}

impl TelnetSession<TelnetStream> {
    /// A session over TCP with default settings and `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(SessionConfig::default().with_timeout(timeout))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let client = TelnetStream::new(config.timeout);
        Self::with_client(client, config)
    }
}

impl Default for TelnetSession<TelnetStream> {
    fn default() -> Self {
        Self::with_config(SessionConfig::default())
    }
}

impl<T: TelnetClient> TelnetSession<T> {
    /// A session driving `client`.
    pub fn with_client(client: T, config: SessionConfig) -> Self {
        warn!("Telnet is deprecated and insecure (clear-text credentials); use SshSession instead");
        Self {
            client,
            state: SessionState::new(config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.state.config
    }

    /// Handle to the busy flag, shared with this session.
    pub fn occupancy(&self) -> Occupancy {
        self.state.occupancy.clone()
    }

    pub fn client(&self) -> &T {
        &self.client
    }

    fn not_connected(&self) -> Error {
        SessionError::NotConnected {
            protocol: Protocol::Telnet,
            destination: self.state.destination(),
        }
        .into()
    }

    /// Open the connection, answer the login and password prompts, then
    /// synchronise on the device prompt.
    async fn login(&mut self, device: &Device, destination_ip: &str) -> Result<()> {
        let timeout = self.state.config.timeout;
        self.client
            .open(destination_ip, self.state.config.telnet_port, timeout)
            .await?;
        self.client.set_timeout(timeout);

        let login = compile_patterns(LOGIN_PROMPTS).map_err(ChannelError::from)?;
        let password = compile_patterns(PASSWORD_PROMPTS).map_err(ChannelError::from)?;

        self.answer(&login, NegotiationStage::Login, device.username.as_bytes())
            .await?;
        self.answer(
            &password,
            NegotiationStage::Password,
            device.password.expose_secret().as_bytes(),
        )
        .await?;

        let symbol = self.state.prompt.as_str().trim_end().to_string();
        let mut observed = if symbol.is_empty() {
            Vec::new()
        } else {
            self.client.read_until(symbol.as_bytes(), timeout).await?
        };
        observed.extend(drain(&mut self.client, self.state.config.chunk_size).await);

        self.state.prompt.refine(&observed);
        debug!(
            "prompt on {} is {:?}",
            destination_ip,
            self.state.prompt.as_str()
        );
        Ok(())
    }

    /// Wait for one of `patterns`, then send `reply` terminated by `\r`.
    async fn answer(
        &mut self,
        patterns: &[Regex],
        stage: NegotiationStage,
        reply: &[u8],
    ) -> Result<()> {
        let timeout = self.state.config.timeout;
        let result = self.client.expect(patterns, timeout).await?;
        if result.index.is_none() {
            return Err(SessionError::Negotiation {
                stage,
                destination: self.state.destination(),
                received: String::from_utf8_lossy(&result.consumed).into_owned(),
            }
            .into());
        }

        debug!("telnet {} prompt seen, answering", stage);
        let mut line = Vec::with_capacity(reply.len() + 1);
        line.extend_from_slice(reply);
        line.push(b'\r');
        self.client.send(&line).await
    }
}

impl<T: TelnetClient> Session for TelnetSession<T> {
    fn protocol(&self) -> Protocol {
        Protocol::Telnet
    }

    async fn connect(&mut self, device: Arc<Device>, destination_ip: &str) -> Result<&mut Self> {
        let _guard = self
            .state
            .occupancy
            .try_acquire(Protocol::Telnet, "connect")?;

        if self.is_connected() {
            if let Err(e) = self.client.close().await {
                warn!("closing previous telnet connection failed: {}", e);
            }
        }
        self.state.bind(device.clone(), destination_ip);

        match self.login(&device, destination_ip).await {
            Ok(()) => {
                info!(
                    "Telnet connected to {} ({}) as {}",
                    self.state.hostname(),
                    destination_ip,
                    device.username
                );
                Ok(self)
            }
            Err(e) => {
                if let Err(close_err) = self.client.close().await {
                    debug!("closing half-open telnet connection failed: {}", close_err);
                }
                match e {
                    Error::Session(SessionError::Negotiation { .. }) => Err(e),
                    source => Err(SessionError::ConnectFailed {
                        protocol: Protocol::Telnet,
                        destination: destination_ip.to_string(),
                        hostname: self.state.hostname(),
                        source: Box::new(source),
                    }
                    .into()),
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        match self.client.probe_socket() {
            Ok(_) => true,
            Err(e) => {
                debug!("telnet probe: {}", e);
                false
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let _guard = self
            .state
            .occupancy
            .try_acquire(Protocol::Telnet, "disconnect")?;

        if let Err(e) = self.client.close().await {
            warn!("closing telnet connection to {} failed: {}", self.state.destination(), e);
        }
        if self.is_connected() {
            return Err(SessionError::DisconnectFailed {
                protocol: Protocol::Telnet,
                destination: self.state.destination(),
                hostname: self.state.hostname(),
            }
            .into());
        }

        info!(
            "Telnet disconnected from {} ({})",
            self.state.hostname(),
            self.state.destination()
        );
        Ok(())
    }

    async fn write_command(&mut self, command: &str) -> Result<String> {
        let _guard = self
            .state
            .occupancy
            .try_acquire(Protocol::Telnet, "write_command")?;

        if !self.is_connected() {
            return Err(self.not_connected());
        }
        exchange(&mut self.client, command, &self.state).await
    }

    async fn flush(&mut self, idle: Option<Duration>) {
        if !self.is_connected() {
            return;
        }
        let idle = idle.unwrap_or(self.state.config.flush_idle);
        flush(&mut self.client, idle, self.state.config.chunk_size).await;
    }

    async fn flush_deep(&mut self, retries_timeout: Option<Duration>) -> bool {
        if !self.is_connected() {
            debug!("flush_deep skipped: telnet not connected");
            return false;
        }
        let config = &self.state.config;
        flush_deep(
            &mut self.client,
            &self.state.prompt,
            retries_timeout.unwrap_or(config.flush_deep_timeout),
            config.flush_idle,
            config.chunk_size,
        )
        .await
    }

    async fn read_until(&mut self, expected: &[u8]) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(self.not_connected());
        }
        self.client
            .read_until(expected, self.state.config.timeout)
            .await
    }

    fn timeout(&self) -> Duration {
        self.state.config.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.state.config.timeout = timeout;
        self.client.set_timeout(timeout);
    }

    fn prompt_symbol(&self) -> &str {
        self.state.prompt.as_str()
    }

    fn destination_ip(&self) -> Option<&str> {
        self.state.destination_ip.as_deref()
    }

    fn destination_device(&self) -> Option<&Arc<Device>> {
        self.state.device.as_ref()
    }

    fn is_occupied(&self) -> bool {
        self.state.occupancy.is_occupied()
    }
}

impl<T: TelnetClient> fmt::Display for TelnetSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.describe(f, "TelnetSession", self.is_connected())
    }
}

impl<T: TelnetClient> Drop for TelnetSession<T> {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!(
                "TelnetSession to {} dropped while connected; call disconnect() first",
                self.state.destination()
            );
        }
    }
}
