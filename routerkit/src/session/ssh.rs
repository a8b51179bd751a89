//! SSH session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::{Occupancy, Session, SessionState, exchange};
use crate::channel::{flush, flush_deep};
use crate::device::Device;
use crate::error::{Protocol, Result, SessionError};
use crate::transport::{
    RusshConnector, SessionConfig, ShellChannel, SshClient, SshConfig, SshConnector,
};

type ChannelOf<C> = <<C as SshConnector>::Client as SshClient>::Channel;

/// Session over an SSH interactive shell.
///
/// Host keys are accepted without verification and only password
/// authentication is attempted, which suits lab equipment and nothing else.
pub struct SshSession<C: SshConnector = RusshConnector> {
    connector: C,
    client: Option<C::Client>,
    channel: Option<ChannelOf<C>>,
    state: SessionState,
}

impl SshSession<RusshConnector> {
    /// A session using russh with default settings and `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(SessionConfig::default().with_timeout(timeout))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_connector(RusshConnector, config)
    }
}

impl Default for SshSession<RusshConnector> {
    fn default() -> Self {
        Self::with_config(SessionConfig::default())
    }
}

impl<C: SshConnector> SshSession<C> {
    /// A session that opens connections through `connector`.
    pub fn with_connector(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            client: None,
            channel: None,
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

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Close channel then client, best effort, leaving both handles empty.
    async fn close_handles(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                warn!("closing SSH channel to {} failed: {}", self.state.destination(), e);
            }
        }
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!("closing SSH client to {} failed: {}", self.state.destination(), e);
            }
        }
    }

    /// Connect, authenticate and start a shell; the client is closed again if
    /// the shell cannot be started.
    async fn open(connector: &C, config: &SshConfig) -> Result<(C::Client, ChannelOf<C>)> {
        let mut client = connector.connect(config).await?;
        match client.invoke_shell(config).await {
            Ok(mut channel) => {
                channel.set_timeout(config.timeout);
                Ok((client, channel))
            }
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    debug!("closing half-open SSH client failed: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

impl<C: SshConnector> Session for SshSession<C> {
    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    async fn connect(&mut self, device: Arc<Device>, destination_ip: &str) -> Result<&mut Self> {
        let _guard = self.state.occupancy.try_acquire(Protocol::Ssh, "connect")?;

        self.close_handles().await;
        self.state.bind(device.clone(), destination_ip);

        let config = SshConfig::new(
            destination_ip,
            device.username.as_str(),
            SecretString::from(device.password.expose_secret().to_owned()),
            &self.state.config,
        );
        debug!("connecting to {} over SSH", config.socket_addr());

        match Self::open(&self.connector, &config).await {
            Ok((client, channel)) => {
                self.client = Some(client);
                self.channel = Some(channel);
                info!(
                    "SSH connected to {} ({}) as {}",
                    self.state.hostname(),
                    destination_ip,
                    device.username
                );
                Ok(self)
            }
            Err(source) => Err(SessionError::ConnectFailed {
                protocol: Protocol::Ssh,
                destination: destination_ip.to_string(),
                hostname: self.state.hostname(),
                source: Box::new(source),
            }
            .into()),
        }
    }

    fn is_connected(&self) -> bool {
        let client_alive = self.client.as_ref().is_some_and(|c| c.is_active());
        let channel_open = self.channel.as_ref().is_some_and(|c| !c.is_closed());
        client_alive && channel_open
    }

    async fn disconnect(&mut self) -> Result<()> {
        let _guard = self.state.occupancy.try_acquire(Protocol::Ssh, "disconnect")?;

        self.close_handles().await;
        if self.is_connected() {
            return Err(SessionError::DisconnectFailed {
                protocol: Protocol::Ssh,
                destination: self.state.destination(),
                hostname: self.state.hostname(),
            }
            .into());
        }

        info!(
            "SSH disconnected from {} ({})",
            self.state.hostname(),
            self.state.destination()
        );
        Ok(())
    }

    async fn write_command(&mut self, command: &str) -> Result<String> {
        let _guard = self
            .state
            .occupancy
            .try_acquire(Protocol::Ssh, "write_command")?;

        if !self.client.as_ref().is_some_and(|c| c.is_active()) {
            return Err(SessionError::NotConnected {
                protocol: Protocol::Ssh,
                destination: self.state.destination(),
            }
            .into());
        }
        let Some(channel) = self.channel.as_mut().filter(|c| !c.is_closed()) else {
            return Err(SessionError::ChannelUnavailable {
                protocol: Protocol::Ssh,
                destination: self.state.destination(),
            }
            .into());
        };

        exchange(channel, command, &self.state).await
    }

    async fn flush(&mut self, idle: Option<Duration>) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let idle = idle.unwrap_or(self.state.config.flush_idle);
        flush(channel, idle, self.state.config.chunk_size).await;
    }

    async fn flush_deep(&mut self, retries_timeout: Option<Duration>) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            debug!("flush_deep skipped: no SSH channel");
            return false;
        };
        let config = &self.state.config;
        flush_deep(
            channel,
            &self.state.prompt,
            retries_timeout.unwrap_or(config.flush_deep_timeout),
            config.flush_idle,
            config.chunk_size,
        )
        .await
    }

    async fn read_until(&mut self, _expected: &[u8]) -> Result<Vec<u8>> {
        Err(SessionError::Unsupported {
            protocol: Protocol::Ssh,
            operation: "read_until",
        }
        .into())
    }

    fn timeout(&self) -> Duration {
        self.state.config.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.state.config.timeout = timeout;
        if let Some(channel) = self.channel.as_mut() {
            channel.set_timeout(timeout);
        }
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

impl<C: SshConnector> fmt::Display for SshSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.describe(f, "SshSession", self.is_connected())
    }
}

impl<C: SshConnector> Drop for SshSession<C> {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!(
                "SshSession to {} dropped while connected; call disconnect() first",
                self.state.destination()
            );
        }
    }
}
