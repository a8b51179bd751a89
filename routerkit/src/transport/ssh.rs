//! SSH transport implementation using russh.
//!
//! The session layer talks to SSH through three small traits so tests can
//! substitute scripted fakes: [`SshConnector`] opens and authenticates a
//! connection, [`SshClient`] owns it, and [`ShellChannel`] is the
//! interactive shell opened on it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace};
use russh::client::{self, Handle, Msg};
use russh::keys::{HashAlg, PublicKey};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::SshConfig;
use crate::channel::ByteChannel;
use crate::error::{ChannelError, Result, TransportError};

/// Opens authenticated SSH connections.
pub trait SshConnector: Send + Sync {
    type Client: SshClient;

    /// Connect and authenticate with the password in `config`.
    fn connect(&self, config: &SshConfig) -> impl Future<Output = Result<Self::Client>> + Send;
}

/// An authenticated SSH connection.
pub trait SshClient: Send {
    type Channel: ShellChannel;

    /// Whether the underlying transport is still up.
    fn is_active(&self) -> bool;

    /// Open a session channel with a PTY and start a shell on it.
    fn invoke_shell(
        &mut self,
        config: &SshConfig,
    ) -> impl Future<Output = Result<Self::Channel>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// An interactive shell channel.
pub trait ShellChannel: ByteChannel {
    fn is_closed(&self) -> bool;

    /// Limit how long a single `recv` may wait.
    fn set_timeout(&mut self, timeout: Duration);

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Connector backed by russh.
#[derive(Debug, Clone, Default)]
pub struct RusshConnector;

impl SshConnector for RusshConnector {
    type Client = RusshClient;

    async fn connect(&self, config: &SshConfig) -> Result<RusshClient> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let handler = LabHostKeys {
            host: config.host.clone(),
        };

        let mut handle = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(TransportError::Ssh)?;

        let authenticated = tokio::time::timeout(
            config.timeout,
            handle.authenticate_password(&config.username, config.password.expose_secret()),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(TransportError::Ssh)?
        .success();

        if !authenticated {
            // Best effort: the server already told us no.
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        debug!("authenticated to {} as {}", config.socket_addr(), config.username);
        Ok(RusshClient { handle })
    }
}

/// An authenticated russh connection.
pub struct RusshClient {
    handle: Handle<LabHostKeys>,
}

impl SshClient for RusshClient {
    type Channel = RusshChannel;

    fn is_active(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn invoke_shell(&mut self, config: &SshConfig) -> Result<RusshChannel> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| ChannelError::ShellRequestFailed(format!("pty: {e}")))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| ChannelError::ShellRequestFailed(format!("shell: {e}")))?;

        Ok(RusshChannel::spawn(channel, config.timeout))
    }

    async fn close(&mut self) -> Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Shell channel whose russh [`Channel`] is owned by a background pump task.
///
/// The pump forwards outgoing writes to the channel and incoming data into
/// an unbounded queue, which is what makes a non-blocking
/// [`ByteChannel::recv_ready`] possible.
pub struct RusshChannel {
    outgoing: Option<mpsc::Sender<Vec<u8>>>,
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: BytesMut,
    closed: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl RusshChannel {
    fn spawn(channel: Channel<Msg>, timeout: Duration) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let pump = tokio::spawn(pump(channel, outgoing_rx, incoming_tx, closed.clone()));

        Self {
            outgoing: Some(outgoing_tx),
            incoming: incoming_rx,
            pending: BytesMut::new(),
            closed,
            pump: Some(pump),
            timeout,
        }
    }

    fn take_pending(&mut self, max_bytes: usize) -> Vec<u8> {
        let n = max_bytes.min(self.pending.len());
        self.pending.split_to(n).to_vec()
    }
}

async fn pump(
    mut channel: Channel<Msg>,
    mut outgoing: mpsc::Receiver<Vec<u8>>,
    incoming: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            data = outgoing.recv() => match data {
                Some(data) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        debug!("failed to write to shell channel: {}", e);
                        break;
                    }
                }
                None => {
                    let _ = channel.eof().await;
                    let _ = channel.close().await;
                    break;
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data }) | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    trace!("shell channel received {} bytes", data.len());
                    if incoming.send(data.to_vec()).is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("shell channel closed by remote");
                    break;
                }
                Some(_) => {}
            },
        }
    }
    closed.store(true, Ordering::SeqCst);
}

impl ByteChannel for RusshChannel {
    fn recv_ready(&mut self) -> bool {
        while let Ok(chunk) = self.incoming.try_recv() {
            self.pending.extend_from_slice(&chunk);
        }
        !self.pending.is_empty()
    }

    async fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        if self.recv_ready() {
            return Ok(self.take_pending(max_bytes));
        }

        match tokio::time::timeout(self.timeout, self.incoming.recv()).await {
            Ok(Some(chunk)) => {
                self.pending.extend_from_slice(&chunk);
                Ok(self.take_pending(max_bytes))
            }
            Ok(None) => Err(ChannelError::Closed.into()),
            Err(_) => Err(ChannelError::Timeout(self.timeout).into()),
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let outgoing = self.outgoing.as_ref().ok_or(ChannelError::Closed)?;
        outgoing
            .send(data.to_vec())
            .await
            .map_err(|_| ChannelError::Closed)?;
        Ok(())
    }
}

impl ShellChannel for RusshChannel {
    fn is_closed(&self) -> bool {
        self.outgoing.is_none() || self.closed.load(Ordering::SeqCst)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the sender tells the pump to send EOF and close.
        self.outgoing.take();
        if let Some(pump) = self.pump.take() {
            if tokio::time::timeout(self.timeout, pump).await.is_err() {
                debug!("shell channel pump did not stop within {:?}", self.timeout);
            }
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for RusshChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Host key policy for lab equipment: every key is accepted and logged.
struct LabHostKeys {
    host: String,
}

impl client::Handler for LabHostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!(
            "accepting {} host key for {}: {}",
            server_public_key.algorithm().as_str(),
            self.host,
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}
