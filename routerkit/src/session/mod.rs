//! Interactive sessions to remote devices.
//!
//! A [`Session`] connects to a device, runs commands and scrapes the output
//! up to the next prompt. [`SshSession`] and [`TelnetSession`] implement it
//! over the transports in [`crate::transport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use routerkit::device::DeviceRegistry;
//! use routerkit::session::{Session, SshSession};
//!
//! # async fn example() -> Result<(), routerkit::Error> {
//! let vm = Arc::new(DeviceRegistry::builtin().create_device("linux", None, None)?);
//!
//! let mut session = SshSession::new(Duration::from_secs(10));
//! let output = session
//!     .connect(vm, "192.168.56.2")
//!     .await?
//!     .write_command("uname -a")
//!     .await?;
//! println!("{}", output);
//!
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod guard;
mod ssh;
mod telnet;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::channel::{ByteChannel, PromptSymbol, ReadOptions, drain, read_until_prompt};
use crate::device::Device;
use crate::diagnostics::ping_command;
use crate::error::{Protocol, Result};
use crate::transport::SessionConfig;

pub use guard::{Occupancy, OccupiedGuard};
pub use ssh::SshSession;
pub use telnet::TelnetSession;

/// Common lifecycle of an interactive session.
///
/// `connect`, `write_command` and `disconnect` are guarded by the session's
/// [`Occupancy`]: while one of them runs, the others fail immediately with
/// [`SessionError::Occupied`](crate::error::SessionError::Occupied).
pub trait Session: Send + fmt::Display {
    /// Transport this session runs over.
    fn protocol(&self) -> Protocol;

    /// Open the transport, log in and return this same session.
    ///
    /// Handles left over from a previous connection are closed first. On
    /// failure any partially opened transport is closed before the error is
    /// returned.
    fn connect(
        &mut self,
        device: Arc<Device>,
        destination_ip: &str,
    ) -> impl Future<Output = Result<&mut Self>> + Send;

    /// Probe the transport. Never fails; probe errors count as disconnected.
    fn is_connected(&self) -> bool;

    /// Close the transport.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send `command` and collect output until the prompt or the timeout.
    ///
    /// A timeout is not an error: whatever arrived is returned.
    fn write_command(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Wait `idle` (or the configured default), then discard whatever is
    /// buffered. Does nothing without a live channel.
    fn flush(&mut self, idle: Option<Duration>) -> impl Future<Output = ()> + Send;

    /// Flush repeatedly until the prompt shows up or `retries_timeout`
    /// (or the configured default) elapses. Returns whether it showed up.
    fn flush_deep(
        &mut self,
        retries_timeout: Option<Duration>,
    ) -> impl Future<Output = bool> + Send;

    /// Read until `expected` appears. Not every transport supports this.
    fn read_until(&mut self, expected: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn timeout(&self) -> Duration;

    fn set_timeout(&mut self, timeout: Duration);

    /// The prompt currently expected at the end of command output.
    fn prompt_symbol(&self) -> &str;

    fn destination_ip(&self) -> Option<&str>;

    fn destination_device(&self) -> Option<&Arc<Device>>;

    fn is_occupied(&self) -> bool;

    /// Ping `ip` from the remote device and return the transcript.
    ///
    /// The session timeout is raised for the duration of the command so the
    /// whole run fits.
    fn ping(
        &mut self,
        ip: &str,
        count: u32,
        wait: Duration,
    ) -> impl Future<Output = Result<String>> + Send {
        async move {
            let previous = self.timeout();
            let command = ping_command(ip, count, wait.as_secs().max(1));
            self.set_timeout(previous + wait + Duration::from_secs(u64::from(count)));
            let result = self.write_command(&command).await;
            self.set_timeout(previous);
            result
        }
    }
}

/// Bookkeeping shared by both session types.
#[derive(Debug)]
struct SessionState {
    config: SessionConfig,
    device: Option<Arc<Device>>,
    destination_ip: Option<String>,
    prompt: PromptSymbol,
    occupancy: Occupancy,
}

impl SessionState {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            device: None,
            destination_ip: None,
            prompt: PromptSymbol::default(),
            occupancy: Occupancy::new(),
        }
    }

    /// Record the target of a connect attempt.
    fn bind(&mut self, device: Arc<Device>, destination_ip: &str) {
        self.prompt = PromptSymbol::new(device.default_prompt_symbol.as_str());
        self.device = Some(device);
        self.destination_ip = Some(destination_ip.to_string());
    }

    fn destination(&self) -> String {
        self.destination_ip
            .clone()
            .unwrap_or_else(|| "<none>".to_string())
    }

    fn hostname(&self) -> String {
        self.device
            .as_ref()
            .map(|d| d.display_hostname().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions::new(self.config.timeout, &self.config)
    }

    fn describe(&self, f: &mut fmt::Formatter<'_>, name: &str, connected: bool) -> fmt::Result {
        let status = if connected { "connected" } else { "disconnected" };
        match (&self.device, &self.destination_ip) {
            (Some(device), Some(ip)) => write!(f, "{}({}@{}, {})", name, device.username, ip, status),
            _ => write!(f, "{}({})", name, status),
        }
    }
}

/// Send one command and read its output up to the prompt.
async fn exchange<C: ByteChannel>(
    channel: &mut C,
    command: &str,
    state: &SessionState,
) -> Result<String> {
    let stale = drain(channel, state.config.chunk_size).await;
    if !stale.is_empty() {
        debug!("discarded {} stale bytes before {:?}", stale.len(), command);
    }

    channel.send(format!("{command}\n").as_bytes()).await?;

    let result = read_until_prompt(channel, &state.prompt, &state.read_options()).await;
    if result.pattern_matched {
        debug!("{:?} returned {} bytes", command, result.data.len());
    } else {
        warn!(
            "prompt {:?} not seen within {:?} after {:?} on {}, returning partial output",
            state.prompt.as_str(),
            state.config.timeout,
            command,
            state.destination()
        );
    }
    Ok(result.as_str().into_owned())
}
