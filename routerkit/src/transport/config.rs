//! Session and per-connection configuration.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Default operation timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Tunables shared by SSH and Telnet sessions.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use std::time::Duration;
/// use routerkit::transport::SessionConfig;
///
/// let config = SessionConfig::default().with_timeout(Duration::from_secs(30));
/// assert_eq!(config.ssh_port, 22);
/// assert_eq!(config.timeout, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connect and read timeout.
    pub timeout: Duration,

    /// SSH port (default: 22).
    pub ssh_port: u16,

    /// Telnet port (default: 23).
    pub telnet_port: u16,

    /// Maximum bytes per channel read.
    pub chunk_size: usize,

    /// Sleep between readiness checks while waiting for a prompt.
    pub poll_interval: Duration,

    /// How long `flush` waits before draining when no duration is given.
    pub flush_idle: Duration,

    /// Overall limit for `flush_deep` when none is given.
    pub flush_deep_timeout: Duration,

    /// Tail size inspected for the prompt.
    pub search_depth: usize,

    /// Terminal width for the SSH PTY.
    pub terminal_width: u32,

    /// Terminal height for the SSH PTY.
    pub terminal_height: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ssh_port: 22,
            telnet_port: 23,
            chunk_size: 4096,
            poll_interval: Duration::from_millis(50),
            flush_idle: Duration::from_millis(500),
            flush_deep_timeout: Duration::from_secs(60),
            search_depth: 1000,
            terminal_width: 511,
            terminal_height: 24,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    pub fn with_telnet_port(mut self, port: u16) -> Self {
        self.telnet_port = port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_flush_idle(mut self, idle: Duration) -> Self {
        self.flush_idle = idle;
        self
    }

    pub fn with_flush_deep_timeout(mut self, timeout: Duration) -> Self {
        self.flush_deep_timeout = timeout;
        self
    }

    pub fn with_search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth;
        self
    }

    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }
}

/// SSH connection parameters for a single connect attempt.
#[derive(Debug)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Password for authentication. Keys and agents are never consulted.
    pub password: SecretString,

    /// Connection timeout, also applied to channel reads.
    pub timeout: Duration,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl SshConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
        config: &SessionConfig,
    ) -> Self {
        Self {
            host: host.into(),
            port: config.ssh_port,
            username: username.into(),
            password,
            timeout: config.timeout,
            terminal_width: config.terminal_width,
            terminal_height: config.terminal_height,
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
