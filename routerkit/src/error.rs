//! Error types for routerkit.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for routerkit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH/TCP transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel read/write errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Device descriptor and registry errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Transport layer errors (connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to reach the remote host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication was rejected
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Operation on a transport that is not open
    #[error("Transport is not open")]
    NotOpen,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (reads, writes, patterns).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open the PTY / shell channel
    #[error("Failed to open interactive shell: {0}")]
    ShellRequestFailed(String),

    /// No data arrived within the read timeout
    #[error("No data received within {0:?}")]
    Timeout(Duration),

    /// Channel closed by the remote end
    #[error("Channel closed")]
    Closed,

    /// I/O error on the channel
    #[error("Channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Which transport a session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ssh,
    Telnet,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ssh => f.write_str("SSH"),
            Protocol::Telnet => f.write_str("Telnet"),
        }
    }
}

/// Step of the telnet login exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    Login,
    Password,
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationStage::Login => f.write_str("login"),
            NegotiationStage::Password => f.write_str("password"),
        }
    }
}

/// Session layer errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session is already running another operation
    #[error("Connection refused: {protocol} session is busy, cannot {operation}")]
    Occupied {
        protocol: Protocol,
        operation: &'static str,
    },

    /// Authentication or channel setup failed during connect
    #[error("{protocol} connection failed to {destination} (host '{hostname}'): {source}")]
    ConnectFailed {
        protocol: Protocol,
        destination: String,
        hostname: String,
        #[source]
        source: Box<Error>,
    },

    /// No live transport
    #[error("{protocol} connection is not established (destination: {destination})")]
    NotConnected {
        protocol: Protocol,
        destination: String,
    },

    /// Transport is alive but the interactive channel is gone
    #[error("{protocol} channel is not available (destination: {destination})")]
    ChannelUnavailable {
        protocol: Protocol,
        destination: String,
    },

    /// Telnet login exchange hit end of stream before the expected prompt
    #[error("Telnet {stage} prompt not found on {destination}: unexpected end of stream (received {received:?})")]
    Negotiation {
        stage: NegotiationStage,
        destination: String,
        received: String,
    },

    /// Transport still reports connected after close
    #[error("{protocol} connection to {destination} (host '{hostname}') could not be closed")]
    DisconnectFailed {
        protocol: Protocol,
        destination: String,
        hostname: String,
    },

    /// Operation the transport cannot express
    #[error("{operation} is not supported for {protocol} sessions")]
    Unsupported {
        protocol: Protocol,
        operation: &'static str,
    },
}

/// Device descriptor and registry errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No profile registered under this kind
    #[error("Unknown device kind: {name}")]
    UnknownKind { name: String },

    /// A profile with this kind already exists
    #[error("Device kind already registered: {name}")]
    AlreadyRegistered { name: String },
}

/// Result type alias using routerkit's Error.
pub type Result<T> = std::result::Result<T, Error>;
