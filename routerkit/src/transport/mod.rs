//! Transport layer: russh for SSH, a TCP stream for Telnet.
//!
//! Sessions reach the network only through the traits defined here, so
//! every session behaviour can be exercised against in-memory fakes.

pub mod config;
mod ssh;
mod telnet;

pub use config::{DEFAULT_TIMEOUT_SECS, SessionConfig, SshConfig};
pub use ssh::{RusshChannel, RusshClient, RusshConnector, ShellChannel, SshClient, SshConnector};
pub use telnet::{ExpectMatch, TelnetClient, TelnetStream};
