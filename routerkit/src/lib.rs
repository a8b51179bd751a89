//! # Routerkit
//!
//! Async SSH and Telnet sessions for scripted testing of network devices.
//!
//! Routerkit logs into lab equipment (Linux VMs, routers, RADIUS servers),
//! sends shell commands and collects their output up to the next prompt.
//!
//! ## Features
//!
//! - SSH shells via russh, Telnet over plain TCP
//! - One [`Session`] contract for both transports
//! - Non-blocking busy guard: overlapping operations on a session are
//!   rejected immediately instead of queued
//! - Prompt detection on the tail of the output, tolerant of ANSI escapes
//! - Built-in device profiles (`linux`, `oneos`, `radius`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use routerkit::{DeviceRegistry, Session, SshSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), routerkit::Error> {
//!     let vm = Arc::new(DeviceRegistry::builtin().create_device("linux", None, None)?);
//!
//!     let mut session = SshSession::new(Duration::from_secs(10));
//!     session.connect(vm, "192.168.56.2").await?;
//!
//!     let output = session.write_command("uname -a").await?;
//!     println!("{}", output);
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use device::{Device, DeviceRegistry};
pub use error::{Error, Result};
pub use session::{Session, SshSession, TelnetSession};
pub use transport::SessionConfig;
