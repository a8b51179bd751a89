//! Channel layer: prompt detection and buffered reads.
//!
//! Everything here works on a [`ByteChannel`], the minimal interface both
//! the SSH shell channel and the telnet client expose. Prompt detection and
//! the read loop are therefore shared by every session type.

mod buffer;
mod patterns;
mod reader;

use std::future::Future;

use crate::error::Result;

pub use buffer::{PatternBuffer, strip_ansi};
pub use patterns::{
    LOGIN_PROMPTS, PASSWORD_PROMPTS, PromptMatcher, PromptSymbol, compile_patterns,
    compile_prompt_pattern,
};
pub use reader::{ReadOptions, ReadResult, drain, flush, flush_deep, read_until_prompt};

/// A live byte stream with a non-blocking readiness probe.
pub trait ByteChannel: Send {
    /// Whether bytes can be read right now without waiting.
    fn recv_ready(&mut self) -> bool;

    /// Read up to `max_bytes`, waiting at most the channel's read timeout.
    fn recv(&mut self, max_bytes: usize) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}
