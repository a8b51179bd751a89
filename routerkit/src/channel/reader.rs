//! Channel buffer reader.
//!
//! Best-effort drains of whatever is already buffered on a channel, and the
//! deadline-bounded loop that accumulates command output until the prompt
//! comes back. None of these functions fail: a read error ends the loop and
//! the bytes gathered so far are returned.

use std::borrow::Cow;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::time::Instant;

use super::ByteChannel;
use super::buffer::PatternBuffer;
use super::patterns::{PromptMatcher, PromptSymbol};
use crate::transport::SessionConfig;

/// Floor for sleeps inside polling loops so they always make progress.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Knobs for [`read_until_prompt`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Give up and return partial output after this long.
    pub timeout: Duration,

    /// Sleep between readiness checks while the channel is quiet.
    pub poll_interval: Duration,

    /// Maximum bytes per `recv` call.
    pub chunk_size: usize,

    /// Tail size inspected for the prompt.
    pub search_depth: usize,
}

impl ReadOptions {
    pub fn new(timeout: Duration, config: &SessionConfig) -> Self {
        Self {
            timeout,
            poll_interval: config.poll_interval,
            chunk_size: config.chunk_size,
            search_depth: config.search_depth,
        }
    }
}

/// Result of a read operation.
#[derive(Debug)]
pub struct ReadResult {
    /// The data that was read.
    pub data: Vec<u8>,

    /// Whether the pattern was matched.
    pub pattern_matched: bool,
}

impl ReadResult {
    /// Get the data as a string (lossy UTF-8).
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Read everything that is ready right now, without waiting for more.
pub async fn drain<C: ByteChannel>(channel: &mut C, chunk_size: usize) -> Vec<u8> {
    let mut drained = Vec::new();
    while channel.recv_ready() {
        match channel.recv(chunk_size).await {
            Ok(chunk) if chunk.is_empty() => break,
            Ok(chunk) => drained.extend_from_slice(&chunk),
            Err(e) => {
                debug!("drain stopped: {}", e);
                break;
            }
        }
    }
    drained
}

/// Wait `idle` for late output to arrive, then drain it.
pub async fn flush<C: ByteChannel>(channel: &mut C, idle: Duration, chunk_size: usize) -> Vec<u8> {
    tokio::time::sleep(idle).await;
    let flushed = drain(channel, chunk_size).await;
    if !flushed.is_empty() {
        trace!(
            "flushed {} bytes: {:?}",
            flushed.len(),
            String::from_utf8_lossy(&flushed)
        );
    }
    flushed
}

/// Flush repeatedly until a cycle's output contains the prompt.
///
/// The prompt check runs after each complete cycle. Returns whether the
/// prompt was seen; gives up with a warning once `retries_timeout` elapses.
pub async fn flush_deep<C: ByteChannel>(
    channel: &mut C,
    prompt: &PromptSymbol,
    retries_timeout: Duration,
    idle: Duration,
    chunk_size: usize,
) -> bool {
    let idle = idle.max(MIN_WAIT);
    let deadline = Instant::now() + retries_timeout;
    let mut cycles = 0u32;

    loop {
        let flushed = flush(channel, idle, chunk_size).await;
        cycles += 1;

        if prompt.contained_in(&flushed) {
            debug!("prompt {:?} seen after {} flush cycles", prompt.as_str(), cycles);
            return true;
        }

        if Instant::now() >= deadline {
            warn!(
                "prompt {:?} not seen after {} flush cycles ({:?}), giving up",
                prompt.as_str(),
                cycles,
                retries_timeout
            );
            return false;
        }
    }
}

/// Accumulate output until its tail matches `matcher` or the timeout elapses.
///
/// The channel is polled through [`ByteChannel::recv_ready`] rather than
/// blocking on a read, so a quiet channel costs one short sleep per poll.
pub async fn read_until_prompt<C, M>(
    channel: &mut C,
    matcher: &M,
    options: &ReadOptions,
) -> ReadResult
where
    C: ByteChannel,
    M: PromptMatcher + ?Sized,
{
    let deadline = Instant::now() + options.timeout;
    let poll_interval = options.poll_interval.max(MIN_WAIT);
    let mut buffer = PatternBuffer::new(options.search_depth);

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        if !channel.recv_ready() {
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
            continue;
        }

        match channel.recv(options.chunk_size).await {
            Ok(chunk) => {
                trace!("read {} bytes (total {})", chunk.len(), buffer.len() + chunk.len());
                buffer.extend(&chunk);
                if buffer.tail_matches(matcher) {
                    return ReadResult {
                        data: buffer.take(),
                        pattern_matched: true,
                    };
                }
            }
            Err(e) => {
                debug!("read loop stopped: {}", e);
                break;
            }
        }
    }

    ReadResult {
        data: buffer.take(),
        pattern_matched: false,
    }
}
