//! Telnet transport over a plain TCP stream.
//!
//! [`TelnetStream`] does just enough RFC 854 to scrape a device shell: IAC
//! commands and sub-negotiations are removed from the data stream, every
//! option the peer offers is refused, and `0xFF` is escaped on the way out.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace};
use memchr::memmem;
use regex::bytes::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::channel::ByteChannel;
use crate::error::{ChannelError, Result, TransportError};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Outcome of [`TelnetClient::expect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectMatch {
    /// Index of the pattern that matched, `None` on timeout or end of stream.
    pub index: Option<usize>,

    /// The matched bytes (empty when nothing matched).
    pub matched: Vec<u8>,

    /// Everything consumed from the stream, up to and including the match.
    pub consumed: Vec<u8>,
}

/// Telnet client capabilities a session needs.
pub trait TelnetClient: ByteChannel {
    /// Connect to `host:port`, replacing any previous connection.
    fn open(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read until one of `patterns` matches, the stream ends, or `timeout`
    /// elapses. Patterns are tried in order against the unconsumed data.
    fn expect(
        &mut self,
        patterns: &[Regex],
        timeout: Duration,
    ) -> impl Future<Output = Result<ExpectMatch>> + Send;

    /// Read until `expected` has been seen, or return what arrived before
    /// the timeout or end of stream.
    fn read_until(
        &mut self,
        expected: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Limit how long a single `recv` may wait.
    fn set_timeout(&mut self, timeout: Duration);

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Liveness probe: fails unless the socket is open and healthy.
    fn probe_socket(&self) -> io::Result<SocketAddr>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum IacState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Incremental IAC decoder; sequences may be split across reads.
#[derive(Debug, Default)]
struct IacDecoder {
    state: IacState,
}

impl IacDecoder {
    /// Decode `input`, appending payload bytes to `data` and option
    /// refusals to `replies`.
    fn decode(&mut self, input: &[u8], data: &mut BytesMut, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (IacState::Data, IAC) => IacState::Iac,
                // NUL only pads a bare CR.
                (IacState::Data, 0) => IacState::Data,
                (IacState::Data, b) => {
                    data.extend_from_slice(&[b]);
                    IacState::Data
                }
                (IacState::Iac, IAC) => {
                    data.extend_from_slice(&[IAC]);
                    IacState::Data
                }
                (IacState::Iac, cmd @ (WILL | WONT | DO | DONT)) => IacState::Negotiate(cmd),
                (IacState::Iac, SB) => IacState::Sub,
                (IacState::Iac, cmd) => {
                    trace!("ignoring telnet command {}", cmd);
                    IacState::Data
                }
                (IacState::Negotiate(cmd), option) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    trace!("refused telnet option {} (command {})", option, cmd);
                    IacState::Data
                }
                (IacState::Sub, IAC) => IacState::SubIac,
                (IacState::Sub, _) => IacState::Sub,
                (IacState::SubIac, SE) => IacState::Data,
                (IacState::SubIac, _) => IacState::Sub,
            };
        }
    }
}

/// Double every `0xFF` so the peer reads it as data.
fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());
    for &byte in data {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    escaped
}

/// Telnet client over `tokio::net::TcpStream`.
#[derive(Debug)]
pub struct TelnetStream {
    stream: Option<TcpStream>,
    decoder: IacDecoder,
    pending: BytesMut,
    replies: Vec<u8>,
    timeout: Duration,
    eof: bool,
}

impl TelnetStream {
    /// A client with no connection yet.
    pub fn new(timeout: Duration) -> Self {
        Self {
            stream: None,
            decoder: IacDecoder::default(),
            pending: BytesMut::new(),
            replies: Vec::new(),
            timeout,
            eof: false,
        }
    }

    fn reset(&mut self) {
        self.decoder = IacDecoder::default();
        self.pending.clear();
        self.replies.clear();
        self.eof = false;
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        Ok(self.stream.as_mut().ok_or(TransportError::NotOpen)?)
    }

    fn absorb(&mut self, raw: &[u8]) {
        self.decoder
            .decode(raw, &mut self.pending, &mut self.replies);
    }

    async fn flush_replies(&mut self) -> Result<()> {
        if self.replies.is_empty() {
            return Ok(());
        }
        let replies = std::mem::take(&mut self.replies);
        self.stream_mut()?
            .write_all(&replies)
            .await
            .map_err(ChannelError::Io)?;
        Ok(())
    }

    /// Read one batch of raw bytes. `None` once `deadline` passes,
    /// `Some(0)` at end of stream.
    async fn fill(&mut self, deadline: Instant) -> Result<Option<usize>> {
        if self.eof {
            return Ok(Some(0));
        }
        self.flush_replies().await?;

        let mut raw = [0u8; 4096];
        let stream = self.stream_mut()?;
        let n = match tokio::time::timeout_at(deadline, stream.read(&mut raw)).await {
            Ok(read) => read.map_err(ChannelError::Io)?,
            Err(_) => return Ok(None),
        };

        if n == 0 {
            debug!("telnet peer closed the stream");
            self.eof = true;
        } else {
            trace!("telnet received {} raw bytes", n);
            self.absorb(&raw[..n]);
        }
        Ok(Some(n))
    }

    fn take_pending(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.pending.len());
        self.pending.split_to(n).to_vec()
    }
}

impl Default for TelnetStream {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::transport::DEFAULT_TIMEOUT_SECS))
    }
}

impl ByteChannel for TelnetStream {
    fn recv_ready(&mut self) -> bool {
        if !self.pending.is_empty() {
            return true;
        }
        if self.eof {
            return false;
        }
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };

        let mut raw = [0u8; 4096];
        match stream.try_read(&mut raw) {
            Ok(0) => {
                self.eof = true;
                false
            }
            Ok(n) => {
                self.absorb(&raw[..n]);
                !self.pending.is_empty()
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                debug!("telnet readiness probe failed: {}", e);
                false
            }
        }
    }

    async fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        // Refusals decoded by `recv_ready` go out before the data is handed on.
        self.flush_replies().await?;
        let deadline = Instant::now() + self.timeout;
        while self.pending.is_empty() {
            match self.fill(deadline).await? {
                None => return Err(ChannelError::Timeout(self.timeout).into()),
                Some(0) => return Err(ChannelError::Closed.into()),
                Some(_) => {}
            }
        }
        Ok(self.take_pending(max_bytes))
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.flush_replies().await?;
        let escaped = escape_iac(data);
        self.stream_mut()?
            .write_all(&escaped)
            .await
            .map_err(ChannelError::Io)?;
        Ok(())
    }
}

impl TelnetClient for TelnetStream {
    async fn open(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        if self.stream.is_some() {
            TelnetClient::close(self).await?;
        }

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|source| TransportError::ConnectionFailed {
                host: host.to_string(),
                port,
                source,
            })?;
        stream.set_nodelay(true).map_err(TransportError::Io)?;

        debug!("telnet connected to {}:{}", host, port);
        self.reset();
        self.stream = Some(stream);
        self.timeout = timeout;
        Ok(())
    }

    async fn expect(&mut self, patterns: &[Regex], timeout: Duration) -> Result<ExpectMatch> {
        let deadline = Instant::now() + timeout;
        loop {
            for (index, pattern) in patterns.iter().enumerate() {
                if let Some(m) = pattern.find(&self.pending) {
                    let matched = self.pending[m.start()..m.end()].to_vec();
                    let consumed = self.take_pending(m.end());
                    return Ok(ExpectMatch {
                        index: Some(index),
                        matched,
                        consumed,
                    });
                }
            }

            match self.fill(deadline).await? {
                Some(n) if n > 0 => {}
                _ => {
                    let consumed = self.take_pending(self.pending.len());
                    return Ok(ExpectMatch {
                        index: None,
                        matched: Vec::new(),
                        consumed,
                    });
                }
            }
        }
    }

    async fn read_until(&mut self, expected: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = memmem::find(&self.pending, expected) {
                return Ok(self.take_pending(pos + expected.len()));
            }
            match self.fill(deadline).await? {
                Some(n) if n > 0 => {}
                _ => return Ok(self.take_pending(self.pending.len())),
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("telnet shutdown: {}", e);
            }
        }
        self.reset();
        Ok(())
    }

    fn probe_socket(&self) -> io::Result<SocketAddr> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        if let Some(e) = stream.take_error()? {
            return Err(e);
        }
        if self.eof {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        stream.peer_addr()
    }
}
