//! Pattern buffer with tail-only prompt search.
//!
//! A prompt can only ever sit at the end of the accumulated output, so only
//! the last `search_depth` bytes are inspected on every check. For large
//! outputs (routing tables, log dumps) this keeps each check cheap.
//!
//! The buffer keeps the raw bytes exactly as received. ANSI escape
//! sequences are stripped from the inspected tail only, so a colourised
//! prompt still matches while callers get the untouched transcript.


use bytes::BytesMut;

use super::patterns::PromptMatcher;

/// Buffer for accumulating channel output and checking its tail for a prompt.
#[derive(Debug)]
pub struct PatternBuffer {
    /// The accumulated raw output.
    buffer: BytesMut,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
        }
    }

    /// Append raw channel data.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// The searchable tail with ANSI escape sequences removed.
    pub fn tail(&self) -> Vec<u8> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        strip_ansi(&self.buffer[start..])
    }

    /// Check whether the tail satisfies the matcher.
    pub fn tail_matches<M: PromptMatcher + ?Sized>(&self, matcher: &M) -> bool {
        matcher.is_match(&self.tail())
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Collects printable output, dropping escape and control sequences.
struct Printable(Vec<u8>);

impl vte::Perform for Printable {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.0.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.0.push(byte);
        }
    }
}

/// Remove ANSI escape sequences (colours, cursor movement, OSC titles).
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    let mut parser: vte::Parser = vte::Parser::new();
    let mut printable = Printable(Vec::with_capacity(data.len()));
    parser.advance(&mut printable, data);
    printable.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PromptSymbol;

    #[test]
    fn test_basic_extend() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"Hello, ");
        buffer.extend(b"world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
        assert_eq!(buffer.len(), 13);
    }

    #[test]
    fn test_raw_bytes_are_kept() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"\x1b[32mGreen text\x1b[0m");
        assert_eq!(buffer.as_slice(), b"\x1b[32mGreen text\x1b[0m");
        assert_eq!(buffer.tail(), b"Green text");
    }

    #[test]
    fn test_coloured_prompt_matches() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"ls\r\nfile\r\n\x1b[01;32muser@vm\x1b[00m:~$ \x1b[0m");
        assert!(buffer.tail_matches(&PromptSymbol::new("$")));
    }

    #[test]
    fn test_prompt_outside_search_depth_is_ignored() {
        let mut buffer = PatternBuffer::new(10);
        buffer.extend(b"router# ");
        buffer.extend(&[b'x'; 100]);
        assert!(!buffer.tail_matches(&PromptSymbol::new("#")));
    }

    #[test]
    fn test_take_clears_buffer() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"test data");
        assert_eq!(buffer.take(), b"test data");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_strip_ansi_keeps_line_breaks() {
        assert_eq!(strip_ansi(b"a\r\n\x1b]0;title\x07b\tc"), b"a\r\nb\tc");
    }
}
