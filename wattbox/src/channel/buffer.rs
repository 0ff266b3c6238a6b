//! Receive buffer with tail search and Telnet command stripping.
//!
//! Prompts only ever appear near the end of what the device sent, so
//! prompt detection searches the last `search_depth` bytes instead of the
//! whole buffer. Line framing for command responses uses the full buffer.

use bytes::BytesMut;
use memchr::memchr;

use super::patterns::PromptMatcher;

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

/// Position inside a Telnet command sequence.
///
/// Kept across `extend` calls so a sequence split between two reads is
/// still removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Telnet {
    #[default]
    Data,
    Iac,
    Option,
    Sub,
    SubIac,
}

/// Buffer for accumulating device output and searching it for prompts.
#[derive(Debug)]
pub struct PatternBuffer {
    /// Accumulated output with Telnet commands removed.
    buffer: BytesMut,

    /// How many bytes from the end to search for prompts.
    search_depth: usize,

    telnet: Telnet,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            telnet: Telnet::Data,
        }
    }

    /// Extend the buffer with raw socket data.
    ///
    /// Option negotiation (`IAC WILL/WONT/DO/DONT x`), subnegotiation
    /// (`IAC SB ... IAC SE`) and two-byte commands are dropped; `IAC IAC`
    /// yields a literal 0xFF.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.reserve(data.len());
        for &byte in data {
            self.telnet = match (self.telnet, byte) {
                (Telnet::Data, IAC) => Telnet::Iac,
                (Telnet::Data, _) => {
                    self.buffer.extend_from_slice(&[byte]);
                    Telnet::Data
                }
                (Telnet::Iac, IAC) => {
                    self.buffer.extend_from_slice(&[IAC]);
                    Telnet::Data
                }
                (Telnet::Iac, WILL..=DONT) => Telnet::Option,
                (Telnet::Iac, SB) => Telnet::Sub,
                (Telnet::Iac, _) => Telnet::Data,
                (Telnet::Option, _) => Telnet::Data,
                (Telnet::Sub, IAC) => Telnet::SubIac,
                (Telnet::Sub, _) => Telnet::Sub,
                (Telnet::SubIac, SE) => Telnet::Data,
                (Telnet::SubIac, _) => Telnet::Sub,
            };
        }
    }

    /// Search only the tail of the buffer.
    ///
    /// Returns the end of the match as an offset into the whole buffer.
    pub fn search_tail<M: PromptMatcher + ?Sized>(&self, matcher: &M) -> Option<usize> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        matcher.find_match(&self.buffer[start..]).map(|end| start + end)
    }

    /// Split off everything up to `end`, leaving the rest buffered.
    pub fn split_to(&mut self, end: usize) -> Vec<u8> {
        self.buffer.split_to(end.min(self.buffer.len())).to_vec()
    }

    /// Remove the first complete line, without its terminator.
    ///
    /// Lines end with `\n`; a trailing `\r` is dropped as well.
    pub fn take_line(&mut self) -> Option<String> {
        let pos = memchr(b'\n', &self.buffer)?;
        let line = self.buffer.split_to(pos + 1);
        let text = String::from_utf8_lossy(&line[..pos]);
        Some(text.trim_end_matches('\r').to_string())
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes; a partially received Telnet command is kept
    /// in progress.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
