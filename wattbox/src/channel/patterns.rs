//! Pattern matching utilities for prompt detection.

use memchr::memmem;

/// Trait for prompt matching over raw device output.
pub trait PromptMatcher: Send + Sync {
    /// Returns byte offset where match ends, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<usize>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }
}

/// Matches at the first `\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineTerminator;

impl PromptMatcher for LineTerminator {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        memchr::memchr(b'\n', data).map(|pos| pos + 1)
    }
}

/// Case-insensitive set of literal markers; matches whichever ends first.
#[derive(Debug, Clone)]
pub struct MarkerSet {
    markers: Vec<Vec<u8>>,
}

impl MarkerSet {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_ascii_lowercase().into_bytes())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Check `text` for any marker.
    pub fn contains(&self, text: &str) -> bool {
        self.is_match(text.as_bytes())
    }
}

impl PromptMatcher for MarkerSet {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        let haystack = data.to_ascii_lowercase();
        self.markers
            .iter()
            .filter_map(|marker| memmem::find(&haystack, marker).map(|pos| pos + marker.len()))
            .min()
    }
}
