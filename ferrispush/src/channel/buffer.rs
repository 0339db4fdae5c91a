//! Output buffer with tail-only prompt search.
//!
//! Prompts sit at the end of the output, so only the last `search_depth`
//! bytes are searched. For large outputs (full configs, routing tables)
//! this keeps each check cheap regardless of how much has accumulated.

use regex::Regex;

/// Buffer for accumulating shell output and searching its tail for a prompt.
#[derive(Debug)]
pub struct PatternBuffer {
    /// The accumulated output.
    buffer: String,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: String::with_capacity(4096),
            search_depth,
        }
    }

    /// Append received output.
    pub fn extend(&mut self, data: &str) {
        self.buffer.push_str(data);
    }

    /// Search only the tail of the buffer for the pattern.
    ///
    /// Offsets in the returned match are relative to the start of the
    /// searched region, not the full buffer.
    pub fn search_tail(&self, pattern: &Regex) -> Option<regex::Match<'_>> {
        pattern.find(self.tail())
    }

    /// Check if the tail contains a pattern match.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// Search the entire buffer for a pattern.
    pub fn search_full(&self, pattern: &Regex) -> Option<regex::Match<'_>> {
        pattern.find(&self.buffer)
    }

    fn tail(&self) -> &str {
        let mut start = self.buffer.len().saturating_sub(self.search_depth);
        while !self.buffer.is_char_boundary(start) {
            start -= 1;
        }
        &self.buffer[start..]
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Get the buffer contents.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Get the current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
