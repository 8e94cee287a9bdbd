//! Byte-indexed reader over the markup handed to the parser.
//!
//! The tokenizer only reports *what* it saw, never *where*. The parser feeds it
//! one character at a time through this reader, so the reader's offset is always
//! the end of the token the sink is currently receiving. Node boundaries are then
//! recovered from the immutable buffer with [`SourceReader::rfind`] and
//! [`SourceReader::ends_with_ignore_ascii_case`].

use std::ops::Range;

/// An immutable source buffer plus a forward-only read cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReader {
    text: String,
    pos: usize,
}

impl SourceReader {
    /// Wrap `text`, with the cursor at offset 0.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos: 0,
        }
    }

    /// Current read offset: number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Total length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Consume the next character, returning the byte range it occupied.
    pub fn next_char(&mut self) -> Option<(Range<usize>, char)> {
        let ch = self.text[self.pos..].chars().next()?;
        let start = self.pos;
        self.pos += ch.len_utf8();
        Some((start..self.pos, ch))
    }

    /// Offset of the nearest `byte` strictly before `before`.
    pub fn rfind(&self, byte: u8, before: usize) -> Option<usize> {
        let end = before.min(self.text.len());
        self.as_bytes()[..end].iter().rposition(|&b| b == byte)
    }

    /// Whether the bytes immediately preceding `end` spell `literal`, ignoring
    /// ASCII case. False when fewer than `literal.len()` bytes precede `end`.
    pub fn ends_with_ignore_ascii_case(&self, end: usize, literal: &str) -> bool {
        let Some(start) = end.checked_sub(literal.len()) else {
            return false;
        };
        self.as_bytes()
            .get(start..end)
            .is_some_and(|window| window.eq_ignore_ascii_case(literal.as_bytes()))
    }

    /// The text in `range`, or an empty string if the range is out of bounds or
    /// splits a character.
    pub fn slice(&self, range: Range<usize>) -> &str {
        self.text.get(range).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_next_char_tracks_byte_offsets() {
        let mut reader = SourceReader::new("aé<");
        assert_eq!(reader.next_char(), Some((0..1, 'a')));
        assert_eq!(reader.next_char(), Some((1..3, 'é')));
        assert_eq!(reader.offset(), 3);
        assert_eq!(reader.next_char(), Some((3..4, '<')));
        assert!(reader.is_exhausted());
        assert_eq!(reader.next_char(), None);
    }

    #[test]
    fn test_rfind_is_strictly_before() {
        let reader = SourceReader::new("<a><b>");
        assert_eq!(reader.rfind(b'<', 6), Some(3));
        assert_eq!(reader.rfind(b'<', 3), Some(0));
        assert_eq!(reader.rfind(b'<', 0), None);
        assert_eq!(reader.rfind(b'<', 100), Some(3));
    }

    #[test]
    fn test_ends_with_closing_literal() {
        let reader = SourceReader::new("<div>x</DIV>");
        assert!(reader.ends_with_ignore_ascii_case(12, "</div>"));
        assert!(!reader.ends_with_ignore_ascii_case(11, "</div>"));
        // not enough bytes before the offset
        assert!(!reader.ends_with_ignore_ascii_case(3, "</div>"));
    }

    #[test]
    fn test_slice_out_of_bounds_is_empty() {
        let reader = SourceReader::new("é");
        assert_eq!(reader.slice(0..2), "é");
        assert_eq!(reader.slice(0..1), "");
        assert_eq!(reader.slice(4..9), "");
    }
}
