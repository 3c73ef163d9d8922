//! Line assembly
//!
//! Accumulates bytes from the serial stream into carriage-return terminated
//! lines with a hard 127 character ceiling.

use std::borrow::Cow;
use std::fmt;

use super::transport::ReadByte;

/// Maximum number of characters buffered before a line is force-completed
pub const MAX_LINE_LEN: usize = 127;

/// Carriage return, ends a line
pub const CR: u8 = 13;
/// Line feed, never stored
pub const LF: u8 = 10;

/// A completed line.
///
/// Borrows the buffer it was assembled in and is only valid until the next
/// byte is fed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    bytes: &'a [u8],
}

impl<'a> Line<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[cfg(test)]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.bytes.contains(&byte)
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.bytes.starts_with(prefix)
    }

    /// Text view; bytes that are not UTF-8 are replaced
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

impl fmt::Debug for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?})", self.text())
    }
}

/// Fixed-capacity input buffer with a write cursor
pub struct LineBuffer {
    buf: [u8; MAX_LINE_LEN],
    cursor: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            cursor: 0,
        }
    }

    /// Number of characters buffered for the current line
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_full(&self) -> bool {
        self.cursor >= MAX_LINE_LEN
    }

    /// Drop whatever has been buffered
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Feed a single byte.
    ///
    /// Returns the completed line on CR, or when the buffer is already full
    /// (the overflowing byte is consumed by the flush).
    pub fn feed(&mut self, input: ReadByte) -> Option<Line<'_>> {
        let byte = match input {
            ReadByte::Byte(b) => b,
            ReadByte::EndOfStream => return None,
        };

        if byte == CR || self.is_full() {
            if byte != CR {
                tracing::debug!(
                    "Input buffer overflow at {} characters, forcing line completion",
                    self.cursor
                );
            }
            let len = self.cursor;
            self.cursor = 0;
            return Some(Line::new(&self.buf[..len]));
        }

        if byte != LF {
            self.buf[self.cursor] = byte;
            self.cursor += 1;
        }
        None
    }
}
