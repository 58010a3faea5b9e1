//! Fixed-capacity, always NUL-terminated string buffers
//!
//! `FixedStr<N>` occupies exactly `N` bytes. At most `N - 1` bytes of text
//! are stored and the remainder is zero-filled, so the buffer is a valid C
//! string at all times and no write can reach past the array. Oversized
//! input is truncated at the last UTF-8 character boundary that fits.

use std::fmt;

/// Inline string buffer of `N` bytes (capacity `N - 1` plus terminator)
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    /// Maximum number of visible bytes
    pub const CAPACITY: usize = N - 1;

    /// Create an empty buffer
    pub const fn new() -> Self {
        Self { bytes: [0u8; N] }
    }

    /// Create a buffer from `value`, truncating if needed
    pub fn from_str_truncated(value: &str) -> Self {
        let mut s = Self::new();
        s.set(value);
        s
    }

    /// Replace the contents with `value`, truncating to `CAPACITY` bytes.
    ///
    /// Returns the number of bytes stored.
    pub fn set(&mut self, value: &str) -> usize {
        let len = truncation_point(value, Self::CAPACITY);
        self.bytes[..len].copy_from_slice(&value.as_bytes()[..len]);
        self.bytes[len..].fill(0);
        len
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Length of the stored text in bytes
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(Self::CAPACITY)
    }

    /// Check if the buffer holds no text
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// Stored text
    pub fn as_str(&self) -> &str {
        // Only whole UTF-8 prefixes are ever written
        std::str::from_utf8(&self.bytes[..self.len()]).unwrap_or("")
    }

    /// Raw backing bytes, including the terminator and zero padding
    pub fn as_bytes_with_nul(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Rebuild from raw bytes read back from disk.
    ///
    /// The last byte is forced to zero and any invalid UTF-8 tail is dropped.
    pub fn from_raw(raw: &[u8; N]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(Self::CAPACITY);
        let text = match std::str::from_utf8(&raw[..end]) {
            Ok(text) => text,
            Err(e) => std::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or(""),
        };
        Self::from_str_truncated(text)
    }
}

/// Largest char boundary in `value` that is `<= max` bytes
fn truncation_point(value: &str, max: usize) -> usize {
    if value.len() <= max {
        return value.len();
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    end
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_within_capacity() {
        let mut s = FixedStr::<4>::new();
        assert_eq!(s.set("AB"), 2);
        assert_eq!(s.as_str(), "AB");
        assert_eq!(s.as_bytes_with_nul(), &[b'A', b'B', 0, 0]);
    }

    #[test]
    fn test_set_truncates_oversized_input() {
        let mut s = FixedStr::<4>::new();
        let long = "A".repeat(99);
        assert_eq!(s.set(&long), 3);
        assert_eq!(s.as_str(), "AAA");
        assert_eq!(s.as_bytes_with_nul()[3], 0);
    }

    #[test]
    fn test_shorter_write_clears_previous_tail() {
        let mut s = FixedStr::<8>::new();
        s.set("ABCDEFG");
        s.set("X");
        assert_eq!(s.as_str(), "X");
        assert!(s.as_bytes_with_nul()[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // "é" is two bytes; only one byte of room remains after "AB"
        let s = FixedStr::<4>::from_str_truncated("ABé");
        assert_eq!(s.as_str(), "AB");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_empty() {
        let mut s = FixedStr::<16>::from_str_truncated("x");
        assert!(!s.is_empty());
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.len(), 0);
        assert_eq!(s.as_str(), "");
    }

    #[test]
    fn test_format_sequences_are_literal() {
        let s = FixedStr::<256>::from_str_truncated("%s%s%n%x");
        assert_eq!(s.as_str(), "%s%s%n%x");
    }

    #[test]
    fn test_from_raw_forces_terminator() {
        let raw = [b'Z'; 8];
        let s = FixedStr::<8>::from_raw(&raw);
        assert_eq!(s.as_str(), "ZZZZZZZ");
        assert_eq!(s.as_bytes_with_nul()[7], 0);
    }

    #[test]
    fn test_from_raw_drops_invalid_utf8() {
        let mut raw = [0u8; 8];
        raw[0] = b'o';
        raw[1] = b'k';
        raw[2] = 0xFF;
        let s = FixedStr::<8>::from_raw(&raw);
        assert_eq!(s.as_str(), "ok");
    }
}
