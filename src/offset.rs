//! Character offset helpers.
//!
//! All span offsets in this crate are character offsets, because the wire
//! formats count characters, not bytes. Rust strings are byte-indexed, so
//! every place that slices unit text goes through these helpers instead of
//! indexing directly.

/// Number of characters in `text`.
#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Convert a byte offset into `text` to a character offset.
///
/// `byte` must lie on a character boundary.
#[must_use]
pub fn byte_to_char(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// Convert a character offset into `text` to a byte offset.
///
/// Offsets past the end saturate to `text.len()`.
#[must_use]
pub fn char_to_byte(text: &str, ch: usize) -> usize {
    text.char_indices()
        .nth(ch)
        .map_or_else(|| text.len(), |(b, _)| b)
}

/// Slice `text` by character offsets `[start, end)`.
///
/// Out-of-range offsets saturate to the text end.
#[must_use]
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let b0 = char_to_byte(text, start);
    let b1 = char_to_byte(text, end);
    &text[b0..b1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_match_bytes() {
        let text = "heart failure";
        assert_eq!(char_len(text), 13);
        assert_eq!(byte_to_char(text, 6), 6);
        assert_eq!(char_slice(text, 6, 13), "failure");
    }

    #[test]
    fn multibyte_offsets_count_chars() {
        let text = "α-fetoprotein";
        assert_eq!(char_len(text), 13);
        // 'α' is 2 bytes but 1 char
        assert_eq!(byte_to_char(text, 2), 1);
        assert_eq!(char_slice(text, 2, 13), "fetoprotein");
    }

    #[test]
    fn saturates_past_end() {
        let text = "abc";
        assert_eq!(char_to_byte(text, 10), 3);
        assert_eq!(char_slice(text, 1, 10), "bc");
    }
}
