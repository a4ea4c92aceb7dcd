//! Unicode utilities for safe byte-boundary text slicing.
//!
//! Shared by the query planner's input-column character limits and the
//! provider adapter's context-window truncation, both of which must cut
//! text without splitting a UTF-8 (and ideally grapheme) boundary.

use unicode_segmentation::UnicodeSegmentation;

/// Finds a valid UTF-8 character boundary at or before the given position.
#[must_use]
pub const fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    while boundary > 0 && (bytes[boundary] & 0xC0) == 0x80 {
        boundary -= 1;
    }
    boundary
}

/// Finds a valid UTF-8 character boundary at or after the given position.
#[must_use]
pub const fn find_char_boundary_forward(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    while boundary < bytes.len() && (bytes[boundary] & 0xC0) == 0x80 {
        boundary += 1;
    }
    boundary
}

/// Counts the number of grapheme clusters in a string.
#[must_use]
pub fn grapheme_count(s: &str) -> usize {
    s.graphemes(true).count()
}

/// Truncates a string at a grapheme cluster boundary, preserving at most
/// `max_graphemes` clusters.
#[must_use]
pub fn truncate_graphemes(s: &str, max_graphemes: usize) -> &str {
    let mut end_byte = 0;
    for (count, grapheme) in s.graphemes(true).enumerate() {
        if count >= max_graphemes {
            break;
        }
        end_byte += grapheme.len();
    }
    &s[..end_byte]
}

/// Truncates `s` to at most `max_bytes` bytes, backing up to the nearest
/// character boundary rather than splitting a multi-byte sequence.
#[must_use]
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let boundary = find_char_boundary(s, max_bytes);
    &s[..boundary]
}

/// Finds the last whitespace byte offset at or before `pos`, falling back to
/// `pos` itself (char-boundary-adjusted) if no whitespace is found.
///
/// Used by the provider adapter to prefer a trailing word boundary when
/// truncating a prompt to fit a model's context window.
#[must_use]
pub fn last_word_boundary_before(s: &str, pos: usize) -> usize {
    let boundary = find_char_boundary(s, pos);
    match s[..boundary].rfind(char::is_whitespace) {
        Some(idx) => idx,
        None => boundary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_char_boundary_backs_up_into_multibyte() {
        let s = "Hello 世界!";
        assert_eq!(find_char_boundary(s, 6), 6);
        assert_eq!(find_char_boundary(s, 7), 6);
        assert_eq!(find_char_boundary(s, 100), s.len());
    }

    #[test]
    fn find_char_boundary_forward_advances_past_multibyte() {
        let s = "Hello 世界!";
        assert_eq!(find_char_boundary_forward(s, 7), 9);
        assert_eq!(find_char_boundary_forward(s, 5), 5);
    }

    #[test]
    fn grapheme_count_counts_clusters_not_bytes() {
        assert_eq!(grapheme_count("Hello"), 5);
        assert_eq!(grapheme_count("世界"), 2);
    }

    #[test]
    fn truncate_graphemes_cuts_on_cluster_boundary() {
        assert_eq!(truncate_graphemes("Hello", 3), "Hel");
        assert_eq!(truncate_graphemes("世界!", 2), "世界");
    }

    #[test]
    fn truncate_bytes_never_splits_a_character() {
        let s = "ab世c";
        let truncated = truncate_bytes(s, 3);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
        assert_eq!(truncated, "ab");
    }

    #[test]
    fn last_word_boundary_before_prefers_whitespace() {
        let s = "the quick brown fox";
        let idx = last_word_boundary_before(s, 12);
        assert_eq!(&s[..idx], "the quick");
    }

    #[test]
    fn last_word_boundary_before_falls_back_without_whitespace() {
        let s = "nowhitespacehere";
        assert_eq!(last_word_boundary_before(s, 5), 5);
    }
}
