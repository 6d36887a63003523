//! Text processing utilities.

/// True when the text contains at least one non-whitespace character.
pub fn has_visible_content(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
///
/// Returns the original string untouched when it already fits.
pub fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut text = text;
            text.truncate(byte_idx);
            (text, true)
        }
        None => (text, false),
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_visible_content() {
        assert!(!has_visible_content(""));
        assert!(!has_visible_content("   \n\t  "));
        assert!(has_visible_content("  x "));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let (text, truncated) = truncate_chars("가나다라".to_string(), 2);
        assert_eq!(text, "가나");
        assert!(truncated);

        let (text, truncated) = truncate_chars("abc".to_string(), 3);
        assert_eq!(text, "abc");
        assert!(!truncated);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\tc  "), "a b c");
    }
}
