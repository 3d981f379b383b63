/// Upper bound, in bytes, for a record's plain-text description.
pub const MAX_DESCRIPTION_TEXT: usize = 8_192;

/// Collapses every whitespace run into one space and trims both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates `text` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Trimmed, collapsed text, or `None` when nothing is left.
pub fn clean_field(text: &str) -> Option<String> {
    let cleaned = collapse_whitespace(text);
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_kept_as_is() {
        assert_eq!(truncate_on_char_boundary("short", 64), "short");
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        let text = "ñandú ñandú";
        let cut = truncate_on_char_boundary(text, 2);
        assert_eq!(cut, "ñ");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(clean_field(" \n "), None);
    }
}
