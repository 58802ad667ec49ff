//! Text helpers shared by synthesis and citations.

use unicode_segmentation::UnicodeSegmentation;

const ELLIPSIS: char = '…';

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapsed text bounded to `max_chars` characters.
///
/// Longer text is cut at a grapheme boundary and ends with `…`; the
/// ellipsis counts toward the bound.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    if max_chars == 0 {
        return String::new();
    }

    let budget = max_chars - 1;
    let mut out = String::new();
    let mut used = 0;
    for grapheme in collapsed.graphemes(true) {
        let width = grapheme.chars().count();
        if used + width > budget {
            break;
        }
        out.push_str(grapheme);
        used += width;
    }

    let mut out = out.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a\n\n b\t c  "), "a b c");
        assert_eq!(collapse_whitespace(" \n\t "), "");
    }

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(snippet("Closures  capture\nvalues", 280), "Closures capture values");
    }

    #[test]
    fn test_exact_length_not_truncated() {
        assert_eq!(snippet("abcde", 5), "abcde");
    }

    #[test]
    fn test_truncated_with_ellipsis_within_bound() {
        let text = "word ".repeat(100);
        let result = snippet(&text, 20);
        assert!(result.chars().count() <= 20);
        assert!(result.ends_with('…'));
        assert!(result.starts_with("word word"));
    }

    #[test]
    fn test_never_splits_grapheme() {
        // "é" written as e + combining acute accent is one grapheme of two chars
        let text = "ae\u{301}e\u{301}e\u{301}e\u{301}";
        let result = snippet(text, 4);
        assert_eq!(result, "ae\u{301}…");
    }

    #[test]
    fn test_zero_bound() {
        assert_eq!(snippet("anything", 0), "");
    }
}
