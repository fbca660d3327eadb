//! Shared helpers used across the map layers.

use unicode_segmentation::UnicodeSegmentation;

/// Normalize a defined term for lookup: strip surrounding quotes, collapse
/// whitespace and lowercase.
pub(crate) fn normalize_term(term: &str) -> String {
    let trimmed = term.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'));
    collapse_whitespace(trimmed).to_lowercase()
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased word tokens of at least two characters.
pub(crate) fn word_tokens(text: &str) -> Vec<String> {
    text.unicode_words()
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.to_lowercase())
        .collect()
}

/// First `max_chars` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Byte offset of the first occurrence of `needle` that does not start or
/// end inside a word of `haystack`.
///
/// ASCII lowercasing keeps byte offsets stable, so with `ignore_ascii_case`
/// the result still indexes `haystack`.
pub(crate) fn find_word(haystack: &str, needle: &str, ignore_ascii_case: bool) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let (haystack, needle) = if ignore_ascii_case {
        (haystack.to_ascii_lowercase(), needle.to_ascii_lowercase())
    } else {
        (haystack.to_string(), needle.to_string())
    };
    haystack.match_indices(needle.as_str()).map(|(at, _)| at).find(|&at| {
        let end = at + needle.len();
        !joins_word(haystack[..at].chars().next_back(), needle.chars().next())
            && !joins_word(haystack[end..].chars().next(), needle.chars().next_back())
    })
}

fn joins_word(outside: Option<char>, inside: Option<char>) -> bool {
    matches!((outside, inside), (Some(o), Some(i)) if o.is_alphanumeric() && i.is_alphanumeric())
}

/// True when every cased character is uppercase and at least one letter exists.
pub(crate) fn is_all_caps(text: &str) -> bool {
    let mut letters = 0;
    for c in text.chars() {
        if c.is_alphabetic() {
            letters += 1;
            if c.is_lowercase() {
                return false;
            }
        }
    }
    letters >= 2
}

/// Parse a Roman numeral from text.
///
/// Returns `(numeric_value, is_uppercase)` or `None` if not a valid Roman numeral.
/// Supports numerals up to 3999 (MMMCMXCIX).
///
/// # Examples
/// ```ignore
/// assert_eq!(parse_roman("IV"), Some((4, true)));
/// assert_eq!(parse_roman("xii"), Some((12, false)));
/// ```
pub(crate) fn parse_roman(text: &str) -> Option<(u32, bool)> {
    let uppercase = text.chars().next()?.is_uppercase();
    let upper = text.to_uppercase();

    let value = |c: char| match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };

    // Subtractive principle, right to left
    let mut total: u32 = 0;
    let mut prev: u32 = 0;
    for c in upper.chars().rev() {
        let v = value(c)?;
        if v < prev {
            total = total.checked_sub(v)?;
        } else {
            total = total.checked_add(v)?;
        }
        prev = v;
    }

    if total == 0 || total > 3999 {
        return None;
    }
    Some((total, uppercase))
}
