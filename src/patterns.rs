//! Compiled patterns and heading classification.
//!
//! All regexes are compiled once per process. Which of them run is decided
//! by [`DocMapConfig`]; nothing here reads configuration files.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{DocMapConfig, HeadingPattern};
use crate::section::SectionKind;
use crate::utils::{collapse_whitespace, is_all_caps, normalize_term, parse_roman};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

// ============ Headings ============

pub(crate) static ARTICLE_HEADING: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(?i:article)\s+([IVXLCDM]+|[ivxlcdm]+|\d{1,3}|[A-Z])\b[.:]?\s*(?:[-–—]\s*)?(.*)$")
});

pub(crate) static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(?:(?i:section)\s+|§\s*)(\d{1,4}(?:\.\d{1,4})*)\.?((?:\([A-Za-z0-9]{1,4}\))*)\.?\s*(?:[-–—:]\s*)?(.*)$")
});

pub(crate) static NUMBERED_HEADING: Lazy<Regex> = Lazy::new(|| {
    compile(r#"^(\d{1,4}(?:\.\d{1,4}){1,5})\.?((?:\([A-Za-z0-9]{1,4}\))*)\s+([A-Za-z][A-Za-z0-9 ,.:;()'"’/&-]{2,})$"#)
});

pub(crate) static ATTACHMENT_HEADING: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(?i:(exhibit|annex|appendix))\s+([A-Z](?:-\d+)?|[IVX]+|\d+(?:[.\-]\d+)*)\b\.?\s*(?:[-–—:]\s*)?(.*)$")
});

pub(crate) static SCHEDULE_HEADING: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(?i:schedule)\s+(\d+(?:\.\d+)*[A-Za-z]?|[A-Z])\b\.?\s*(?:[-–—:]\s*)?(.*)$")
});

/// Table-of-contents line: entry text, dot leaders, printed page number.
pub(crate) static TOC_LINE: Lazy<Regex> =
    Lazy::new(|| compile(r"^(.+?)\s*(?:\.\s?){3,}\s*(\d{1,4})$"));

/// `[PAGE n]` marker on a line of its own.
pub(crate) static PAGE_MARKER: Lazy<Regex> = Lazy::new(|| compile(r"^\s*\[(?i:page)\s+\d+\]\s*$"));

// ============ Definitions ============

/// `"Term" means` / `"Term" shall mean`; group 1 is the term.
pub(crate) static QUOTED_MEANS: Lazy<Regex> = Lazy::new(|| {
    compile(r#"["“]([A-Za-z0-9][^"“”\n]{0,119})["”]\s*,?\s*(?i:shall\s+mean|means|mean)\b"#)
});

/// `(the "Borrower")`; group 1 is the term.
pub(crate) static PARENTHETICAL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    compile(r#"\((?:(?i:the|each|collectively|individually),?\s+(?:(?i:a|an|the)\s+)?)?["“]([A-Za-z][^"“”\n]{0,79})["”]\)"#)
});

/// `Term means ...` at block start; group 1 is the term, group 2 the body.
pub(crate) static UNQUOTED_MEANS: Lazy<Regex> = Lazy::new(|| {
    compile(r"^([A-Z][A-Za-z0-9\-/()]*(?:\s+[A-Za-z0-9\-/()]+){0,7}?)\s+(?i:shall\s+mean|means)\s+(\S[\s\S]*)$")
});

// ============ References ============

/// "Section 6.02(a)", "Sections 2.01", "§ 4.1"; groups: 1 keyword, 2 section sign, 3 number, 4 subdivisions.
pub(crate) static SECTION_REF: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?:\b(?i:(sections?))\s+|(§§?)\s*)(\d{1,4}(?:\.\d{1,4})*)((?:\([A-Za-z0-9]{1,4}\))*)")
});

/// Continuation of a plural section list: ", 2.02", " and 2.03", " through 2.05".
pub(crate) static SECTION_LIST_TAIL: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(?:\s*,\s*(?:(?:and|or)\s+)?|\s+(?:and|or|through|to)\s+)(\d{1,4}(?:\.\d{1,4})*)((?:\([A-Za-z0-9]{1,4}\))*)")
});

pub(crate) static ARTICLE_REF: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(?i:articles?)\s+([IVXLCDM]+|\d{1,3})\b"));

pub(crate) static RELATIVE_REF: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(?i:this)\s+((?i:subsection|section|article))\b"));

/// "of the Security Agreement" following a section citation; group 1 is the document name.
pub(crate) static EXTERNAL_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\s+(?i:of|under|in)\s+(?:(?i:the)\s+)?((?:[A-Z][\w&'’\-]*\s+){1,6}(?:Agreement|Indenture|Guaranty|Guarantee|Notes?|Plan|Mortgage|Certificate|Instrument|Deed|Letter))\b")
});

/// "Exhibit A", "Schedule 5", "Annex II"; group 1 keyword, group 2 identifier.
pub(crate) static ATTACHMENT_REF: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(?i:(exhibits?|annex(?:es)?|appendix|appendices|schedules?))\s+([A-Z](?:-\d+)?|[IVX]+|\d+(?:\.\d+)*[A-Za-z]?)\b")
});

/// "the Security Agreement"; group 1 is the document name.
pub(crate) static EXTERNAL_REF: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(?i:the)\s+((?:[A-Z][\w&'’\-]*\s+){1,6}(?:Agreement|Indenture|Guaranty|Guarantee|Notes?|Plan|Mortgage|Certificate|Instrument|Deed|Letter))\b")
});

/// Any quoted phrase; group 1 is the inner text.
pub(crate) static QUOTED_PHRASE: Lazy<Regex> =
    Lazy::new(|| compile(r#"["“]([^"“”\n]{1,80})["”]"#));

// ============ Keys ============

/// Canonical key of an article identifier ("VI", "6", "A").
pub(crate) fn article_key(id: &str) -> String {
    let single_letter = id.len() == 1 && !matches!(id, "I" | "V" | "X" | "i" | "v" | "x");
    if let Ok(number) = id.parse::<u32>() {
        return format!("ARTICLE:{}", number);
    }
    match parse_roman(id) {
        Some((number, _)) if !single_letter => format!("ARTICLE:{}", number),
        _ => format!("ARTICLE:{}", id.to_uppercase()),
    }
}

/// Canonical key of a section number with optional subdivisions.
///
/// `("6.02", "(a)(iv)")` becomes `SECTION:6.2(a)(iv)`.
pub(crate) fn section_key(number: &str, subdivisions: &str) -> Option<String> {
    let parts = number
        .split('.')
        .map(|p| p.parse::<u32>().ok().map(|n| n.to_string()))
        .collect::<Option<Vec<_>>>()?;
    Some(format!("SECTION:{}{}", parts.join("."), subdivisions.to_lowercase()))
}

/// Canonical key of an exhibit, annex, appendix or schedule.
pub(crate) fn attachment_key(kind: SectionKind, id: &str) -> String {
    let prefix = match kind {
        SectionKind::Annex => "ANNEX",
        SectionKind::Appendix => "APPENDIX",
        SectionKind::Schedule => "SCHEDULE",
        _ => "EXHIBIT",
    };
    format!("{}:{}", prefix, id.to_uppercase())
}

pub(crate) fn attachment_kind(keyword: &str) -> SectionKind {
    let lower = keyword.to_lowercase();
    if lower.starts_with("annex") {
        SectionKind::Annex
    } else if lower.starts_with("append") {
        SectionKind::Appendix
    } else if lower.starts_with("schedule") {
        SectionKind::Schedule
    } else {
        SectionKind::Exhibit
    }
}

/// Parent keys of a section key, nearest first.
///
/// `SECTION:6.2(a)(i)` yields `SECTION:6.2(a)`, `SECTION:6.2`, `SECTION:6`
/// and finally `ARTICLE:6`.
pub(crate) fn ancestor_keys(key: &str) -> Vec<String> {
    let mut out = Vec::new();
    let Some(body) = key.strip_prefix("SECTION:") else {
        return out;
    };

    let mut current = body.to_string();
    loop {
        if current.ends_with(')') {
            if let Some(open) = current.rfind('(') {
                current.truncate(open);
                out.push(format!("SECTION:{}", current));
                continue;
            }
        }
        match current.rfind('.') {
            Some(dot) => {
                current.truncate(dot);
                out.push(format!("SECTION:{}", current));
            }
            None => break,
        }
    }

    if let Some(top) = current.split('.').next().filter(|t| !t.is_empty()) {
        out.push(format!("ARTICLE:{}", top));
    }
    out
}

// ============ Heading classification ============

/// A heading recognized at the start of a block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HeadingMatch {
    pub kind: SectionKind,
    pub key: String,
    pub label: String,
    pub title: String,
    /// Fixed level, or `None` for captions which nest under the open heading
    pub level: Option<u8>,
}

/// A heading title must look like a title rather than running prose.
fn is_title_like(title: &str) -> bool {
    let title = title.trim();
    if title.is_empty() {
        return true;
    }
    let starts_well = title
        .chars()
        .next()
        .map(|c| c.is_uppercase() || c.is_ascii_digit() || matches!(c, '"' | '“' | '(' | '['))
        .unwrap_or(false);
    starts_well && title.split_whitespace().count() <= 14
}

fn clean_title(title: &str) -> String {
    collapse_whitespace(title.trim().trim_end_matches(|c: char| c == '.' || c == ':'))
}

/// Short all-caps line, e.g. "NEGATIVE COVENANTS".
pub(crate) fn is_caps_caption(line: &str, max_words: usize) -> bool {
    let line = line.trim();
    let starts_with_letter = line.chars().next().map(char::is_alphabetic).unwrap_or(false);
    starts_with_letter
        && line.chars().count() <= 100
        && line.split_whitespace().count() <= max_words
        && !line.ends_with(',')
        && !line.ends_with(';')
        && is_all_caps(line)
}

/// Short title-cased line with no sentence punctuation, e.g. "Financial Covenants".
pub(crate) fn is_title_caption(line: &str, max_words: usize) -> bool {
    let line = line.trim();
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 2 || words.len() > max_words {
        return false;
    }
    if line.contains(|c: char| matches!(c, '.' | ',' | ';' | ':' | '$' | '%' | '"' | '“' | '”')) {
        return false;
    }
    let first_upper = line.chars().next().map(char::is_uppercase).unwrap_or(false);
    first_upper
        && words.iter().all(|w| {
            w.chars().filter(|c| c.is_alphabetic()).count() <= 3
                || w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
        })
}

/// Whether a line is a table-of-contents entry.
pub(crate) fn is_toc_line(line: &str) -> bool {
    TOC_LINE.is_match(line.trim())
}

/// "TABLE OF CONTENTS" and "Contents" headings.
pub(crate) fn is_contents_title(title: &str) -> bool {
    matches!(normalize_term(title).as_str(), "table of contents" | "contents")
}

/// Classify the first line of a block.
///
/// `standalone` is true when the block is a single line; only then can a
/// title-cased line count as a caption.
pub(crate) fn match_heading(line: &str, standalone: bool, config: &DocMapConfig) -> Option<HeadingMatch> {
    let line = line.trim();
    if line.is_empty() || is_toc_line(line) {
        return None;
    }

    // Pattern 1: "ARTICLE VI - NEGATIVE COVENANTS"
    if config.has_heading(HeadingPattern::Article) {
        if let Some(caps) = ARTICLE_HEADING.captures(line) {
            let id = &caps[1];
            let title = &caps[2];
            if is_title_like(title) {
                let keyword = line.split_whitespace().next().unwrap_or("Article");
                return Some(HeadingMatch {
                    kind: SectionKind::Article,
                    key: article_key(id),
                    label: format!("{} {}", keyword, id),
                    title: clean_title(title),
                    level: Some(1),
                });
            }
        }
    }

    // Pattern 2: "Section 6.02(a) Dividends" / "§ 6.02"
    if config.has_heading(HeadingPattern::Section) {
        if let Some(caps) = SECTION_HEADING.captures(line) {
            if let Some(found) = numbered(&caps[1], &caps[2], &caps[3], true, line, config) {
                return Some(found);
            }
        }
    }

    // Pattern 3: "6.02 Restricted Payments"
    if config.has_heading(HeadingPattern::NumberedHeading) {
        if let Some(caps) = NUMBERED_HEADING.captures(line) {
            if let Some(found) = numbered(&caps[1], &caps[2], &caps[3], false, line, config) {
                return Some(found);
            }
        }
    }

    // Pattern 4: "Exhibit A - Form of Note"
    if config.has_heading(HeadingPattern::Exhibit) {
        if let Some(caps) = ATTACHMENT_HEADING.captures(line) {
            let kind = attachment_kind(&caps[1]);
            if is_title_like(&caps[3]) {
                return Some(HeadingMatch {
                    kind,
                    key: attachment_key(kind, &caps[2]),
                    label: format!("{} {}", &caps[1], &caps[2]),
                    title: clean_title(&caps[3]),
                    level: Some(1),
                });
            }
        }
    }

    // Pattern 5: "Schedule 1.01 Commitments"
    if config.has_heading(HeadingPattern::Schedule) {
        if let Some(caps) = SCHEDULE_HEADING.captures(line) {
            if is_title_like(&caps[2]) {
                let keyword = line.split_whitespace().next().unwrap_or("Schedule");
                return Some(HeadingMatch {
                    kind: SectionKind::Schedule,
                    key: attachment_key(SectionKind::Schedule, &caps[1]),
                    label: format!("{} {}", keyword, &caps[1]),
                    title: clean_title(&caps[2]),
                    level: Some(1),
                });
            }
        }
    }

    // Pattern 6: "NEGATIVE COVENANTS", or "Financial Covenants" on its own
    if config.has_heading(HeadingPattern::Caption) {
        let caption = is_caps_caption(line, config.caption_max_words)
            || (standalone && is_title_caption(line, config.caption_max_words));
        if caption {
            let title = clean_title(line);
            return Some(HeadingMatch {
                kind: SectionKind::Caption,
                key: format!("CAPTION:{}", normalize_term(&title)),
                label: String::new(),
                title,
                level: None,
            });
        }
    }

    None
}

fn numbered(
    number: &str,
    subdivisions: &str,
    title: &str,
    with_keyword: bool,
    line: &str,
    config: &DocMapConfig,
) -> Option<HeadingMatch> {
    if !subdivisions.is_empty() && !config.has_heading(HeadingPattern::Subsection) {
        return None;
    }
    if !is_title_like(title) {
        return None;
    }
    let key = section_key(number, subdivisions)?;
    let depth = number.split('.').count() + subdivisions.matches('(').count();
    let label = if with_keyword {
        let keyword = if line.starts_with('§') {
            "§"
        } else {
            line.split_whitespace().next().unwrap_or("Section")
        };
        format!("{} {}{}", keyword, number, subdivisions)
    } else {
        format!("{}{}", number, subdivisions)
    };
    Some(HeadingMatch {
        kind: if subdivisions.is_empty() {
            SectionKind::Section
        } else {
            SectionKind::Subsection
        },
        key,
        label,
        title: clean_title(title),
        level: Some(u8::try_from(depth + 1).unwrap_or(u8::MAX)),
    })
}

/// Whether a line must become a block of its own.
pub(crate) fn is_heading_like(line: &str, config: &DocMapConfig) -> bool {
    is_toc_line(line) || match_heading(line, false, config).is_some()
}

/// Whether a line opens a `"Term" means` definition.
pub(crate) fn opens_definition(line: &str) -> bool {
    QUOTED_MEANS
        .find(line.trim_start())
        .map(|m| m.start() == 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(line: &str) -> Option<HeadingMatch> {
        match_heading(line, true, &DocMapConfig::default())
    }

    #[test]
    fn test_article_heading() {
        let found = heading("ARTICLE VI - NEGATIVE COVENANTS").unwrap();
        assert_eq!(found.kind, SectionKind::Article);
        assert_eq!(found.key, "ARTICLE:6");
        assert_eq!(found.label, "ARTICLE VI");
        assert_eq!(found.title, "NEGATIVE COVENANTS");
        assert_eq!(found.level, Some(1));

        let bare = heading("ARTICLE I").unwrap();
        assert_eq!(bare.title, "");
        assert_eq!(heading("Article A").unwrap().key, "ARTICLE:A");
    }

    #[test]
    fn test_section_heading_levels() {
        let section = heading("Section 2.01 Financial Covenants").unwrap();
        assert_eq!(section.key, "SECTION:2.1");
        assert_eq!(section.label, "Section 2.01");
        assert_eq!(section.title, "Financial Covenants");
        assert_eq!(section.level, Some(3));

        let sub = heading("Section 6.02(a) Dividends").unwrap();
        assert_eq!(sub.kind, SectionKind::Subsection);
        assert_eq!(sub.key, "SECTION:6.2(a)");
        assert_eq!(sub.level, Some(4));

        assert_eq!(heading("§ 4.1 Notices").unwrap().label, "§ 4.1");
    }

    #[test]
    fn test_numbered_heading() {
        let found = heading("6.02 Restricted Payments").unwrap();
        assert_eq!(found.key, "SECTION:6.2");
        assert_eq!(found.label, "6.02");
        assert!(heading("1.5 times the amount of interest").is_none());
    }

    #[test]
    fn test_prose_is_not_heading() {
        assert!(heading("Section 6.02 of the Credit Agreement is hereby amended.").is_none());
        assert!(heading("Section 2.01 shall not apply to any Excluded Subsidiary.").is_none());
    }

    #[test]
    fn test_subsection_pattern_can_be_disabled() {
        let config = DocMapConfig::default().with_heading_patterns(vec![HeadingPattern::Section]);
        assert!(match_heading("Section 6.02(a) Dividends", true, &config).is_none());
        assert!(match_heading("Section 6.02 Dividends", true, &config).is_some());
    }

    #[test]
    fn test_attachments() {
        let exhibit = heading("EXHIBIT A - FORM OF NOTE").unwrap();
        assert_eq!(exhibit.key, "EXHIBIT:A");
        assert_eq!(exhibit.title, "FORM OF NOTE");
        assert_eq!(heading("Schedule 1.01 Commitments").unwrap().key, "SCHEDULE:1.01");
        assert_eq!(heading("Annex II").unwrap().key, "ANNEX:II");
    }

    #[test]
    fn test_captions() {
        let caps = heading("NEGATIVE COVENANTS").unwrap();
        assert_eq!(caps.kind, SectionKind::Caption);
        assert_eq!(caps.level, None);
        assert!(heading("Financial Covenants").is_some());
        assert!(match_heading("Financial Covenants", false, &DocMapConfig::default()).is_none());
        assert!(heading("Borrower shall maintain the ratio.").is_none());
    }

    #[test]
    fn test_toc_lines_are_not_headings() {
        assert!(is_toc_line("Section 6.02 Restricted Payments ........ 45"));
        assert!(is_toc_line("ARTICLE I DEFINITIONS . . . . 1"));
        assert!(heading("Section 6.02 Restricted Payments ........ 45").is_none());
    }

    #[test]
    fn test_opens_definition() {
        assert!(opens_definition("\"Maturity Date\" means March 31, 2031."));
        assert!(opens_definition("“Excess Cash” shall mean cash."));
        assert!(!opens_definition("As used herein, \"Excess Cash\" means cash."));
    }

    #[test]
    fn test_ancestor_keys() {
        assert_eq!(
            ancestor_keys("SECTION:6.2(a)(i)"),
            vec!["SECTION:6.2(a)", "SECTION:6.2", "SECTION:6", "ARTICLE:6"]
        );
        assert_eq!(ancestor_keys("SECTION:3"), vec!["ARTICLE:3"]);
        assert!(ancestor_keys("EXHIBIT:A").is_empty());
    }

    #[test]
    fn test_section_key_normalizes_numbers() {
        assert_eq!(section_key("2.01", "").as_deref(), Some("SECTION:2.1"));
        assert_eq!(section_key("6.10", "(A)").as_deref(), Some("SECTION:6.10(a)"));
    }
}
