//! Cross-reference types and mention detection.
//!
//! Mentions are found with ordered patterns. Each pattern may only claim
//! text no earlier pattern has claimed, so "Section 6.02" inside "this
//! Section 6.02" is a section reference and not a relative one.
//!
//! Detected shapes:
//! - `Section 6.02(a)`, `Sections 2.01 and 2.02`, `§ 4.1`, `Article III`
//! - `Section 5 of the Security Agreement` (section of another document)
//! - `this Section`, `this Article`
//! - `"Defined Term"` where the quoted text is a defined term
//! - `Exhibit A`, `Schedule 5`, `Annex II`, `Appendix 1`
//! - `the Security Agreement`

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{DocMapConfig, ReferencePattern};
use crate::definitions::DefinitionTable;
use crate::patterns::{
    article_key, attachment_key, attachment_kind, section_key, ARTICLE_REF, ATTACHMENT_REF, EXTERNAL_REF,
    EXTERNAL_SUFFIX, QUOTED_PHRASE, RELATIVE_REF, SECTION_LIST_TAIL, SECTION_REF,
};
use crate::section::{SectionId, SectionKind};
use crate::segmenter::Block;
use crate::utils::normalize_term;
use crate::Anchor;

/// The category of a cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    SectionRef,
    DefinitionRef,
    ExhibitRef,
    ScheduleRef,
    ExternalDocRef,
}

/// What a mention points at, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum ReferenceTarget {
    /// Canonical section key, e.g. `SECTION:6.2(a)` or `ARTICLE:3`
    Section { key: String },
    /// "this Section"; resolved to the enclosing node of that kind
    Relative { kind: SectionKind },
    /// Normalized defined term
    Term { term: String },
    /// Canonical attachment key, e.g. `EXHIBIT:A`
    Attachment { key: String },
    /// Another document, optionally a section inside it
    External { document: String, section: Option<String> },
}

/// Result of attempting to resolve a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// Resolved to exactly the cited target.
    Exact,
    /// The cited subsection was not extracted; resolved to its nearest ancestor.
    Ancestor {
        /// Key of the node actually matched
        matched_key: String,
    },
    /// Several targets matched; the first in document order was taken.
    Soft {
        /// Anchors of the targets not taken
        alternatives: Vec<Anchor>,
    },
    /// No target found. The reference is kept.
    Unresolved {
        /// Reason for failure
        reason: String,
    },
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved { .. })
    }
}

/// A reference mention and its resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    /// Position in the map's reference list
    pub id: usize,
    /// Span of the mention itself
    pub from_anchor: Anchor,
    pub ref_type: ReferenceType,
    /// Mention text as written
    pub raw_text: String,
    pub target: ReferenceTarget,
    /// Anchor of the resolved target; `None` when unresolved
    pub resolved_anchor: Option<Anchor>,
    /// Resolved section node, when the target is a section of the same document
    pub resolved_section: Option<SectionId>,
    /// Document holding the target, when it is another document
    pub resolved_document: Option<String>,
    pub resolution: Resolution,
    pub confidence: f64,
}

impl CrossReference {
    pub fn is_resolved(&self) -> bool {
        self.resolved_anchor.is_some()
    }
}

/// A detected mention, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mention {
    pub block_index: usize,
    pub start: usize,
    pub end: usize,
    pub ref_type: ReferenceType,
    pub raw_text: String,
    pub target: ReferenceTarget,
    pub confidence: f64,
}

/// Finds reference mentions in blocks.
pub(crate) struct ReferenceScanner<'a> {
    config: &'a DocMapConfig,
    definitions: &'a DefinitionTable,
    /// Normalized names this document goes by
    own_names: Vec<String>,
    bare_terms: Option<Regex>,
}

impl<'a> ReferenceScanner<'a> {
    pub fn new(config: &'a DocMapConfig, definitions: &'a DefinitionTable, own_names: Vec<String>) -> Self {
        let bare_terms = if config.has_reference(ReferencePattern::BareTerm) {
            bare_term_regex(definitions)
        } else {
            None
        };
        Self {
            config,
            definitions,
            own_names: own_names.iter().map(|n| normalize_term(n)).filter(|n| !n.is_empty()).collect(),
            bare_terms,
        }
    }

    /// Whether an agreement name refers to this document.
    fn is_own_name(&self, name: &str) -> bool {
        let name = normalize_term(name);
        self.own_names.iter().any(|own| *own == name || own.ends_with(&format!(" {}", name)))
    }

    /// Mentions in one block, in text order. Mentions at the very start of a
    /// heading block are the heading's own label and are skipped.
    pub fn scan(&self, block: &Block, is_heading: bool) -> Vec<Mention> {
        let text = block.raw_text.as_str();
        let mut found: Vec<Mention> = Vec::new();

        for pattern in &self.config.reference_patterns {
            match pattern {
                ReferencePattern::Section => self.scan_sections(block, text, &mut found),
                ReferencePattern::Relative => self.scan_relative(block, text, &mut found),
                ReferencePattern::QuotedTerm => self.scan_quoted_terms(block, text, &mut found),
                ReferencePattern::Exhibit => self.scan_attachments(block, text, &mut found),
                ReferencePattern::External => self.scan_external(block, text, &mut found),
                ReferencePattern::BareTerm => self.scan_bare_terms(block, text, &mut found),
            }
        }

        if is_heading {
            found.retain(|m| m.start > 0);
        }
        found.sort_by_key(|m| (m.start, m.end));
        found
    }

    fn scan_sections(&self, block: &Block, text: &str, found: &mut Vec<Mention>) {
        // Pattern 1: "Section 6.02(a)" and lists after "Sections"
        for caps in SECTION_REF.captures_iter(text) {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(3)) else {
                continue;
            };
            let subdivisions = caps.get(4).map(|m| m.as_str()).unwrap_or("");
            let Some(key) = section_key(number.as_str(), subdivisions) else {
                continue;
            };
            let plural = caps
                .get(1)
                .map(|k| k.as_str().to_lowercase().ends_with('s'))
                .unwrap_or(false)
                || caps.get(2).map(|k| k.as_str() == "§§").unwrap_or(false);

            self.push_section_or_external(block, text, whole.start(), whole.end(), key, found);

            if plural {
                let mut pos = whole.end();
                while let Some(tail) = SECTION_LIST_TAIL.captures(&text[pos..]) {
                    let (Some(tail_whole), Some(tail_number)) = (tail.get(0), tail.get(1)) else {
                        break;
                    };
                    let tail_subs = tail.get(2).map(|m| m.as_str()).unwrap_or("");
                    let start = pos + tail_number.start();
                    let end = pos + tail_whole.end();
                    if let Some(key) = section_key(tail_number.as_str(), tail_subs) {
                        push_claimed(found, self.mention(block, start, end, ReferenceType::SectionRef, ReferenceTarget::Section { key }, 0.85));
                    }
                    pos = end;
                }
            }
        }

        // Pattern 2: "Article III"
        for caps in ARTICLE_REF.captures_iter(text) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            self.push_section_or_external(block, text, whole.start(), whole.end(), article_key(id.as_str()), found);
        }
    }

    /// A section citation, or a section of another document when followed by
    /// "of the <Name> Agreement".
    fn push_section_or_external(
        &self,
        block: &Block,
        text: &str,
        start: usize,
        end: usize,
        key: String,
        found: &mut Vec<Mention>,
    ) {
        if self.config.has_reference(ReferencePattern::External) {
            if let Some(suffix) = EXTERNAL_SUFFIX.captures(&text[end..]) {
                if let (Some(suffix_whole), Some(name)) = (suffix.get(0), suffix.get(1)) {
                    let document = name.as_str().trim().to_string();
                    if !self.is_own_name(&document) {
                        let target = ReferenceTarget::External {
                            document,
                            section: Some(key),
                        };
                        let end = end + suffix_whole.end();
                        push_claimed(found, self.mention(block, start, end, ReferenceType::ExternalDocRef, target, 0.8));
                        return;
                    }
                }
            }
        }
        push_claimed(found, self.mention(block, start, end, ReferenceType::SectionRef, ReferenceTarget::Section { key }, 0.9));
    }

    fn scan_relative(&self, block: &Block, text: &str, found: &mut Vec<Mention>) {
        // Pattern 3: "this Section"
        for caps in RELATIVE_REF.captures_iter(text) {
            let (Some(whole), Some(keyword)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let kind = match keyword.as_str().to_lowercase().as_str() {
                "article" => SectionKind::Article,
                "subsection" => SectionKind::Subsection,
                _ => SectionKind::Section,
            };
            push_claimed(
                found,
                self.mention(block, whole.start(), whole.end(), ReferenceType::SectionRef, ReferenceTarget::Relative { kind }, 0.8),
            );
        }
    }

    fn scan_quoted_terms(&self, block: &Block, text: &str, found: &mut Vec<Mention>) {
        // Pattern 4: "Defined Term", but not at the definition itself
        for caps in QUOTED_PHRASE.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let term = normalize_term(inner.as_str());
            if !self.definitions.contains(&term) || self.is_definition_site(block, whole.start()) {
                continue;
            }
            push_claimed(
                found,
                self.mention(block, whole.start(), whole.end(), ReferenceType::DefinitionRef, ReferenceTarget::Term { term }, 0.95),
            );
        }
    }

    fn scan_attachments(&self, block: &Block, text: &str, found: &mut Vec<Mention>) {
        // Pattern 5: "Exhibit A", "Schedule 5"
        for caps in ATTACHMENT_REF.captures_iter(text) {
            let (Some(whole), Some(keyword), Some(id)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let kind = attachment_kind(keyword.as_str());
            let ref_type = if kind == SectionKind::Schedule {
                ReferenceType::ScheduleRef
            } else {
                ReferenceType::ExhibitRef
            };
            let target = ReferenceTarget::Attachment {
                key: attachment_key(kind, id.as_str()),
            };
            push_claimed(found, self.mention(block, whole.start(), whole.end(), ref_type, target, 0.9));
        }
    }

    fn scan_external(&self, block: &Block, text: &str, found: &mut Vec<Mention>) {
        // Pattern 6: "the Security Agreement"
        for caps in EXTERNAL_REF.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let document = name.as_str().trim().to_string();
            if self.is_own_name(&document) {
                continue;
            }
            let target = ReferenceTarget::External { document, section: None };
            push_claimed(found, self.mention(block, whole.start(), whole.end(), ReferenceType::ExternalDocRef, target, 0.8));
        }
    }

    fn scan_bare_terms(&self, block: &Block, text: &str, found: &mut Vec<Mention>) {
        // Pattern 7: unquoted defined terms
        let Some(regex) = &self.bare_terms else {
            return;
        };
        for m in regex.find_iter(text) {
            if self.is_definition_site(block, m.start()) {
                continue;
            }
            let term = normalize_term(m.as_str());
            push_claimed(
                found,
                self.mention(block, m.start(), m.end(), ReferenceType::DefinitionRef, ReferenceTarget::Term { term }, 0.7),
            );
        }
    }

    fn is_definition_site(&self, block: &Block, start: usize) -> bool {
        self.definitions.entries().iter().any(|entry| {
            entry.term_anchor.block_index() == block.index()
                && entry.term_anchor.char_start() <= start
                && start < entry.term_anchor.char_end().max(entry.term_anchor.char_start() + 1)
        })
    }

    fn mention(
        &self,
        block: &Block,
        start: usize,
        end: usize,
        ref_type: ReferenceType,
        target: ReferenceTarget,
        confidence: f64,
    ) -> Mention {
        Mention {
            block_index: block.index(),
            start,
            end,
            ref_type,
            raw_text: block.raw_text[start..end].to_string(),
            target,
            confidence,
        }
    }
}

/// Add a mention unless an earlier pattern already claimed overlapping text.
fn push_claimed(found: &mut Vec<Mention>, mention: Mention) {
    let overlaps = found.iter().any(|m| mention.start < m.end && m.start < mention.end);
    if !overlaps {
        found.push(mention);
    }
}

/// Alternation of every defined term as written, longest first.
fn bare_term_regex(definitions: &DefinitionTable) -> Option<Regex> {
    let mut terms: Vec<&str> = definitions.entries().iter().map(|e| e.term.as_str()).collect();
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    terms.dedup();
    if terms.is_empty() {
        return None;
    }
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternation)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionExtractor;
    use crate::segmenter::Segmenter;
    use crate::structure::StructureExtractor;

    fn mentions_with(text: &str, config: &DocMapConfig) -> Vec<(ReferenceType, String, ReferenceTarget)> {
        let blocks = Segmenter::new(config).segment("doc", text);
        let structure = StructureExtractor::new(config).extract("doc", &blocks, &[]).value;
        let definitions = DefinitionExtractor::new(config).extract(&blocks, &structure.sections, &structure.block_sections);
        let own = structure.title.iter().cloned().collect();
        let scanner = ReferenceScanner::new(config, &definitions, own);
        let headings: Vec<usize> = structure.sections.iter().skip(1).map(|n| n.start_block()).collect();
        blocks
            .iter()
            .flat_map(|b| scanner.scan(b, headings.contains(&b.index())))
            .map(|m| (m.ref_type, m.raw_text, m.target))
            .collect()
    }

    fn mentions(text: &str) -> Vec<(ReferenceType, String, ReferenceTarget)> {
        mentions_with(text, &DocMapConfig::default())
    }

    fn section(key: &str) -> ReferenceTarget {
        ReferenceTarget::Section { key: key.to_string() }
    }

    #[test]
    fn test_section_and_article_refs() {
        let found = mentions("subject to Section 6.02(a) and Article III hereof.");
        assert_eq!(
            found,
            vec![
                (ReferenceType::SectionRef, "Section 6.02(a)".to_string(), section("SECTION:6.2(a)")),
                (ReferenceType::SectionRef, "Article III".to_string(), section("ARTICLE:3")),
            ]
        );
    }

    #[test]
    fn test_section_lists() {
        let found = mentions("as set forth in Sections 2.01, 2.02 and 2.03(b).");
        let keys: Vec<_> = found.iter().map(|(_, raw, _)| raw.as_str()).collect();
        assert_eq!(keys, vec!["Sections 2.01", "2.02", "2.03(b)"]);
        assert_eq!(found[2].2, section("SECTION:2.3(b)"));
    }

    #[test]
    fn test_heading_label_is_not_a_reference() {
        let found = mentions("Section 2.01 Payments\n\nSee Section 2.01 above.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, "Section 2.01");
    }

    #[test]
    fn test_relative_yields_to_numbered() {
        let found = mentions("Except as provided in this Section 6.02, and in this Article, nothing applies.");
        assert_eq!(
            found,
            vec![
                (ReferenceType::SectionRef, "Section 6.02".to_string(), section("SECTION:6.2")),
                (
                    ReferenceType::SectionRef,
                    "this Article".to_string(),
                    ReferenceTarget::Relative { kind: SectionKind::Article }
                ),
            ]
        );
    }

    #[test]
    fn test_quoted_terms_skip_definition_site() {
        let text = "\"Borrower\" means Acme.\n\nThe \"Borrower\" shall pay. The \"Lender\" may not.";
        let found = mentions(text);
        assert_eq!(
            found,
            vec![(
                ReferenceType::DefinitionRef,
                "\"Borrower\"".to_string(),
                ReferenceTarget::Term { term: "borrower".to_string() }
            )]
        );
    }

    #[test]
    fn test_attachments() {
        let found = mentions("in the form of Exhibit A, listed on Schedule 5 and Annex II.");
        let types: Vec<_> = found.iter().map(|(t, raw, _)| (*t, raw.as_str())).collect();
        assert_eq!(
            types,
            vec![
                (ReferenceType::ExhibitRef, "Exhibit A"),
                (ReferenceType::ScheduleRef, "Schedule 5"),
                (ReferenceType::ExhibitRef, "Annex II"),
            ]
        );
        assert_eq!(found[1].2, ReferenceTarget::Attachment { key: "SCHEDULE:5".to_string() });
    }

    #[test]
    fn test_external_documents() {
        let found = mentions("pursuant to Section 5.1 of the Security Agreement and the Intercreditor Agreement.");
        assert_eq!(
            found,
            vec![
                (
                    ReferenceType::ExternalDocRef,
                    "Section 5.1 of the Security Agreement".to_string(),
                    ReferenceTarget::External {
                        document: "Security Agreement".to_string(),
                        section: Some("SECTION:5.1".to_string())
                    }
                ),
                (
                    ReferenceType::ExternalDocRef,
                    "the Intercreditor Agreement".to_string(),
                    ReferenceTarget::External {
                        document: "Intercreditor Agreement".to_string(),
                        section: None
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_own_title_is_not_external() {
        let found = mentions("CREDIT AGREEMENT\n\nSee Section 2.01 of the Credit Agreement and this Agreement.");
        assert_eq!(found, vec![(ReferenceType::SectionRef, "Section 2.01".to_string(), section("SECTION:2.1"))]);
    }

    #[test]
    fn test_bare_terms_are_opt_in() {
        let text = "\"Maturity Date\" means March 31.\n\nPay on the Maturity Date.";
        assert!(mentions(text).is_empty());

        let mut config = DocMapConfig::default();
        config.reference_patterns.push(ReferencePattern::BareTerm);
        let found = mentions_with(text, &config);
        assert_eq!(
            found,
            vec![(
                ReferenceType::DefinitionRef,
                "Maturity Date".to_string(),
                ReferenceTarget::Term { term: "maturity date".to_string() }
            )]
        );
    }
}
