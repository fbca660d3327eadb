//! Defined terms and their scopes.
//!
//! Definitions are found with these patterns:
//! - `"Term" means ...` / `"Term" shall mean ...` - quoted term and verb
//! - `ABC Corp. (the "Term")` - parenthetical definition (opt-in)
//! - `Term means ...` - short unquoted term at block start (opt-in)
//!
//! A definition is document-wide when it sits directly under the root or
//! anywhere inside a definitions article; otherwise its scope is the
//! innermost enclosing section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DefinitionPattern, DefinitionTieBreak, DocMapConfig};
use crate::patterns::{PARENTHETICAL_DEFINITION, QUOTED_MEANS, UNQUOTED_MEANS};
use crate::section::{SectionId, SectionTree};
use crate::segmenter::Block;
use crate::utils::normalize_term;
use crate::{Anchor, DocMapError, DocMapResult};

/// The type of formal definition pattern detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionType {
    /// Pattern: "Term" means ...
    QuotedMeans,
    /// Pattern: ABC Corp (the "Term")
    Parenthetical,
    /// Pattern: Term means ...
    Unquoted,
}

impl DefinitionType {
    fn confidence(self) -> f64 {
        match self {
            DefinitionType::QuotedMeans => 0.95,
            DefinitionType::Parenthetical => 0.90,
            DefinitionType::Unquoted => 0.75,
        }
    }
}

/// A defined term and where its definition lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionEntry {
    /// Term as written, case preserved
    pub term: String,
    /// Span of the definition; the whole block unless the block holds several
    pub definition_anchor: Anchor,
    /// Span of the quoted term itself
    pub term_anchor: Anchor,
    /// Section the definition is limited to; `None` is document-wide
    pub scope: Option<SectionId>,
    /// Definition body (after "means" for the verb patterns)
    pub text: String,
    pub definition_type: DefinitionType,
    pub confidence: f64,
}

/// Where a definition query originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionScope {
    /// No origin; equally valid candidates are a tie
    Anywhere,
    /// Document level; document-wide entries win
    Document,
    /// From inside a section; the narrowest applicable scope wins
    Within(SectionId),
}

/// Result of a definition lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionHit<'m> {
    pub entry: &'m DefinitionEntry,
    /// Other definitions of the same term, in document order
    pub alternatives: Vec<&'m DefinitionEntry>,
    /// The entry was picked by the first-encountered tie-break
    pub tie_broken: bool,
}

/// All definitions of a document, in document order, with a term index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionTable {
    entries: Vec<DefinitionEntry>,
    by_term: BTreeMap<String, Vec<usize>>,
}

impl DefinitionTable {
    pub(crate) fn from_entries(entries: Vec<DefinitionEntry>) -> Self {
        let mut by_term: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_term.entry(normalize_term(&entry.term)).or_default().push(i);
        }
        Self { entries, by_term }
    }

    pub fn entries(&self) -> &[DefinitionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized terms, sorted.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.by_term.keys().map(String::as_str)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.by_term.contains_key(&normalize_term(term))
    }

    /// Every definition of a term, in document order.
    pub fn candidates(&self, term: &str) -> Vec<&DefinitionEntry> {
        self.by_term
            .get(&normalize_term(term))
            .map(|ids| ids.iter().filter_map(|&i| self.entries.get(i)).collect())
            .unwrap_or_default()
    }

    /// Look up a term from an origin.
    pub fn lookup<'m>(
        &'m self,
        term: &str,
        origin: DefinitionScope,
        sections: &SectionTree,
        tie_break: DefinitionTieBreak,
    ) -> DocMapResult<DefinitionHit<'m>> {
        let all = self.candidates(term);
        match all.as_slice() {
            [] => {
                return Err(DocMapError::UnknownTerm {
                    term: term.to_string(),
                })
            }
            [only] => return Ok(hit(*only, &all, false)),
            _ => {}
        }

        match origin {
            DefinitionScope::Anywhere => break_tie(term, &all, &all, tie_break),
            DefinitionScope::Document => document_level(term, &all, tie_break),
            DefinitionScope::Within(section) => {
                let applicable: Vec<(usize, &DefinitionEntry)> = all
                    .iter()
                    .filter(|e| e.scope.map(|s| sections.is_within(section, s)).unwrap_or(true))
                    .map(|e| (e.scope.map(|s| sections.depth(s)).unwrap_or(0), *e))
                    .collect();
                let Some(best) = applicable.iter().map(|(depth, _)| *depth).max() else {
                    // Nothing is in force here; answer as the document would.
                    return document_level(term, &all, tie_break);
                };
                let tier: Vec<&DefinitionEntry> = applicable
                    .iter()
                    .filter(|(depth, _)| *depth == best)
                    .map(|(_, e)| *e)
                    .collect();
                match tier.as_slice() {
                    [narrowest] => Ok(hit(*narrowest, &all, false)),
                    _ => break_tie(term, &tier, &all, tie_break),
                }
            }
        }
    }
}

fn hit<'m>(entry: &'m DefinitionEntry, all: &[&'m DefinitionEntry], tie_broken: bool) -> DefinitionHit<'m> {
    DefinitionHit {
        entry,
        alternatives: all.iter().copied().filter(|e| !std::ptr::eq(*e, entry)).collect(),
        tie_broken,
    }
}

fn document_level<'m>(
    term: &str,
    all: &[&'m DefinitionEntry],
    tie_break: DefinitionTieBreak,
) -> DocMapResult<DefinitionHit<'m>> {
    let document_wide: Vec<&DefinitionEntry> = all.iter().copied().filter(|e| e.scope.is_none()).collect();
    match document_wide.as_slice() {
        [only] => Ok(hit(*only, all, false)),
        [] => break_tie(term, all, all, tie_break),
        _ => break_tie(term, &document_wide, all, tie_break),
    }
}

fn break_tie<'m>(
    term: &str,
    tier: &[&'m DefinitionEntry],
    all: &[&'m DefinitionEntry],
    tie_break: DefinitionTieBreak,
) -> DocMapResult<DefinitionHit<'m>> {
    match (tie_break, tier.first()) {
        (DefinitionTieBreak::FirstEncountered, Some(first)) => Ok(hit(*first, all, true)),
        _ => Err(DocMapError::AmbiguousDefinition {
            term: tier.first().map(|e| e.term.clone()).unwrap_or_else(|| term.to_string()),
            candidates: tier.iter().map(|e| e.definition_anchor.clone()).collect(),
        }),
    }
}

/// Finds definitions in blocks and assigns their scopes.
pub(crate) struct DefinitionExtractor<'c> {
    config: &'c DocMapConfig,
}

impl<'c> DefinitionExtractor<'c> {
    pub fn new(config: &'c DocMapConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, blocks: &[Block], sections: &SectionTree, block_sections: &[SectionId]) -> DefinitionTable {
        let mut entries = Vec::new();
        for block in blocks {
            let scope = block_sections
                .get(block.index())
                .and_then(|&innermost| self.scope_for(innermost, sections));
            let found = self.extract_block(block);
            entries.extend(found.into_iter().map(|entry| DefinitionEntry { scope, ..entry }));
        }
        debug!(definitions = entries.len(), "definitions extracted");
        DefinitionTable::from_entries(entries)
    }

    fn scope_for(&self, innermost: SectionId, sections: &SectionTree) -> Option<SectionId> {
        if innermost == SectionId::ROOT {
            return None;
        }
        let marker = self.config.definitions_section_marker.to_lowercase();
        let in_definitions = !marker.is_empty()
            && sections
                .get(innermost)
                .into_iter()
                .chain(sections.ancestors(innermost))
                .any(|node| node.title.to_lowercase().contains(&marker) || node.label.to_lowercase().contains(&marker));
        if in_definitions {
            None
        } else {
            Some(innermost)
        }
    }

    fn extract_block(&self, block: &Block) -> Vec<DefinitionEntry> {
        let text = block.raw_text.as_str();
        let mut found = Vec::new();

        // Pattern 1: "Term" means ...
        if self.config.has_definition(DefinitionPattern::QuotedMeans) {
            let matches: Vec<_> = QUOTED_MEANS.captures_iter(text).collect();
            let several = matches.len() > 1;
            for (i, caps) in matches.iter().enumerate() {
                let (Some(whole), Some(term)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let segment_end = matches
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map(|next| next.start())
                    .unwrap_or(text.len());
                let segment_end = whole.start() + text[whole.start()..segment_end].trim_end().len();
                let definition_anchor = if several {
                    narrow_or_block(block, whole.start(), segment_end)
                } else {
                    block.anchor.clone()
                };
                let body_start = whole.end().min(segment_end);
                found.push(self.entry(
                    block,
                    term.as_str(),
                    whole.start(),
                    closing_quote_end(text, term.end()),
                    definition_anchor,
                    text[body_start..segment_end].trim(),
                    DefinitionType::QuotedMeans,
                ));
            }
        }

        // Pattern 2: ABC Corp (the "Term")
        if self.config.has_definition(DefinitionPattern::Parenthetical) {
            for caps in PARENTHETICAL_DEFINITION.captures_iter(text) {
                let (Some(whole), Some(term)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let normalized = normalize_term(term.as_str());
                if found.iter().any(|e: &DefinitionEntry| normalize_term(&e.term) == normalized) {
                    continue;
                }
                let sentence_start = text[..whole.start()]
                    .rfind(|c: char| matches!(c, '.' | ';' | '\n'))
                    .map(|i| i + 1)
                    .unwrap_or(0);
                found.push(self.entry(
                    block,
                    term.as_str(),
                    whole.start(),
                    whole.end(),
                    block.anchor.clone(),
                    text[sentence_start..whole.start()].trim(),
                    DefinitionType::Parenthetical,
                ));
            }
        }

        // Pattern 3: Term means ...
        if found.is_empty() && self.config.has_definition(DefinitionPattern::Unquoted) {
            if let Some(caps) = UNQUOTED_MEANS.captures(text) {
                if let (Some(term), Some(body)) = (caps.get(1), caps.get(2)) {
                    found.push(self.entry(
                        block,
                        term.as_str(),
                        term.start(),
                        term.end(),
                        block.anchor.clone(),
                        body.as_str().trim(),
                        DefinitionType::Unquoted,
                    ));
                }
            }
        }

        found
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        block: &Block,
        term: &str,
        term_start: usize,
        term_end: usize,
        definition_anchor: Anchor,
        text: &str,
        definition_type: DefinitionType,
    ) -> DefinitionEntry {
        DefinitionEntry {
            term: term.trim().to_string(),
            term_anchor: narrow_or_block(block, term_start, term_end),
            definition_anchor,
            scope: None,
            text: text.to_string(),
            definition_type,
            confidence: definition_type.confidence(),
        }
    }
}

fn narrow_or_block(block: &Block, start: usize, end: usize) -> Anchor {
    block.anchor.narrow(start, end).unwrap_or_else(|_| block.anchor.clone())
}

/// Byte offset just past the closing quote that follows a term.
fn closing_quote_end(text: &str, term_end: usize) -> usize {
    text[term_end..]
        .chars()
        .next()
        .map(|c| term_end + c.len_utf8())
        .unwrap_or(term_end)
}
