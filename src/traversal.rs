//! Stateless read-only queries over a [`DocumentMap`].
//!
//! Every function takes the map by shared reference; maps can be queried
//! from many threads at once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::definitions::{DefinitionEntry, DefinitionScope};
use crate::linker::ReferenceLinker;
use crate::map::DocumentMap;
use crate::reference::{CrossReference, Mention, ReferenceScanner, ReferenceTarget, ReferenceType};
use crate::section::SectionId;
use crate::utils::{collapse_whitespace, find_word, normalize_term, truncate_chars, word_tokens};
use crate::{Anchor, DocMapError, DocMapResult, Span};

const SUMMARY_CHARS: usize = 320;
const KEY_EVENT_CHARS: usize = 220;
const MAX_KEY_EVENTS: usize = 5;
/// Larger than any overlap plus bonus, so match tiers never interleave.
const TIER_WEIGHT: f64 = 10.0;
const DEFINITION_BONUS: f64 = 0.5;

/// Part of a map searched by [`search_in_doc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    Document,
    /// A section and its descendants
    Section(SectionId),
    /// Blocks holding definitions
    Definitions,
}

/// How a search hit matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The query appears verbatim as whole words
    Exact,
    /// The query appears as whole words ignoring case and line breaks
    Normalized,
    /// Only some query words appear
    Overlap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched phrase, or the whole block for overlap hits
    pub anchor: Anchor,
    pub snippet: String,
    pub score: f64,
    pub match_kind: MatchKind,
    /// Innermost section of the hit
    pub section: SectionId,
}

/// Search one map. Exact phrase hits rank above normalized hits, which
/// rank above token overlap. Phrases only match at word boundaries. Within
/// a tier, token overlap and a bonus for the block defining the queried
/// term decide the order; equal scores keep document order.
pub fn search_in_doc(map: &DocumentMap, query: &str, scope: SearchScope) -> DocMapResult<Vec<SearchHit>> {
    let phrase = collapse_whitespace(query);
    if phrase.is_empty() {
        return Ok(Vec::new());
    }
    let config = map.config();
    let query_tokens: HashSet<String> = word_tokens(&phrase)
        .into_iter()
        .filter(|t| !config.is_stop_word(t))
        .collect();
    let normalized_query = normalize_term(&phrase);

    let candidates: Vec<usize> = match scope {
        SearchScope::Document => (0..map.blocks().len()).collect(),
        SearchScope::Section(id) => {
            let node = map.section(id)?;
            (node.start_block()..=node.end_block()).collect()
        }
        SearchScope::Definitions => {
            let mut blocks: Vec<usize> = map
                .definitions()
                .entries()
                .iter()
                .map(|e| e.definition_anchor.block_index())
                .collect();
            blocks.sort_unstable();
            blocks.dedup();
            blocks
        }
    };

    let mut hits = Vec::new();
    for index in candidates {
        let Some(block) = map.block(index) else { continue };
        let text = block.raw_text.as_str();

        let overlap = if query_tokens.is_empty() {
            0.0
        } else {
            let block_tokens: HashSet<String> = word_tokens(text).into_iter().collect();
            query_tokens.intersection(&block_tokens).count() as f64 / query_tokens.len() as f64
        };

        // Line breaks become spaces without moving any byte offset.
        let flattened = text.replace('\n', " ");
        let (kind, found_at) = if let Some(at) = find_word(&flattened, &phrase, false) {
            (MatchKind::Exact, Some(at))
        } else if let Some(at) = find_word(&flattened, &phrase, true) {
            (MatchKind::Normalized, Some(at))
        } else if overlap > 0.0 {
            (MatchKind::Overlap, None)
        } else {
            continue;
        };
        let tier = match kind {
            MatchKind::Exact => 2.0,
            MatchKind::Normalized => 1.0,
            MatchKind::Overlap => 0.0,
        };
        let mut score = tier * TIER_WEIGHT + overlap;

        let defines_query = map
            .definitions()
            .entries()
            .iter()
            .any(|e| e.definition_anchor.block_index() == index && normalize_term(&e.term) == normalized_query);
        if defines_query {
            score += DEFINITION_BONUS;
        }

        let anchor = match found_at {
            Some(at) => block.anchor.narrow(at, at + phrase.len())?,
            None => block.anchor.clone(),
        };
        hits.push(SearchHit {
            snippet: snippet(text, found_at.unwrap_or(0), config.snippet_chars),
            anchor,
            score,
            match_kind: kind,
            section: map.section_of_block(index),
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.anchor.block_index().cmp(&b.anchor.block_index()))
            .then_with(|| a.anchor.char_start().cmp(&b.anchor.char_start()))
    });
    Ok(hits)
}

/// Window of about `width` characters around a byte offset, on one line.
fn snippet(text: &str, at: usize, width: usize) -> String {
    let before = text[..at.min(text.len())].chars().count();
    let skip = before.saturating_sub(width / 4);
    let window: String = text.chars().skip(skip).take(width).collect();
    window.replace('\n', " ")
}

/// Text of an anchor or an anchor range.
///
/// A range reads from the start anchor's offset to the end anchor's
/// offset; blocks are joined with a blank line.
pub fn read_span(map: &DocumentMap, span: impl Into<Span>) -> DocMapResult<String> {
    match span.into() {
        Span::Anchor(anchor) => {
            let text = block_text(map, &anchor)?;
            Ok(text[anchor.char_start()..anchor.char_end()].to_string())
        }
        Span::Range(range) => {
            let (start, end) = (&range.start, &range.end);
            if start.block_index() > end.block_index() {
                return Err(DocMapError::InvalidAnchor {
                    reason: format!("range start {} is after its end {}", start, end),
                });
            }
            let first = block_text(map, start)?;
            let last = block_text(map, end)?;
            if start.block_index() == end.block_index() {
                if start.char_start() > end.char_end() {
                    return Err(DocMapError::InvalidAnchor {
                        reason: format!("range start {} is after its end {}", start, end),
                    });
                }
                return Ok(first[start.char_start()..end.char_end()].to_string());
            }

            let mut parts = Vec::with_capacity(end.block_index() - start.block_index() + 1);
            parts.push(&first[start.char_start()..]);
            for index in start.block_index() + 1..end.block_index() {
                if let Some(block) = map.block(index) {
                    parts.push(block.raw_text.as_str());
                }
            }
            parts.push(&last[..end.char_end()]);
            Ok(parts.join("\n\n"))
        }
    }
}

fn block_text<'m>(map: &'m DocumentMap, anchor: &Anchor) -> DocMapResult<&'m str> {
    let text = map.block(anchor.block_index()).map(|b| b.raw_text.as_str());
    anchor.check_against(map.document_id(), text)?;
    Ok(text.unwrap_or_default())
}

/// Text of one page; blocks are joined with a blank line.
pub fn read_page(map: &DocumentMap, page: u32) -> DocMapResult<String> {
    let pages = map.page_count();
    if page == 0 || page > pages {
        return Err(DocMapError::PageOutOfRange { page, pages });
    }
    Ok(map
        .blocks()
        .iter()
        .filter(|b| b.page() == page)
        .map(|b| b.raw_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// The block behind an anchor together with its section path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorView {
    pub anchor: Anchor,
    /// Text covered by the anchor
    pub text: String,
    /// Text of the whole block
    pub block_text: String,
    /// Headings from the outermost section down to the innermost
    pub section_path: Vec<String>,
}

pub fn open_at_anchor(map: &DocumentMap, anchor: &Anchor) -> DocMapResult<AnchorView> {
    let text = read_span(map, anchor)?;
    let block_text = block_text(map, anchor)?.to_string();
    let innermost = map.section_of_block(anchor.block_index());

    let mut section_path: Vec<String> = map
        .sections()
        .ancestors(innermost)
        .filter(|node| !node.is_root())
        .map(|node| node.heading())
        .collect();
    section_path.reverse();
    if let Some(node) = map.sections().get(innermost).filter(|node| !node.is_root()) {
        section_path.push(node.heading());
    }

    Ok(AnchorView {
        anchor: anchor.clone(),
        text,
        block_text,
        section_path,
    })
}

/// Target of a reference made in `map`; `None` for unresolved references
/// and for references made in another map. The target of an
/// other-document reference belongs to `reference.resolved_document`.
pub fn follow_reference(map: &DocumentMap, reference: &CrossReference) -> Option<Anchor> {
    if reference.from_anchor.document_id() != map.document_id() {
        return None;
    }
    reference.resolved_anchor.clone()
}

/// Resolve an ad-hoc citation such as "Section 6.02(a)" or "Maturity Date"
/// as if it appeared at `origin`.
///
/// Returns `None` when the text holds no recognizable reference. The
/// returned reference's `from_anchor` is `origin`, or the document start.
pub fn follow_reference_text(map: &DocumentMap, citation: &str, origin: Option<&Anchor>) -> Option<CrossReference> {
    resolve_citation(map, citation, origin, &[])
}

pub(crate) fn resolve_citation(
    map: &DocumentMap,
    citation: &str,
    origin: Option<&Anchor>,
    siblings: &[&DocumentMap],
) -> Option<CrossReference> {
    let citation = collapse_whitespace(citation);
    if citation.is_empty() {
        return None;
    }
    // Out-of-range index so no definition site can collide with it.
    let scratch = crate::segmenter::Block {
        anchor: Anchor::whole_block(map.document_id(), 1, usize::MAX, citation.len()),
        raw_text: citation.clone(),
        line_number: 0,
    };
    let mut own_names = vec![map.document_id().replace(['-', '_'], " ")];
    own_names.extend(map.title().map(str::to_string));
    let scanner = ReferenceScanner::new(map.config(), map.definitions(), own_names);

    let mention = scanner.scan(&scratch, false).into_iter().next().or_else(|| {
        map.definitions().contains(&citation).then(|| Mention {
            block_index: usize::MAX,
            start: 0,
            end: citation.len(),
            ref_type: ReferenceType::DefinitionRef,
            raw_text: citation.clone(),
            target: ReferenceTarget::Term {
                term: normalize_term(&citation),
            },
            confidence: 0.9,
        })
    })?;

    let origin_section = origin
        .map(|a| map.section_of_block(a.block_index()))
        .unwrap_or(SectionId::ROOT);
    let sections = map.sections();
    let block_sections: Vec<SectionId> = Vec::new();
    let linker = ReferenceLinker {
        blocks: &[],
        sections,
        block_sections: &block_sections,
        definitions: map.definitions(),
        siblings,
    };
    let mut reference = linker.link_one(0, mention, origin_section);
    reference.from_anchor = origin.cloned().unwrap_or_else(|| sections.root().start_anchor.clone());
    Some(reference)
}

/// Definition of a term with no origin. Equally specific candidates are
/// decided by the map's tie-break setting.
pub fn read_definition<'m>(map: &'m DocumentMap, term: &str) -> DocMapResult<&'m DefinitionEntry> {
    read_definition_in(map, term, DefinitionScope::Anywhere)
}

/// Definition of a term as seen from a scope.
pub fn read_definition_in<'m>(
    map: &'m DocumentMap,
    term: &str,
    scope: DefinitionScope,
) -> DocMapResult<&'m DefinitionEntry> {
    map.definitions()
        .lookup(term, scope, map.sections(), map.config().tie_break)
        .map(|hit| hit.entry)
}

/// A block of a section that mentions one of the key event tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyEvent {
    pub anchor: Anchor,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionSummary {
    pub section: SectionId,
    pub heading: String,
    /// Opening body text, shortened
    pub summary: String,
    pub key_events: Vec<KeyEvent>,
}

/// Short summary of a section: its opening body text plus the first few
/// blocks that mention a key event token ("default", "covenant", ...).
pub fn summarize_section(map: &DocumentMap, id: SectionId) -> DocMapResult<SectionSummary> {
    let node = map.section(id)?;
    let heading_blocks: HashSet<usize> = map
        .sections()
        .iter()
        .filter(|n| !n.is_root())
        .map(|n| n.start_block())
        .collect();
    let body: Vec<_> = (node.start_block()..=node.end_block())
        .filter(|i| !heading_blocks.contains(i))
        .filter_map(|i| map.block(i))
        .collect();

    let joined = collapse_whitespace(&body.iter().map(|b| b.raw_text.as_str()).collect::<Vec<_>>().join(" "));
    let summary = truncate_chars(&joined, SUMMARY_CHARS).to_string();

    let tokens = &map.config().key_event_tokens;
    let key_events = body
        .iter()
        .filter(|b| {
            let lower = b.raw_text.to_lowercase();
            tokens.iter().any(|t| lower.contains(t.as_str()))
        })
        .take(MAX_KEY_EVENTS)
        .map(|b| KeyEvent {
            anchor: b.anchor.clone(),
            text: truncate_chars(&collapse_whitespace(&b.raw_text), KEY_EVENT_CHARS).to_string(),
        })
        .collect();

    Ok(SectionSummary {
        section: id,
        heading: if node.is_root() {
            map.title().unwrap_or(map.document_id()).to_string()
        } else {
            node.heading()
        },
        summary,
        key_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::build_doc_map;
    use crate::AnchorRange;

    fn sample() -> DocumentMap {
        build_doc_map(
            "doc",
            "Section 1.01 Loans\n\nThe Lenders shall make loans.\nEach loan is due on demand.\n\nSection 1.02 Interest\n\nInterest accrues daily.",
        )
    }

    #[test]
    fn test_read_single_anchor() {
        let map = sample();
        let anchor = map.block(1).unwrap().anchor.narrow(4, 11).unwrap();
        assert_eq!(read_span(&map, &anchor).unwrap(), "Lenders");
    }

    #[test]
    fn test_read_partial_range() {
        let map = sample();
        let start = map.block(1).unwrap().anchor.narrow(30, 57).unwrap();
        let end = map.block(2).unwrap().anchor.narrow(0, 12).unwrap();
        let range = AnchorRange::new(start, end).unwrap();
        assert_eq!(read_span(&map, range).unwrap(), "Each loan is due on demand.\n\nSection 1.02");
    }

    #[test]
    fn test_read_out_of_range() {
        let map = sample();
        let anchor = Anchor::new("doc", 40, 0, 1, None).unwrap();
        assert!(matches!(read_span(&map, anchor), Err(DocMapError::AnchorNotFound { .. })));

        let foreign = Anchor::new("other", 0, 0, 1, None).unwrap();
        assert!(matches!(read_span(&map, foreign), Err(DocMapError::AnchorNotFound { .. })));

        let past_end = Anchor::new("doc", 0, 0, 500, None).unwrap();
        assert!(matches!(read_span(&map, past_end), Err(DocMapError::AnchorNotFound { .. })));
    }

    #[test]
    fn test_search_ranking() {
        let map = sample();
        let hits = search_in_doc(&map, "loans", SearchScope::Document).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].match_kind, MatchKind::Exact);
        assert_eq!(hits[0].anchor.block_index(), 1);
        assert_eq!(read_span(&map, &hits[0].anchor).unwrap(), "loans");
        assert_eq!(hits[1].match_kind, MatchKind::Normalized);
        assert_eq!(hits[1].anchor.block_index(), 0);

        // Equal scores keep document order.
        let hits = search_in_doc(&map, "LOANS", SearchScope::Document).unwrap();
        assert_eq!(hits[0].match_kind, MatchKind::Normalized);
        assert_eq!(hits[0].anchor.block_index(), 0);
        assert_eq!(hits[0].score, hits[1].score);

        assert!(search_in_doc(&map, "   ", SearchScope::Document).unwrap().is_empty());
    }

    #[test]
    fn test_search_exact_outranks_defining_block() {
        let map = build_doc_map("doc", "Each loan is due.\n\n\"LOAN\" means each advance.");
        assert_eq!(map.definitions().entries().len(), 1);

        let hits = search_in_doc(&map, "loan", SearchScope::Document).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].anchor.block_index(), hits[0].match_kind), (0, MatchKind::Exact));
        assert_eq!((hits[1].anchor.block_index(), hits[1].match_kind), (1, MatchKind::Normalized));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_search_ignores_partial_words() {
        let map = build_doc_map("doc", "The loans are due.\n\nEach loan bears interest.");
        let hits = search_in_doc(&map, "loan", SearchScope::Document).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].anchor.block_index(), 1);
        assert_eq!(read_span(&map, &hits[0].anchor).unwrap(), "loan");
    }

    #[test]
    fn test_search_section_scope() {
        let map = sample();
        let second = map.sections().find_by_key("SECTION:1.2")[0];
        let hits = search_in_doc(&map, "interest", SearchScope::Section(second)).unwrap();
        assert!(hits.iter().all(|h| h.anchor.block_index() >= 2));
        assert!(matches!(
            search_in_doc(&map, "interest", SearchScope::Section(SectionId(99))),
            Err(DocMapError::UnknownSection(99))
        ));
    }

    #[test]
    fn test_read_page() {
        let map = build_doc_map("doc", "First page text.\n[PAGE 1]\nSecond page text.\n\nMore.");
        assert_eq!(map.page_count(), 2);
        assert_eq!(read_page(&map, 2).unwrap(), "Second page text.\n\nMore.");
        assert!(matches!(read_page(&map, 3), Err(DocMapError::PageOutOfRange { page: 3, pages: 2 })));
    }

    #[test]
    fn test_open_at_anchor() {
        let map = sample();
        let anchor = map.block(3).unwrap().anchor.clone();
        let view = open_at_anchor(&map, &anchor).unwrap();
        assert_eq!(view.section_path, vec!["Section 1.02 Interest".to_string()]);
        assert_eq!(view.text, "Interest accrues daily.");
    }

    #[test]
    fn test_follow_reference_text() {
        let map = sample();
        let reference = follow_reference_text(&map, "Section 1.02", None).unwrap();
        assert_eq!(reference.resolved_anchor.unwrap().block_index(), 2);

        let missing = follow_reference_text(&map, "Section 9.09", None).unwrap();
        assert!(!missing.is_resolved());

        assert!(follow_reference_text(&map, "nothing to see", None).is_none());
    }

    #[test]
    fn test_summarize_section() {
        let map = sample();
        let first = map.sections().find_by_key("SECTION:1.1")[0];
        let summary = summarize_section(&map, first).unwrap();
        assert_eq!(summary.heading, "Section 1.01 Loans");
        assert_eq!(summary.summary, "The Lenders shall make loans. Each loan is due on demand.");
        assert!(summary.key_events.is_empty());

        let second = map.sections().find_by_key("SECTION:1.2")[0];
        let summary = summarize_section(&map, second).unwrap();
        assert_eq!(summary.key_events.len(), 1);
    }
}
