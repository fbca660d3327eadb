//! Section tree construction from anchored blocks.
//!
//! Headings are detected at block start, title-less headings take their
//! title from a following caption block, seeds (table of contents or
//! caller outline) confirm or add headings, and finally an index-based
//! stack links every heading to the most recent heading of strictly lower
//! level.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::DocMapConfig;
use crate::patterns::{is_contents_title, is_toc_line, match_heading, HeadingMatch};
use crate::section::{SectionId, SectionKind, SectionNode, SectionSource, SectionTree};
use crate::segmenter::Block;
use crate::toc::{toc_seeds, SeedSection, SourcedSeed};
use crate::utils::normalize_term;
use crate::{ProcessError, ProcessResult};

/// Output of structure extraction.
#[derive(Debug, Clone)]
pub(crate) struct Structure {
    pub sections: SectionTree,
    /// Innermost section of every block
    pub block_sections: Vec<SectionId>,
    /// Leading caption, e.g. "CREDIT AGREEMENT"
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
struct Candidate {
    heading: HeadingMatch,
    source: SectionSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockRole {
    Body,
    Heading,
    /// Table-of-contents line or heading
    Toc,
    /// Caption folded into the previous heading's title
    Absorbed,
}

/// Builds a [`SectionTree`] for a list of blocks.
pub(crate) struct StructureExtractor<'c> {
    config: &'c DocMapConfig,
}

impl<'c> StructureExtractor<'c> {
    pub fn new(config: &'c DocMapConfig) -> Self {
        Self { config }
    }

    /// Extract the section tree. `blocks` must not be empty.
    pub fn extract(&self, document_id: &str, blocks: &[Block], seeds: &[SeedSection]) -> ProcessResult<Structure> {
        let mut result = ProcessResult::ok(());

        let (mut candidates, mut roles) = self.detect(blocks);
        self.absorb_captions(&mut candidates, &mut roles);

        let mut sourced = Vec::new();
        if self.config.use_toc {
            sourced.extend(toc_seeds(blocks, self.config).into_iter().map(|seed| SourcedSeed {
                seed,
                source: SectionSource::Toc,
            }));
        }
        sourced.extend(seeds.iter().cloned().map(|seed| SourcedSeed {
            seed,
            source: SectionSource::Seeded,
        }));
        for seed in sourced {
            self.place_seed(blocks, &mut candidates, &mut roles, seed, &mut result);
        }

        let heading_count = candidates.iter().filter(|c| c.is_some()).count();
        if heading_count == 0 {
            warn!(document_id, "no headings found; using a single root section");
            result.add_warning("No section headings found in document");
        }

        let (nodes, block_sections) = self.link(blocks, &candidates, &mut result);
        let title = document_title(&nodes);
        let mut nodes = nodes;
        if let Some(title) = &title {
            nodes[0].title = title.clone();
        }
        debug!(document_id, headings = heading_count, "structure extracted");

        result.map(|()| Structure {
            sections: SectionTree::from_nodes(nodes),
            block_sections,
            title,
        })
    }

    fn detect(&self, blocks: &[Block]) -> (Vec<Option<Candidate>>, Vec<BlockRole>) {
        let mut candidates = Vec::with_capacity(blocks.len());
        let mut roles = Vec::with_capacity(blocks.len());
        for block in blocks {
            if block.is_single_line() && is_toc_line(&block.raw_text) {
                candidates.push(None);
                roles.push(BlockRole::Toc);
                continue;
            }
            match match_heading(block.first_line(), block.is_single_line(), self.config) {
                Some(heading) if heading.kind == SectionKind::Caption && is_contents_title(&heading.title) => {
                    candidates.push(None);
                    roles.push(BlockRole::Toc);
                }
                Some(heading) => {
                    candidates.push(Some(Candidate {
                        heading,
                        source: SectionSource::Detected,
                    }));
                    roles.push(BlockRole::Heading);
                }
                None => {
                    candidates.push(None);
                    roles.push(BlockRole::Body);
                }
            }
        }
        (candidates, roles)
    }

    /// "ARTICLE I" followed by "DEFINITIONS": the caption becomes the title.
    fn absorb_captions(&self, candidates: &mut [Option<Candidate>], roles: &mut [BlockRole]) {
        for i in 0..candidates.len().saturating_sub(1) {
            let wants_title = matches!(
                &candidates[i],
                Some(c) if c.heading.kind != SectionKind::Caption && c.heading.title.is_empty()
            );
            if !wants_title {
                continue;
            }
            let caption = match &candidates[i + 1] {
                Some(next) if next.heading.kind == SectionKind::Caption => next.heading.title.clone(),
                _ => continue,
            };
            if let Some(current) = candidates[i].as_mut() {
                current.heading.title = caption;
            }
            candidates[i + 1] = None;
            roles[i + 1] = BlockRole::Absorbed;
        }
    }

    fn place_seed(
        &self,
        blocks: &[Block],
        candidates: &mut [Option<Candidate>],
        roles: &mut [BlockRole],
        sourced: SourcedSeed,
        result: &mut ProcessResult<()>,
    ) {
        let SourcedSeed { seed, source } = sourced;
        let seed_heading = seed
            .label
            .as_deref()
            .and_then(|_| match_heading(&seed.heading_text(), true, self.config))
            .filter(|h| h.kind != SectionKind::Caption);
        let seed_title = normalize_term(&seed.title);
        let multi_page = blocks.last().map(|b| b.page() > 1).unwrap_or(false);

        // Exact title match against a detected heading: the seed wins.
        let by_title = closest(blocks, seed.page, candidates.iter().enumerate().filter_map(|(i, c)| {
            c.as_ref()
                .filter(|c| !seed_title.is_empty() && normalize_term(&c.heading.title) == seed_title)
                .map(|_| i)
        }));
        if let Some(i) = by_title {
            if let Some(candidate) = candidates[i].as_mut() {
                if let Some(found) = &seed_heading {
                    candidate.heading.kind = found.kind;
                    candidate.heading.key = found.key.clone();
                    candidate.heading.label = found.label.clone();
                }
                candidate.heading.title = seed.title.clone();
                if let Some(level) = seed.level.or_else(|| seed_heading.as_ref().and_then(|h| h.level)) {
                    candidate.heading.level = Some(level.max(1));
                }
                candidate.source = source;
            }
            return;
        }

        // Same key: confirm and fill a missing title.
        if let Some(found) = &seed_heading {
            let by_key = closest(blocks, seed.page, candidates.iter().enumerate().filter_map(|(i, c)| {
                c.as_ref().filter(|c| c.heading.key == found.key).map(|_| i)
            }));
            if let Some(i) = by_key {
                if let Some(candidate) = candidates[i].as_mut() {
                    if candidate.heading.title.is_empty() {
                        candidate.heading.title = seed.title.clone();
                    }
                    candidate.source = source;
                }
                return;
            }
        }

        // Fill a gap: a body block that opens with the seed's heading text.
        let radius = self.config.toc_search_radius;
        let phrases: Vec<String> = [Some(seed.heading_text()), seed.label.clone(), Some(seed.title.clone())]
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect();
        let body = closest(blocks, seed.page, (0..blocks.len()).filter(|&i| {
            roles[i] == BlockRole::Body
                && within_radius(blocks[i].page(), seed.page, radius, multi_page)
                && phrases.iter().any(|p| starts_with_phrase(blocks[i].first_line(), p))
        }));

        match body {
            Some(i) => {
                let heading = match &seed_heading {
                    Some(found) => HeadingMatch {
                        title: seed.title.clone(),
                        level: seed.level.or(found.level).map(|l| l.max(1)),
                        ..found.clone()
                    },
                    None => HeadingMatch {
                        kind: SectionKind::Caption,
                        key: format!("CAPTION:{}", seed_title),
                        label: String::new(),
                        title: seed.title.clone(),
                        level: seed.level.map(|l| l.max(1)),
                    },
                };
                candidates[i] = Some(Candidate { heading, source });
                roles[i] = BlockRole::Heading;
            }
            None => {
                warn!(title = %seed.title, page = ?seed.page, "seed section could not be anchored");
                result.add_error(ProcessError::UnanchoredSeed {
                    title: seed.heading_text(),
                    page: seed.page,
                });
            }
        }
    }

    /// Link headings into the arena with an index-based stack.
    fn link(
        &self,
        blocks: &[Block],
        candidates: &[Option<Candidate>],
        result: &mut ProcessResult<()>,
    ) -> (Vec<SectionNode>, Vec<SectionId>) {
        let last = blocks.len().saturating_sub(1);
        let block_anchor = |i: usize| blocks[i].anchor.clone();

        let mut nodes = vec![SectionNode {
            id: SectionId::ROOT,
            key: "ROOT".to_string(),
            kind: SectionKind::Root,
            label: String::new(),
            title: String::new(),
            level: 0,
            start_anchor: block_anchor(0),
            end_anchor: block_anchor(last),
            parent: None,
            children: Vec::new(),
            source: SectionSource::Root,
        }];
        let mut ends = vec![last];
        let mut stack = vec![SectionId::ROOT];
        let mut seen_keys = HashSet::new();
        let mut block_sections = Vec::with_capacity(blocks.len());

        for (b, candidate) in candidates.iter().enumerate() {
            if let Some(Candidate { heading, source }) = candidate {
                let top = stack.last().copied().unwrap_or(SectionId::ROOT);
                let level = match heading.level {
                    Some(level) => level.max(1),
                    None if nodes[top.0].kind == SectionKind::Caption => nodes[top.0].level,
                    None => nodes[top.0].level.saturating_add(1),
                };

                // Pop until the top has a strictly lower level; popped nodes end here.
                while let Some(&open) = stack.last() {
                    if nodes[open.0].level < level {
                        break;
                    }
                    stack.pop();
                    ends[open.0] = b - 1;
                }
                let parent = stack.last().copied().unwrap_or(SectionId::ROOT);

                let parent_level = nodes[parent.0].level;
                if parent != SectionId::ROOT && level > parent_level.saturating_add(2) {
                    result.add_error(ProcessError::NestingSkip {
                        label: heading.label.clone(),
                        level,
                        parent_level,
                        location: block_anchor(b),
                    });
                }
                if heading.kind != SectionKind::Caption && !seen_keys.insert(heading.key.clone()) {
                    result.add_error(ProcessError::DuplicateSection {
                        key: heading.key.clone(),
                        location: block_anchor(b),
                    });
                }

                let id = SectionId(nodes.len());
                nodes[parent.0].children.push(id);
                nodes.push(SectionNode {
                    id,
                    key: heading.key.clone(),
                    kind: heading.kind,
                    label: heading.label.clone(),
                    title: heading.title.clone(),
                    level,
                    start_anchor: block_anchor(b),
                    end_anchor: block_anchor(b),
                    parent: Some(parent),
                    children: Vec::new(),
                    source: *source,
                });
                ends.push(last);
                stack.push(id);
            }
            block_sections.push(stack.last().copied().unwrap_or(SectionId::ROOT));
        }

        for (node, end) in nodes.iter_mut().zip(&ends) {
            node.end_anchor = block_anchor(*end);
        }
        (nodes, block_sections)
    }
}

/// The leading top-level caption, if it comes before any numbered heading.
fn document_title(nodes: &[SectionNode]) -> Option<String> {
    nodes
        .iter()
        .skip(1)
        .take_while(|node| node.kind == SectionKind::Caption)
        .find(|node| node.level == 1)
        .map(|node| node.title.clone())
}

fn within_radius(page: u32, target: Option<u32>, radius: u32, multi_page: bool) -> bool {
    match target {
        Some(target) if multi_page => page.abs_diff(target) <= radius,
        _ => true,
    }
}

/// Pick the index whose block page is closest to `page`, earliest on ties.
fn closest(blocks: &[Block], page: Option<u32>, indices: impl Iterator<Item = usize>) -> Option<usize> {
    indices.min_by_key(|&i| (page.map(|p| blocks[i].page().abs_diff(p)).unwrap_or(0), i))
}

/// Whether `line` opens with `phrase` (ASCII case-insensitive) at a word boundary.
fn starts_with_phrase(line: &str, phrase: &str) -> bool {
    let line = line.trim_start();
    let phrase = phrase.trim();
    if phrase.is_empty() || line.len() < phrase.len() || !line.is_char_boundary(phrase.len()) {
        return false;
    }
    if !line[..phrase.len()].eq_ignore_ascii_case(phrase) {
        return false;
    }
    line[phrase.len()..]
        .chars()
        .next()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::Segmenter;

    fn extract(text: &str, seeds: &[SeedSection]) -> ProcessResult<Structure> {
        let config = DocMapConfig::default();
        let blocks = Segmenter::new(&config).segment("doc", text);
        StructureExtractor::new(&config).extract("doc", &blocks, seeds)
    }

    fn headings(structure: &Structure) -> Vec<(String, u8, Option<usize>)> {
        structure
            .sections
            .iter()
            .skip(1)
            .map(|n| (n.heading(), n.level, n.parent.map(|p| p.index())))
            .collect()
    }

    #[test]
    fn test_no_headings_single_root() {
        let result = extract("Just a paragraph.\n\nAnother one.", &[]);
        assert_eq!(result.value.sections.len(), 1);
        assert_eq!(result.value.sections.root().end_block(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_article_section_nesting() {
        let text = "ARTICLE I\nDEFINITIONS\n\nTerms.\n\nARTICLE II\nCOVENANTS\n\nSection 2.01 Payment\nPay.\n\nSection 2.02 Reporting\nReport.";
        let result = extract(text, &[]);
        assert!(!result.has_errors());
        assert_eq!(
            headings(&result.value),
            vec![
                ("ARTICLE I DEFINITIONS".to_string(), 1, Some(0)),
                ("ARTICLE II COVENANTS".to_string(), 1, Some(0)),
                ("Section 2.01 Payment".to_string(), 3, Some(2)),
                ("Section 2.02 Reporting".to_string(), 3, Some(2)),
            ]
        );

        let sections = &result.value.sections;
        let article_one = sections.get(SectionId(1)).unwrap();
        assert_eq!((article_one.start_block(), article_one.end_block()), (0, 2));
        let section_one = sections.get(SectionId(3)).unwrap();
        assert_eq!((section_one.start_block(), section_one.end_block()), (5, 6));
        assert_eq!(sections.root().end_block(), 8);
        assert_eq!(result.value.block_sections[6], SectionId(3));
    }

    #[test]
    fn test_document_title_from_leading_caption() {
        let result = extract("CREDIT AGREEMENT\n\nARTICLE I\nDEFINITIONS", &[]);
        assert_eq!(result.value.title.as_deref(), Some("CREDIT AGREEMENT"));
        assert_eq!(result.value.sections.root().title, "CREDIT AGREEMENT");
    }

    #[test]
    fn test_toc_lines_become_seeds_not_headings() {
        let text = "TABLE OF CONTENTS\n\nSection 1.01 Defined Terms ..... 2\n\n[PAGE 1]\n\nSection 1.01 DEFINED TERMS\nWords.";
        let result = extract(text, &[]);
        let structure = &result.value;
        let keys: Vec<_> = structure.sections.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["ROOT", "SECTION:1.1"]);
        assert_eq!(structure.title, None);
        let section = structure.sections.find_by_key("SECTION:1.1")[0];
        let node = structure.sections.get(section).unwrap();
        assert_eq!(node.source, SectionSource::Toc);
        assert_eq!(node.title, "Defined Terms");
        assert!(!result.has_errors());
    }

    #[test]
    fn test_seed_fills_gap_in_body() {
        let seeds = vec![SeedSection::new("Events of Default").with_level(1)];
        let result = extract("Preamble text.\n\nEvents of Default. If any of the following occur.", &seeds);
        let structure = &result.value;
        assert_eq!(structure.sections.len(), 2);
        let node = structure.sections.get(SectionId(1)).unwrap();
        assert_eq!(node.source, SectionSource::Seeded);
        assert_eq!(node.start_block(), 1);
        assert_eq!(node.title, "Events of Default");
    }

    #[test]
    fn test_unanchored_seed_is_reported() {
        let seeds = vec![SeedSection::new("Guarantee").with_label("Section 9.01").with_page(30)];
        let result = extract("Section 1.01 Terms\nText.", &seeds);
        assert!(matches!(
            result.errors.as_slice(),
            [ProcessError::UnanchoredSeed { page: Some(30), .. }]
        ));
    }

    #[test]
    fn test_duplicate_keys_are_reported() {
        let result = extract("Section 1.01 Terms\n\nSection 1.01 Terms Again", &[]);
        assert_eq!(result.value.sections.len(), 3);
        assert!(matches!(result.errors.as_slice(), [ProcessError::DuplicateSection { .. }]));
    }

    #[test]
    fn test_caption_nests_under_open_section() {
        let text = "Section 2.01 Covenants\nBody.\n\nFinancial Tests\n\nMore body.\n\nSection 2.02 Reports";
        let result = extract(text, &[]);
        assert_eq!(
            headings(&result.value),
            vec![
                ("Section 2.01 Covenants".to_string(), 3, Some(0)),
                ("Financial Tests".to_string(), 4, Some(1)),
                ("Section 2.02 Reports".to_string(), 3, Some(0)),
            ]
        );
    }

    #[test]
    fn test_starts_with_phrase() {
        assert!(starts_with_phrase("Events of Default. If", "events of default"));
        assert!(!starts_with_phrase("Eventsful", "Events"));
        assert!(starts_with_phrase("Events", "Events"));
    }
}
