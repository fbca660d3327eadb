//! The document map: blocks, section tree, definitions and the reference
//! graph of one document, plus the pipeline that builds it.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::config::DocMapConfig;
use crate::definitions::{DefinitionExtractor, DefinitionTable};
use crate::linker::{names_match, ReferenceLinker};
use crate::patterns::is_toc_line;
use crate::reference::{CrossReference, Mention, ReferenceScanner};
use crate::section::{SectionId, SectionNode, SectionTree};
use crate::segmenter::{Block, Segmenter};
use crate::structure::StructureExtractor;
use crate::toc::SeedSection;
use crate::{DocMapError, DocMapResult, ProcessResult};

/// Everything known about one document. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMap {
    document_id: String,
    title: Option<String>,
    blocks: Vec<Block>,
    sections: SectionTree,
    /// Innermost section of every block
    block_sections: Vec<SectionId>,
    definitions: DefinitionTable,
    references: Vec<CrossReference>,
    /// Configuration the map was built with; traversal reads it
    config: DocMapConfig,
}

impl DocumentMap {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Leading caption of the document, e.g. "CREDIT AGREEMENT".
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn config(&self) -> &DocMapConfig {
        &self.config
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Number of pages; at least 1.
    pub fn page_count(&self) -> u32 {
        self.blocks.last().map(Block::page).unwrap_or(1)
    }

    pub fn sections(&self) -> &SectionTree {
        &self.sections
    }

    pub fn section(&self, id: SectionId) -> DocMapResult<&SectionNode> {
        self.sections.get(id).ok_or(DocMapError::UnknownSection(id.index()))
    }

    /// Innermost section containing a block.
    pub fn section_of_block(&self, block_index: usize) -> SectionId {
        self.block_sections.get(block_index).copied().unwrap_or(SectionId::ROOT)
    }

    pub fn definitions(&self) -> &DefinitionTable {
        &self.definitions
    }

    /// Every detected reference, resolved or not, in document order.
    pub fn references(&self) -> &[CrossReference] {
        &self.references
    }

    /// References whose mention lies in a block.
    pub fn references_from(&self, block_index: usize) -> impl Iterator<Item = &CrossReference> {
        self.references
            .iter()
            .filter(move |r| r.from_anchor.block_index() == block_index)
    }

    /// References resolved to a section of this map.
    pub fn references_to(&self, section: SectionId) -> impl Iterator<Item = &CrossReference> {
        self.references
            .iter()
            .filter(move |r| r.resolved_section == Some(section))
    }

    pub fn unresolved_references(&self) -> impl Iterator<Item = &CrossReference> {
        self.references.iter().filter(|r| !r.is_resolved())
    }

    /// Whether a citation name ("Security Agreement") refers to this map.
    pub fn answers_to(&self, name: &str) -> bool {
        names_match(name, &self.document_id, self.title.as_deref())
    }

    pub fn to_json(&self) -> DocMapResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DocMapError::Serialization(e.to_string()))
    }

    pub fn from_json(source: &str) -> DocMapResult<Self> {
        serde_json::from_str(source).map_err(|e| DocMapError::Serialization(e.to_string()))
    }

    pub fn to_ron(&self) -> DocMapResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| DocMapError::Serialization(e.to_string()))
    }

    /// Indented outline of the section tree with block ranges.
    ///
    /// ```text
    /// doc-1 [b0..b6]
    ///   ARTICLE I DEFINITIONS [b0..b2]
    ///   ARTICLE II COVENANTS [b3..b6]
    ///     Section 2.01 Financial Covenants [b5..b6]
    /// ```
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let root = self.sections.root();
        let _ = writeln!(
            out,
            "{} [b{}..b{}]",
            self.document_id,
            root.start_block(),
            root.end_block()
        );
        self.outline_children(root.id, 1, &mut out);
        out
    }

    fn outline_children(&self, id: SectionId, depth: usize, out: &mut String) {
        for child in self.sections.children(id) {
            let _ = writeln!(
                out,
                "{}{} [b{}..b{}]",
                "  ".repeat(depth),
                child.heading(),
                child.start_block(),
                child.end_block()
            );
            self.outline_children(child.id, depth + 1, out);
        }
    }
}

/// Build a map with the default configuration. Never fails; diagnostics
/// are dropped.
pub fn build_doc_map(document_id: &str, raw_text: &str) -> DocumentMap {
    build_doc_map_with(document_id, raw_text, &DocMapConfig::default())
}

/// Build a map with an explicit configuration. Never fails.
pub fn build_doc_map_with(document_id: &str, raw_text: &str, config: &DocMapConfig) -> DocumentMap {
    DocMapBuilder::new(config).build(document_id, raw_text).into_value()
}

/// Pipeline from raw text to [`DocumentMap`], with optional seed sections
/// and sibling maps for other-document references.
pub struct DocMapBuilder<'a> {
    config: &'a DocMapConfig,
    seeds: Vec<SeedSection>,
    siblings: Vec<&'a DocumentMap>,
}

impl<'a> DocMapBuilder<'a> {
    pub fn new(config: &'a DocMapConfig) -> Self {
        Self {
            config,
            seeds: Vec::new(),
            siblings: Vec::new(),
        }
    }

    /// Proposed outline entries; exact title matches win over detection.
    pub fn with_seeds(mut self, seeds: Vec<SeedSection>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_sibling(mut self, map: &'a DocumentMap) -> Self {
        self.siblings.push(map);
        self
    }

    pub fn with_siblings(mut self, maps: impl IntoIterator<Item = &'a DocumentMap>) -> Self {
        self.siblings.extend(maps);
        self
    }

    /// Run the pipeline. The value is always usable; `errors` lists
    /// dangling references and seed problems.
    pub fn build(&self, document_id: &str, raw_text: &str) -> ProcessResult<DocumentMap> {
        let span = debug_span!("build_doc_map", document_id);
        let _enter = span.enter();

        let config = self.config;
        let blocks = Segmenter::new(config).segment(document_id, raw_text);
        debug!(blocks = blocks.len(), pages = blocks.last().map(Block::page).unwrap_or(1), "segmented");

        let mut result = ProcessResult::ok(());
        let structure = result.absorb(StructureExtractor::new(config).extract(document_id, &blocks, &self.seeds));
        debug!(sections = structure.sections.len() - 1, "extracted structure");

        let definitions =
            DefinitionExtractor::new(config).extract(&blocks, &structure.sections, &structure.block_sections);
        debug!(definitions = definitions.len(), "extracted definitions");

        let mut own_names = vec![document_id.replace(['-', '_'], " ")];
        own_names.extend(structure.title.clone());
        let scanner = ReferenceScanner::new(config, &definitions, own_names);

        let heading_blocks: HashSet<usize> = structure
            .sections
            .iter()
            .filter(|node| !node.is_root())
            .map(SectionNode::start_block)
            .collect();
        let mentions: Vec<Mention> = blocks
            .iter()
            .filter(|block| !(block.is_single_line() && is_toc_line(&block.raw_text)))
            .flat_map(|block| scanner.scan(block, heading_blocks.contains(&block.index())))
            .collect();

        let linker = ReferenceLinker {
            blocks: &blocks,
            sections: &structure.sections,
            block_sections: &structure.block_sections,
            definitions: &definitions,
            siblings: &self.siblings,
        };
        let references = result.absorb(linker.link(mentions));
        debug!(
            references = references.len(),
            resolved = references.iter().filter(|r| r.is_resolved()).count(),
            "linked references"
        );

        result.map(|()| DocumentMap {
            document_id: document_id.to_string(),
            title: structure.title,
            blocks,
            sections: structure.sections,
            block_sections: structure.block_sections,
            definitions,
            references,
            config: config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let map = build_doc_map("empty", "");
        assert_eq!(map.blocks().len(), 1);
        assert_eq!(map.sections().len(), 1);
        assert_eq!(map.page_count(), 1);
        assert!(map.references().is_empty());
        insta::assert_snapshot!(map.outline(), @"empty [b0..b0]");
    }

    #[test]
    fn test_plain_paragraphs_have_root_only() {
        let map = build_doc_map("memo", "The parties met on Monday.\n\nNothing was decided.");
        assert_eq!(map.sections().len(), 1);
        assert_eq!(map.section_of_block(1), SectionId::ROOT);
        assert_eq!(map.sections().root().end_block(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let map = build_doc_map(
            "doc",
            "Section 1.01 Loans\n\nThe Lenders shall make loans.\n\nSee Section 1.01.",
        );
        let json = map.to_json().unwrap();
        let restored = DocumentMap::from_json(&json).unwrap();
        assert_eq!(restored.blocks(), map.blocks());
        assert_eq!(restored.outline(), map.outline());
        assert_eq!(restored.references().len(), 1);
        assert_eq!(restored.references()[0].resolved_section, map.references()[0].resolved_section);
    }

    #[test]
    fn test_ron_render() {
        let map = build_doc_map("doc", "Section 1.01 Loans");
        let ron = map.to_ron().unwrap();
        assert!(ron.contains("document_id: \"doc\""));
    }

    #[test]
    fn test_answers_to_title() {
        let map = build_doc_map("sa-2021", "PLEDGE AND SECURITY AGREEMENT\n\nSection 1 Grant\n\nThe Grantor grants a lien.");
        assert_eq!(map.title(), Some("PLEDGE AND SECURITY AGREEMENT"));
        assert!(map.answers_to("Security Agreement"));
        assert!(map.answers_to("sa 2021"));
        assert!(!map.answers_to("Credit Agreement"));
    }

    #[test]
    fn test_references_from_and_to() {
        let map = build_doc_map(
            "doc",
            "Section 1.01 Loans\n\nThe Lenders shall make loans.\n\nSection 1.02 Interest\n\nInterest accrues as set forth in Section 1.01.",
        );
        let target = map.sections().find_by_key("SECTION:1.1")[0];
        assert_eq!(map.references_to(target).count(), 1);
        assert_eq!(map.references_from(3).count(), 1);
        assert_eq!(map.references_from(1).count(), 0);
    }
}
