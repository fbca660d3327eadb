//! Document maps for long legal and financial documents.
//!
//! A [`DocumentMap`] turns normalized text into ordered, anchored blocks, a
//! section tree, a scoped definitions table and a graph of cross-references,
//! so that a reader can search, read exact spans, follow "Section 6.02(a)"
//! and look up "Maturity Date" while every answer stays citable.
//!
//! ## Pipeline
//!
//! - [`Segmenter`] - Splits text into blocks, one page per `[PAGE n]` marker
//! - Structure extraction - Headings, captions and seed sections into a [`SectionTree`]
//! - Definition extraction - `"Term" means ...` into a scoped [`DefinitionTable`]
//! - Reference resolution - Section, term, exhibit and other-document citations
//!
//! ## Traversal
//!
//! - [`search_in_doc`], [`read_span`], [`follow_reference`], [`read_definition`]
//! - [`read_page`], [`open_at_anchor`], [`follow_reference_text`], [`summarize_section`]
//! - [`quote_evidence`], [`consistency_check`]
//! - [`Navigator`] records every anchor it reads to a [`TrailSink`]
//!
//! ## Example
//!
//! ```
//! use layered_docmap::{build_doc_map, read_definition, search_in_doc, SearchScope};
//!
//! let map = build_doc_map(
//!     "credit",
//!     "ARTICLE I\n\nDEFINITIONS\n\n\"Maturity Date\" means March 31, 2030.",
//! );
//! let entry = read_definition(&map, "maturity date").unwrap();
//! assert_eq!(entry.term, "Maturity Date");
//!
//! let hits = search_in_doc(&map, "Maturity Date", SearchScope::Document).unwrap();
//! assert_eq!(hits[0].anchor.block_index(), entry.definition_anchor.block_index());
//! ```

mod config;
mod definitions;
mod evidence;
mod library;
mod linker;
mod map;
mod patterns;
mod reference;
mod section;
mod segmenter;
mod structure;
mod toc;
mod trail;
mod traversal;
mod utils;

pub use config::{DefinitionPattern, DefinitionTieBreak, DocMapConfig, HeadingPattern, ReferencePattern};
pub use definitions::{DefinitionEntry, DefinitionHit, DefinitionScope, DefinitionTable, DefinitionType};
pub use evidence::{consistency_check, quote_evidence, ConsistencyReport, Evidence, SupportStatus};
pub use library::{DocumentLibrary, DocumentSource};
pub use map::{build_doc_map, build_doc_map_with, DocMapBuilder, DocumentMap};
pub use reference::{CrossReference, ReferenceTarget, ReferenceType, Resolution};
pub use section::{Ancestors, SectionId, SectionKind, SectionNode, SectionSource, SectionTree};
pub use segmenter::{normalize_text, Block, Segmenter};
pub use toc::SeedSection;
pub use trail::{JsonLinesTrail, MemoryTrail, Navigator, TrailEvent, TrailSink};
pub use traversal::{
    follow_reference, follow_reference_text, open_at_anchor, read_definition, read_definition_in, read_page,
    read_span, search_in_doc, summarize_section, AnchorView, KeyEvent, MatchKind, SearchHit, SearchScope,
    SectionSummary,
};

// Document-level primitives
pub use layered_docmap_document::{
    Anchor, AnchorRange, DocMapError, DocMapResult, ProcessError, ProcessResult, Span,
};

#[cfg(test)]
mod tests {
    mod properties;
    mod references;
    mod scenarios;
    mod structure;
    mod traversal;
}
