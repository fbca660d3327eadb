//! A set of maps that can refer to each other.
//!
//! Documents are mapped in parallel, one scoped thread per document. Maps
//! with unresolved other-document references are then rebuilt with the
//! rest of the set as siblings.

use std::collections::BTreeMap;
use std::thread;

use tracing::info;

use crate::config::DocMapConfig;
use crate::map::{DocMapBuilder, DocumentMap};
use crate::reference::{CrossReference, ReferenceType};
use crate::toc::SeedSection;
use crate::trail::{Navigator, TrailSink};
use crate::traversal::{resolve_citation, search_in_doc, SearchHit, SearchScope};
use crate::{Anchor, DocMapError, DocMapResult, ProcessError, ProcessResult};

/// Input for one document of a library.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSource {
    pub document_id: String,
    pub text: String,
    pub seeds: Vec<SeedSection>,
}

impl DocumentSource {
    pub fn new(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
            seeds: Vec::new(),
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<SeedSection>) -> Self {
        self.seeds = seeds;
        self
    }
}

/// Maps keyed by document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLibrary {
    maps: BTreeMap<String, DocumentMap>,
}

impl DocumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every source and link references between them.
    pub fn build(sources: Vec<DocumentSource>, config: &DocMapConfig) -> ProcessResult<Self> {
        let mut result = ProcessResult::ok(Self::new());
        let built = build_all(&sources, config);

        let mut diagnostics: BTreeMap<String, (Vec<ProcessError>, Vec<String>)> = BTreeMap::new();
        for (source, outcome) in sources.iter().zip(built) {
            match outcome {
                Some(map_result) => {
                    diagnostics.insert(source.document_id.clone(), (map_result.errors, map_result.warnings));
                    result.value.maps.insert(source.document_id.clone(), map_result.value);
                }
                None => result.add_error(ProcessError::Other(format!(
                    "building '{}' did not complete",
                    source.document_id
                ))),
            }
        }

        let pending: Vec<&DocumentSource> = sources
            .iter()
            .filter(|s| {
                result
                    .value
                    .maps
                    .get(&s.document_id)
                    .map(has_unresolved_external)
                    .unwrap_or(false)
            })
            .collect();
        if !pending.is_empty() && result.value.maps.len() > 1 {
            info!(documents = pending.len(), "linking other-document references");
            let mut relinked = Vec::with_capacity(pending.len());
            for source in pending {
                let siblings: Vec<&DocumentMap> = result
                    .value
                    .maps
                    .values()
                    .filter(|m| m.document_id() != source.document_id)
                    .collect();
                let map_result = DocMapBuilder::new(config)
                    .with_seeds(source.seeds.clone())
                    .with_siblings(siblings)
                    .build(&source.document_id, &source.text);
                relinked.push((source.document_id.clone(), map_result));
            }
            for (id, map_result) in relinked {
                diagnostics.insert(id.clone(), (map_result.errors, map_result.warnings));
                result.value.maps.insert(id, map_result.value);
            }
        }

        for (id, (errors, warnings)) in diagnostics {
            result.errors.extend(errors);
            result.warnings.extend(warnings.into_iter().map(|w| format!("{}: {}", id, w)));
        }
        info!(
            documents = result.value.maps.len(),
            errors = result.errors.len(),
            "built document library"
        );
        result
    }

    /// Add or replace a map.
    pub fn insert(&mut self, map: DocumentMap) -> Option<DocumentMap> {
        self.maps.insert(map.document_id().to_string(), map)
    }

    pub fn get(&self, document_id: &str) -> DocMapResult<&DocumentMap> {
        self.maps
            .get(document_id)
            .ok_or_else(|| DocMapError::UnknownDocument(document_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Maps in document id order.
    pub fn iter(&self) -> impl Iterator<Item = &DocumentMap> {
        self.maps.values()
    }

    /// Search every map. Hits are ordered by score, then document id, then
    /// position.
    pub fn search(&self, query: &str) -> DocMapResult<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for map in self.maps.values() {
            hits.extend(search_in_doc(map, query, SearchScope::Document)?);
        }
        // Stable sort keeps the per-document order for equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }

    /// Target of a reference made in any map of the library, with the map
    /// that holds it.
    pub fn follow_reference(&self, reference: &CrossReference) -> Option<(&DocumentMap, Anchor)> {
        let anchor = reference.resolved_anchor.clone()?;
        let map = self.maps.get(anchor.document_id())?;
        Some((map, anchor))
    }

    /// Resolve a citation typed against one document, letting
    /// other-document citations reach the rest of the library.
    pub fn follow_reference_text(
        &self,
        document_id: &str,
        citation: &str,
        origin: Option<&Anchor>,
    ) -> DocMapResult<Option<CrossReference>> {
        let map = self.get(document_id)?;
        let siblings: Vec<&DocumentMap> = self.maps.values().filter(|m| m.document_id() != document_id).collect();
        Ok(resolve_citation(map, citation, origin, &siblings))
    }

    pub fn navigator<S: TrailSink>(&self, document_id: &str, sink: S) -> DocMapResult<Navigator<'_, S>> {
        Ok(Navigator::new(self.get(document_id)?, sink))
    }
}

fn has_unresolved_external(map: &DocumentMap) -> bool {
    map.unresolved_references()
        .any(|r| r.ref_type == ReferenceType::ExternalDocRef)
}

/// Build every source on its own scoped thread. `None` marks a build that
/// panicked.
fn build_all(sources: &[DocumentSource], config: &DocMapConfig) -> Vec<Option<ProcessResult<DocumentMap>>> {
    thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                scope.spawn(move || {
                    DocMapBuilder::new(config)
                        .with_seeds(source.seeds.clone())
                        .build(&source.document_id, &source.text)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().ok()).collect()
    })
}
