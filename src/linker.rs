//! Resolution of detected mentions against the section tree, the
//! definitions table and sibling maps.
//!
//! Key responsibilities:
//! - Resolve section citations exactly, or to the nearest extracted ancestor
//! - Resolve defined-term mentions with the scope rule
//! - Resolve exhibits and schedules against existing nodes only
//! - Resolve other-document references against sibling maps
//! - Keep everything else as unresolved data and report dangling citations

use tracing::trace;

use crate::config::DefinitionTieBreak;
use crate::definitions::{DefinitionScope, DefinitionTable};
use crate::map::DocumentMap;
use crate::patterns::ancestor_keys;
use crate::reference::{CrossReference, Mention, ReferenceTarget, ReferenceType, Resolution};
use crate::section::{SectionId, SectionKind, SectionTree};
use crate::segmenter::Block;
use crate::utils::normalize_term;
use crate::{Anchor, ProcessError, ProcessResult};

/// Outcome of resolving one mention.
struct Resolved {
    anchor: Option<Anchor>,
    section: Option<SectionId>,
    document: Option<String>,
    resolution: Resolution,
    confidence: f64,
}

impl Resolved {
    fn unresolved(reason: impl Into<String>, base: f64) -> Self {
        Self {
            anchor: None,
            section: None,
            document: None,
            resolution: Resolution::Unresolved { reason: reason.into() },
            confidence: base * 0.3,
        }
    }
}

/// Links mentions of one document to their targets.
pub(crate) struct ReferenceLinker<'a> {
    pub blocks: &'a [Block],
    pub sections: &'a SectionTree,
    pub block_sections: &'a [SectionId],
    pub definitions: &'a DefinitionTable,
    pub siblings: &'a [&'a DocumentMap],
}

impl<'a> ReferenceLinker<'a> {
    /// Link every mention. Unresolved internal citations are reported as
    /// dangling references.
    pub fn link(&self, mentions: Vec<Mention>) -> ProcessResult<Vec<CrossReference>> {
        let mut result = ProcessResult::ok(Vec::with_capacity(mentions.len()));
        for (id, mention) in mentions.into_iter().enumerate() {
            let origin = self
                .block_sections
                .get(mention.block_index)
                .copied()
                .unwrap_or(SectionId::ROOT);
            let reference = self.link_one(id, mention, origin);

            if let Resolution::Unresolved { reason } = &reference.resolution {
                trace!(reference = %reference.raw_text, %reason, "unresolved reference");
                if reference.ref_type != ReferenceType::ExternalDocRef {
                    result.add_error(ProcessError::DanglingReference {
                        reference: reference.raw_text.clone(),
                        location: reference.from_anchor.clone(),
                    });
                }
            }
            result.value.push(reference);
        }
        result
    }

    /// Resolve one mention as if it appeared inside `origin`.
    pub fn link_one(&self, id: usize, mention: Mention, origin: SectionId) -> CrossReference {
        let from_anchor = self
            .blocks
            .get(mention.block_index)
            .map(|block| {
                block
                    .anchor
                    .narrow(mention.start, mention.end)
                    .unwrap_or_else(|_| block.anchor.clone())
            })
            .unwrap_or_else(|| Anchor::whole_block("", 1, mention.block_index, 0));

        let base = mention.confidence;
        let resolved = match &mention.target {
            ReferenceTarget::Section { key } => resolve_in_tree(self.sections, key, base, None),
            ReferenceTarget::Relative { kind } => self.resolve_relative(*kind, origin, base),
            ReferenceTarget::Term { term } => self.resolve_term(term, origin, base),
            ReferenceTarget::Attachment { key } => self.resolve_attachment(key, base),
            ReferenceTarget::External { document, section } => {
                self.resolve_external(document, section.as_deref(), base)
            }
        };

        CrossReference {
            id,
            from_anchor,
            ref_type: mention.ref_type,
            raw_text: mention.raw_text,
            target: mention.target,
            resolved_anchor: resolved.anchor,
            resolved_section: resolved.section,
            resolved_document: resolved.document,
            resolution: resolved.resolution,
            confidence: resolved.confidence,
        }
    }

    fn resolve_relative(&self, kind: SectionKind, origin: SectionId, base: f64) -> Resolved {
        let kinds: &[SectionKind] = match kind {
            SectionKind::Article => &[SectionKind::Article],
            SectionKind::Subsection => &[SectionKind::Subsection],
            _ => &[SectionKind::Section, SectionKind::Subsection],
        };
        match self.sections.enclosing_of_kind(origin, kinds) {
            Some(node) => Resolved {
                anchor: Some(node.start_anchor.clone()),
                section: Some(node.id),
                document: None,
                resolution: Resolution::Exact,
                confidence: base * 0.95,
            },
            None => Resolved::unresolved(format!("no enclosing {:?}", kind).to_lowercase(), base),
        }
    }

    fn resolve_term(&self, term: &str, origin: SectionId, base: f64) -> Resolved {
        let lookup = self.definitions.lookup(
            term,
            DefinitionScope::Within(origin),
            self.sections,
            DefinitionTieBreak::FirstEncountered,
        );
        match lookup {
            Ok(hit) => {
                let (resolution, confidence) = if hit.tie_broken {
                    (
                        Resolution::Soft {
                            alternatives: hit.alternatives.iter().map(|e| e.definition_anchor.clone()).collect(),
                        },
                        base * 0.6,
                    )
                } else {
                    (Resolution::Exact, base)
                };
                Resolved {
                    anchor: Some(hit.entry.definition_anchor.clone()),
                    section: None,
                    document: None,
                    resolution,
                    confidence,
                }
            }
            Err(e) => Resolved::unresolved(e.to_string(), base),
        }
    }

    fn resolve_attachment(&self, key: &str, base: f64) -> Resolved {
        let resolved = resolve_in_tree(self.sections, key, base, None);
        if resolved.anchor.is_some() {
            return resolved;
        }
        let (kind, id) = key.split_once(':').unwrap_or(("EXHIBIT", key));
        Resolved::unresolved(format!("no {} {} in document", kind.to_lowercase(), id), base)
    }

    fn resolve_external(&self, document: &str, section: Option<&str>, base: f64) -> Resolved {
        let Some(sibling) = self.siblings.iter().find(|map| map.answers_to(document)) else {
            return Resolved::unresolved(format!("document '{}' is not in the map set", document), base);
        };
        let sibling_id = Some(sibling.document_id().to_string());
        let root = sibling.sections().root();

        let Some(key) = section else {
            return Resolved {
                anchor: Some(root.start_anchor.clone()),
                section: None,
                document: sibling_id,
                resolution: Resolution::Exact,
                confidence: (base * 1.1).min(1.0),
            };
        };

        let resolved = resolve_in_tree(sibling.sections(), key, base, sibling_id.clone());
        if resolved.anchor.is_some() {
            return resolved;
        }
        // The document is known but the section is not: land on the document.
        Resolved {
            anchor: Some(root.start_anchor.clone()),
            section: None,
            document: sibling_id,
            resolution: Resolution::Ancestor {
                matched_key: root.key.clone(),
            },
            confidence: base * 0.5,
        }
    }
}

/// Resolve a canonical key in a tree: exact, then nearest ancestor.
///
/// `document` is set when the tree belongs to another map; `section` is only
/// filled for the map's own tree.
fn resolve_in_tree(tree: &SectionTree, key: &str, base: f64, document: Option<String>) -> Resolved {
    let local = document.is_none();
    let node_at = |id: SectionId| tree.get(id);

    match tree.find_by_key(key) {
        [only] => {
            if let Some(node) = node_at(*only) {
                return Resolved {
                    anchor: Some(node.start_anchor.clone()),
                    section: local.then_some(node.id),
                    document,
                    resolution: Resolution::Exact,
                    confidence: (base * 1.1).min(1.0),
                };
            }
        }
        [first, rest @ ..] => {
            if let Some(node) = node_at(*first) {
                return Resolved {
                    anchor: Some(node.start_anchor.clone()),
                    section: local.then_some(node.id),
                    document,
                    resolution: Resolution::Soft {
                        alternatives: rest
                            .iter()
                            .filter_map(|id| node_at(*id))
                            .map(|n| n.start_anchor.clone())
                            .collect(),
                    },
                    confidence: base * 0.6,
                };
            }
        }
        [] => {}
    }

    for ancestor in ancestor_keys(key) {
        if let Some(node) = tree.find_by_key(&ancestor).first().and_then(|id| node_at(*id)) {
            return Resolved {
                anchor: Some(node.start_anchor.clone()),
                section: local.then_some(node.id),
                document,
                resolution: Resolution::Ancestor { matched_key: ancestor },
                confidence: base * 0.9,
            };
        }
    }

    Resolved::unresolved(format!("no section '{}' in document", key), base)
}

/// Whether a name (document id or title) refers to a map.
pub(crate) fn names_match(name: &str, document_id: &str, title: Option<&str>) -> bool {
    let name = normalize_term(name);
    if name.is_empty() {
        return false;
    }
    let id = normalize_term(&document_id.replace(['-', '_'], " "));
    let suffix = format!(" {}", name);
    id == name
        || title
            .map(normalize_term)
            .map(|t| t == name || t.ends_with(&suffix))
            .unwrap_or(false)
}
