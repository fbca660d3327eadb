//! Section nodes and the flat arena that holds a document's outline.
//!
//! Nodes are stored in document order, which is also a pre-order walk of the
//! tree. Index 0 is always the level-0 root spanning every block. Parent and
//! child links are indices into the arena.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Anchor;

/// Index of a node in a [`SectionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionId(pub usize);

impl SectionId {
    pub const ROOT: SectionId = SectionId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of heading that opened a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Root,
    Article,
    Section,
    Subsection,
    Exhibit,
    Annex,
    Appendix,
    Schedule,
    /// A caption line with no number, e.g. "NEGATIVE COVENANTS"
    Caption,
}

/// Where a node's heading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionSource {
    Root,
    /// Detected by a heading pattern
    Detected,
    /// Confirmed or placed by a table-of-contents entry
    Toc,
    /// Confirmed or placed by a caller-supplied seed
    Seeded,
}

/// A node in the section tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionNode {
    pub id: SectionId,
    /// Canonical lookup key, e.g. `ARTICLE:6`, `SECTION:6.2(a)`, `EXHIBIT:A`
    pub key: String,
    pub kind: SectionKind,
    /// Heading label as written, e.g. "Section 6.02" or "ARTICLE VI"
    pub label: String,
    /// Heading title, possibly empty
    pub title: String,
    /// Nesting level; 0 only for the root
    pub level: u8,
    /// First block of the section (the heading block)
    pub start_anchor: Anchor,
    /// Last block of the section
    pub end_anchor: Anchor,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
    pub source: SectionSource,
}

impl SectionNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Label and title joined for display.
    pub fn heading(&self) -> String {
        match (self.label.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} {}", self.label, self.title),
            (false, true) => self.label.clone(),
            (true, false) => self.title.clone(),
            (true, true) => self.key.clone(),
        }
    }

    pub fn start_block(&self) -> usize {
        self.start_anchor.block_index()
    }

    pub fn end_block(&self) -> usize {
        self.end_anchor.block_index()
    }

    /// Whether a block index falls inside this section's range.
    pub fn contains_block(&self, block_index: usize) -> bool {
        self.start_block() <= block_index && block_index <= self.end_block()
    }
}

/// Flat arena of section nodes with a key index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTree {
    nodes: Vec<SectionNode>,
    by_key: BTreeMap<String, Vec<SectionId>>,
}

impl SectionTree {
    /// Build from nodes already linked and in document order.
    pub(crate) fn from_nodes(nodes: Vec<SectionNode>) -> Self {
        let mut by_key: BTreeMap<String, Vec<SectionId>> = BTreeMap::new();
        for node in &nodes {
            by_key.entry(node.key.clone()).or_default().push(node.id);
        }
        Self { nodes, by_key }
    }

    pub fn root(&self) -> &SectionNode {
        &self.nodes[0]
    }

    pub fn get(&self, id: SectionId) -> Option<&SectionNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the root is always present.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in document (pre-order) order, root first.
    pub fn iter(&self) -> impl Iterator<Item = &SectionNode> {
        self.nodes.iter()
    }

    pub fn children(&self, id: SectionId) -> impl Iterator<Item = &SectionNode> {
        self.get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |child| self.get(*child))
    }

    /// Ancestors of a node, nearest first, ending at the root.
    pub fn ancestors(&self, id: SectionId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(|node| node.parent),
        }
    }

    /// Number of edges between a node and the root.
    pub fn depth(&self, id: SectionId) -> usize {
        self.ancestors(id).count()
    }

    /// Whether `ancestor` is `id` itself or one of its ancestors.
    pub fn is_within(&self, id: SectionId, ancestor: SectionId) -> bool {
        id == ancestor || self.ancestors(id).any(|node| node.id == ancestor)
    }

    /// Nodes with a canonical key, in document order.
    pub fn find_by_key(&self, key: &str) -> &[SectionId] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Deepest node whose range contains the block.
    pub fn innermost(&self, block_index: usize) -> SectionId {
        let mut current = SectionId::ROOT;
        loop {
            let next = self
                .children(current)
                .find(|child| child.contains_block(block_index))
                .map(|child| child.id);
            match next {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Nearest node of one of the given kinds, starting at `id` itself.
    pub fn enclosing_of_kind(&self, id: SectionId, kinds: &[SectionKind]) -> Option<&SectionNode> {
        let node = self.get(id)?;
        if kinds.contains(&node.kind) {
            return Some(node);
        }
        self.ancestors(id).find(|n| kinds.contains(&n.kind))
    }

    /// Nodes whose normalized title or heading equals the given text.
    pub fn find_by_title(&self, normalized: &str) -> Vec<SectionId> {
        self.nodes
            .iter()
            .filter(|node| {
                !node.is_root()
                    && (crate::utils::normalize_term(&node.title) == normalized
                        || crate::utils::normalize_term(&node.heading()) == normalized)
            })
            .map(|node| node.id)
            .collect()
    }
}

/// Iterator returned by [`SectionTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a SectionTree,
    next: Option<SectionId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a SectionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: usize, key: &str, level: u8, start: usize, end: usize, parent: Option<usize>) -> SectionNode {
        SectionNode {
            id: SectionId(id),
            key: key.to_string(),
            kind: if parent.is_none() { SectionKind::Root } else { SectionKind::Section },
            label: key.to_string(),
            title: String::new(),
            level,
            start_anchor: Anchor::whole_block("doc", 1, start, 5),
            end_anchor: Anchor::whole_block("doc", 1, end, 5),
            parent: parent.map(SectionId),
            children: Vec::new(),
            source: SectionSource::Detected,
        }
    }

    fn sample_tree() -> SectionTree {
        let mut nodes = vec![
            node(0, "ROOT", 0, 0, 9, None),
            node(1, "ARTICLE:1", 1, 0, 4, Some(0)),
            node(2, "SECTION:1.1", 3, 1, 4, Some(1)),
            node(3, "ARTICLE:2", 1, 5, 9, Some(0)),
        ];
        nodes[0].children = vec![SectionId(1), SectionId(3)];
        nodes[1].children = vec![SectionId(2)];
        SectionTree::from_nodes(nodes)
    }

    #[test]
    fn test_innermost_descends() {
        let tree = sample_tree();
        assert_eq!(tree.innermost(0), SectionId(1));
        assert_eq!(tree.innermost(3), SectionId(2));
        assert_eq!(tree.innermost(7), SectionId(3));
    }

    #[test]
    fn test_ancestors_and_depth() {
        let tree = sample_tree();
        let keys: Vec<_> = tree.ancestors(SectionId(2)).map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["ARTICLE:1", "ROOT"]);
        assert_eq!(tree.depth(SectionId(2)), 2);
        assert_eq!(tree.depth(SectionId::ROOT), 0);
        assert!(tree.is_within(SectionId(2), SectionId(1)));
        assert!(!tree.is_within(SectionId(3), SectionId(1)));
    }

    #[test]
    fn test_find_by_key() {
        let tree = sample_tree();
        assert_eq!(tree.find_by_key("SECTION:1.1"), &[SectionId(2)]);
        assert!(tree.find_by_key("SECTION:9").is_empty());
    }

    #[test]
    fn test_find_by_title_skips_root() {
        let mut tree = sample_tree();
        tree.nodes[0].title = "Credit Agreement".to_string();
        tree.nodes[3].title = "Negative Covenants".to_string();
        assert_eq!(tree.find_by_title("negative covenants"), vec![SectionId(3)]);
        assert_eq!(tree.find_by_title("article:2 negative covenants"), vec![SectionId(3)]);
        assert!(tree.find_by_title("credit agreement").is_empty());
    }
}
