//! Anchors: canonical, citable addresses of text inside a document map.
//!
//! An [`Anchor`] names a byte range inside one block of one document. Block
//! indices are global and zero-based in reading order; pages are one-based.
//! Offsets must fall on UTF-8 character boundaries of the block text. Block
//! and offset bounds are only known to the owning map, so they are checked
//! when the anchor is dereferenced rather than at construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DocMapError, DocMapResult};

/// Address of a contiguous byte range inside a single block.
///
/// Equality is structural: two anchors with the same fields are the same
/// citation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Anchor {
    document_id: String,
    page: u32,
    block_index: usize,
    char_start: usize,
    char_end: usize,
}

impl Anchor {
    /// Create an anchor, defaulting the page to 1.
    ///
    /// Fails with [`DocMapError::InvalidAnchor`] when `char_start > char_end`
    /// or when an explicit page of 0 is given.
    pub fn new(
        document_id: impl Into<String>,
        block_index: usize,
        char_start: usize,
        char_end: usize,
        page: Option<u32>,
    ) -> DocMapResult<Self> {
        if char_start > char_end {
            return Err(DocMapError::InvalidAnchor {
                reason: format!("char_start {} is after char_end {}", char_start, char_end),
            });
        }
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(DocMapError::InvalidAnchor {
                reason: "pages are numbered from 1".to_string(),
            });
        }
        Ok(Self {
            document_id: document_id.into(),
            page,
            block_index,
            char_start,
            char_end,
        })
    }

    /// Anchor covering the whole of a block whose text is `len` bytes long.
    pub fn whole_block(document_id: impl Into<String>, page: u32, block_index: usize, len: usize) -> Self {
        Self {
            document_id: document_id.into(),
            page: page.max(1),
            block_index,
            char_start: 0,
            char_end: len,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn block_index(&self) -> usize {
        self.block_index
    }

    pub fn char_start(&self) -> usize {
        self.char_start
    }

    pub fn char_end(&self) -> usize {
        self.char_end
    }

    /// Number of bytes covered.
    pub fn len(&self) -> usize {
        self.char_end.saturating_sub(self.char_start)
    }

    pub fn is_empty(&self) -> bool {
        self.char_start == self.char_end
    }

    /// A sub-range of the same block, with offsets relative to the block.
    ///
    /// The new range must lie inside this anchor's range.
    pub fn narrow(&self, char_start: usize, char_end: usize) -> DocMapResult<Self> {
        if char_start > char_end || char_start < self.char_start || char_end > self.char_end {
            return Err(DocMapError::InvalidAnchor {
                reason: format!(
                    "{}..{} does not lie inside {}..{}",
                    char_start, char_end, self.char_start, self.char_end
                ),
            });
        }
        Ok(Self {
            char_start,
            char_end,
            ..self.clone()
        })
    }

    /// Short block label in the `doc:p{page}:b{block}` form used in trails.
    pub fn block_label(&self) -> String {
        format!("{}:p{}:b{}", self.document_id, self.page, self.block_index)
    }

    /// Check this anchor against a block of the owning map.
    ///
    /// `block` is `None` when the block index is past the end of the map.
    /// Deserialized anchors skip [`Anchor::new`], so its checks are repeated.
    pub fn check_against(&self, document_id: &str, block: Option<&str>) -> DocMapResult<()> {
        if self.char_start > self.char_end {
            return Err(DocMapError::InvalidAnchor {
                reason: format!("char_start {} is after char_end {}", self.char_start, self.char_end),
            });
        }
        if self.page == 0 {
            return Err(DocMapError::InvalidAnchor {
                reason: "pages are numbered from 1".to_string(),
            });
        }
        if self.document_id != document_id {
            return Err(DocMapError::AnchorNotFound {
                anchor: self.to_string(),
                reason: format!("anchor belongs to document '{}'", self.document_id),
            });
        }
        let text = block.ok_or_else(|| DocMapError::AnchorNotFound {
            anchor: self.to_string(),
            reason: format!("block {} is outside the map", self.block_index),
        })?;
        if self.char_end > text.len() {
            return Err(DocMapError::AnchorNotFound {
                anchor: self.to_string(),
                reason: format!("offset {} is past the block end {}", self.char_end, text.len()),
            });
        }
        if !text.is_char_boundary(self.char_start) || !text.is_char_boundary(self.char_end) {
            return Err(DocMapError::InvalidAnchor {
                reason: format!("{} does not fall on character boundaries", self),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:p{}:b{}@{}..{}",
            self.document_id, self.page, self.block_index, self.char_start, self.char_end
        )
    }
}

impl FromStr for Anchor {
    type Err = DocMapError;

    /// Parse the `Display` form, `doc:p{page}:b{block}@{start}..{end}`.
    ///
    /// The document id may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DocMapError::InvalidAnchor {
            reason: format!("cannot parse '{}': {}", s, reason),
        };

        let (address, range) = s.rsplit_once('@').ok_or_else(|| invalid("missing '@start..end'"))?;
        let (start, end) = range.split_once("..").ok_or_else(|| invalid("missing '..'"))?;
        let char_start = start.parse::<usize>().map_err(|_| invalid("bad start offset"))?;
        let char_end = end.parse::<usize>().map_err(|_| invalid("bad end offset"))?;

        let mut parts = address.rsplitn(3, ':');
        let block = parts
            .next()
            .and_then(|b| b.strip_prefix('b'))
            .ok_or_else(|| invalid("missing block"))?;
        let page = parts
            .next()
            .and_then(|p| p.strip_prefix('p'))
            .ok_or_else(|| invalid("missing page"))?;
        let document_id = parts.next().filter(|d| !d.is_empty()).ok_or_else(|| invalid("missing document id"))?;

        let block_index = block.parse::<usize>().map_err(|_| invalid("bad block index"))?;
        let page = page.parse::<u32>().map_err(|_| invalid("bad page"))?;
        Anchor::new(document_id, block_index, char_start, char_end, Some(page))
    }
}

/// Inclusive range between two anchors of the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorRange {
    pub start: Anchor,
    pub end: Anchor,
}

impl AnchorRange {
    pub fn new(start: Anchor, end: Anchor) -> DocMapResult<Self> {
        if start.document_id != end.document_id {
            return Err(DocMapError::InvalidAnchor {
                reason: format!(
                    "range spans two documents ('{}' and '{}')",
                    start.document_id, end.document_id
                ),
            });
        }
        let ordered = start.block_index < end.block_index
            || (start.block_index == end.block_index && start.char_start <= end.char_end);
        if !ordered {
            return Err(DocMapError::InvalidAnchor {
                reason: format!("range start {} is after its end {}", start, end),
            });
        }
        Ok(Self { start, end })
    }

    pub fn document_id(&self) -> &str {
        &self.start.document_id
    }

    pub fn block_count(&self) -> usize {
        self.end.block_index - self.start.block_index + 1
    }
}

impl fmt::Display for AnchorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Either a single anchor or a range; the argument of `read_span`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Span {
    Range(AnchorRange),
    Anchor(Anchor),
}

impl Span {
    pub fn document_id(&self) -> &str {
        match self {
            Span::Anchor(anchor) => anchor.document_id(),
            Span::Range(range) => range.document_id(),
        }
    }
}

impl From<Anchor> for Span {
    fn from(anchor: Anchor) -> Self {
        Span::Anchor(anchor)
    }
}

impl From<&Anchor> for Span {
    fn from(anchor: &Anchor) -> Self {
        Span::Anchor(anchor.clone())
    }
}

impl From<AnchorRange> for Span {
    fn from(range: AnchorRange) -> Self {
        Span::Range(range)
    }
}
