//! Error types for document maps.
//!
//! Building a map never fails; these errors come from traversal calls,
//! configuration loading and serialization.

use thiserror::Error;

use crate::anchor::Anchor;

/// Errors raised by traversal, configuration and serialization.
#[derive(Debug, Error)]
pub enum DocMapError {
    /// Malformed anchor or range. Always a caller bug.
    #[error("invalid anchor: {reason}")]
    InvalidAnchor { reason: String },

    /// Well-formed anchor that points outside the map.
    #[error("anchor {anchor} not found: {reason}")]
    AnchorNotFound { anchor: String, reason: String },

    /// Several definitions of a term are equally specific for the query.
    #[error("'{term}' has {} equally specific definitions", .candidates.len())]
    AmbiguousDefinition { term: String, candidates: Vec<Anchor> },

    /// No definition of the term exists in the map.
    #[error("no definition for '{term}'")]
    UnknownTerm { term: String },

    #[error("page {page} out of range (document has {pages} pages)")]
    PageOutOfRange { page: u32, pages: u32 },

    #[error("unknown section id {0}")]
    UnknownSection(usize),

    #[error("unknown document '{0}'")]
    UnknownDocument(String),

    /// Configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for document map operations.
pub type DocMapResult<T> = Result<T, DocMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_counts_candidates() {
        let err = DocMapError::AmbiguousDefinition {
            term: "Excess Cash".to_string(),
            candidates: vec![
                Anchor::whole_block("doc", 1, 2, 10),
                Anchor::whole_block("doc", 1, 9, 10),
            ],
        };
        assert_eq!(err.to_string(), "'Excess Cash' has 2 equally specific definitions");
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DocMapError = io.into();
        assert!(matches!(err, DocMapError::Io(_)));
    }
}
