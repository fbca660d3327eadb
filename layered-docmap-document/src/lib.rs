//! Document-level primitives for layered-docmap.
//!
//! This crate provides the addressing and error vocabulary shared by the
//! map builder and every traversal call.
//!
//! ## Core Types
//!
//! - [`Anchor`] / [`AnchorRange`] / [`Span`] - Citable positions within a document
//! - [`DocMapError`] - Errors raised by traversal and configuration
//! - [`ProcessResult<T>`] - Values with non-fatal build diagnostics
//!
//! ## Example
//!
//! ```
//! use layered_docmap_document::{Anchor, DocMapError};
//!
//! let anchor = Anchor::new("credit-agreement", 4, 0, 12, Some(2)).unwrap();
//! assert_eq!(anchor.to_string(), "credit-agreement:p2:b4@0..12");
//!
//! let err = Anchor::new("credit-agreement", 4, 9, 3, None).unwrap_err();
//! assert!(matches!(err, DocMapError::InvalidAnchor { .. }));
//! ```

mod anchor;
mod error;
mod process;

pub use anchor::{Anchor, AnchorRange, Span};
pub use error::{DocMapError, DocMapResult};
pub use process::{ProcessError, ProcessResult};
