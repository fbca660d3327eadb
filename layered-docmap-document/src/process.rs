//! Non-fatal diagnostics collected while building a map.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anchor::Anchor;

/// Problems found during a build that do not stop it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ProcessError {
    /// Reference whose target could not be found in the map
    #[error("dangling reference '{reference}' at {location}")]
    DanglingReference { reference: String, location: Anchor },

    /// Seed section that matched no block near its predicted page
    #[error("seed section '{title}' could not be anchored")]
    UnanchoredSeed { title: String, page: Option<u32> },

    /// Heading that skips one or more levels below its parent
    #[error("heading '{label}' at level {level} sits under level {parent_level}")]
    NestingSkip {
        label: String,
        level: u8,
        parent_level: u8,
        location: Anchor,
    },

    /// Heading whose key was already used by an earlier heading
    #[error("duplicate section key '{key}' at {location}")]
    DuplicateSection { key: String, location: Anchor },

    #[error("{0}")]
    Other(String),
}

/// Result wrapper that collects errors without halting processing.
#[derive(Debug)]
pub struct ProcessResult<T> {
    pub value: T,
    pub errors: Vec<ProcessError>,
    pub warnings: Vec<String>,
}

impl<T> ProcessResult<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_errors(value: T, errors: Vec<ProcessError>) -> Self {
        Self {
            value,
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_error(&mut self, error: ProcessError) {
        self.errors.push(error);
    }

    /// Transform the value, keeping the collected diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProcessResult<U> {
        ProcessResult {
            value: f(self.value),
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    /// Move another result's diagnostics into this one and return its value.
    pub fn absorb<U>(&mut self, other: ProcessResult<U>) -> U {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        other.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_result() {
        let mut result = ProcessResult::ok(42);
        assert!(!result.has_errors());

        result.add_error(ProcessError::Other("test error".into()));
        assert!(result.has_errors());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_absorb_merges_diagnostics() {
        let mut outer = ProcessResult::ok(());
        let mut inner = ProcessResult::ok("inner");
        inner.add_warning("no headings found");
        inner.add_error(ProcessError::UnanchoredSeed {
            title: "Events of Default".into(),
            page: Some(40),
        });

        let value = outer.absorb(inner);
        assert_eq!(value, "inner");
        assert_eq!(outer.warnings, vec!["no headings found".to_string()]);
        assert_eq!(outer.errors.len(), 1);
    }

    #[test]
    fn test_dangling_reference_display() {
        let err = ProcessError::DanglingReference {
            reference: "Schedule 5".into(),
            location: Anchor::whole_block("doc", 1, 3, 12),
        };
        assert_eq!(err.to_string(), "dangling reference 'Schedule 5' at doc:p1:b3@0..12");
    }
}
