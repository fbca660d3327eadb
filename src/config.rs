//! Map-building configuration.
//!
//! [`DocMapConfig`] decides which heading, definition and reference patterns
//! are active, how ambiguous definitions are settled, and the tunables used
//! by search and summaries. The compiled regexes themselves are process-wide
//! statics in [`crate::patterns`]; the config only switches them on or off.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{DocMapError, DocMapResult};

/// Heading families recognized at the start of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingPattern {
    /// "ARTICLE I", "Article 2 - Definitions"
    Article,
    /// "Section 6.02 Restricted Payments", "§ 4.1"
    Section,
    /// "6.02 Restricted Payments" (at least one dot)
    NumberedHeading,
    /// "6.02(a)" and "Section 6.02(a)"; without it those lines stay body text
    Subsection,
    /// "Exhibit A", "Annex I", "Appendix 2"
    Exhibit,
    /// "Schedule 1.01"
    Schedule,
    /// Short all-caps lines, or short title-cased lines that stand alone
    Caption,
}

/// Definition shapes the extractor looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionPattern {
    /// `"Term" means ...` / `"Term" shall mean ...`
    QuotedMeans,
    /// `ABC Corp. (the "Borrower")`
    Parenthetical,
    /// `Term means ...` with a short capitalized term and no quotes
    Unquoted,
}

/// Reference shapes the resolver looks for, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePattern {
    /// "Section 6.02(a)", "Sections 2.01 and 2.02", "Article III"
    Section,
    /// "this Section", "this Article"
    Relative,
    /// A quoted phrase naming a defined term
    QuotedTerm,
    /// "Exhibit A", "Schedule 5", "Annex I"
    Exhibit,
    /// "the Security Agreement"
    External,
    /// Unquoted occurrences of defined terms
    BareTerm,
}

/// What `read_definition` does when candidates are equally specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionTieBreak {
    /// Report `AmbiguousDefinition`
    Strict,
    /// Return the first entry in document order and list the others
    FirstEncountered,
}

impl Default for DefinitionTieBreak {
    fn default() -> Self {
        DefinitionTieBreak::Strict
    }
}

/// Configuration for building and querying document maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocMapConfig {
    /// Active heading patterns
    pub heading_patterns: Vec<HeadingPattern>,
    /// Active definition patterns
    pub definition_patterns: Vec<DefinitionPattern>,
    /// Active reference patterns; earlier entries claim overlapping text first
    pub reference_patterns: Vec<ReferencePattern>,
    /// Maximum words in a caption line
    pub caption_max_words: usize,
    /// Sections whose title contains this (case-insensitive) hold document-wide definitions
    pub definitions_section_marker: String,
    /// Tie-break for equally specific definitions
    pub tie_break: DefinitionTieBreak,
    /// Width of search snippets, in characters
    pub snippet_chars: usize,
    /// Split pages on `[PAGE n]` marker lines
    pub split_pages: bool,
    /// Turn table-of-contents lines into seed sections
    pub use_toc: bool,
    /// Pages searched on either side of a seed's predicted page
    pub toc_search_radius: u32,
    /// Tokens that mark a sentence as a key event in section summaries
    pub key_event_tokens: Vec<String>,
    /// Query words ignored by token scoring
    pub stop_words: Vec<String>,
}

impl Default for DocMapConfig {
    fn default() -> Self {
        Self::credit_agreement()
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl DocMapConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for long credit agreements and indentures.
    pub fn credit_agreement() -> Self {
        Self {
            heading_patterns: vec![
                HeadingPattern::Article,
                HeadingPattern::Section,
                HeadingPattern::NumberedHeading,
                HeadingPattern::Subsection,
                HeadingPattern::Exhibit,
                HeadingPattern::Schedule,
                HeadingPattern::Caption,
            ],
            definition_patterns: vec![DefinitionPattern::QuotedMeans],
            reference_patterns: vec![
                ReferencePattern::Section,
                ReferencePattern::Relative,
                ReferencePattern::QuotedTerm,
                ReferencePattern::Exhibit,
                ReferencePattern::External,
            ],
            caption_max_words: 8,
            definitions_section_marker: "definition".to_string(),
            tie_break: DefinitionTieBreak::Strict,
            snippet_chars: 160,
            split_pages: true,
            use_toc: true,
            toc_search_radius: 2,
            key_event_tokens: words(&[
                "covenant",
                "default",
                "maturity",
                "interest",
                "payment",
                "ratio",
                "margin",
                "liquidity",
                "leverage",
            ]),
            stop_words: words(&[
                "a", "an", "and", "any", "are", "as", "be", "by", "do", "does", "for", "how", "in",
                "is", "of", "on", "or", "the", "to", "what", "when", "where", "which", "with",
            ]),
        }
    }

    /// Settings for short compliance certificates.
    ///
    /// Certificates rarely have articles or a table of contents, define terms
    /// by reference to the underlying agreement, and cite its sections.
    pub fn compliance_certificate() -> Self {
        Self {
            heading_patterns: vec![
                HeadingPattern::Section,
                HeadingPattern::NumberedHeading,
                HeadingPattern::Schedule,
                HeadingPattern::Caption,
            ],
            definition_patterns: vec![DefinitionPattern::QuotedMeans, DefinitionPattern::Parenthetical],
            use_toc: false,
            tie_break: DefinitionTieBreak::FirstEncountered,
            key_event_tokens: words(&["compliance", "covenant", "ratio", "default", "certify"]),
            ..Self::credit_agreement()
        }
    }

    /// Parse a config from TOML. Missing keys take their default.
    pub fn from_toml_str(source: &str) -> DocMapResult<Self> {
        toml::from_str(source).map_err(|e| DocMapError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> DocMapResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Render this config as TOML.
    pub fn to_toml_string(&self) -> DocMapResult<String> {
        toml::to_string(self).map_err(|e| DocMapError::Serialization(e.to_string()))
    }

    /// Replace the heading patterns.
    pub fn with_heading_patterns(mut self, patterns: Vec<HeadingPattern>) -> Self {
        self.heading_patterns = patterns;
        self
    }

    /// Replace the definition patterns.
    pub fn with_definition_patterns(mut self, patterns: Vec<DefinitionPattern>) -> Self {
        self.definition_patterns = patterns;
        self
    }

    /// Replace the reference patterns. Order is priority order.
    pub fn with_reference_patterns(mut self, patterns: Vec<ReferencePattern>) -> Self {
        self.reference_patterns = patterns;
        self
    }

    pub fn with_tie_break(mut self, tie_break: DefinitionTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    pub fn with_page_splitting(mut self, split: bool) -> Self {
        self.split_pages = split;
        self
    }

    /// Enable or disable table-of-contents seeding.
    pub fn with_toc(mut self, use_toc: bool) -> Self {
        self.use_toc = use_toc;
        self
    }

    pub fn with_caption_max_words(mut self, words: usize) -> Self {
        self.caption_max_words = words;
        self
    }

    pub fn has_heading(&self, pattern: HeadingPattern) -> bool {
        self.heading_patterns.contains(&pattern)
    }

    pub fn has_definition(&self, pattern: DefinitionPattern) -> bool {
        self.definition_patterns.contains(&pattern)
    }

    pub fn has_reference(&self, pattern: ReferencePattern) -> bool {
        self.reference_patterns.contains(&pattern)
    }

    pub(crate) fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.iter().any(|w| w == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_credit_agreement() {
        let config = DocMapConfig::default();
        assert_eq!(config, DocMapConfig::credit_agreement());
        assert!(config.has_heading(HeadingPattern::Caption));
        assert!(!config.has_reference(ReferencePattern::BareTerm));
        assert_eq!(config.tie_break, DefinitionTieBreak::Strict);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DocMapConfig::from_toml_str(
            r#"
            tie_break = "first_encountered"
            snippet_chars = 80
            reference_patterns = ["section", "bare_term"]
            "#,
        )
        .unwrap();
        assert_eq!(config.tie_break, DefinitionTieBreak::FirstEncountered);
        assert_eq!(config.snippet_chars, 80);
        assert_eq!(
            config.reference_patterns,
            vec![ReferencePattern::Section, ReferencePattern::BareTerm]
        );
        assert_eq!(config.caption_max_words, 8);
        assert!(config.use_toc);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = DocMapConfig::from_toml_str("tie_break = \"sometimes\"").unwrap_err();
        assert!(matches!(err, DocMapError::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DocMapConfig::compliance_certificate();
        let text = config.to_toml_string().unwrap();
        assert_eq!(DocMapConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DocMapConfig::from_toml_file("/nonexistent/docmap.toml").unwrap_err();
        assert!(matches!(err, DocMapError::Io(_)));
    }

    #[test]
    fn test_builder_setters() {
        let config = DocMapConfig::new()
            .with_tie_break(DefinitionTieBreak::FirstEncountered)
            .with_toc(false)
            .with_page_splitting(false)
            .with_snippet_chars(40)
            .with_caption_max_words(4);
        assert_eq!(config.caption_max_words, 4);
        assert!(!config.use_toc);
        assert!(!config.split_pages);
        assert_eq!(config.snippet_chars, 40);
    }
}
