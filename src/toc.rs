//! Seed sections and table-of-contents parsing.
//!
//! A seed is a proposed outline entry: a title, optionally a label such as
//! "Section 6.02", a level and a predicted page. Seeds come from the
//! document's own table of contents or from the caller.

use serde::{Deserialize, Serialize};

use crate::config::DocMapConfig;
use crate::patterns::{match_heading, TOC_LINE};
use crate::segmenter::Block;
use crate::section::SectionSource;

/// A proposed section heading to be anchored in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSection {
    pub title: String,
    /// Heading label, e.g. "Section 6.02" or "ARTICLE VI"
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub level: Option<u8>,
    /// Page where the heading is expected
    #[serde(default)]
    pub page: Option<u32>,
}

impl SeedSection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            label: None,
            level: None,
            page: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Label and title as they would appear in a heading line.
    pub(crate) fn heading_text(&self) -> String {
        match &self.label {
            Some(label) if !self.title.is_empty() => format!("{} {}", label, self.title),
            Some(label) => label.clone(),
            None => self.title.clone(),
        }
    }
}

/// A seed together with where it came from.
#[derive(Debug, Clone)]
pub(crate) struct SourcedSeed {
    pub seed: SeedSection,
    pub source: SectionSource,
}

/// Parse one table-of-contents line into a seed.
pub(crate) fn parse_toc_line(line: &str, config: &DocMapConfig) -> Option<SeedSection> {
    let caps = TOC_LINE.captures(line.trim())?;
    let entry = caps[1].trim();
    let page = caps[2].parse::<u32>().ok();

    let mut seed = match match_heading(entry, true, config) {
        Some(found) if !found.label.is_empty() => {
            let mut seed = SeedSection::new(found.title).with_label(found.label);
            seed.level = found.level;
            seed
        }
        _ => SeedSection::new(entry),
    };
    seed.page = page;
    Some(seed)
}

/// Seeds for every table-of-contents line among the blocks.
pub(crate) fn toc_seeds(blocks: &[Block], config: &DocMapConfig) -> Vec<SeedSection> {
    blocks
        .iter()
        .filter(|block| block.is_single_line())
        .filter_map(|block| parse_toc_line(&block.raw_text, config))
        .collect()
}
