//! Splitting normalized text into ordered, anchored blocks.
//!
//! A block is a blank-line-delimited paragraph, except that heading-like
//! lines always stand alone and a line opening a `"Term" means` definition
//! always starts a new block. `[PAGE n]` marker lines end the current page
//! and never appear in block text.

use serde::{Deserialize, Serialize};

use crate::config::DocMapConfig;
use crate::patterns::{is_heading_like, opens_definition, PAGE_MARKER};
use crate::Anchor;

/// A paragraph-like unit of text with its address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Whole-block anchor
    pub anchor: Anchor,
    /// Block text; lines joined with `\n`
    pub raw_text: String,
    /// 1-based line number of the block's first line in the normalized text
    pub line_number: usize,
}

impl Block {
    pub fn index(&self) -> usize {
        self.anchor.block_index()
    }

    pub fn page(&self) -> u32 {
        self.anchor.page()
    }

    pub fn first_line(&self) -> &str {
        self.raw_text.lines().next().unwrap_or("")
    }

    pub fn is_single_line(&self) -> bool {
        !self.raw_text.contains('\n')
    }
}

/// Normalize raw text: unify line endings, turn every non-newline
/// whitespace character into a plain space, collapse runs of spaces and
/// trim each line.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    for (i, line) in unified.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let mut pending_space = false;
        for c in line.chars() {
            if c.is_whitespace() || c == '\u{200B}' {
                pending_space = true;
                continue;
            }
            if pending_space && !out.is_empty() && !out.ends_with('\n') {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// Pure, deterministic block splitter.
pub struct Segmenter<'c> {
    config: &'c DocMapConfig,
}

struct Pending {
    lines: Vec<String>,
    line_number: usize,
    page: u32,
}

impl<'c> Segmenter<'c> {
    pub fn new(config: &'c DocMapConfig) -> Self {
        Self { config }
    }

    /// Split text into blocks. The text is normalized first.
    ///
    /// Always returns at least one block; empty input yields a single empty
    /// block so every map has something for its root to span.
    pub fn segment(&self, document_id: &str, raw: &str) -> Vec<Block> {
        let text = normalize_text(raw);
        let mut blocks = Vec::new();
        let mut pending: Option<Pending> = None;
        let mut page: u32 = 1;
        let mut page_has_content = false;

        for (idx, line) in text.split('\n').enumerate() {
            let line_number = idx + 1;

            if self.config.split_pages && PAGE_MARKER.is_match(line) {
                self.flush(document_id, &mut pending, &mut blocks);
                if page_has_content {
                    page += 1;
                    page_has_content = false;
                }
                continue;
            }

            if line.is_empty() {
                self.flush(document_id, &mut pending, &mut blocks);
                continue;
            }
            page_has_content = true;

            if is_heading_like(line, self.config) {
                self.flush(document_id, &mut pending, &mut blocks);
                pending = Some(Pending {
                    lines: vec![line.to_string()],
                    line_number,
                    page,
                });
                self.flush(document_id, &mut pending, &mut blocks);
                continue;
            }

            if opens_definition(line) {
                self.flush(document_id, &mut pending, &mut blocks);
            }

            match pending.as_mut() {
                Some(open) => open.lines.push(line.to_string()),
                None => {
                    pending = Some(Pending {
                        lines: vec![line.to_string()],
                        line_number,
                        page,
                    })
                }
            }
        }
        self.flush(document_id, &mut pending, &mut blocks);

        if blocks.is_empty() {
            blocks.push(Block {
                anchor: Anchor::whole_block(document_id, 1, 0, 0),
                raw_text: String::new(),
                line_number: 1,
            });
        }
        blocks
    }

    fn flush(&self, document_id: &str, pending: &mut Option<Pending>, blocks: &mut Vec<Block>) {
        if let Some(open) = pending.take() {
            let raw_text = open.lines.join("\n");
            blocks.push(Block {
                anchor: Anchor::whole_block(document_id, open.page, blocks.len(), raw_text.len()),
                raw_text,
                line_number: open.line_number,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        let config = DocMapConfig::default();
        Segmenter::new(&config)
            .segment("doc", input)
            .into_iter()
            .map(|b| b.raw_text)
            .collect()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(normalize_text("  Section\u{00A0}\u{00A0}1.01\tTerms  "), "Section 1.01 Terms");
        assert_eq!(normalize_text("x\n\n  y"), "x\n\ny");
    }

    #[test]
    fn test_blank_lines_split_paragraphs() {
        assert_eq!(
            texts("first line\nstill first\n\nsecond"),
            vec!["first line\nstill first", "second"]
        );
    }

    #[test]
    fn test_headings_stand_alone() {
        assert_eq!(
            texts("ARTICLE II\nCOVENANTS\nSection 2.01 Financial Covenants\nBorrower shall pay."),
            vec!["ARTICLE II", "COVENANTS", "Section 2.01 Financial Covenants", "Borrower shall pay."]
        );
    }

    #[test]
    fn test_definitions_start_blocks() {
        let input = "\"Agent\" means the administrative agent\nnamed above.\n\"Borrower\" means Acme.";
        assert_eq!(
            texts(input),
            vec!["\"Agent\" means the administrative agent\nnamed above.", "\"Borrower\" means Acme."]
        );
    }

    #[test]
    fn test_page_markers() {
        let config = DocMapConfig::default();
        let blocks = Segmenter::new(&config).segment("doc", "one\n[PAGE 1]\ntwo\n\n[PAGE 2]\n\nthree");
        let pages: Vec<_> = blocks.iter().map(|b| (b.raw_text.as_str(), b.page())).collect();
        assert_eq!(pages, vec![("one", 1), ("two", 2), ("three", 3)]);
        assert_eq!(blocks[2].line_number, 7);
    }

    #[test]
    fn test_leading_marker_does_not_skip_a_page() {
        let config = DocMapConfig::default();
        let blocks = Segmenter::new(&config).segment("doc", "[PAGE 1]\nalpha\n[PAGE 2]\nbeta");
        assert_eq!(blocks[0].page(), 1);
        assert_eq!(blocks[1].page(), 2);
    }

    #[test]
    fn test_empty_input_has_one_block() {
        let config = DocMapConfig::default();
        let blocks = Segmenter::new(&config).segment("doc", "");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].raw_text, "");
        assert_eq!(blocks[0].anchor.len(), 0);
    }

    #[test]
    fn test_anchors_cover_whole_blocks() {
        let config = DocMapConfig::default();
        let blocks = Segmenter::new(&config).segment("doc", "alpha\n\nbeta gamma");
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.index(), i);
            assert_eq!(block.anchor.char_start(), 0);
            assert_eq!(block.anchor.char_end(), block.raw_text.len());
        }
    }
}
