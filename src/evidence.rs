//! Quoting anchored evidence and checking a claim against it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::map::DocumentMap;
use crate::traversal::read_span;
use crate::utils::{collapse_whitespace, truncate_chars, word_tokens};
use crate::Anchor;

const EXCERPT_CHARS: usize = 320;

/// A quoted excerpt and the anchor it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub anchor: Anchor,
    pub excerpt: String,
}

/// Quote each anchor. Anchors that do not dereference in `map` are skipped.
pub fn quote_evidence(map: &DocumentMap, anchors: &[Anchor]) -> Vec<Evidence> {
    anchors
        .iter()
        .filter_map(|anchor| {
            let text = read_span(map, anchor).ok()?;
            Some(Evidence {
                anchor: anchor.clone(),
                excerpt: truncate_chars(&collapse_whitespace(&text), EXCERPT_CHARS).to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    Supported,
    PartiallySupported,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub status: SupportStatus,
    /// Share of the claim's content words found in the evidence, 0.0 to 1.0
    pub score: f64,
    /// Claim words missing from the evidence, in claim order
    pub missing: Vec<String>,
    pub evidence: Vec<Evidence>,
}

/// Check how much of a claim is covered by the text at some anchors.
///
/// Coverage of at least 0.6 is supported, at least 0.3 partially
/// supported. A claim with no content words is never supported.
pub fn consistency_check(map: &DocumentMap, claim: &str, anchors: &[Anchor]) -> ConsistencyReport {
    let evidence = quote_evidence(map, anchors);
    let config = map.config();

    let mut seen = HashSet::new();
    let claim_tokens: Vec<String> = word_tokens(claim)
        .into_iter()
        .filter(|t| !config.is_stop_word(t))
        .filter(|t| seen.insert(t.clone()))
        .collect();

    let evidence_tokens: HashSet<String> = anchors
        .iter()
        .filter_map(|anchor| read_span(map, anchor).ok())
        .flat_map(|text| word_tokens(&text))
        .collect();

    let missing: Vec<String> = claim_tokens
        .iter()
        .filter(|t| !evidence_tokens.contains(*t))
        .cloned()
        .collect();
    let score = if claim_tokens.is_empty() {
        0.0
    } else {
        (claim_tokens.len() - missing.len()) as f64 / claim_tokens.len() as f64
    };
    let status = if claim_tokens.is_empty() {
        SupportStatus::NotSupported
    } else if score >= 0.6 {
        SupportStatus::Supported
    } else if score >= 0.3 {
        SupportStatus::PartiallySupported
    } else {
        SupportStatus::NotSupported
    };

    ConsistencyReport {
        status,
        score,
        missing,
        evidence,
    }
}
