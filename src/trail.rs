//! Reading trail and scratchpad.
//!
//! The traversal functions are stateless. A [`Navigator`] wraps one map and
//! reports every anchor it reads to a [`TrailSink`]; sinks keep or persist
//! the events, the core never does.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::definitions::{DefinitionEntry, DefinitionScope};
use crate::map::DocumentMap;
use crate::reference::CrossReference;
use crate::traversal::{self, SearchHit, SearchScope};
use crate::{Anchor, DocMapError, DocMapResult, Span};

/// One entry of a reading trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrailEvent {
    /// An anchor was read by a traversal operation
    Visit { operation: String, anchor: Anchor },
    /// A note kept under a key, with the anchors that support it
    Finding {
        key: String,
        note: String,
        anchors: Vec<Anchor>,
    },
}

/// Receiver of trail events.
pub trait TrailSink {
    fn record(&mut self, event: TrailEvent) -> DocMapResult<()>;
}

/// In-memory trail: visits are kept once each, in first-visit order;
/// findings are kept by key, later ones replacing earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTrail {
    visits: Vec<(String, Anchor)>,
    seen: HashSet<Anchor>,
    scratchpad: BTreeMap<String, (String, Vec<Anchor>)>,
}

impl MemoryTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visited anchors with the operation that first read them.
    pub fn visits(&self) -> &[(String, Anchor)] {
        &self.visits
    }

    pub fn note(&self, key: &str) -> Option<&str> {
        self.scratchpad.get(key).map(|(note, _)| note.as_str())
    }

    pub fn scratchpad(&self) -> impl Iterator<Item = (&str, &str, &[Anchor])> {
        self.scratchpad
            .iter()
            .map(|(key, (note, anchors))| (key.as_str(), note.as_str(), anchors.as_slice()))
    }
}

impl TrailSink for MemoryTrail {
    fn record(&mut self, event: TrailEvent) -> DocMapResult<()> {
        match event {
            TrailEvent::Visit { operation, anchor } => {
                if self.seen.insert(anchor.clone()) {
                    self.visits.push((operation, anchor));
                }
            }
            TrailEvent::Finding { key, note, anchors } => {
                self.scratchpad.insert(key, (note, anchors));
            }
        }
        Ok(())
    }
}

/// Appends every event as one JSON line.
pub struct JsonLinesTrail<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesTrail<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TrailSink for JsonLinesTrail<W> {
    fn record(&mut self, event: TrailEvent) -> DocMapResult<()> {
        let line = serde_json::to_string(&event).map_err(|e| DocMapError::Serialization(e.to_string()))?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }
}

/// Traversal over one map that records what it reads.
pub struct Navigator<'m, S: TrailSink> {
    map: &'m DocumentMap,
    sink: S,
}

impl<'m, S: TrailSink> Navigator<'m, S> {
    pub fn new(map: &'m DocumentMap, sink: S) -> Self {
        Self { map, sink }
    }

    pub fn map(&self) -> &'m DocumentMap {
        self.map
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn visit(&mut self, operation: &str, anchor: &Anchor) -> DocMapResult<()> {
        self.sink.record(TrailEvent::Visit {
            operation: operation.to_string(),
            anchor: anchor.clone(),
        })
    }

    /// Search; the top hits up to `limit` are recorded.
    pub fn search(&mut self, query: &str, scope: SearchScope, limit: usize) -> DocMapResult<Vec<SearchHit>> {
        let mut hits = traversal::search_in_doc(self.map, query, scope)?;
        hits.truncate(limit);
        for hit in &hits {
            self.visit("search", &hit.anchor)?;
        }
        Ok(hits)
    }

    pub fn read_span(&mut self, span: impl Into<Span>) -> DocMapResult<String> {
        let span = span.into();
        let text = traversal::read_span(self.map, span.clone())?;
        match &span {
            Span::Anchor(anchor) => self.visit("read_span", anchor)?,
            Span::Range(range) => {
                self.visit("read_span", &range.start)?;
                self.visit("read_span", &range.end)?;
            }
        }
        Ok(text)
    }

    pub fn follow_reference(&mut self, reference: &CrossReference) -> DocMapResult<Option<Anchor>> {
        let target = traversal::follow_reference(self.map, reference);
        if let Some(anchor) = &target {
            self.visit("follow_reference", anchor)?;
        }
        Ok(target)
    }

    pub fn read_definition(&mut self, term: &str, scope: DefinitionScope) -> DocMapResult<&'m DefinitionEntry> {
        let entry = traversal::read_definition_in(self.map, term, scope)?;
        self.visit("read_definition", &entry.definition_anchor)?;
        Ok(entry)
    }

    /// Keep a note in the trail under `key`.
    pub fn note(&mut self, key: impl Into<String>, note: impl Into<String>, anchors: Vec<Anchor>) -> DocMapResult<()> {
        self.sink.record(TrailEvent::Finding {
            key: key.into(),
            note: note.into(),
            anchors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::build_doc_map;

    fn sample() -> DocumentMap {
        build_doc_map(
            "doc",
            "Section 1.01 Loans\n\nThe Lenders shall make loans as provided in Section 1.02.\n\nSection 1.02 Interest\n\nInterest accrues daily.",
        )
    }

    #[test]
    fn test_memory_trail_dedups_visits() {
        let map = sample();
        let mut nav = Navigator::new(&map, MemoryTrail::new());
        let anchor = map.block(1).unwrap().anchor.clone();
        nav.read_span(&anchor).unwrap();
        nav.read_span(&anchor).unwrap();

        let reference = map.references()[0].clone();
        let target = nav.follow_reference(&reference).unwrap().unwrap();
        assert_eq!(target.block_index(), 2);

        let trail = nav.into_sink();
        let operations: Vec<&str> = trail.visits().iter().map(|(op, _)| op.as_str()).collect();
        assert_eq!(operations, vec!["read_span", "follow_reference"]);
    }

    #[test]
    fn test_scratchpad_replaces_by_key() {
        let map = sample();
        let mut nav = Navigator::new(&map, MemoryTrail::new());
        nav.note("rate", "daily accrual", vec![]).unwrap();
        nav.note("rate", "daily accrual, 360-day year", vec![]).unwrap();
        assert_eq!(nav.sink().note("rate"), Some("daily accrual, 360-day year"));
        assert_eq!(nav.sink().scratchpad().count(), 1);
    }

    #[test]
    fn test_json_lines_trail() {
        let map = sample();
        let mut nav = Navigator::new(&map, JsonLinesTrail::new(Vec::new()));
        nav.search("interest", SearchScope::Document, 1).unwrap();
        nav.note("k", "v", vec![]).unwrap();

        let out = String::from_utf8(nav.into_sink().into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"kind":"visit","operation":"search","anchor":{"document_id":"doc""#));
        assert_eq!(lines[1], r#"{"kind":"finding","key":"k","note":"v","anchors":[]}"#);
    }
}
