//! Scanning of `**Related:**` annotation lines.
//!
//! The parser drops these lines from document content; the graph builder
//! needs them back. They are recovered here by a second pass over the raw
//! text so parsing itself stays stateless.

use std::collections::HashMap;

use crate::parser::{marker_payload, raw_sections, split_list, ID_MARKER, RELATED_MARKER};

/// The `Related` ids declared by one section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelatedAnnotation {
    pub section_index: usize,
    pub doc_id: String,
    pub related_ids: Vec<String>,
}

/// Scan one file for `Related` lines, keyed by the owning section's id.
///
/// Every `Related` line in a section contributes, in order. Sections without
/// an id or without any `Related` line produce nothing.
pub fn scan_related(text: &str) -> Vec<RelatedAnnotation> {
    raw_sections(text)
        .filter_map(|(section_index, raw)| {
            let mut doc_id: Option<&str> = None;
            let mut related_ids = Vec::new();
            for line in raw.lines().skip(1) {
                if let Some(payload) = marker_payload(line, ID_MARKER) {
                    if doc_id.is_none() && !payload.is_empty() {
                        doc_id = Some(payload);
                    }
                } else if let Some(payload) = marker_payload(line, RELATED_MARKER) {
                    related_ids.extend(split_list(payload));
                }
            }
            let doc_id = doc_id?;
            if related_ids.is_empty() {
                return None;
            }
            Some(RelatedAnnotation {
                section_index,
                doc_id: doc_id.to_string(),
                related_ids,
            })
        })
        .collect()
}

/// Related ids for every accepted document in a corpus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelatedAnnotations {
    by_doc: HashMap<String, Vec<String>>,
}

impl RelatedAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record related ids for a document, appending to any already present.
    pub fn insert(&mut self, doc_id: impl Into<String>, related_ids: Vec<String>) {
        self.by_doc.entry(doc_id.into()).or_default().extend(related_ids);
    }

    /// Related ids declared by `doc_id`, in declaration order.
    pub fn get(&self, doc_id: &str) -> &[String] {
        self.by_doc.get(doc_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_doc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_doc.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.by_doc.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
