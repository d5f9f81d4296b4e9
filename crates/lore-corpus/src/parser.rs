//! Markdown corpus parsing.
//!
//! A corpus file is a sequence of second-level sections. Everything before
//! the first `## ` heading is preamble and is discarded. Each section looks
//! like:
//!
//! ```text
//! ## Functor
//!
//! **ID:** def-functor-001
//! **Tags:** category, mapping
//! **Type:** definition
//!
//! A functor maps objects and arrows...
//!
//! **Related:** def-category-001
//! ```
//!
//! Parsing is pure: the same text always yields the same documents, and the
//! returned iterators are lazy and can be recreated at will.

use std::iter::{Enumerate, Skip};
use std::str::Split;

use serde::{Deserialize, Serialize};
use tracing::debug;

use lore_core::types::{CorpusDocument, DocType};

/// Separator between sections. The first segment is the file preamble.
pub const SECTION_SEPARATOR: &str = "\n## ";

pub const ID_MARKER: &str = "**ID:**";
pub const TAGS_MARKER: &str = "**Tags:**";
pub const TYPE_MARKER: &str = "**Type:**";
pub const RELATED_MARKER: &str = "**Related:**";

/// A recoverable problem found while parsing one section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseIssue {
    /// `Type` was absent or not a known type; the type was inferred instead.
    UnknownDocType {
        doc_id: String,
        value: Option<String>,
        inferred: Option<DocType>,
    },
    /// A metadata marker was present with nothing after it.
    EmptyMetadata { title: String, marker: String },
}

/// The outcome of parsing one section.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedSection {
    /// Zero-based position of the section within its file, preamble excluded.
    pub index: usize,
    pub title: String,
    /// `None` when the section has no `ID` line and was skipped.
    pub document: Option<CorpusDocument>,
    pub issues: Vec<ParseIssue>,
}

/// Stateless parser for markdown corpus files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusParser;

impl CorpusParser {
    /// Lazily parse the documents in one corpus file.
    pub fn parse<'a>(text: &'a str, source_file: &'a str) -> Documents<'a> {
        Documents {
            sections: Self::sections(text, source_file),
        }
    }

    /// Lazily parse every section, including skipped ones and their issues.
    pub fn sections<'a>(text: &'a str, source_file: &'a str) -> Sections<'a> {
        Sections {
            raw: raw_sections(text),
            source_file,
        }
    }
}

/// Iterator over the raw text of each section, paired with its index.
pub(crate) fn raw_sections(text: &str) -> Enumerate<Skip<Split<'_, &'static str>>> {
    text.split(SECTION_SEPARATOR).skip(1).enumerate()
}

/// If `line` is the given metadata marker, return its trimmed payload.
pub(crate) fn marker_payload<'l>(line: &'l str, marker: &str) -> Option<&'l str> {
    line.trim_start().strip_prefix(marker).map(str::trim)
}

/// Split a comma-separated metadata payload into trimmed, non-empty items.
pub(crate) fn split_list(payload: &str) -> Vec<String> {
    payload
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Lazy iterator over the sections of one file.
pub struct Sections<'a> {
    raw: Enumerate<Skip<Split<'a, &'static str>>>,
    source_file: &'a str,
}

impl Iterator for Sections<'_> {
    type Item = ParsedSection;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, raw) = self.raw.next()?;
        Some(parse_section(index, raw, self.source_file))
    }
}

/// Lazy iterator over the documents of one file.
pub struct Documents<'a> {
    sections: Sections<'a>,
}

impl Iterator for Documents<'_> {
    type Item = CorpusDocument;

    fn next(&mut self) -> Option<Self::Item> {
        self.sections.by_ref().find_map(|section| section.document)
    }
}

fn parse_section(index: usize, raw: &str, source_file: &str) -> ParsedSection {
    let mut lines = raw.lines();
    let title = lines.next().unwrap_or_default().trim().to_string();

    let mut doc_id: Option<String> = None;
    let mut tags: Option<Vec<String>> = None;
    let mut type_value: Option<String> = None;
    let mut content_lines: Vec<&str> = Vec::new();
    let mut issues = Vec::new();

    for line in lines {
        if let Some(payload) = marker_payload(line, ID_MARKER) {
            if doc_id.is_none() {
                if payload.is_empty() {
                    issues.push(ParseIssue::EmptyMetadata {
                        title: title.clone(),
                        marker: ID_MARKER.to_string(),
                    });
                } else {
                    doc_id = Some(payload.to_string());
                }
            }
            continue;
        }
        if let Some(payload) = marker_payload(line, TAGS_MARKER) {
            if tags.is_none() {
                tags = Some(split_list(payload));
            }
            continue;
        }
        if let Some(payload) = marker_payload(line, TYPE_MARKER) {
            if type_value.is_none() {
                if payload.is_empty() {
                    issues.push(ParseIssue::EmptyMetadata {
                        title: title.clone(),
                        marker: TYPE_MARKER.to_string(),
                    });
                } else {
                    type_value = Some(payload.to_string());
                }
            }
            continue;
        }
        if marker_payload(line, RELATED_MARKER).is_some() {
            continue;
        }
        if doc_id.is_some() {
            content_lines.push(line);
        }
    }

    let Some(doc_id) = doc_id else {
        debug!(title = %title, source_file, "Skipping section without an ID");
        return ParsedSection {
            index,
            title,
            document: None,
            issues,
        };
    };

    let doc_type = match type_value.as_deref().map(str::parse::<DocType>) {
        Some(Ok(doc_type)) => doc_type,
        _ => {
            let inferred = DocType::from_id(&doc_id);
            issues.push(ParseIssue::UnknownDocType {
                doc_id: doc_id.clone(),
                value: type_value.clone(),
                inferred,
            });
            inferred.unwrap_or(DocType::Definition)
        }
    };

    let content = trim_blank_lines(&content_lines).join("\n");
    let document = CorpusDocument::new(
        doc_id,
        title.clone(),
        tags.unwrap_or_default(),
        doc_type,
        content,
        source_file,
    );

    ParsedSection {
        index,
        title,
        document: Some(document),
        issues,
    }
}

fn trim_blank_lines<'l>(lines: &'l [&'l str]) -> &'l [&'l str] {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    &lines[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "# Category Theory Corpus

Preamble text that is not a fragment.

## Functor

**ID:** def-functor-001
**Tags:** category, mapping , structure
**Type:** definition

A functor maps objects to objects
and arrows to arrows.

**Related:** def-category-001, law-functor-identity-001

## Notes without an id

Just prose.

## Composition Pattern
**Type:** pattern
**ID:** pattern-compose-001

Compose functors using def-functor-001.
";

    #[test]
    fn test_parses_documents_and_skips_preamble() {
        let docs: Vec<_> = CorpusParser::parse(SAMPLE, "functors.md").collect();
        assert_eq!(docs.len(), 2);

        let functor = &docs[0];
        assert_eq!(functor.doc_id, "def-functor-001");
        assert_eq!(functor.title, "Functor");
        assert_eq!(functor.tags, vec!["category", "mapping", "structure"]);
        assert_eq!(functor.doc_type, DocType::Definition);
        assert_eq!(
            functor.content,
            "A functor maps objects to objects\nand arrows to arrows."
        );
        assert_eq!(functor.source_file, "functors.md");
    }

    #[test]
    fn test_metadata_order_is_free() {
        let docs: Vec<_> = CorpusParser::parse(SAMPLE, "functors.md").collect();
        let pattern = &docs[1];
        assert_eq!(pattern.doc_id, "pattern-compose-001");
        assert_eq!(pattern.doc_type, DocType::Pattern);
        assert!(pattern.tags.is_empty());
        assert_eq!(pattern.content, "Compose functors using def-functor-001.");
    }

    #[test]
    fn test_related_line_not_in_content() {
        let docs: Vec<_> = CorpusParser::parse(SAMPLE, "functors.md").collect();
        assert!(!docs[0].content.contains("Related"));
        assert!(!docs[0].content.contains("law-functor-identity-001"));
    }

    #[test]
    fn test_first_metadata_occurrence_wins() {
        let text = "\n## Dup\n**ID:** law-a-001\n**ID:** law-b-001\n**Type:** law\n**Type:** fix\n**Tags:** x\n**Tags:** y\nbody\n";
        let docs: Vec<_> = CorpusParser::parse(text, "f.md").collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc_id, "law-a-001");
        assert_eq!(docs[0].doc_type, DocType::Law);
        assert_eq!(docs[0].tags, vec!["x"]);
        assert_eq!(docs[0].content, "body");
    }

    #[test]
    fn test_lines_before_id_are_not_content() {
        let text = "\n## T\nintro line\n**ID:** fix-a-001\nafter\n";
        let docs: Vec<_> = CorpusParser::parse(text, "f.md").collect();
        assert_eq!(docs[0].content, "after");
    }

    #[test]
    fn test_section_without_id_is_skipped_not_error() {
        let sections: Vec<_> = CorpusParser::sections(SAMPLE, "functors.md").collect();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].title, "Notes without an id");
        assert!(sections[1].document.is_none());
        assert!(sections[1].issues.is_empty());
    }

    #[test]
    fn test_unknown_type_inferred_from_id() {
        let text = "\n## V\n**ID:** violation-mutation-001\n**Type:** mistake\nbody\n";
        let sections: Vec<_> = CorpusParser::sections(text, "f.md").collect();
        let doc = sections[0].document.as_ref().unwrap();
        assert_eq!(doc.doc_type, DocType::Violation);
        assert_eq!(
            sections[0].issues,
            vec![ParseIssue::UnknownDocType {
                doc_id: "violation-mutation-001".into(),
                value: Some("mistake".into()),
                inferred: Some(DocType::Violation),
            }]
        );
    }

    #[test]
    fn test_missing_type_without_role_defaults_to_definition() {
        let text = "\n## G\n**ID:** glossary-001\nbody\n";
        let sections: Vec<_> = CorpusParser::sections(text, "f.md").collect();
        assert_eq!(
            sections[0].document.as_ref().unwrap().doc_type,
            DocType::Definition
        );
        assert_eq!(sections[0].issues.len(), 1);
    }

    #[test]
    fn test_empty_id_is_reported_and_section_skipped() {
        let text = "\n## E\n**ID:**\nbody\n";
        let sections: Vec<_> = CorpusParser::sections(text, "f.md").collect();
        assert!(sections[0].document.is_none());
        assert!(matches!(
            sections[0].issues[0],
            ParseIssue::EmptyMetadata { .. }
        ));
    }

    #[test]
    fn test_file_with_only_preamble_yields_nothing() {
        assert_eq!(CorpusParser::parse("# Title\n\nNo sections.", "f.md").count(), 0);
        assert_eq!(CorpusParser::parse("", "f.md").count(), 0);
    }

    #[test]
    fn test_crlf_lines_are_handled() {
        let text = "pre\r\n## T\r\n**ID:** def-x-001\r\n**Type:** definition\r\nbody\r\n";
        let docs: Vec<_> = CorpusParser::parse(text, "f.md").collect();
        assert_eq!(docs[0].doc_id, "def-x-001");
        assert_eq!(docs[0].content, "body");
    }

    #[test]
    fn test_interior_blank_lines_preserved() {
        let text = "\n## T\n**ID:** def-x-001\n\n\nfirst\n\nsecond\n\n\n";
        let docs: Vec<_> = CorpusParser::parse(text, "f.md").collect();
        assert_eq!(docs[0].content, "first\n\nsecond");
    }

    proptest! {
        #[test]
        fn prop_parsing_is_deterministic(
            sections in proptest::collection::vec(
                ("[a-z]{1,8}", "[a-z ]{0,30}", 0usize..7),
                0..6,
            )
        ) {
            let mut text = String::from("preamble\n");
            for (i, (slug, body, t)) in sections.iter().enumerate() {
                let doc_type = DocType::ALL[*t];
                text.push_str(&format!(
                    "\n## Section {i}\n**ID:** {}{slug}-{i:03}\n**Type:** {}\n{body}\n",
                    doc_type.id_prefix(),
                    doc_type.as_str()
                ));
            }
            let first: Vec<_> = CorpusParser::parse(&text, "p.md").collect();
            let second: Vec<_> = CorpusParser::parse(&text, "p.md").collect();
            prop_assert_eq!(first.len(), sections.len());
            prop_assert_eq!(first, second);
        }
    }
}
