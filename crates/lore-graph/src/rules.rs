//! Declarative edge extraction rules.
//!
//! A rule fires for documents whose own id carries `source_role`, and
//! produces one edge per id with `embedded_role` found in the content.
//! An embedded id is the role prefix followed by a slug of word characters
//! and hyphens, not preceded by a word character or hyphen.

use regex::Regex;

use lore_core::error::{LoreError, Result};
use lore_core::types::{DocType, EdgeType};

/// Which way an extracted edge points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// The document points at the embedded id.
    FromDocument,
    /// The embedded id points at the document.
    ToDocument,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionRule {
    pub source_role: DocType,
    pub embedded_role: DocType,
    pub edge_type: EdgeType,
    pub orientation: Orientation,
}

pub const EXTRACTION_RULES: [ExtractionRule; 5] = [
    ExtractionRule {
        source_role: DocType::Violation,
        embedded_role: DocType::Fix,
        edge_type: EdgeType::Fixes,
        orientation: Orientation::FromDocument,
    },
    ExtractionRule {
        source_role: DocType::Violation,
        embedded_role: DocType::Law,
        edge_type: EdgeType::Violates,
        orientation: Orientation::FromDocument,
    },
    ExtractionRule {
        source_role: DocType::Pattern,
        embedded_role: DocType::Definition,
        edge_type: EdgeType::Defines,
        orientation: Orientation::ToDocument,
    },
    ExtractionRule {
        source_role: DocType::Pattern,
        embedded_role: DocType::Example,
        edge_type: EdgeType::Implements,
        orientation: Orientation::FromDocument,
    },
    ExtractionRule {
        source_role: DocType::TestTemplate,
        embedded_role: DocType::Pattern,
        edge_type: EdgeType::Verifies,
        orientation: Orientation::FromDocument,
    },
];

/// Finds embedded ids of each role in free text.
#[derive(Debug, Clone)]
pub struct RoleMatcher {
    /// One pattern per entry of `DocType::ALL`.
    patterns: Vec<(DocType, Regex)>,
}

impl RoleMatcher {
    pub fn new() -> Result<Self> {
        let patterns = DocType::ALL
            .into_iter()
            .map(|role| {
                let source = format!(r"(?:^|[^\w-])({}[\w-]+)", regex::escape(role.id_prefix()));
                Regex::new(&source)
                    .map(|re| (role, re))
                    .map_err(|e| LoreError::Config(format!("invalid id pattern for {}: {}", role, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Every id carrying `role` in `text`, in order of appearance.
    ///
    /// Repeated mentions are returned repeatedly. Trailing hyphens are not
    /// part of an id.
    pub fn find_ids<'t>(&self, role: DocType, text: &'t str) -> Vec<&'t str> {
        let Some((_, re)) = self.patterns.iter().find(|(r, _)| *r == role) else {
            return Vec::new();
        };
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches('-'))
            .filter(|id| id.len() > role.id_prefix().len())
            .collect()
    }
}

/// Rules that apply to a document with the given id.
pub fn rules_for(doc_id: &str) -> impl Iterator<Item = &'static ExtractionRule> {
    let role = DocType::from_id(doc_id);
    EXTRACTION_RULES
        .iter()
        .filter(move |rule| Some(rule.source_role) == role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_ids_in_order_with_repeats() {
        let matcher = RoleMatcher::new().unwrap();
        let text = "Uses law-identity-001 and law-composition-002; see law-identity-001.";
        assert_eq!(
            matcher.find_ids(DocType::Law, text),
            vec!["law-identity-001", "law-composition-002", "law-identity-001"]
        );
    }

    #[test]
    fn test_role_inside_other_id_is_not_matched() {
        let matcher = RoleMatcher::new().unwrap();
        let text = "pattern-test-harness-001 and undef-x and (test-real-001)";
        assert_eq!(matcher.find_ids(DocType::TestTemplate, text), vec!["test-real-001"]);
        assert!(matcher.find_ids(DocType::Definition, text).is_empty());
    }

    #[test]
    fn test_trailing_hyphen_and_bare_prefix() {
        let matcher = RoleMatcher::new().unwrap();
        assert_eq!(matcher.find_ids(DocType::Fix, "apply fix-clone- now"), vec!["fix-clone"]);
        assert!(matcher.find_ids(DocType::Fix, "a fix- b fix--").is_empty());
    }

    #[test]
    fn test_match_at_line_start() {
        let matcher = RoleMatcher::new().unwrap();
        assert_eq!(
            matcher.find_ids(DocType::Example, "example-a-001\nexample-b-002"),
            vec!["example-a-001", "example-b-002"]
        );
    }

    #[test]
    fn test_rules_keyed_on_id_prefix() {
        let violation: Vec<_> = rules_for("violation-mutate-001").map(|r| r.edge_type).collect();
        assert_eq!(violation, vec![EdgeType::Fixes, EdgeType::Violates]);
        let pattern: Vec<_> = rules_for("pattern-compose-001").map(|r| r.edge_type).collect();
        assert_eq!(pattern, vec![EdgeType::Defines, EdgeType::Implements]);
        let test: Vec<_> = rules_for("test-compose-001").map(|r| r.edge_type).collect();
        assert_eq!(test, vec![EdgeType::Verifies]);
        assert_eq!(rules_for("def-functor-001").count(), 0);
        assert_eq!(rules_for("glossary-1").count(), 0);
    }
}
