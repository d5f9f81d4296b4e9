use tracing::{debug, info, warn};

use lore_core::error::Result;
use lore_core::types::{CorpusDocument, EdgeType};
use lore_corpus::RelatedAnnotations;

use crate::graph::{GraphEdge, GraphNode, KnowledgeGraph};
use crate::rules::{rules_for, Orientation, RoleMatcher};

/// Extracts typed nodes and edges from documents.
///
/// Extraction looks at one document at a time, so the resulting edge
/// multiset does not depend on document order beyond edge ordering.
#[derive(Debug, Clone)]
pub struct KnowledgeGraphBuilder {
    matcher: RoleMatcher,
}

impl KnowledgeGraphBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            matcher: RoleMatcher::new()?,
        })
    }

    /// Edges contributed by one document.
    ///
    /// `related_ids` are the ids from the document's `Related` lines; each
    /// yields a `relates_to` edge. Content rules follow in table order.
    pub fn extract_edges(&self, doc: &CorpusDocument, related_ids: &[String]) -> Vec<GraphEdge> {
        let mut edges: Vec<GraphEdge> = related_ids
            .iter()
            .map(|id| GraphEdge::new(&doc.doc_id, id, EdgeType::RelatesTo))
            .collect();

        for rule in rules_for(&doc.doc_id) {
            for found in self.matcher.find_ids(rule.embedded_role, &doc.content) {
                let edge = match rule.orientation {
                    Orientation::FromDocument => GraphEdge::new(&doc.doc_id, found, rule.edge_type),
                    Orientation::ToDocument => GraphEdge::new(found, &doc.doc_id, rule.edge_type),
                };
                edges.push(edge);
            }
        }
        edges
    }

    pub fn build(&self, documents: &[CorpusDocument], related: &RelatedAnnotations) -> KnowledgeGraph {
        let nodes: Vec<GraphNode> = documents.iter().map(GraphNode::from).collect();
        let mut edges = Vec::new();
        for doc in documents {
            let extracted = self.extract_edges(doc, related.get(&doc.doc_id));
            debug!(doc_id = %doc.doc_id, edges = extracted.len(), "Extracted edges");
            edges.extend(extracted);
        }

        let graph = KnowledgeGraph::from_parts(nodes, edges);
        for edge in graph.dangling_edges() {
            warn!(
                source = %edge.source,
                target = %edge.target,
                edge_type = %edge.edge_type,
                "Dangling edge: endpoint does not resolve to a document"
            );
        }
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Knowledge graph built"
        );
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::types::DocType;
    use proptest::prelude::*;

    fn doc(id: &str, doc_type: DocType, content: &str) -> CorpusDocument {
        CorpusDocument::new(id, id, vec![], doc_type, content, "test.md")
    }

    fn sorted(mut edges: Vec<GraphEdge>) -> Vec<GraphEdge> {
        edges.sort();
        edges
    }

    #[test]
    fn test_definition_defines_pattern() {
        let docs = vec![
            doc("def-functor-001", DocType::Definition, "Used by pattern-compose-001."),
            doc("pattern-compose-001", DocType::Pattern, "Builds on def-functor-001."),
        ];
        let graph = KnowledgeGraphBuilder::new()
            .unwrap()
            .build(&docs, &RelatedAnnotations::new());
        assert_eq!(
            graph.edges(),
            [GraphEdge::new("def-functor-001", "pattern-compose-001", EdgeType::Defines)]
        );
    }

    #[test]
    fn test_violation_rules() {
        let builder = KnowledgeGraphBuilder::new().unwrap();
        let violation = doc(
            "violation-mutation-001",
            DocType::Violation,
            "Breaks law-purity-001. Apply fix-copy-001 or fix-freeze-002.",
        );
        let edges = builder.extract_edges(&violation, &[]);
        assert_eq!(
            edges,
            vec![
                GraphEdge::new("violation-mutation-001", "fix-copy-001", EdgeType::Fixes),
                GraphEdge::new("violation-mutation-001", "fix-freeze-002", EdgeType::Fixes),
                GraphEdge::new("violation-mutation-001", "law-purity-001", EdgeType::Violates),
            ]
        );
    }

    #[test]
    fn test_pattern_implements_example() {
        let builder = KnowledgeGraphBuilder::new().unwrap();
        let pattern = doc("pattern-p-001", DocType::Pattern, "See example-e-001.");
        assert_eq!(
            builder.extract_edges(&pattern, &[]),
            vec![GraphEdge::new("pattern-p-001", "example-e-001", EdgeType::Implements)]
        );
    }

    #[test]
    fn test_test_template_verifies_pattern() {
        let builder = KnowledgeGraphBuilder::new().unwrap();
        let test = doc("test-t-001", DocType::TestTemplate, "Checks pattern-p-001 twice: pattern-p-001");
        let edges = builder.extract_edges(&test, &[]);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.edge_type == EdgeType::Verifies));
    }

    #[test]
    fn test_role_comes_from_id_not_type_field() {
        let builder = KnowledgeGraphBuilder::new().unwrap();
        // Declared a law, but the id says violation.
        let odd = doc("violation-x-001", DocType::Law, "law-y-001");
        assert_eq!(builder.extract_edges(&odd, &[])[0].edge_type, EdgeType::Violates);
        // Definitions have no content rules.
        let def = doc("def-x-001", DocType::Definition, "law-y-001 fix-z-001 pattern-q-001");
        assert!(builder.extract_edges(&def, &[]).is_empty());
    }

    #[test]
    fn test_related_annotations_become_relates_to() {
        let mut related = RelatedAnnotations::new();
        related.insert("def-a-001", vec!["law-b-001".into(), "def-missing-001".into()]);
        let docs = vec![
            doc("def-a-001", DocType::Definition, ""),
            doc("law-b-001", DocType::Law, ""),
        ];
        let graph = KnowledgeGraphBuilder::new().unwrap().build(&docs, &related);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dangling_edges().count(), 1);
        assert_eq!(graph.edges_from("def-a-001").count(), 1);
    }

    #[test]
    fn test_build_order_independent_multiset() {
        let builder = KnowledgeGraphBuilder::new().unwrap();
        let docs = vec![
            doc("pattern-p-001", DocType::Pattern, "def-a-001 example-e-001"),
            doc("violation-v-001", DocType::Violation, "law-l-001 fix-f-001"),
            doc("test-t-001", DocType::TestTemplate, "pattern-p-001"),
        ];
        let mut reversed = docs.clone();
        reversed.reverse();

        let a = builder.build(&docs, &RelatedAnnotations::new());
        let b = builder.build(&reversed, &RelatedAnnotations::new());
        assert_eq!(sorted(a.edges().to_vec()), sorted(b.edges().to_vec()));
    }

    proptest! {
        #[test]
        fn prop_extraction_is_idempotent(
            source in prop::sample::select(vec!["violation", "pattern", "test", "def", "law"]),
            mentions in proptest::collection::vec(
                (prop::sample::select(vec!["def", "law", "fix", "example", "pattern", "test"]), "[a-z]{1,6}"),
                0..8,
            ),
        ) {
            let content = mentions
                .iter()
                .map(|(role, slug)| format!("{role}-{slug}-001"))
                .collect::<Vec<_>>()
                .join(" and ");
            let id = format!("{source}-subject-001");
            let document = doc(&id, DocType::from_id(&id).unwrap_or(DocType::Definition), &content);
            let builder = KnowledgeGraphBuilder::new().unwrap();

            let first = builder.build(std::slice::from_ref(&document), &RelatedAnnotations::new());
            let second = builder.build(std::slice::from_ref(&document), &RelatedAnnotations::new());
            prop_assert_eq!(first.edges(), second.edges());
        }
    }
}
