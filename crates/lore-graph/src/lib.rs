//! Lore graph crate - typed knowledge graph extracted from cross-references.

pub mod builder;
pub mod graph;
pub mod rules;

pub use builder::KnowledgeGraphBuilder;
pub use graph::{GraphEdge, GraphNode, GraphStats, KnowledgeGraph};
pub use rules::{ExtractionRule, Orientation, RoleMatcher, EXTRACTION_RULES};
