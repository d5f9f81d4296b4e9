use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoreError;

// =============================================================================
// Enums
// =============================================================================

/// The role of a knowledge fragment, shared by documents and graph nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// A definition of a concept.
    Definition,
    /// A law the concept must satisfy.
    Law,
    /// A reusable pattern built from definitions.
    Pattern,
    /// A known violation of a law.
    Violation,
    /// A fix for a violation.
    Fix,
    /// A worked example.
    Example,
    /// A test template verifying a pattern.
    TestTemplate,
}

impl DocType {
    /// Every document type, in declaration order.
    pub const ALL: [DocType; 7] = [
        DocType::Definition,
        DocType::Law,
        DocType::Pattern,
        DocType::Violation,
        DocType::Fix,
        DocType::Example,
        DocType::TestTemplate,
    ];

    /// The canonical name used in corpus `Type` lines and persisted artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Definition => "definition",
            DocType::Law => "law",
            DocType::Pattern => "pattern",
            DocType::Violation => "violation",
            DocType::Fix => "fix",
            DocType::Example => "example",
            DocType::TestTemplate => "test_template",
        }
    }

    /// The id prefix that marks a document as carrying this role.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            DocType::Definition => "def-",
            DocType::Law => "law-",
            DocType::Pattern => "pattern-",
            DocType::Violation => "violation-",
            DocType::Fix => "fix-",
            DocType::Example => "example-",
            DocType::TestTemplate => "test-",
        }
    }

    /// Infer the role carried by a document id from its prefix.
    pub fn from_id(doc_id: &str) -> Option<DocType> {
        DocType::ALL
            .into_iter()
            .find(|t| doc_id.starts_with(t.id_prefix()))
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        DocType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| LoreError::InvalidArgument(format!("unknown document type: {}", s)))
    }
}

/// The relationship carried by a knowledge graph edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Defines,
    Requires,
    Verifies,
    Violates,
    Fixes,
    Implements,
    RelatesTo,
    Uses,
}

impl EdgeType {
    /// Every edge type, in declaration order.
    pub const ALL: [EdgeType; 8] = [
        EdgeType::Defines,
        EdgeType::Requires,
        EdgeType::Verifies,
        EdgeType::Violates,
        EdgeType::Fixes,
        EdgeType::Implements,
        EdgeType::RelatesTo,
        EdgeType::Uses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Defines => "defines",
            EdgeType::Requires => "requires",
            EdgeType::Verifies => "verifies",
            EdgeType::Violates => "violates",
            EdgeType::Fixes => "fixes",
            EdgeType::Implements => "implements",
            EdgeType::RelatesTo => "relates_to",
            EdgeType::Uses => "uses",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        EdgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| LoreError::InvalidArgument(format!("unknown edge type: {}", s)))
    }
}

/// Which vector index backend to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexVariant {
    /// Brute-force squared Euclidean distance against every vector.
    #[default]
    Exact,
    /// Inverted-file index over k-means clusters.
    Clustered,
    /// Navigable proximity graph with bounded out-degree.
    Graph,
}

impl IndexVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexVariant::Exact => "exact",
            IndexVariant::Clustered => "clustered",
            IndexVariant::Graph => "graph",
        }
    }
}

impl fmt::Display for IndexVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexVariant {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" | "flat" => Ok(IndexVariant::Exact),
            "clustered" | "ivf" => Ok(IndexVariant::Clustered),
            "graph" | "hnsw" => Ok(IndexVariant::Graph),
            other => Err(LoreError::InvalidArgument(format!(
                "unknown index variant: {}",
                other
            ))),
        }
    }
}

/// Inverse document frequency formula used by the BM25 index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdfVariant {
    /// `ln((N - n + 0.5) / (n + 0.5))` with negative values floored to
    /// `epsilon * mean_idf`.
    #[default]
    Okapi,
    /// `ln(1 + (N - n + 0.5) / (n + 0.5))`, never negative.
    Lucene,
}

/// The kind of query, without parameters. Used for session defaults and
/// for tagging result records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryModeKind {
    Semantic,
    Keyword,
    #[default]
    Hybrid,
}

impl QueryModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryModeKind::Semantic => "semantic",
            QueryModeKind::Keyword => "keyword",
            QueryModeKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for QueryModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryModeKind {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "semantic" => Ok(QueryModeKind::Semantic),
            "keyword" => Ok(QueryModeKind::Keyword),
            "hybrid" => Ok(QueryModeKind::Hybrid),
            _ => Err(LoreError::UnknownQueryMode(s.to_string())),
        }
    }
}

/// A fully-specified query mode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryMode {
    Semantic,
    Keyword,
    /// Weighted fusion: `alpha` on the semantic side, `1 - alpha` on the keyword side.
    Hybrid { alpha: f64 },
}

impl QueryMode {
    /// Build a hybrid mode, rejecting weights outside `[0, 1]`.
    pub fn hybrid(alpha: f64) -> Result<Self, LoreError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(LoreError::InvalidArgument(format!(
                "alpha must be within [0, 1], got {}",
                alpha
            )));
        }
        Ok(QueryMode::Hybrid { alpha })
    }

    /// Combine a mode kind with the hybrid weight to use if it is hybrid.
    pub fn from_kind(kind: QueryModeKind, alpha: f64) -> Result<Self, LoreError> {
        match kind {
            QueryModeKind::Semantic => Ok(QueryMode::Semantic),
            QueryModeKind::Keyword => Ok(QueryMode::Keyword),
            QueryModeKind::Hybrid => QueryMode::hybrid(alpha),
        }
    }

    pub fn kind(&self) -> QueryModeKind {
        match self {
            QueryMode::Semantic => QueryModeKind::Semantic,
            QueryMode::Keyword => QueryModeKind::Keyword,
            QueryMode::Hybrid { .. } => QueryModeKind::Hybrid,
        }
    }
}

/// Direction of a relation relative to the document it is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

// =============================================================================
// Structs
// =============================================================================

/// One atomic knowledge fragment parsed from a corpus file.
///
/// Immutable once constructed; `content_hash` is derived from `content` and
/// used for change detection only, never for identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub doc_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub doc_type: DocType,
    pub content: String,
    pub source_file: String,
    pub content_hash: String,
}

impl CorpusDocument {
    pub fn new(
        doc_id: impl Into<String>,
        title: impl Into<String>,
        tags: Vec<String>,
        doc_type: DocType,
        content: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let content_hash = content_hash(&content);
        Self {
            doc_id: doc_id.into(),
            title: title.into(),
            tags,
            doc_type,
            content,
            source_file: source_file.into(),
            content_hash,
        }
    }

    /// Text handed to the embedder: title, a blank line, then content.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.content)
    }

    /// Text tokenized by the lexical index: title, tags, then content.
    pub fn lexical_text(&self) -> String {
        format!("{} {} {}", self.title, self.tags.join(" "), self.content)
    }
}

/// Hex BLAKE3 digest of a document's content.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// A document vector produced by an embedder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub doc_id: String,
    pub vector: Vec<f32>,
}

impl IndexedVector {
    pub fn new(doc_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            doc_id: doc_id.into(),
            vector,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A typed neighbour attached to a search result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRef {
    pub doc_id: String,
    pub edge_type: EdgeType,
    pub direction: Direction,
}

/// One ranked record returned by the query surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub title: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub score: f64,
    pub mode: QueryModeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedRef>,
    #[serde(skip)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_round_trip_names() {
        for t in DocType::ALL {
            assert_eq!(t.as_str().parse::<DocType>().unwrap(), t);
        }
        assert_eq!("Test-Template".parse::<DocType>().unwrap(), DocType::TestTemplate);
        assert!("glossary".parse::<DocType>().is_err());
    }

    #[test]
    fn test_doc_type_from_id_prefix() {
        assert_eq!(DocType::from_id("def-functor-001"), Some(DocType::Definition));
        assert_eq!(DocType::from_id("test-compose-001"), Some(DocType::TestTemplate));
        assert_eq!(DocType::from_id("violation-mutation-002"), Some(DocType::Violation));
        assert_eq!(DocType::from_id("glossary-001"), None);
        // The role is a prefix, not a substring.
        assert_eq!(DocType::from_id("prefix-thing"), None);
    }

    #[test]
    fn test_edge_type_names() {
        assert_eq!(EdgeType::RelatesTo.as_str(), "relates_to");
        assert_eq!("relates_to".parse::<EdgeType>().unwrap(), EdgeType::RelatesTo);
        assert!("knows".parse::<EdgeType>().is_err());
    }

    #[test]
    fn test_query_mode_kind_parse_fails_fast() {
        assert_eq!("Hybrid".parse::<QueryModeKind>().unwrap(), QueryModeKind::Hybrid);
        let err = "vector".parse::<QueryModeKind>().unwrap_err();
        assert!(matches!(err, LoreError::UnknownQueryMode(m) if m == "vector"));
    }

    #[test]
    fn test_hybrid_alpha_bounds() {
        assert!(QueryMode::hybrid(0.0).is_ok());
        assert!(QueryMode::hybrid(1.0).is_ok());
        assert!(QueryMode::hybrid(1.01).is_err());
        assert!(QueryMode::hybrid(-0.1).is_err());
        assert!(QueryMode::hybrid(f64::NAN).is_err());
    }

    #[test]
    fn test_query_mode_from_kind() {
        assert_eq!(
            QueryMode::from_kind(QueryModeKind::Keyword, 0.3).unwrap(),
            QueryMode::Keyword
        );
        assert_eq!(
            QueryMode::from_kind(QueryModeKind::Hybrid, 0.3).unwrap(),
            QueryMode::Hybrid { alpha: 0.3 }
        );
    }

    #[test]
    fn test_index_variant_aliases() {
        assert_eq!("flat".parse::<IndexVariant>().unwrap(), IndexVariant::Exact);
        assert_eq!("IVF".parse::<IndexVariant>().unwrap(), IndexVariant::Clustered);
        assert_eq!("hnsw".parse::<IndexVariant>().unwrap(), IndexVariant::Graph);
        assert!("lsh".parse::<IndexVariant>().is_err());
    }

    #[test]
    fn test_document_hash_tracks_content() {
        let a = CorpusDocument::new("def-a-001", "A", vec![], DocType::Definition, "body", "a.md");
        let b = CorpusDocument::new("def-b-001", "B", vec![], DocType::Law, "body", "b.md");
        let c = CorpusDocument::new("def-a-001", "A", vec![], DocType::Definition, "other", "a.md");
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.content_hash, c.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn test_document_texts() {
        let doc = CorpusDocument::new(
            "def-functor-001",
            "Functor",
            vec!["category".into(), "map".into()],
            DocType::Definition,
            "Maps arrows.",
            "functors.md",
        );
        assert_eq!(doc.embedding_text(), "Functor\n\nMaps arrows.");
        assert_eq!(doc.lexical_text(), "Functor category map Maps arrows.");
    }

    #[test]
    fn test_search_result_serializes_type_field() {
        let result = SearchResult {
            doc_id: "law-identity-001".into(),
            title: "Identity".into(),
            tags: vec![],
            doc_type: DocType::Law,
            score: 0.5,
            mode: QueryModeKind::Keyword,
            semantic_score: None,
            keyword_score: None,
            related: vec![],
            content: "hidden".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "law");
        assert_eq!(json["mode"], "keyword");
        assert!(json.get("semantic_score").is_none());
        assert!(json.get("content").is_none());
    }
}
