//! Persisted build artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lore_core::types::{CorpusDocument, IndexVariant, IndexedVector};
use lore_corpus::CorpusWarning;
use lore_graph::{GraphEdge, GraphNode};
use lore_lexical::{Bm25Params, LexicalDocument};
use lore_vector::IndexParams;

/// Identity and settings of one index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub index_variant: IndexVariant,
    pub dimension: usize,
    pub document_count: usize,
    /// Name of the embedder that produced the vectors. Queries must use
    /// the same one.
    pub embedder: String,
    pub refiner: Option<String>,
    /// Whether the vector index is built from refined rather than raw vectors.
    pub index_refined: bool,
    pub index_params: IndexParams,
    pub lexical_params: Bm25Params,
    pub warnings: Vec<CorpusWarning>,
}

impl BuildManifest {
    /// Manifest for a build starting now, with a fresh build id.
    pub fn new(index_variant: IndexVariant, dimension: usize, embedder: impl Into<String>) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            index_variant,
            dimension,
            document_count: 0,
            embedder: embedder.into(),
            refiner: None,
            index_refined: false,
            index_params: IndexParams::default(),
            lexical_params: Bm25Params::default(),
            warnings: Vec::new(),
        }
    }
}

/// Everything one build produces.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub manifest: BuildManifest,
    pub documents: Vec<CorpusDocument>,
    pub vectors: Vec<IndexedVector>,
    /// Refined vectors, empty when no refiner ran.
    pub node_embeddings: Vec<IndexedVector>,
    pub lexical: Vec<LexicalDocument>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Artifacts {
    /// The vectors the vector index should be built from.
    pub fn index_vectors(&self) -> &[IndexedVector] {
        if self.manifest.index_refined && !self.node_embeddings.is_empty() {
            &self.node_embeddings
        } else {
            &self.vectors
        }
    }
}

/// Little-endian f32 encoding of a vector.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_vector`]. Returns `None` for a truncated blob.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_blob_encoding() {
        let v = vec![1.0f32, -0.5, f32::MIN_POSITIVE];
        let bytes = encode_vector(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(decode_vector(&bytes).unwrap(), v);
        assert!(decode_vector(&bytes[..5]).is_none());
    }

    #[test]
    fn test_manifest_ids_are_unique() {
        let a = BuildManifest::new(IndexVariant::Exact, 3, "hashing");
        let b = BuildManifest::new(IndexVariant::Exact, 3, "hashing");
        assert_ne!(a.build_id, b.build_id);
    }
}
