//! Graph-aware refinement of document vectors.
//!
//! A trained graph model can be plugged in behind [`NodeEmbeddingRefiner`].
//! Retrieval never requires one: raw embeddings are always usable.

use std::collections::HashMap;

use tracing::debug;

use lore_core::error::{LoreError, Result};
use lore_core::types::IndexedVector;
use lore_graph::KnowledgeGraph;

use crate::embedding::l2_normalize;

/// Produces refined vectors for graph nodes.
pub trait NodeEmbeddingRefiner: Send + Sync {
    /// Refine `vectors` using the structure of `graph`.
    ///
    /// Returns one vector per input, in input order, same dimension.
    fn refine(&self, graph: &KnowledgeGraph, vectors: &[IndexedVector]) -> Result<Vec<IndexedVector>>;

    fn name(&self) -> &str;
}

/// Message passing by neighbour averaging.
///
/// Each round replaces every vector with the unit-normalised mean of itself
/// and its resolved graph neighbours. Nodes without neighbours, or without a
/// vector, are left unchanged.
#[derive(Debug, Clone)]
pub struct NeighborMeanRefiner {
    rounds: usize,
}

impl Default for NeighborMeanRefiner {
    fn default() -> Self {
        Self { rounds: 1 }
    }
}

impl NeighborMeanRefiner {
    pub fn new(rounds: usize) -> Self {
        Self { rounds }
    }
}

impl NodeEmbeddingRefiner for NeighborMeanRefiner {
    fn refine(&self, graph: &KnowledgeGraph, vectors: &[IndexedVector]) -> Result<Vec<IndexedVector>> {
        let Some(first) = vectors.first() else {
            return Ok(Vec::new());
        };
        let dimension = first.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.dimension() != dimension) {
            return Err(LoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.dimension(),
            });
        }

        let slot: HashMap<&str, usize> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (v.doc_id.as_str(), i))
            .collect();
        let neighbours: Vec<Vec<usize>> = vectors
            .iter()
            .map(|v| {
                graph
                    .neighbors(&v.doc_id)
                    .into_iter()
                    .filter_map(|id| slot.get(id).copied())
                    .collect()
            })
            .collect();

        let mut current: Vec<Vec<f32>> = vectors.iter().map(|v| v.vector.clone()).collect();
        for round in 0..self.rounds {
            let next: Vec<Vec<f32>> = current
                .iter()
                .zip(&neighbours)
                .map(|(own, adjacent)| {
                    if adjacent.is_empty() {
                        return own.clone();
                    }
                    let mut mean = own.clone();
                    for &n in adjacent {
                        for (acc, x) in mean.iter_mut().zip(&current[n]) {
                            *acc += x;
                        }
                    }
                    let count = (adjacent.len() + 1) as f32;
                    for val in &mut mean {
                        *val /= count;
                    }
                    l2_normalize(&mut mean);
                    mean
                })
                .collect();
            current = next;
            debug!(round, "Refinement round complete");
        }

        Ok(vectors
            .iter()
            .zip(current)
            .map(|(v, refined)| IndexedVector::new(v.doc_id.clone(), refined))
            .collect())
    }

    fn name(&self) -> &str {
        "neighbor-mean"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::types::{DocType, EdgeType};
    use lore_graph::{GraphEdge, GraphNode};

    fn graph() -> KnowledgeGraph {
        let node = |id: &str| GraphNode {
            doc_id: id.into(),
            node_type: DocType::Definition,
            tags: vec![],
        };
        KnowledgeGraph::from_parts(
            vec![node("a"), node("b"), node("lonely")],
            vec![GraphEdge::new("a", "b", EdgeType::RelatesTo)],
        )
    }

    #[test]
    fn test_connected_nodes_move_together() {
        let vectors = vec![
            IndexedVector::new("a", vec![1.0, 0.0]),
            IndexedVector::new("b", vec![0.0, 1.0]),
            IndexedVector::new("lonely", vec![0.0, 2.0]),
        ];
        let refined = NeighborMeanRefiner::default().refine(&graph(), &vectors).unwrap();

        let expected = std::f32::consts::FRAC_1_SQRT_2;
        for v in &refined[..2] {
            assert!((v.vector[0] - expected).abs() < 1e-6);
            assert!((v.vector[1] - expected).abs() < 1e-6);
        }
        assert_eq!(refined[2].vector, vec![0.0, 2.0]);
        assert_eq!(refined[2].doc_id, "lonely");
    }

    #[test]
    fn test_zero_rounds_is_identity() {
        let vectors = vec![
            IndexedVector::new("a", vec![1.0, 0.0]),
            IndexedVector::new("b", vec![0.0, 1.0]),
        ];
        let refined = NeighborMeanRefiner::new(0).refine(&graph(), &vectors).unwrap();
        assert_eq!(refined, vectors);
    }

    #[test]
    fn test_ragged_input_is_rejected() {
        let vectors = vec![
            IndexedVector::new("a", vec![1.0, 0.0]),
            IndexedVector::new("b", vec![0.0]),
        ];
        assert!(NeighborMeanRefiner::default().refine(&graph(), &vectors).is_err());
    }
}
