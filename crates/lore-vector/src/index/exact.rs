use lore_core::error::Result;
use lore_core::types::{IndexVariant, IndexedVector};

use super::{ensure_dimension, rank, squared_l2, Neighbor, VectorIndex};

/// Brute-force index. Every search computes the distance to every vector.
///
/// Vectors are stored in one flat buffer with a stride of `dimension`.
#[derive(Debug, Clone)]
pub struct ExactIndex {
    dimension: usize,
    ids: Vec<String>,
    data: Vec<f32>,
}

impl ExactIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    fn vector(&self, slot: usize) -> &[f32] {
        &self.data[slot * self.dimension..(slot + 1) * self.dimension]
    }
}

impl VectorIndex for ExactIndex {
    fn variant(&self) -> IndexVariant {
        IndexVariant::Exact
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn insert(&mut self, vector: IndexedVector) -> Result<()> {
        ensure_dimension(self.dimension, vector.dimension())?;
        self.ids.push(vector.doc_id);
        self.data.extend_from_slice(&vector.vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        ensure_dimension(self.dimension, query.len())?;
        let hits = self
            .ids
            .iter()
            .enumerate()
            .map(|(slot, doc_id)| Neighbor {
                doc_id: doc_id.clone(),
                distance: squared_l2(query, self.vector(slot)),
            })
            .collect();
        Ok(rank(hits, k))
    }
}
