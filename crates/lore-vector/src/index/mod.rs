//! Vector indexes answering k-nearest-neighbour queries.
//!
//! Three interchangeable backends share the [`VectorIndex`] contract:
//!
//! - [`ExactIndex`] scans every stored vector.
//! - [`ClusteredIndex`] probes the nearest k-means clusters only.
//! - [`GraphIndex`] walks a navigable proximity graph.
//!
//! Distance is squared Euclidean everywhere. Results are ordered by
//! ascending distance, ties broken by ascending `doc_id`.

mod clustered;
mod exact;
mod graph;

use std::cmp::Ordering;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::info;

use lore_core::config::IndexConfig;
use lore_core::error::{LoreError, Result};
use lore_core::types::{IndexVariant, IndexedVector};

pub use clustered::ClusteredIndex;
pub use exact::ExactIndex;
pub use graph::GraphIndex;

/// A single hit returned from a vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub doc_id: String,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Tuning knobs for the approximate backends. Ignored by the exact index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    pub max_clusters: usize,
    pub nprobe: usize,
    pub kmeans_iterations: usize,
    pub max_degree: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            max_clusters: 100,
            nprobe: 4,
            kmeans_iterations: 25,
            max_degree: 32,
            ef_construction: 64,
            ef_search: 64,
        }
    }
}

impl From<&IndexConfig> for IndexParams {
    fn from(config: &IndexConfig) -> Self {
        Self {
            max_clusters: config.max_clusters,
            nprobe: config.nprobe,
            kmeans_iterations: config.kmeans_iterations,
            max_degree: config.max_degree,
            ef_construction: config.ef_construction,
            ef_search: config.ef_search,
        }
    }
}

/// Capability shared by every vector index backend.
///
/// Indexes are mutated only while being built. Once handed out behind a
/// shared reference they are read-only and safe to query concurrently.
pub trait VectorIndex: Send + Sync + Debug {
    fn variant(&self) -> IndexVariant;

    /// Dimensionality every stored and query vector must have.
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one vector. Fails on a dimension mismatch.
    fn insert(&mut self, vector: IndexedVector) -> Result<()>;

    /// Return up to `k` nearest neighbours of `query`.
    ///
    /// An empty index yields an empty result. `k` larger than the index
    /// yields every stored vector.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}

/// Build an index of the requested variant over a non-empty vector set.
pub fn build_index(
    vectors: Vec<IndexedVector>,
    variant: IndexVariant,
    params: &IndexParams,
) -> Result<Box<dyn VectorIndex>> {
    let dimension = check_dimensions(&vectors)?;
    let count = vectors.len();

    let mut index: Box<dyn VectorIndex> = match variant {
        IndexVariant::Exact => Box::new(ExactIndex::new(dimension)),
        IndexVariant::Clustered => Box::new(ClusteredIndex::train(&vectors, params)?),
        IndexVariant::Graph => Box::new(GraphIndex::new(dimension, params)),
    };
    for vector in vectors {
        index.insert(vector)?;
    }

    info!(variant = %variant, count, dimension, "Vector index built");
    Ok(index)
}

/// Return the shared dimension of a vector set, rejecting empty or ragged sets.
pub(crate) fn check_dimensions(vectors: &[IndexedVector]) -> Result<usize> {
    let first = vectors.first().ok_or(LoreError::CorpusEmpty)?;
    let expected = first.dimension();
    if expected == 0 {
        return Err(LoreError::InvalidArgument(format!(
            "vector for {} has zero dimensions",
            first.doc_id
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.dimension() != expected) {
        return Err(LoreError::DimensionMismatch {
            expected,
            actual: bad.dimension(),
        });
    }
    Ok(expected)
}

pub(crate) fn ensure_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LoreError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Squared Euclidean distance. Callers guarantee equal lengths.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

pub(crate) fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

/// Sort ascending by distance then doc id, and keep the first `k`.
pub(crate) fn rank(mut hits: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    hits.sort_by(compare_neighbors);
    hits.truncate(k);
    hits
}
