//! Inverted-file index over k-means clusters.

use tracing::debug;

use lore_core::error::Result;
use lore_core::types::{IndexVariant, IndexedVector};

use super::{check_dimensions, ensure_dimension, rank, squared_l2, IndexParams, Neighbor, VectorIndex};

/// Approximate index that partitions vectors into clusters and scans only
/// the clusters nearest the query.
///
/// Must be trained on a vector set before anything is inserted. The cluster
/// count is `min(max_clusters, n / 10)`, at least one.
#[derive(Debug, Clone)]
pub struct ClusteredIndex {
    dimension: usize,
    nprobe: usize,
    centroids: Vec<Vec<f32>>,
    /// Slots of the vectors assigned to each centroid.
    lists: Vec<Vec<usize>>,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// Cluster count for a training set of `n` vectors.
pub fn cluster_count(n: usize, max_clusters: usize) -> usize {
    (n / 10).min(max_clusters).max(1)
}

impl ClusteredIndex {
    /// Run k-means over `training` and return an empty index with the
    /// resulting centroids.
    ///
    /// Initial centroids are evenly spaced picks from the training set and
    /// ties go to the lower centroid, so training is deterministic.
    pub fn train(training: &[IndexedVector], params: &IndexParams) -> Result<Self> {
        let dimension = check_dimensions(training)?;
        let nlist = cluster_count(training.len(), params.max_clusters);

        let mut centroids: Vec<Vec<f32>> = (0..nlist)
            .map(|c| training[c * training.len() / nlist].vector.clone())
            .collect();
        let mut assignment = vec![usize::MAX; training.len()];

        for iteration in 0..params.kmeans_iterations.max(1) {
            let mut changed = false;
            for (slot, v) in training.iter().enumerate() {
                let nearest = nearest_centroid(&centroids, &v.vector);
                if assignment[slot] != nearest {
                    assignment[slot] = nearest;
                    changed = true;
                }
            }
            if !changed {
                debug!(iteration, nlist, "k-means converged");
                break;
            }

            let mut sums = vec![vec![0.0f64; dimension]; nlist];
            let mut counts = vec![0usize; nlist];
            for (slot, v) in training.iter().enumerate() {
                let c = assignment[slot];
                counts[c] += 1;
                for (acc, x) in sums[c].iter_mut().zip(&v.vector) {
                    *acc += *x as f64;
                }
            }
            for (c, centroid) in centroids.iter_mut().enumerate() {
                // An empty cluster keeps its previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                for (dst, acc) in centroid.iter_mut().zip(&sums[c]) {
                    *dst = (*acc / counts[c] as f64) as f32;
                }
            }
        }

        Ok(Self {
            dimension,
            nprobe: params.nprobe.max(1),
            lists: vec![Vec::new(); centroids.len()],
            centroids,
            ids: Vec::new(),
            vectors: Vec::new(),
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }

    /// Centroid indices ordered by distance to `query`.
    fn cluster_visit_order(&self, query: &[f32]) -> Vec<usize> {
        let mut order: Vec<(f32, usize)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(c, centroid)| (squared_l2(query, centroid), c))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        order.into_iter().map(|(_, c)| c).collect()
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_l2(vector, centroid);
        if d < best_distance {
            best = c;
            best_distance = d;
        }
    }
    best
}

impl VectorIndex for ClusteredIndex {
    fn variant(&self) -> IndexVariant {
        IndexVariant::Clustered
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn insert(&mut self, vector: IndexedVector) -> Result<()> {
        ensure_dimension(self.dimension, vector.dimension())?;
        let slot = self.ids.len();
        let cluster = nearest_centroid(&self.centroids, &vector.vector);
        self.lists[cluster].push(slot);
        self.ids.push(vector.doc_id);
        self.vectors.push(vector.vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        ensure_dimension(self.dimension, query.len())?;
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        // Probe the nearest `nprobe` clusters, then keep widening until
        // enough candidates are in hand to fill `k`.
        let mut candidates = Vec::new();
        for (probed, cluster) in self.cluster_visit_order(query).into_iter().enumerate() {
            if probed >= self.nprobe && candidates.len() >= k {
                break;
            }
            candidates.extend(self.lists[cluster].iter().map(|&slot| Neighbor {
                doc_id: self.ids[slot].clone(),
                distance: squared_l2(query, &self.vectors[slot]),
            }));
        }

        Ok(rank(candidates, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<IndexedVector> {
        // Two well separated groups of 50.
        (0..100)
            .map(|i| {
                let base = if i < 50 { 0.0 } else { 100.0 };
                let jitter = (i % 7) as f32 * 0.1;
                IndexedVector::new(format!("v{i:03}"), vec![base + jitter, base - jitter])
            })
            .collect()
    }

    #[test]
    fn test_cluster_count_bounds() {
        assert_eq!(cluster_count(1, 100), 1);
        assert_eq!(cluster_count(9, 100), 1);
        assert_eq!(cluster_count(250, 100), 25);
        assert_eq!(cluster_count(5000, 100), 100);
        assert_eq!(cluster_count(5000, 8), 8);
    }

    #[test]
    fn test_training_is_deterministic() {
        let params = IndexParams::default();
        let a = ClusteredIndex::train(&blobs(), &params).unwrap();
        let b = ClusteredIndex::train(&blobs(), &params).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.cluster_count(), 10);
    }

    #[test]
    fn test_single_cluster_widens_to_fill_k() {
        let params = IndexParams {
            nprobe: 1,
            ..IndexParams::default()
        };
        let vectors = blobs();
        let mut index = ClusteredIndex::train(&vectors, &params).unwrap();
        for v in vectors {
            index.insert(v).unwrap();
        }
        let hits = index.search(&[0.0, 0.0], 100).unwrap();
        assert_eq!(hits.len(), 100);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_before_insert_is_empty() {
        let index = ClusteredIndex::train(&blobs(), &IndexParams::default()).unwrap();
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());
    }
}
