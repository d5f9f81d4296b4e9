//! Navigable small-world proximity graph.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::debug;

use lore_core::error::Result;
use lore_core::types::{IndexVariant, IndexedVector};

use super::{ensure_dimension, rank, squared_l2, IndexParams, Neighbor, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    slot: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Approximate index over a single-layer proximity graph.
///
/// Each inserted vector is linked to the nearest nodes found by a beam
/// search, and those nodes link back. Out-degree never exceeds
/// `max_degree`; overfull nodes keep their closest links. No training step.
#[derive(Debug, Clone)]
pub struct GraphIndex {
    dimension: usize,
    max_degree: usize,
    ef_construction: usize,
    ef_search: usize,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    links: Vec<Vec<usize>>,
}

impl GraphIndex {
    pub fn new(dimension: usize, params: &IndexParams) -> Self {
        Self {
            dimension,
            max_degree: params.max_degree.max(2),
            ef_construction: params.ef_construction.max(1),
            ef_search: params.ef_search.max(1),
            ids: Vec::new(),
            vectors: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Largest out-degree currently in the graph.
    pub fn max_out_degree(&self) -> usize {
        self.links.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Greedy beam search from the entry node. Returns up to `ef` nodes,
    /// nearest first, plus the visited mask.
    fn beam_search(&self, query: &[f32], ef: usize) -> (Vec<Candidate>, Vec<bool>) {
        let mut visited = vec![false; self.ids.len()];
        let entry = Candidate {
            distance: squared_l2(query, &self.vectors[0]),
            slot: 0,
        };
        visited[0] = true;

        let mut frontier = BinaryHeap::from([Reverse(entry)]);
        let mut found = BinaryHeap::from([entry]);

        while let Some(Reverse(current)) = frontier.pop() {
            if found.len() >= ef && found.peek().is_some_and(|worst| current.distance > worst.distance) {
                break;
            }
            for &next in &self.links[current.slot] {
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                let candidate = Candidate {
                    distance: squared_l2(query, &self.vectors[next]),
                    slot: next,
                };
                let admits = found.len() < ef
                    || found.peek().is_some_and(|worst| candidate < *worst);
                if admits {
                    frontier.push(Reverse(candidate));
                    found.push(candidate);
                    if found.len() > ef {
                        found.pop();
                    }
                }
            }
        }

        (found.into_sorted_vec(), visited)
    }

    /// Keep only the `max_degree` closest links of `slot`.
    fn prune(&mut self, slot: usize) {
        if self.links[slot].len() <= self.max_degree {
            return;
        }
        let origin = &self.vectors[slot];
        let mut scored: Vec<Candidate> = self.links[slot]
            .iter()
            .map(|&n| Candidate {
                distance: squared_l2(origin, &self.vectors[n]),
                slot: n,
            })
            .collect();
        scored.sort();
        scored.truncate(self.max_degree);
        self.links[slot] = scored.into_iter().map(|c| c.slot).collect();
    }
}

impl VectorIndex for GraphIndex {
    fn variant(&self) -> IndexVariant {
        IndexVariant::Graph
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

        let nearest = if slot == 0 {
            Vec::new()
        } else {
            self.beam_search(&vector.vector, self.ef_construction).0
        };

        self.ids.push(vector.doc_id);
        self.vectors.push(vector.vector);
        let fan_out = (self.max_degree / 2).max(1);
        self.links
            .push(nearest.iter().take(fan_out).map(|c| c.slot).collect());

        for c in nearest.iter().take(fan_out) {
            self.links[c.slot].push(slot);
            self.prune(c.slot);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        ensure_dimension(self.dimension, query.len())?;
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        // A request covering the whole graph is answered by a full scan.
        let candidates: Vec<Neighbor> = if k >= self.ids.len() {
            self.ids
                .iter()
                .zip(&self.vectors)
                .map(|(doc_id, v)| Neighbor {
                    doc_id: doc_id.clone(),
                    distance: squared_l2(query, v),
                })
                .collect()
        } else {
            let (mut found, visited) = self.beam_search(query, self.ef_search.max(k));
            // Pruning can cut every in-link to a node. Fill the shortfall
            // from the slots the walk never reached.
            if found.len() < k {
                let mut unreached: Vec<Candidate> = visited
                    .iter()
                    .enumerate()
                    .filter(|&(_, &seen)| !seen)
                    .map(|(slot, _)| Candidate {
                        distance: squared_l2(query, &self.vectors[slot]),
                        slot,
                    })
                    .collect();
                unreached.sort();
                debug!(
                    reached = found.len(),
                    unreached = unreached.len(),
                    k,
                    "Graph walk short of k, scanning unreached nodes"
                );
                found.extend(unreached.into_iter().take(k - found.len()));
            }
            found
                .into_iter()
                .map(|c| Neighbor {
                    doc_id: self.ids[c.slot].clone(),
                    distance: c.distance,
                })
                .collect()
        };

        Ok(rank(candidates, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ExactIndex;

    fn ring(n: usize) -> Vec<IndexedVector> {
        (0..n)
            .map(|i| {
                let angle = i as f32 / n as f32 * std::f32::consts::TAU;
                IndexedVector::new(format!("r{i:03}"), vec![angle.cos(), angle.sin()])
            })
            .collect()
    }

    #[test]
    fn test_degree_is_bounded() {
        let params = IndexParams {
            max_degree: 4,
            ..IndexParams::default()
        };
        let mut index = GraphIndex::new(2, &params);
        for v in ring(200) {
            index.insert(v).unwrap();
        }
        assert!(index.max_out_degree() <= 4);
    }

    #[test]
    fn test_recall_against_exact() {
        let vectors = ring(300);
        let mut graph = GraphIndex::new(2, &IndexParams::default());
        let mut exact = ExactIndex::new(2);
        for v in vectors {
            graph.insert(v.clone()).unwrap();
            exact.insert(v).unwrap();
        }

        let query = [0.3f32, 0.95];
        let expected: Vec<_> = exact.search(&query, 10).unwrap();
        let got = graph.search(&query, 10).unwrap();
        let overlap = got
            .iter()
            .filter(|n| expected.iter().any(|e| e.doc_id == n.doc_id))
            .count();
        assert!(overlap >= 8, "recall too low: {overlap}/10");
    }

    #[test]
    fn test_full_request_is_exhaustive() {
        let mut index = GraphIndex::new(2, &IndexParams::default());
        for v in ring(20) {
            index.insert(v).unwrap();
        }
        let hits = index.search(&[1.0, 0.0], 20).unwrap();
        assert_eq!(hits.len(), 20);
        assert_eq!(hits[0].doc_id, "r000");
    }

    fn scattered(n: usize) -> Vec<IndexedVector> {
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f32 / (1u64 << 53) as f32
        };
        (0..n)
            .map(|i| IndexedVector::new(format!("p{i:05}"), vec![next(), next()]))
            .collect()
    }

    #[test]
    fn test_low_degree_graph_still_returns_k() {
        let params = IndexParams {
            max_degree: 4,
            ef_construction: 16,
            ef_search: 16,
            ..IndexParams::default()
        };
        let mut index = GraphIndex::new(2, &params);
        for v in scattered(2000) {
            index.insert(v).unwrap();
        }

        for k in [10, 500, 1999] {
            let hits = index.search(&[0.5, 0.5], k).unwrap();
            assert_eq!(hits.len(), k);
            let mut ids: Vec<_> = hits.iter().map(|h| h.doc_id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), k);
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn test_single_node() {
        let mut index = GraphIndex::new(1, &IndexParams::default());
        index.insert(IndexedVector::new("only", vec![2.0])).unwrap();
        let hits = index.search(&[0.0], 1).unwrap();
        assert_eq!(hits, vec![Neighbor { doc_id: "only".into(), distance: 4.0 }]);
    }
}
