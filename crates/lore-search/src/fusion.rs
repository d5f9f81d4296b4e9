//! Min-max normalisation and weighted score fusion.
//!
//! Semantic and keyword scores live on unrelated scales: negated squared
//! distances on one side, unbounded BM25 sums on the other. Both are
//! normalised over the whole corpus before they are mixed.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Normalised value assigned to every entry when all scores are equal.
pub const DEGENERATE_SCORE: f64 = 0.5;

/// Map every score into `[0, 1]` with `(s - min) / (max - min)`.
///
/// When every score is the same (including the single-entry case) each entry
/// maps to exactly [`DEGENERATE_SCORE`].
pub fn normalize(scores: &HashMap<String, f64>) -> HashMap<String, f64> {
    let (min, max) = scores
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;

    scores
        .iter()
        .map(|(id, &s)| {
            let value = if range > 0.0 && range.is_finite() {
                ((s - min) / range).clamp(0.0, 1.0)
            } else {
                DEGENERATE_SCORE
            };
            (id.clone(), value)
        })
        .collect()
}

/// Combined score of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedScore {
    pub doc_id: String,
    pub combined: f64,
    /// Normalised semantic score, 0 when the document had none.
    pub semantic: f64,
    /// Normalised keyword score, 0 when the document had none.
    pub keyword: f64,
}

/// Fuse two raw score maps, higher is better on both sides.
///
/// Each map is normalised independently, then combined as
/// `alpha * semantic + (1 - alpha) * keyword` over the union of ids. A
/// document missing from one side gets 0 for that side. The result is sorted
/// by descending combined score, ties by ascending `doc_id`.
pub fn fuse(
    semantic: &HashMap<String, f64>,
    keyword: &HashMap<String, f64>,
    alpha: f64,
) -> Vec<FusedScore> {
    let semantic = normalize(semantic);
    let keyword = normalize(keyword);

    let ids: BTreeSet<&String> = semantic.keys().chain(keyword.keys()).collect();
    let mut fused: Vec<FusedScore> = ids
        .into_iter()
        .map(|id| {
            let s = semantic.get(id).copied().unwrap_or(0.0);
            let k = keyword.get(id).copied().unwrap_or(0.0);
            FusedScore {
                doc_id: id.clone(),
                combined: alpha * s + (1.0 - alpha) * k,
                semantic: s,
                keyword: k,
            }
        })
        .collect();

    fused.sort_by(|a, b| by_score_desc(a.combined, &a.doc_id, b.combined, &b.doc_id));
    fused
}

/// Top `k` entries of a score map, descending, ties by ascending `doc_id`.
pub fn top_k(scores: &HashMap<String, f64>, k: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = scores.iter().map(|(id, s)| (id.clone(), *s)).collect();
    ranked.sort_by(|a, b| by_score_desc(a.1, &a.0, b.1, &b.0));
    ranked.truncate(k);
    ranked
}

fn by_score_desc(a_score: f64, a_id: &str, b_score: f64, b_id: &str) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_id.cmp(b_id))
}
