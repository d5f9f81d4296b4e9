//! Hybrid retriever: semantic, keyword and fused queries over built indexes.
//!
//! The retriever is read-only once constructed. Clones share the same
//! indexes, so any number of sessions can query concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use lore_core::error::{LoreError, Result};
use lore_core::types::{CorpusDocument, QueryMode, QueryModeKind, SearchResult};
use lore_lexical::Bm25Index;
use lore_vector::{DynEmbedder, VectorIndex};

use crate::fusion;
use crate::outcome::QueryOutcome;

/// Default timeout for one query embedding.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(5);

/// Documents in corpus order with an id lookup.
#[derive(Debug, Clone, Default)]
pub struct DocumentTable {
    documents: Vec<CorpusDocument>,
    positions: HashMap<String, usize>,
}

impl DocumentTable {
    pub fn new(documents: Vec<CorpusDocument>) -> Self {
        let positions = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.doc_id.clone(), i))
            .collect();
        Self {
            documents,
            positions,
        }
    }

    pub fn get(&self, doc_id: &str) -> Option<&CorpusDocument> {
        self.positions.get(doc_id).map(|&i| &self.documents[i])
    }

    pub fn documents(&self) -> &[CorpusDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Answers queries against one vector index and one BM25 index built over
/// the same documents.
#[derive(Clone)]
pub struct HybridRetriever {
    index: Arc<dyn VectorIndex>,
    lexical: Arc<Bm25Index>,
    documents: Arc<DocumentTable>,
    embedder: Arc<dyn DynEmbedder>,
    embed_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        lexical: Arc<Bm25Index>,
        documents: Arc<DocumentTable>,
        embedder: Arc<dyn DynEmbedder>,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(LoreError::IndexNotBuilt("no documents are indexed".to_string()));
        }
        if embedder.dimensions() != index.dimension() {
            return Err(LoreError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimensions(),
            });
        }
        Ok(Self {
            index,
            lexical,
            documents,
            embedder,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        })
    }

    /// Set the per-query embedding timeout.
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    pub fn documents(&self) -> &DocumentTable {
        &self.documents
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn lexical(&self) -> &Bm25Index {
        &self.lexical
    }

    /// Embed the query text, bounded by the configured timeout.
    ///
    /// Any failure of the embedder, including a timeout, is reported as
    /// `EmbedderUnavailable`.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match tokio::time::timeout(self.embed_timeout, self.embedder.embed_boxed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(e)) => Err(LoreError::EmbedderUnavailable(e.to_string())),
            Err(_) => Err(LoreError::EmbedderUnavailable(format!(
                "embedding timed out after {} ms",
                self.embed_timeout.as_millis()
            ))),
        }
    }

    /// Nearest documents to the query embedding. Score is `1 / (1 + distance)`.
    pub async fn query_semantic(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query = self.embed_query(text).await?;
        let neighbors = self.index.search(&query, k)?;
        debug!(k, hits = neighbors.len(), "Semantic query");

        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                let score = 1.0 / (1.0 + n.distance as f64);
                self.result(&n.doc_id, score, QueryModeKind::Semantic, None)
            })
            .collect())
    }

    /// BM25 ranking over every document, zero scores included.
    pub fn query_keyword(&self, text: &str, k: usize) -> Vec<SearchResult> {
        let scores = self.lexical.score_text(text);
        debug!(k, "Keyword query");
        fusion::top_k(&scores, k)
            .into_iter()
            .filter_map(|(id, score)| self.result(&id, score, QueryModeKind::Keyword, None))
            .collect()
    }

    /// Weighted fusion of full-corpus semantic and keyword scores.
    pub async fn query_hybrid(&self, text: &str, k: usize, alpha: f64) -> Result<Vec<SearchResult>> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(LoreError::InvalidArgument(format!(
                "alpha must be within [0, 1], got {}",
                alpha
            )));
        }
        let query = self.embed_query(text).await?;
        let semantic = self.semantic_scores(&query)?;
        let keyword = self.lexical.score_text(text);

        let fused = fusion::fuse(&semantic, &keyword, alpha);
        debug!(k, alpha, candidates = fused.len(), "Hybrid query");

        Ok(fused
            .into_iter()
            .take(k)
            .filter_map(|f| {
                self.result(
                    &f.doc_id,
                    f.combined,
                    QueryModeKind::Hybrid,
                    Some((f.semantic, f.keyword)),
                )
            })
            .collect())
    }

    /// Run a query in `mode`, falling back to keyword ranking when the
    /// embedder is unavailable.
    pub async fn run(&self, text: &str, mode: QueryMode, k: usize) -> Result<QueryOutcome> {
        let attempt = match mode {
            QueryMode::Keyword => Ok(self.query_keyword(text, k)),
            QueryMode::Semantic => self.query_semantic(text, k).await,
            QueryMode::Hybrid { alpha } => self.query_hybrid(text, k, alpha).await,
        };

        let mut outcome = QueryOutcome {
            query: text.to_string(),
            requested: mode,
            results: Vec::new(),
            degraded: false,
            warnings: Vec::new(),
        };

        match attempt {
            Ok(results) => outcome.results = results,
            Err(LoreError::EmbedderUnavailable(reason)) => {
                warn!(mode = %mode.kind(), reason = %reason, "Embedder unavailable, using keyword ranking");
                outcome.results = self.query_keyword(text, k);
                outcome.degraded = true;
                outcome.warnings.push(format!(
                    "{} search unavailable ({}); showing keyword results",
                    mode.kind(),
                    reason
                ));
            }
            Err(e) => return Err(e),
        }
        Ok(outcome)
    }

    /// Negated squared distance for every indexed document.
    fn semantic_scores(&self, query: &[f32]) -> Result<HashMap<String, f64>> {
        let neighbors = self.index.search(query, self.index.len())?;
        Ok(neighbors
            .into_iter()
            .map(|n| (n.doc_id, -(n.distance as f64)))
            .collect())
    }

    fn result(
        &self,
        doc_id: &str,
        score: f64,
        mode: QueryModeKind,
        breakdown: Option<(f64, f64)>,
    ) -> Option<SearchResult> {
        let Some(doc) = self.documents.get(doc_id) else {
            warn!(doc_id = %doc_id, "Ranked id missing from document table");
            return None;
        };
        Some(SearchResult {
            doc_id: doc.doc_id.clone(),
            title: doc.title.clone(),
            tags: doc.tags.clone(),
            doc_type: doc.doc_type,
            score,
            mode,
            semantic_score: breakdown.map(|(s, _)| s),
            keyword_score: breakdown.map(|(_, k)| k),
            related: Vec::new(),
            content: doc.content.clone(),
        })
    }
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("index", &self.index)
            .field("documents", &self.documents.len())
            .field("embed_timeout", &self.embed_timeout)
            .finish()
    }
}
