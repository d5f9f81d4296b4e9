//! Index build pipeline.
//!
//! Turns a parsed corpus into every query-time artifact:
//! 1. Embedding of each document (the only async step)
//! 2. BM25 statistics, knowledge graph and vector index, built concurrently
//! 3. Optional graph refinement of the vectors
//!
//! Each build step owns its inputs and writes its own artifact, so the steps
//! share no mutable state.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use lore_core::config::LoreConfig;
use lore_core::error::{LoreError, Result};
use lore_core::types::{CorpusDocument, IndexVariant, IndexedVector};
use lore_corpus::{Corpus, CorpusWarning};
use lore_graph::{KnowledgeGraph, KnowledgeGraphBuilder};
use lore_lexical::{Bm25Index, Bm25Params};
use lore_storage::{ArtifactRepository, Artifacts, BuildManifest};
use lore_vector::{build_index, embed_documents, DynEmbedder, IndexParams, NodeEmbeddingRefiner, VectorIndex};

/// Settings for one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub variant: IndexVariant,
    pub index_params: IndexParams,
    pub lexical_params: Bm25Params,
    pub batch_size: usize,
    /// Build the vector index from refined vectors when a refiner is set.
    pub use_refined_vectors: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            variant: IndexVariant::Exact,
            index_params: IndexParams::default(),
            lexical_params: Bm25Params::default(),
            batch_size: 32,
            use_refined_vectors: false,
        }
    }
}

impl From<&LoreConfig> for BuildOptions {
    fn from(config: &LoreConfig) -> Self {
        Self {
            variant: config.index.variant,
            index_params: IndexParams::from(&config.index),
            lexical_params: Bm25Params::from(&config.lexical),
            batch_size: config.embedding.batch_size,
            use_refined_vectors: config.index.use_refined_vectors,
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub documents: usize,
    pub dimension: usize,
    pub variant: IndexVariant,
    pub vocabulary_size: usize,
    pub edges: usize,
    pub dangling_edges: usize,
    pub refined: bool,
    pub warnings: Vec<CorpusWarning>,
    pub elapsed_ms: u64,
}

impl BuildReport {
    pub fn duplicate_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, CorpusWarning::DuplicateDocumentId { .. }))
            .count()
    }
}

/// Everything a build produced, ready to save or to query directly.
#[derive(Debug)]
pub struct BuildOutput {
    pub artifacts: Artifacts,
    pub index: Arc<dyn VectorIndex>,
    pub lexical: Arc<Bm25Index>,
    pub graph: Arc<KnowledgeGraph>,
    pub report: BuildReport,
}

impl BuildOutput {
    /// Persist the artifacts, replacing any previous build.
    pub fn save(&self, repository: &ArtifactRepository) -> Result<()> {
        repository.save(&self.artifacts)
    }
}

/// Builds every index over a corpus.
pub struct IndexBuilder {
    embedder: Arc<dyn DynEmbedder>,
    embedder_name: String,
    refiner: Option<Arc<dyn NodeEmbeddingRefiner>>,
    options: BuildOptions,
}

impl IndexBuilder {
    /// `embedder_name` is recorded in the manifest so queries can check they
    /// use the same embedder.
    pub fn new(
        embedder: Arc<dyn DynEmbedder>,
        embedder_name: impl Into<String>,
        options: BuildOptions,
    ) -> Self {
        Self {
            embedder,
            embedder_name: embedder_name.into(),
            refiner: None,
            options,
        }
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn NodeEmbeddingRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Load every corpus file in `dir` and build.
    pub async fn build_dir(&self, dir: &Path, extension: &str) -> Result<BuildOutput> {
        let dir = dir.to_path_buf();
        let extension = extension.to_string();
        let corpus = join(tokio::task::spawn_blocking(move || Corpus::load_dir(&dir, &extension))).await?;
        self.build(corpus).await
    }

    pub async fn build(&self, corpus: Corpus) -> Result<BuildOutput> {
        let started = Instant::now();
        let (documents, related, warnings) = corpus.into_parts();
        if documents.is_empty() {
            return Err(LoreError::CorpusEmpty);
        }
        for warning in &warnings {
            warn!(%warning, "Corpus warning");
        }

        let vectors = embed_documents(self.embedder.as_ref(), &documents, self.options.batch_size).await?;
        let dimension = vectors.first().map(IndexedVector::dimension).unwrap_or(0);
        info!(documents = documents.len(), dimension, "Documents embedded");

        let documents = Arc::new(documents);

        let lexical_task = {
            let documents = Arc::clone(&documents);
            let params = self.options.lexical_params;
            tokio::task::spawn_blocking(move || Ok(Bm25Index::build(&documents, params)))
        };
        let graph_task = {
            let documents = Arc::clone(&documents);
            tokio::task::spawn_blocking(move || {
                let builder = KnowledgeGraphBuilder::new()?;
                Ok(builder.build(&documents, &related))
            })
        };

        let refine_first = self.options.use_refined_vectors && self.refiner.is_some();
        let (lexical, graph, raw_index) = if refine_first {
            let (lexical, graph) = tokio::try_join!(join(lexical_task), join(graph_task))?;
            (lexical, graph, None)
        } else {
            let index_task = self.spawn_index_build(vectors.clone());
            let (lexical, graph, index) =
                tokio::try_join!(join(lexical_task), join(graph_task), join(index_task))?;
            (lexical, graph, Some(index))
        };
        let graph = Arc::new(graph);

        let node_embeddings = match &self.refiner {
            Some(refiner) => {
                let refined = refiner.refine(&graph, &vectors)?;
                info!(refiner = refiner.name(), vectors = refined.len(), "Vectors refined");
                refined
            }
            None => Vec::new(),
        };

        let index = match raw_index {
            Some(index) => index,
            None => join(self.spawn_index_build(node_embeddings.clone())).await?,
        };

        let mut manifest = BuildManifest::new(self.options.variant, dimension, self.embedder_name.clone());
        manifest.document_count = documents.len();
        manifest.refiner = self.refiner.as_ref().map(|r| r.name().to_string());
        manifest.index_refined = refine_first;
        manifest.index_params = self.options.index_params.clone();
        manifest.lexical_params = self.options.lexical_params;
        manifest.warnings = warnings;

        let graph_stats = graph.stats();
        let report = BuildReport {
            build_id: manifest.build_id,
            documents: documents.len(),
            dimension,
            variant: self.options.variant,
            vocabulary_size: lexical.vocabulary_size(),
            edges: graph_stats.edge_count,
            dangling_edges: graph_stats.dangling_edges,
            refined: !node_embeddings.is_empty(),
            warnings: manifest.warnings.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        let documents: Vec<CorpusDocument> = Arc::try_unwrap(documents).unwrap_or_else(|shared| (*shared).clone());
        let artifacts = Artifacts {
            manifest,
            documents,
            vectors,
            node_embeddings,
            lexical: lexical.documents().to_vec(),
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().to_vec(),
        };

        info!(
            build_id = %report.build_id,
            documents = report.documents,
            edges = report.edges,
            dangling = report.dangling_edges,
            warnings = report.warnings.len(),
            elapsed_ms = report.elapsed_ms,
            "Build complete"
        );

        Ok(BuildOutput {
            artifacts,
            index: Arc::from(index),
            lexical: Arc::new(lexical),
            graph,
            report,
        })
    }

    fn spawn_index_build(&self, vectors: Vec<IndexedVector>) -> JoinHandle<Result<Box<dyn VectorIndex>>> {
        let variant = self.options.variant;
        let params = self.options.index_params.clone();
        tokio::task::spawn_blocking(move || build_index(vectors, variant, &params))
    }
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| LoreError::Task(format!("build task failed: {}", e)))?
}
