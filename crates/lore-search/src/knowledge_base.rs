//! Query-time view of one build: retriever, graph and manifest.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use lore_core::config::SearchConfig;
use lore_core::error::{LoreError, Result};
use lore_core::types::{CorpusDocument, DocType, IndexVariant, RelatedRef};
use lore_graph::{GraphStats, KnowledgeGraph};
use lore_lexical::Bm25Index;
use lore_storage::{ArtifactRepository, Artifacts, BuildManifest};
use lore_vector::{build_index, DynEmbedder};

use crate::pipeline::BuildOutput;
use crate::retriever::{DocumentTable, HybridRetriever};
use crate::session::QuerySession;

/// Counts and identity of the current build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub index_variant: IndexVariant,
    pub dimension: usize,
    pub embedder: String,
    pub refiner: Option<String>,
    pub index_refined: bool,
    pub documents: usize,
    pub documents_by_type: BTreeMap<DocType, usize>,
    pub vocabulary_size: usize,
    pub avg_doc_len: f64,
    pub graph: GraphStats,
    pub warnings: usize,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build:      {}", self.build_id)?;
        writeln!(f, "Built at:   {}", self.built_at.to_rfc3339())?;
        writeln!(f, "Index:      {} ({} dims)", self.index_variant, self.dimension)?;
        match &self.refiner {
            Some(refiner) if self.index_refined => {
                writeln!(f, "Embedder:   {} (refined by {})", self.embedder, refiner)?
            }
            Some(refiner) => writeln!(f, "Embedder:   {} ({} vectors stored)", self.embedder, refiner)?,
            None => writeln!(f, "Embedder:   {}", self.embedder)?,
        }
        writeln!(f, "Documents:  {}", self.documents)?;
        for (doc_type, count) in &self.documents_by_type {
            writeln!(f, "  {:<14} {}", doc_type.as_str(), count)?;
        }
        writeln!(
            f,
            "Vocabulary: {} terms, avg length {:.1}",
            self.vocabulary_size, self.avg_doc_len
        )?;
        writeln!(
            f,
            "Graph:      {} nodes, {} edges ({} dangling)",
            self.graph.node_count, self.graph.edge_count, self.graph.dangling_edges
        )?;
        for (edge_type, count) in &self.graph.edges_by_type {
            writeln!(f, "  {:<14} {}", edge_type.as_str(), count)?;
        }
        write!(f, "Warnings:   {}", self.warnings)
    }
}

/// Loaded indexes ready to answer queries.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    manifest: BuildManifest,
    retriever: HybridRetriever,
    graph: Arc<KnowledgeGraph>,
}

impl KnowledgeBase {
    /// Load the current build from the store.
    ///
    /// The vector index is rebuilt from stored vectors with the variant and
    /// parameters recorded in the manifest. Fails with `IndexNotBuilt` when
    /// the store holds no build.
    pub fn open(repository: &ArtifactRepository, embedder: Arc<dyn DynEmbedder>) -> Result<Self> {
        let artifacts = repository.load()?;
        Self::from_artifacts(artifacts, embedder)
    }

    pub fn from_artifacts(artifacts: Artifacts, embedder: Arc<dyn DynEmbedder>) -> Result<Self> {
        let index = build_index(
            artifacts.index_vectors().to_vec(),
            artifacts.manifest.index_variant,
            &artifacts.manifest.index_params,
        )?;
        let lexical = Bm25Index::from_documents(artifacts.lexical, artifacts.manifest.lexical_params);
        let graph = KnowledgeGraph::from_parts(artifacts.nodes, artifacts.edges);

        let retriever = HybridRetriever::new(
            Arc::from(index),
            Arc::new(lexical),
            Arc::new(DocumentTable::new(artifacts.documents)),
            embedder,
        )?;

        info!(
            build_id = %artifacts.manifest.build_id,
            documents = retriever.documents().len(),
            variant = %artifacts.manifest.index_variant,
            "Knowledge base loaded"
        );

        Ok(Self {
            manifest: artifacts.manifest,
            retriever,
            graph: Arc::new(graph),
        })
    }

    /// Use a fresh build directly, without a round trip through the store.
    pub fn from_build(output: BuildOutput, embedder: Arc<dyn DynEmbedder>) -> Result<Self> {
        let BuildOutput {
            artifacts,
            index,
            lexical,
            graph,
            ..
        } = output;
        let retriever = HybridRetriever::new(
            index,
            lexical,
            Arc::new(DocumentTable::new(artifacts.documents)),
            embedder,
        )?;
        Ok(Self {
            manifest: artifacts.manifest,
            retriever,
            graph,
        })
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.retriever = self.retriever.with_embed_timeout(timeout);
        self
    }

    /// Fail unless the build was embedded by the embedder named `name`.
    ///
    /// Loading only checks dimensions, not names.
    pub fn require_embedder(&self, name: &str) -> Result<()> {
        if self.manifest.embedder != name {
            return Err(LoreError::EmbedderMismatch {
                built: self.manifest.embedder.clone(),
                configured: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn document(&self, doc_id: &str) -> Option<&CorpusDocument> {
        self.retriever.documents().get(doc_id)
    }

    /// Resolved typed neighbours of a document, outgoing first.
    pub fn related(&self, doc_id: &str) -> Vec<RelatedRef> {
        self.graph.related(doc_id)
    }

    /// A new session with defaults from `config`.
    pub fn session(&self, config: &SearchConfig) -> Result<QuerySession> {
        QuerySession::new(self.clone(), config)
    }

    pub fn stats(&self) -> IndexStats {
        let mut documents_by_type = BTreeMap::new();
        for doc in self.retriever.documents().documents() {
            *documents_by_type.entry(doc.doc_type).or_default() += 1;
        }
        let lexical = self.retriever.lexical();

        IndexStats {
            build_id: self.manifest.build_id,
            built_at: self.manifest.built_at,
            index_variant: self.manifest.index_variant,
            dimension: self.manifest.dimension,
            embedder: self.manifest.embedder.clone(),
            refiner: self.manifest.refiner.clone(),
            index_refined: self.manifest.index_refined,
            documents: self.retriever.documents().len(),
            documents_by_type,
            vocabulary_size: lexical.vocabulary_size(),
            avg_doc_len: lexical.avg_doc_len(),
            graph: self.graph.stats(),
            warnings: self.manifest.warnings.len(),
        }
    }
}
