use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LoreError, Result};
use crate::types::{IdfVariant, IndexVariant, QueryModeKind};

/// Top-level configuration for lore.
///
/// Loaded from `~/.lore/config.toml` by default. Each section corresponds
/// to one stage of the build or query path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoreConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl LoreConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoreConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make a build or query ill-defined.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(LoreError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(LoreError::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }
        if self.index.max_clusters == 0 || self.index.nprobe == 0 {
            return Err(LoreError::Config(
                "index.max_clusters and index.nprobe must be positive".to_string(),
            ));
        }
        if self.index.max_degree < 2 {
            return Err(LoreError::Config(
                "index.max_degree must be at least 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lexical.b) {
            return Err(LoreError::Config(format!(
                "lexical.b must be within [0, 1], got {}",
                self.lexical.b
            )));
        }
        if self.lexical.k1.is_nan() || self.lexical.k1 < 0.0 {
            return Err(LoreError::Config(format!(
                "lexical.k1 must be non-negative, got {}",
                self.lexical.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.search.alpha) {
            return Err(LoreError::Config(format!(
                "search.alpha must be within [0, 1], got {}",
                self.search.alpha
            )));
        }
        if self.search.default_k == 0 {
            return Err(LoreError::Config(
                "search.default_k must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The data directory with a leading `~` expanded to the home directory.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Location of the SQLite artifact store inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join("lore.db")
    }
}

/// Expand `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the artifact store.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.lore/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where the corpus lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory scanned for corpus files.
    pub dir: String,
    /// File extension of corpus files, without the dot.
    pub extension: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: "corpus".to_string(),
            extension: "md".to_string(),
        }
    }
}

/// Embedder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Output dimensionality of the built-in hashing embedder.
    pub dimensions: usize,
    /// Per-call timeout for embedding requests, in milliseconds.
    pub timeout_ms: u64,
    /// Number of documents sent per batch at build time.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            timeout_ms: 5_000,
            batch_size: 32,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Which backend to build: exact, clustered or graph.
    pub variant: IndexVariant,
    /// Upper bound on k-means clusters for the clustered variant.
    pub max_clusters: usize,
    /// Clusters probed per query before widening.
    pub nprobe: usize,
    /// Lloyd iterations during clustered training.
    pub kmeans_iterations: usize,
    /// Out-degree bound of the proximity graph.
    pub max_degree: usize,
    /// Beam width while inserting into the proximity graph.
    pub ef_construction: usize,
    /// Beam width while searching the proximity graph.
    pub ef_search: usize,
    /// Build the vector index from graph-refined vectors when available.
    pub use_refined_vectors: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            variant: IndexVariant::Exact,
            max_clusters: 100,
            nprobe: 4,
            kmeans_iterations: 25,
            max_degree: 32,
            ef_construction: 64,
            ef_search: 64,
            use_refined_vectors: false,
        }
    }
}

/// BM25 settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// Term frequency saturation.
    pub k1: f64,
    /// Document length normalization.
    pub b: f64,
    /// IDF formula.
    pub idf: IdfVariant,
    /// Floor factor for negative Okapi IDF values.
    pub okapi_epsilon: f64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            idf: IdfVariant::Okapi,
            okapi_epsilon: 0.25,
        }
    }
}

/// Query defaults for new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_mode: QueryModeKind,
    pub default_k: usize,
    /// Semantic weight for hybrid queries.
    pub alpha: f64,
    pub show_content: bool,
    /// Attach typed graph neighbours to each result.
    pub expand_relations: bool,
    /// Maximum characters of content shown per result.
    pub content_preview_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_mode: QueryModeKind::Hybrid,
            default_k: 5,
            alpha: 0.5,
            show_content: false,
            expand_relations: false,
            content_preview_chars: 200,
        }
    }
}
