//! CLI argument definitions for the `lore` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lore_core::config::LoreConfig;
use lore_core::types::{IndexVariant, QueryModeKind};

/// lore: hybrid semantic and keyword retrieval over a typed Markdown corpus.
#[derive(Parser, Debug)]
#[command(name = "lore", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the artifact store.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the effective configuration to the config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Parse the corpus and rebuild every index.
    Build {
        /// Corpus directory.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Vector index variant: exact, clustered or graph.
        #[arg(long, value_parser = parse_variant)]
        variant: Option<IndexVariant>,

        /// Build the vector index from graph-refined vectors.
        #[arg(long)]
        refine: bool,
    },

    /// Run a single query.
    Query {
        text: String,

        /// semantic, keyword or hybrid.
        #[arg(short = 'm', long, value_parser = parse_mode)]
        mode: Option<QueryModeKind>,

        /// Number of results.
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Semantic weight for hybrid queries.
        #[arg(short = 'a', long)]
        alpha: Option<f64>,

        #[arg(long)]
        show_content: bool,

        /// Attach typed graph neighbours to each result.
        #[arg(long)]
        related: bool,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one stored document and the documents within `hops` links of it.
    Show {
        id: String,

        #[arg(long, default_value_t = 1)]
        hops: usize,
    },

    /// Summarise the current build.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Interactive query loop.
    Shell,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > LORE_CONFIG env var > ~/.lore/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("LORE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply global and per-command overrides on top of the file values.
    pub fn apply_overrides(&self, config: &mut LoreConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        match &self.command {
            Command::Build {
                corpus,
                variant,
                refine,
            } => {
                if let Some(dir) = corpus {
                    config.corpus.dir = dir.to_string_lossy().to_string();
                }
                if let Some(variant) = variant {
                    config.index.variant = *variant;
                }
                if *refine {
                    config.index.use_refined_vectors = true;
                }
            }
            Command::Query {
                mode,
                k,
                alpha,
                show_content,
                related,
                ..
            } => {
                if let Some(mode) = mode {
                    config.search.default_mode = *mode;
                }
                if let Some(k) = k {
                    config.search.default_k = *k;
                }
                if let Some(alpha) = alpha {
                    config.search.alpha = *alpha;
                }
                config.search.show_content |= *show_content;
                config.search.expand_relations |= *related;
            }
            Command::Init { .. } | Command::Show { .. } | Command::Stats { .. } | Command::Shell => {}
        }
    }
}

fn parse_variant(value: &str) -> Result<IndexVariant, String> {
    value.parse().map_err(|e: lore_core::error::LoreError| e.to_string())
}

fn parse_mode(value: &str) -> Result<QueryModeKind, String> {
    value.parse().map_err(|e: lore_core::error::LoreError| e.to_string())
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".lore").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".lore").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_config_flag_wins() {
        let args = parse(&["lore", "--config", "/tmp/custom.toml", "stats"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn test_config_env_then_default() {
        let args = parse(&["lore", "shell"]);
        std::env::set_var("LORE_CONFIG", "/tmp/from-env.toml");
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/from-env.toml"));
        std::env::remove_var("LORE_CONFIG");
        assert!(args.resolve_config_path().ends_with("config.toml"));
    }

    #[test]
    fn test_query_overrides_search_section() {
        let args = parse(&[
            "lore", "query", "functor law", "--mode", "keyword", "-k", "3", "--alpha", "0.2", "--related",
        ]);
        let mut config = LoreConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.search.default_mode, QueryModeKind::Keyword);
        assert_eq!(config.search.default_k, 3);
        assert!((config.search.alpha - 0.2).abs() < f64::EPSILON);
        assert!(config.search.expand_relations);
        assert!(!config.search.show_content);
    }

    #[test]
    fn test_build_overrides_index_section() {
        let args = parse(&[
            "lore", "--data-dir", "/tmp/lore", "build", "--corpus", "docs", "--variant", "graph", "--refine",
        ]);
        let mut config = LoreConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.data_dir, "/tmp/lore");
        assert_eq!(config.corpus.dir, "docs");
        assert_eq!(config.index.variant, IndexVariant::Graph);
        assert!(config.index.use_refined_vectors);
    }

    #[test]
    fn test_init_and_show_subcommands() {
        let args = parse(&["lore", "init", "--force"]);
        assert!(matches!(args.command, Command::Init { force: true }));

        let args = parse(&["lore", "show", "law-functor-identity"]);
        match args.command {
            Command::Show { id, hops } => {
                assert_eq!(id, "law-functor-identity");
                assert_eq!(hops, 1);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = parse(&["lore", "-l", "debug", "show", "law-x", "--hops", "0"]);
        let mut config = LoreConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "debug");
        assert!(matches!(args.command, Command::Show { hops: 0, .. }));
    }

    #[test]
    fn test_unknown_mode_rejected_at_parse() {
        assert!(CliArgs::try_parse_from(["lore", "query", "x", "--mode", "fuzzy"]).is_err());
        assert!(CliArgs::try_parse_from(["lore", "build", "--variant", "lsh"]).is_err());
    }
}
