//! lore application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite artifact store
//! 4. Dispatch: init, build, query, show, stats or the interactive shell

mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use lore_core::config::{expand_home, LoreConfig};
use lore_core::error::LoreError;
use lore_search::session::HELP;
use lore_search::{BuildOptions, CommandOutcome, IndexBuilder, KnowledgeBase, SessionCommand};
use lore_storage::ArtifactRepository;
use lore_vector::{DynEmbedder, HashingEmbedder, NeighborMeanRefiner};

use cli::{CliArgs, Command};

const EMBEDDER_NAME: &str = "hashing";

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load the config file before the global subscriber exists. Load warnings
/// go through a temporary stderr subscriber.
fn load_config(path: &Path) -> LoreConfig {
    if !path.exists() {
        return LoreConfig::default();
    }
    let early = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .finish();
    tracing::subscriber::with_default(early, || LoreConfig::load_or_default(path))
}

fn write_config(config: &LoreConfig, path: &Path, force: bool) -> AppResult<()> {
    if path.exists() && !force {
        return Err(format!("{} already exists, pass --force to overwrite", path.display()).into());
    }
    config.save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn open_repository(config: &LoreConfig) -> AppResult<ArtifactRepository> {
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = config.store_path();
    let repo = ArtifactRepository::open(&db_path)?;
    tracing::debug!(path = %db_path.display(), "Artifact store opened");
    Ok(repo)
}

fn open_knowledge_base(
    repo: &ArtifactRepository,
    embedder: Arc<dyn DynEmbedder>,
    config: &LoreConfig,
) -> AppResult<KnowledgeBase> {
    let kb = KnowledgeBase::open(repo, embedder)?
        .with_embed_timeout(Duration::from_millis(config.embedding.timeout_ms));
    kb.require_embedder(EMBEDDER_NAME)?;
    Ok(kb)
}

async fn run_build(config: &LoreConfig, embedder: Arc<dyn DynEmbedder>, repo: &ArtifactRepository) -> AppResult<()> {
    let corpus_dir = expand_home(&config.corpus.dir);
    let mut builder = IndexBuilder::new(embedder, EMBEDDER_NAME, BuildOptions::from(config));
    if config.index.use_refined_vectors {
        builder = builder.with_refiner(Arc::new(NeighborMeanRefiner::default()));
    }

    tracing::info!(corpus = %corpus_dir.display(), variant = %config.index.variant, "Building indexes");
    let output = builder.build_dir(&corpus_dir, &config.corpus.extension).await?;
    output.save(repo)?;

    let report = &output.report;
    println!("Build:      {}", report.build_id);
    println!("Documents:  {}", report.documents);
    println!("Index:      {} ({} dims{})", report.variant, report.dimension, if report.refined { ", refined" } else { "" });
    println!("Vocabulary: {} terms", report.vocabulary_size);
    println!("Graph:      {} edges ({} dangling)", report.edges, report.dangling_edges);
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    println!("Finished in {} ms", report.elapsed_ms);
    Ok(())
}

async fn run_query(kb: KnowledgeBase, config: &LoreConfig, text: &str, json: bool) -> AppResult<()> {
    let session = kb.session(&config.search)?;
    let outcome = session.run_query(text).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", session.render(&outcome));
    }
    Ok(())
}

fn run_show(
    repo: &ArtifactRepository,
    embedder: Arc<dyn DynEmbedder>,
    config: &LoreConfig,
    doc_id: &str,
    hops: usize,
) -> AppResult<()> {
    let Some(doc) = repo.document(doc_id)? else {
        return Err(LoreError::InvalidArgument(format!("unknown document id: {}", doc_id)).into());
    };
    println!("{}", doc.title);
    println!("   ID:     {}", doc.doc_id);
    println!("   Type:   {}", doc.doc_type);
    if !doc.tags.is_empty() {
        println!("   Tags:   {}", doc.tags.join(", "));
    }
    println!("   Source: {}", doc.source_file);
    println!("\n{}", doc.content);

    if hops > 0 {
        let kb = open_knowledge_base(repo, embedder, config)?;
        let reached = kb.graph().traverse(&[doc_id], hops);
        println!("\nWithin {} hop(s):", hops);
        for (id, hop) in reached.iter().filter(|(_, hop)| *hop > 0) {
            println!("   {} {}", hop, id);
        }
    }
    Ok(())
}

async fn run_shell(kb: KnowledgeBase, config: &LoreConfig) -> AppResult<()> {
    let mut session = kb.session(&config.search)?;
    let stats = kb.stats();
    println!("lore v{} - {} documents, {} index", env!("CARGO_PKG_VERSION"), stats.documents, stats.index_variant);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!();
        print!("[{}] Query> ", session);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match SessionCommand::parse(line) {
            Ok(Some(command)) => match session.apply(command) {
                Ok(CommandOutcome::Quit) => break,
                Ok(CommandOutcome::Message(message)) => println!("{}", message),
                Err(e) => eprintln!("Error: {}", e),
            },
            Ok(None) => match session.run_query(line).await {
                Ok(outcome) => println!("{}", session.render(&outcome)),
                Err(e) => eprintln!("Error: {}", e),
            },
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config.
    let config_file: PathBuf = args.resolve_config_path();
    let mut config = load_config(&config_file);
    args.apply_overrides(&mut config);

    // Tracing. Logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::debug!("Starting lore v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), "Configuration resolved");
    config.validate()?;

    if let Command::Init { force } = args.command {
        return write_config(&config, &config_file, force);
    }

    let embedder: Arc<dyn DynEmbedder> = Arc::new(HashingEmbedder::new(config.embedding.dimensions)?);
    let repo = open_repository(&config)?;

    match args.command {
        Command::Build { .. } => run_build(&config, embedder, &repo).await?,
        Command::Query { ref text, json, .. } => {
            let kb = open_knowledge_base(&repo, embedder, &config)?;
            run_query(kb, &config, text, json).await?;
        }
        Command::Show { ref id, hops } => run_show(&repo, embedder, &config, id, hops)?,
        Command::Stats { json } => {
            let kb = open_knowledge_base(&repo, embedder, &config)?;
            let stats = kb.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats);
            }
        }
        Command::Shell => {
            let kb = open_knowledge_base(&repo, embedder, &config)?;
            run_shell(kb, &config).await?;
        }
        Command::Init { .. } => {}
    }

    Ok(())
}
