mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use semdex_index::store::SchemaCheck;
use semdex_index::{
    Chunker, CodeIndexer, EmbeddingStore, FsWorkspace, IndexReport, IndexState, IndexWatcher,
    SearchResult, TreeSitterProvider,
};
use semdex_llm::openai::OpenAiProvider;
use serde::Serialize;

use crate::config::Config;

/// Coalescing window for raw filesystem events before they reach the indexer's own debounce.
const WATCH_COALESCE: Duration = Duration::from_millis(500);

/// Semantic code search over a local workspace.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to `semdex.toml` in the workspace root)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace root to index
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the workspace and bring the index up to date
    Index {
        /// Keep running and reindex files as they change
        #[arg(short, long)]
        watch: bool,
    },
    /// Find the chunks most similar to a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Only return chunks of this language id
        #[arg(long)]
        lang: Option<String>,
    },
    /// List indexed files
    Files,
    /// Show index statistics
    Status,
}

type Indexer = CodeIndexer<OpenAiProvider>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("workspace root {} not found", cli.root.display()))?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| root.join("semdex.toml"));
    let config = Config::load(&config_path)?;
    config.validate()?;

    let (indexer, workspace) = build_indexer(&config, &root).await?;

    match cli.command {
        Command::Index { watch } => {
            run_index(&indexer, &workspace, watch || config.index.watch, cli.json).await
        }
        Command::Search { query, limit, lang } => {
            let results = indexer.search(&query, limit, lang.as_deref()).await?;
            if cli.json {
                print_json(&results)
            } else {
                print_results(&results);
                Ok(())
            }
        }
        Command::Files => {
            let files = indexer.indexed_files().await?;
            if cli.json {
                return print_json(&files);
            }
            for file in &files {
                println!(
                    "{}\t{}\t{} chunks",
                    file.uri, file.language_id, file.chunk_count
                );
            }
            println!("{} files", files.len());
            Ok(())
        }
        Command::Status => print_status(&indexer, &config, &root, cli.json).await,
    }
}

async fn build_indexer(config: &Config, root: &Path) -> anyhow::Result<(Arc<Indexer>, FsWorkspace)> {
    let mut provider = OpenAiProvider::new(
        config.provider.base_url.clone(),
        config.provider.api_key.clone(),
        config.provider.embedding_model.clone(),
        Duration::from_secs(config.provider.timeout_secs),
    )?
    .with_max_retries(config.provider.max_retries);
    if let Some(model) = &config.provider.summary_model {
        provider = provider.with_summary_model(model.clone());
    }

    let store = EmbeddingStore::open(&config.store_config(root)).await?;
    match store.schema_check() {
        SchemaCheck::Rebuilt { previous } => {
            tracing::warn!(previous = %previous, "index metadata changed, cache was rebuilt");
        }
        SchemaCheck::Created => tracing::debug!("created new index database"),
        SchemaCheck::Current => {}
    }

    let workspace = FsWorkspace::with_filters(root, &config.index.extensions, &config.index.exclude)?;
    let chunker = Chunker::new(Arc::new(TreeSitterProvider), config.chunker_config());
    let indexer = CodeIndexer::new(
        store,
        Arc::new(provider),
        Arc::new(workspace.clone()),
        chunker,
        config.indexer_config(),
    );
    Ok((Arc::new(indexer), workspace))
}

async fn run_index(
    indexer: &Arc<Indexer>,
    workspace: &FsWorkspace,
    watch: bool,
    json: bool,
) -> anyhow::Result<()> {
    indexer.initialize().await?;
    if indexer.progress().state == IndexState::Disabled {
        println!("indexing is disabled");
        return Ok(());
    }

    if let Some(report) = indexer.start_indexing().await? {
        if json {
            print_json(&report)?;
        } else {
            print_report(&report);
        }
    }
    if !watch {
        return Ok(());
    }

    let mut progress = indexer.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            match snapshot.state {
                IndexState::Ready | IndexState::Error => tracing::info!("index {snapshot}"),
                _ => tracing::debug!("index {snapshot}"),
            }
        }
    });

    let _watcher = IndexWatcher::start(workspace, Arc::clone(indexer), WATCH_COALESCE)?;
    tracing::info!(root = %workspace.root().display(), "watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    indexer.stop_indexing();
    reporter.abort();
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!(
        "scanned {} files: {} indexed, {} unchanged, {} skipped, {} removed ({} chunks) in {} ms",
        report.files_scanned,
        report.files_indexed,
        report.files_unchanged,
        report.files_skipped,
        report.files_removed,
        report.chunks_created,
        report.duration_ms,
    );
    if report.cancelled {
        println!("scan was cancelled before completion");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("no matches");
        return;
    }
    for result in results {
        let symbol = result
            .symbol_name
            .as_deref()
            .map(|s| format!(" {s}"))
            .unwrap_or_default();
        println!(
            "{:.3}  {}:{}-{}  [{}{}]",
            result.score, result.uri, result.line_start, result.line_end, result.chunk_kind, symbol
        );
        if let Some(summary) = &result.summary {
            println!("       {summary}");
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    root: &'a Path,
    database: PathBuf,
    #[serde(flatten)]
    stats: semdex_index::store::StoreStats,
}

async fn print_status(indexer: &Indexer, config: &Config, root: &Path, json: bool) -> anyhow::Result<()> {
    let stats = indexer.stats().await?;
    let status = StatusOutput {
        root,
        database: config.db_path(root),
        stats,
    };
    if json {
        return print_json(&status);
    }

    println!("root:        {}", status.root.display());
    if status.stats.persistent {
        println!("database:    {}", status.database.display());
    } else {
        println!("database:    in-memory (could not open {})", status.database.display());
    }
    println!("model:       {} ({} dims)", status.stats.model_id, status.stats.dimensions);
    println!(
        "vector knn:  {}",
        if status.stats.vector_index { "sqlite-vec" } else { "brute force" }
    );
    println!("files:       {}", status.stats.file_count);
    println!("chunks:      {}", status.stats.chunk_count);
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
