//! Index command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

use crate::cli::output::{IndexSummary, get_formatter};
use crate::cli::progress::ProgressNotifier;
use crate::cli::shutdown_signal;
use crate::models::{Config, JobRequest, OutputFormat};
use crate::parsers::ParserRegistry;
use crate::services::{
    JobContext, JobRegistry, JsonLinesNotifier, LogNotifier, Notifier, create_backend,
    create_embedder, run_directory_job,
};

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Directory to index
    #[arg(required = true)]
    pub path: PathBuf,

    /// Only index files directly inside the directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Chunk size in characters (defaults to indexing.chunk_size)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Chunk overlap in characters (defaults to indexing.chunk_overlap)
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Passages per embedding request (defaults to embedding.batch_size)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Drop and recreate the collection before indexing
    #[arg(long)]
    pub recreate: bool,

    /// Additional glob patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Print indexing events as JSON lines instead of a progress bar
    #[arg(long)]
    pub events: bool,
}

pub async fn handle_index(args: IndexArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    config.indexing.exclude_patterns.extend(args.exclude);

    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("invalid path: {}", args.path.display()))?;
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }

    let request = JobRequest {
        recursive: !args.no_recursive,
        chunk_size: args.chunk_size.unwrap_or(config.indexing.chunk_size),
        chunk_overlap: args.chunk_overlap.unwrap_or(config.indexing.chunk_overlap),
        embedding_batch_size: args
            .batch_size
            .unwrap_or(config.embedding.batch_size as usize),
        recreate_collection: args.recreate,
        ..JobRequest::new(&root)
    };
    if request.chunk_size == 0 || request.embedding_batch_size == 0 {
        anyhow::bail!("chunk size and batch size must be at least 1");
    }

    let embedder = create_embedder(&config.embedding).context("failed to create embedder")?;
    let store = create_backend(&config.vector_store)
        .await
        .context("failed to connect to vector store")?;

    let event_mode = args.events || format == OutputFormat::Json;
    let notifier: Arc<dyn Notifier> = if event_mode {
        Arc::new(JsonLinesNotifier::stdout())
    } else if console::Term::stderr().is_term() {
        Arc::new(ProgressNotifier::new(verbose))
    } else {
        Arc::new(LogNotifier)
    };

    let registry = JobRegistry::new();
    let handle = registry.acquire(store.collection())?;

    let ctx = JobContext {
        embedder,
        store,
        notifier,
        parsers: Arc::new(ParserRegistry::with_defaults()),
        indexing: config.indexing.clone(),
        pacing: config.pacing.clone(),
    };

    let token = handle.cancel_token();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("interrupt received, finishing the current file");
        token.cancel();
    });

    let start_time = Instant::now();
    let counters = run_directory_job(&handle, request, &ctx).await;
    watcher.abort();

    if !event_mode {
        let summary = IndexSummary {
            root: root.display().to_string(),
            counters,
            cancelled: handle.is_cancelled(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        print!("{}", get_formatter(format).format_index_summary(&summary));
    }

    Ok(())
}
