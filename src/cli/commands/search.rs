use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, SearchFilter, SearchResults};
use crate::services::{create_backend, create_embedder};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', default_value_t = 10, help = "Maximum number of results to return")]
    pub limit: u64,

    #[arg(long, help = "Match passages containing the query text instead of embedding it")]
    pub text: bool,

    #[arg(long, help = "Only return passages from files of this type (e.g. 'md')")]
    pub file_type: Option<String>,

    #[arg(long, help = "Only return passages from this file")]
    pub path: Option<String>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }
    if args.limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let filter = SearchFilter {
        file_path: args.path,
        file_type: args.file_type.map(|t| t.trim_start_matches('.').to_lowercase()),
    };
    let filter = (!filter.is_empty()).then_some(filter);

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Limit: {}", args.limit);
        eprintln!("  Mode: {}", if args.text { "text" } else { "vector" });
        if let Some(ref f) = filter {
            eprintln!("  Filter: {f:?}");
        }
    }

    let store = create_backend(&config.vector_store)
        .await
        .context("failed to connect to vector store")?;

    let results = if args.text {
        store
            .search_text(query, args.limit, filter.as_ref())
            .await
            .context("text search failed")?
    } else {
        let embedder = create_embedder(&config.embedding).context("failed to create embedder")?;
        let embed_start = Instant::now();
        let vector = embedder
            .embed_query(query)
            .await
            .context("failed to generate query embedding")?;
        if verbose {
            eprintln!("  Embedding: {}ms", embed_start.elapsed().as_millis());
        }
        store
            .search_vector(vector, args.limit, filter.as_ref())
            .await
            .context("search failed")?
    };

    let duration_ms = start_time.elapsed().as_millis() as u64;
    let search_results = SearchResults::new(query.to_string(), results, duration_ms);
    print!("{}", formatter.format_search_results(&search_results));

    Ok(())
}
