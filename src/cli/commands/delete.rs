use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::create_backend;

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// File whose records should be removed from the index
    #[arg(required = true)]
    pub path: PathBuf,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub force: bool,
}

pub async fn handle_delete(args: DeleteArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    // Records are keyed by the canonical path used at index time; a file
    // that no longer exists is matched verbatim.
    let path = args.path.canonicalize().unwrap_or(args.path);
    let path_str = path.to_string_lossy().to_string();

    if verbose {
        eprintln!("Deleting indexed records for: {path_str}");
    }

    if !args.force {
        println!("This will delete all indexed records of '{path_str}'. Continue? [y/N]");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    let store = create_backend(&config.vector_store)
        .await
        .context("failed to connect to vector store")?;
    store
        .delete_by_path(&path_str)
        .await
        .with_context(|| format!("failed to delete records of {path_str}"))?;

    println!(
        "{}",
        formatter.format_message(&format!(
            "Deleted records of {path_str} from '{}'",
            store.collection()
        ))
    );

    Ok(())
}
