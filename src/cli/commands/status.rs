use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::{create_backend, create_embedder};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let (embedder, embedder_healthy) = match create_embedder(&config.embedding) {
        Ok(embedder) => {
            let healthy = embedder.health_check().await.is_ok();
            (embedder.describe(), healthy)
        }
        Err(e) => (format!("{:?} ({e})", config.embedding.backend), false),
    };

    let (vector_store_connected, info) = match create_backend(&config.vector_store).await {
        Ok(store) => {
            let connected = store.health_check().await.unwrap_or(false);
            let info = if connected {
                store.collection_info().await.ok().flatten()
            } else {
                None
            };
            (connected, info)
        }
        Err(_) => (false, None),
    };

    let status = StatusInfo {
        embedder,
        embedder_healthy,
        embedding_dim: config.embedding.dimension as usize,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        collection: config.vector_store.collection.clone(),
        points: info.map(|i| i.points_count),
        collection_dim: info.and_then(|i| i.embedding_dim),
    };

    print!("{}", formatter.format_status(&status));

    if status.dimension_mismatch() {
        eprintln!();
        eprintln!(
            "Warning: collection dimension differs from the embedder; the next index run recreates it."
        );
    }

    if !vector_store_connected {
        eprintln!();
        match config.vector_store.driver {
            VectorDriver::Qdrant => {
                eprintln!("Warning: Qdrant not running. Start with: docker-compose up -d qdrant");
            }
            VectorDriver::PostgreSQL => {
                eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
            }
            VectorDriver::Memory => {}
        }
    }

    Ok(())
}
