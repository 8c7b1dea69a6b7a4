use anyhow::Result;

use crate::checkpoint::{CheckpointStore, FileCheckpoint};
use crate::cli::output::{CheckpointInfo, StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{Embedder, HttpEmbedder, QdrantBackend, VectorStore};

pub fn checkpoint_info(config: &Config) -> CheckpointInfo {
    let checkpoint = FileCheckpoint::new(&config.pipeline.checkpoint_path);
    let (last_committed, error) = match checkpoint.load() {
        Ok(value) => (value, None),
        Err(e) => (None, Some(e.to_string())),
    };
    CheckpointInfo {
        path: checkpoint.path().to_path_buf(),
        last_committed,
        error,
    }
}

pub async fn handle_status(config: &Config, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    let (embedding_healthy, embedding_model) = match HttpEmbedder::new(&config.embedding) {
        Ok(embedder) => match embedder.health_check().await {
            Ok(health) => (true, health.model_id),
            Err(_) => (false, None),
        },
        Err(_) => (false, None),
    };

    let (vector_store_connected, vector_store_points) =
        if let Ok(store) = QdrantBackend::new(&config.vector_store) {
            let connected = store.health_check().await.unwrap_or(false);
            let points = if connected {
                store
                    .collection_info()
                    .await
                    .ok()
                    .flatten()
                    .map(|info| info.points_count)
            } else {
                None
            };
            (connected, points)
        } else {
            (false, None)
        };

    let status = StatusInfo {
        dataset_path: config.dataset.path.clone(),
        checkpoint: checkpoint_info(config),
        embedding_url: config.embedding.url.clone(),
        embedding_healthy,
        embedding_model,
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        collection: config.vector_store.collection.clone(),
        vector_store_points,
    };

    print!("{}", formatter.format_status(&status));

    if !config.dataset.path.exists() {
        eprintln!();
        eprintln!(
            "Warning: dataset not found at {}",
            config.dataset.path.display()
        );
    }
    if !embedding_healthy {
        eprintln!();
        eprintln!("Warning: embedding server not reachable at {}", config.embedding.url);
    }
    if !vector_store_connected {
        eprintln!();
        eprintln!("Warning: Qdrant not running. Start with: docker-compose up -d qdrant");
    }

    Ok(())
}
