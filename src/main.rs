use std::sync::Arc;

use event_analyzer::api::{create_router, AppState};
use event_analyzer::config::{Config, StreamKind};
use event_analyzer::ingest::{StreamProgress, WorkerPool};
use event_analyzer::services::{AffinityStore, SimilarityStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Invalid configuration stops the process before any consumer starts
    let config = Config::load()?;
    let weights = config.action_weights()?;

    let affinity = Arc::new(AffinityStore::new(weights));
    let similarity = Arc::new(SimilarityStore::new());
    let actions_progress = Arc::new(StreamProgress::new(StreamKind::UserActions));
    let similarity_progress = Arc::new(StreamProgress::new(StreamKind::EventsSimilarity));

    let pools = start_ingestion(
        &config,
        &affinity,
        &similarity,
        &actions_progress,
        &similarity_progress,
    )?;

    let state = AppState::new(affinity, similarity, config.query_timeout())
        .with_progress(actions_progress)
        .with_progress(similarity_progress);
    let app = create_router(state);

    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Query server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for pool in pools {
        pool.shutdown().await;
    }

    tracing::info!("Analyzer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(feature = "kafka")]
fn start_ingestion(
    config: &Config,
    affinity: &Arc<AffinityStore>,
    similarity: &Arc<SimilarityStore>,
    actions_progress: &Arc<StreamProgress>,
    similarity_progress: &Arc<StreamProgress>,
) -> anyhow::Result<Vec<WorkerPool>> {
    use event_analyzer::config::split_partitions;
    use event_analyzer::ingest::kafka::KafkaSource;
    use event_analyzer::ingest::{
        BatchLimits, IngestWorker, SimilarityHandler, StreamHandler, UserActionHandler,
    };

    let limits = BatchLimits {
        max_records: config.max_poll_records(),
        max_wait: config.fetch_max_wait(),
    };

    let streams: [(StreamKind, Arc<dyn StreamHandler>, &Arc<StreamProgress>); 2] = [
        (
            StreamKind::UserActions,
            Arc::new(UserActionHandler::new(Arc::clone(affinity))),
            actions_progress,
        ),
        (
            StreamKind::EventsSimilarity,
            Arc::new(SimilarityHandler::new(Arc::clone(similarity))),
            similarity_progress,
        ),
    ];

    let mut pools = Vec::new();
    for (stream, handler, progress) in streams {
        let assignments: Vec<Option<Vec<i32>>> = match config.partitions(stream) {
            Some(partitions) => split_partitions(partitions, config.concurrency(stream))
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None; config.concurrency(stream)],
        };

        let mut workers = Vec::with_capacity(assignments.len());
        for (id, partitions) in assignments.into_iter().enumerate() {
            let source = KafkaSource::connect(config, stream, partitions.as_deref())?;
            workers.push(IngestWorker::new(
                id,
                source,
                Arc::clone(&handler),
                Arc::clone(progress),
                limits,
                config.retry_backoff(),
            ));
        }

        pools.push(WorkerPool::spawn(stream, workers));
    }

    Ok(pools)
}

#[cfg(not(feature = "kafka"))]
fn start_ingestion(
    _config: &Config,
    _affinity: &Arc<AffinityStore>,
    _similarity: &Arc<SimilarityStore>,
    _actions_progress: &Arc<StreamProgress>,
    _similarity_progress: &Arc<StreamProgress>,
) -> anyhow::Result<Vec<WorkerPool>> {
    tracing::warn!("Built without the `kafka` feature; stream ingestion is disabled");
    Ok(Vec::new())
}
