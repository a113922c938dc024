use std::sync::Arc;
use std::time::Duration;

use crate::ingest::{StreamProgress, StreamStatus};
use crate::services::{ActionWeights, AffinityStore, RecommendationEngine, SimilarityStore};

/// Shared application state
///
/// Cloned into every request; all fields are handles to the same stores the
/// ingestion workers write to.
#[derive(Clone)]
pub struct AppState {
    pub engine: RecommendationEngine,
    pub progress: Vec<Arc<StreamProgress>>,
}

impl AppState {
    pub fn new(
        affinity: Arc<AffinityStore>,
        similarity: Arc<SimilarityStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            engine: RecommendationEngine::new(affinity, similarity, query_timeout),
            progress: Vec::new(),
        }
    }

    /// Empty stores using the given action weights, for tests and local runs
    pub fn in_memory(weights: ActionWeights, query_timeout: Duration) -> Self {
        Self::new(
            Arc::new(AffinityStore::new(weights)),
            Arc::new(SimilarityStore::new()),
            query_timeout,
        )
    }

    pub fn with_progress(mut self, progress: Arc<StreamProgress>) -> Self {
        self.progress.push(progress);
        self
    }

    pub fn ingest_status(&self) -> Vec<StreamStatus> {
        self.progress.iter().map(|p| p.status()).collect()
    }
}
