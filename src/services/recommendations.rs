use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{
        recommendation::top_k, EventId, EventInteractions, RecommendedEvent, UserId,
    },
};

use super::{AffinityStore, SimilarityStore};

/// Answers recommendation queries from the affinity and similarity stores
///
/// A user's affinity toward an event spreads to the event's neighbours in
/// proportion to both the affinity weight and the similarity score. The engine
/// only reads from the stores; ingestion may keep writing while a query runs.
#[derive(Clone)]
pub struct RecommendationEngine {
    affinity: Arc<AffinityStore>,
    similarity: Arc<SimilarityStore>,
    deadline: Duration,
}

impl RecommendationEngine {
    pub fn new(
        affinity: Arc<AffinityStore>,
        similarity: Arc<SimilarityStore>,
        deadline: Duration,
    ) -> Self {
        Self {
            affinity,
            similarity,
            deadline,
        }
    }

    pub fn affinity(&self) -> &AffinityStore {
        &self.affinity
    }

    pub fn similarity(&self) -> &SimilarityStore {
        &self.similarity
    }

    /// Ranks events the user has not interacted with yet
    pub fn recommend(
        &self,
        user_id: UserId,
        exclude: &HashSet<EventId>,
        limit: usize,
    ) -> AppResult<Vec<RecommendedEvent>> {
        let affinities = self.affinity.affinities_of(user_id);
        if affinities.is_empty() {
            return Err(AppError::NoAffinity(user_id));
        }

        // walk sources in id order so float accumulation is reproducible
        let mut sources: Vec<(EventId, f64)> = affinities
            .iter()
            .filter(|(event_id, _)| !exclude.contains(event_id))
            .map(|(event_id, weight)| (*event_id, *weight))
            .collect();
        sources.sort_by_key(|(event_id, _)| *event_id);

        let mut scores: BTreeMap<EventId, f64> = BTreeMap::new();
        for (source, weight) in sources {
            for (candidate, similarity) in self.similarity.neighbors_of(source) {
                if affinities.contains_key(&candidate) || exclude.contains(&candidate) {
                    continue;
                }
                *scores.entry(candidate).or_insert(0.0) += weight * similarity;
            }
        }

        let candidates = scores
            .into_iter()
            .map(|(event_id, score)| RecommendedEvent::new(event_id, score))
            .collect();

        Ok(top_k(candidates, limit))
    }

    /// Same as [`recommend`](Self::recommend) but bounded by the configured deadline
    pub async fn recommend_within_deadline(
        &self,
        user_id: UserId,
        exclude: HashSet<EventId>,
        limit: usize,
    ) -> AppResult<Vec<RecommendedEvent>> {
        let engine = self.clone();
        run_with_deadline(self.deadline, move || {
            engine.recommend(user_id, &exclude, limit)
        })
        .await
    }

    /// Neighbours of one event the user has not interacted with, by similarity
    pub fn similar_events(
        &self,
        event_id: EventId,
        user_id: UserId,
        limit: usize,
    ) -> Vec<RecommendedEvent> {
        let seen = self.affinity.affinities_of(user_id);

        let candidates = self
            .similarity
            .neighbors_of(event_id)
            .into_iter()
            .filter(|(other, _)| !seen.contains_key(other))
            .map(|(other, score)| RecommendedEvent::new(other, score))
            .collect();

        top_k(candidates, limit)
    }

    /// Total interaction weight per requested event, in request order
    pub fn interactions_count(&self, event_ids: &[EventId]) -> Vec<EventInteractions> {
        event_ids
            .iter()
            .map(|event_id| EventInteractions {
                event_id: *event_id,
                total_weight: self.affinity.total_weight(*event_id),
            })
            .collect()
    }

    /// [`similar_events`](Self::similar_events) bounded by the configured deadline
    pub async fn similar_events_within_deadline(
        &self,
        event_id: EventId,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<RecommendedEvent>> {
        let engine = self.clone();
        run_with_deadline(self.deadline, move || {
            Ok(engine.similar_events(event_id, user_id, limit))
        })
        .await
    }

    /// [`interactions_count`](Self::interactions_count) bounded by the configured deadline
    pub async fn interactions_count_within_deadline(
        &self,
        event_ids: Vec<EventId>,
    ) -> AppResult<Vec<EventInteractions>> {
        let engine = self.clone();
        run_with_deadline(self.deadline, move || {
            Ok(engine.interactions_count(&event_ids))
        })
        .await
    }
}

/// Runs read-only query work on the blocking pool and gives up after `deadline`.
///
/// The caller gets [`AppError::Timeout`] on expiry; the work itself is left to
/// finish in the background since it holds no locks across calls.
pub async fn run_with_deadline<T, F>(deadline: Duration, work: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::Internal(format!("Query task failed: {}", e))),
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Query deadline exceeded");
            Err(AppError::Timeout(deadline))
        }
    }
}
