use serde::Serialize;
use std::cmp::Ordering;

use super::EventId;

/// One entry of a ranked recommendation list
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecommendedEvent {
    pub event_id: EventId,
    pub score: f64,
}

impl RecommendedEvent {
    pub fn new(event_id: EventId, score: f64) -> Self {
        Self { event_id, score }
    }

    /// Ranking order: higher score first, then lower event id
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.event_id.cmp(&other.event_id))
    }
}

/// Total interaction weight an event has collected across all users
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventInteractions {
    pub event_id: EventId,
    pub total_weight: f64,
}

/// Sorts by rank and keeps the best `limit` entries
pub fn top_k(mut candidates: Vec<RecommendedEvent>, limit: usize) -> Vec<RecommendedEvent> {
    candidates.sort_by(RecommendedEvent::rank_cmp);
    candidates.truncate(limit);
    candidates
}
