use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::error::StoreError;
use crate::models::{EventId, EventPair, SimilarityRecord};

use super::ApplyOutcome;

/// Concurrent store of event-pair similarity scores.
///
/// Conflicts resolve by the update's own timestamp: a record is replaced only
/// by a strictly newer update, so delivery order never matters.
#[derive(Default)]
pub struct SimilarityStore {
    records: DashMap<EventPair, SimilarityRecord>,
    neighbors: DashMap<EventId, DashSet<EventId>>,
}

impl SimilarityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_update(
        &self,
        event_a: EventId,
        event_b: EventId,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StoreError> {
        if event_a == event_b {
            tracing::error!(event_id = %event_a, "Rejected self-similarity update");
            return Err(StoreError::SelfPair(event_a));
        }
        if !(0.0..=1.0).contains(&score) {
            tracing::error!(
                event_a = %event_a,
                event_b = %event_b,
                score,
                "Rejected out-of-range similarity score"
            );
            return Err(StoreError::ScoreOutOfRange {
                event_a,
                event_b,
                score,
            });
        }

        let pair = EventPair::new(event_a, event_b);
        let incoming = SimilarityRecord {
            score,
            update_timestamp: timestamp,
        };

        let outcome = match self.records.entry(pair) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                ApplyOutcome::Created
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get().update_timestamp;
                if timestamp > current {
                    slot.insert(incoming);
                    ApplyOutcome::Updated
                } else {
                    tracing::debug!(
                        event_a = %pair.first(),
                        event_b = %pair.second(),
                        incoming = %timestamp,
                        stored = %current,
                        "Discarded stale similarity update"
                    );
                    ApplyOutcome::Stale
                }
            }
        };

        if outcome == ApplyOutcome::Created {
            self.neighbors
                .entry(pair.first())
                .or_default()
                .insert(pair.second());
            self.neighbors
                .entry(pair.second())
                .or_default()
                .insert(pair.first());
        }

        Ok(outcome)
    }

    /// Every event with a known similarity to `event_id`, ascending by id
    pub fn neighbors_of(&self, event_id: EventId) -> Vec<(EventId, f64)> {
        let mut others: Vec<EventId> = match self.neighbors.get(&event_id) {
            Some(set) => set.iter().map(|other| *other).collect(),
            None => return Vec::new(),
        };
        others.sort();

        others
            .into_iter()
            .filter_map(|other| {
                self.records
                    .get(&EventPair::new(event_id, other))
                    .map(|record| (other, record.score))
            })
            .collect()
    }

    pub fn record(&self, event_a: EventId, event_b: EventId) -> Option<SimilarityRecord> {
        self.records
            .get(&EventPair::new(event_a, event_b))
            .map(|record| *record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
