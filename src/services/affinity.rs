use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{ActionKind, AffinityRecord, EventId, UserId};

use super::{ActionWeights, ApplyOutcome};

/// Concurrent store of per (user, event) interaction weights.
///
/// Records live in one sharded map keyed by the pair, so merges on the same key
/// serialize on its shard entry while unrelated keys proceed in parallel.
/// The two secondary indexes only ever grow and are updated after the record
/// is visible; readers may briefly miss a freshly created key.
pub struct AffinityStore {
    weights: ActionWeights,
    records: DashMap<(UserId, EventId), AffinityRecord>,
    events_by_user: DashMap<UserId, DashSet<EventId>>,
    users_by_event: DashMap<EventId, DashSet<UserId>>,
}

impl AffinityStore {
    pub fn new(weights: ActionWeights) -> Self {
        Self {
            weights,
            records: DashMap::new(),
            events_by_user: DashMap::new(),
            users_by_event: DashMap::new(),
        }
    }

    /// Merges one user action into the store
    pub fn apply_action(
        &self,
        user_id: UserId,
        event_id: EventId,
        kind: ActionKind,
        timestamp: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StoreError> {
        let weight = self.weights.weight(kind);
        self.apply_weight(user_id, event_id, weight, timestamp)
    }

    fn apply_weight(
        &self,
        user_id: UserId,
        event_id: EventId,
        weight: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StoreError> {
        if !(0.0..=1.0).contains(&weight) {
            tracing::error!(
                user_id = %user_id,
                event_id = %event_id,
                weight,
                "Rejected out-of-range affinity weight"
            );
            return Err(StoreError::WeightOutOfRange {
                user_id,
                event_id,
                weight,
            });
        }

        let outcome = match self.records.entry((user_id, event_id)) {
            Entry::Vacant(slot) => {
                slot.insert(AffinityRecord::new(weight, timestamp));
                ApplyOutcome::Created
            }
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                let merged = current.merged(weight, timestamp);

                if merged.weight < current.weight {
                    tracing::error!(
                        user_id = %user_id,
                        event_id = %event_id,
                        current = current.weight,
                        proposed = merged.weight,
                        "Affinity merge would lower a stored weight"
                    );
                    return Err(StoreError::WeightRegression {
                        user_id,
                        event_id,
                        current: current.weight,
                        proposed: merged.weight,
                    });
                }

                if merged == current {
                    ApplyOutcome::Unchanged
                } else {
                    slot.insert(merged);
                    ApplyOutcome::Updated
                }
            }
        };

        if outcome == ApplyOutcome::Created {
            self.events_by_user
                .entry(user_id)
                .or_default()
                .insert(event_id);
            self.users_by_event
                .entry(event_id)
                .or_default()
                .insert(user_id);
        }

        tracing::trace!(
            user_id = %user_id,
            event_id = %event_id,
            weight,
            outcome = ?outcome,
            "Applied user action"
        );

        Ok(outcome)
    }

    /// Current weight of every event the user interacted with
    pub fn affinities_of(&self, user_id: UserId) -> HashMap<EventId, f64> {
        let event_ids: Vec<EventId> = match self.events_by_user.get(&user_id) {
            Some(events) => events.iter().map(|event_id| *event_id).collect(),
            None => return HashMap::new(),
        };

        event_ids
            .into_iter()
            .filter_map(|event_id| {
                self.records
                    .get(&(user_id, event_id))
                    .map(|record| (event_id, record.weight))
            })
            .collect()
    }

    pub fn record(&self, user_id: UserId, event_id: EventId) -> Option<AffinityRecord> {
        self.records.get(&(user_id, event_id)).map(|record| *record)
    }

    /// Sum of all users' weights toward one event
    pub fn total_weight(&self, event_id: EventId) -> f64 {
        let user_ids: Vec<UserId> = match self.users_by_event.get(&event_id) {
            Some(users) => users.iter().map(|user_id| *user_id).collect(),
            None => return 0.0,
        };

        let mut weights: Vec<(UserId, f64)> = user_ids
            .into_iter()
            .filter_map(|user_id| {
                self.records
                    .get(&(user_id, event_id))
                    .map(|record| (user_id, record.weight))
            })
            .collect();
        // fixed summation order keeps repeated reads bit-identical
        weights.sort_by_key(|(user_id, _)| *user_id);
        weights.iter().map(|(_, weight)| weight).sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for AffinityStore {
    fn default() -> Self {
        Self::new(ActionWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_view_like_view_keeps_strongest_signal() {
        let store = AffinityStore::default();
        let (user, event) = (UserId(1), EventId(1));

        assert_eq!(
            store.apply_action(user, event, ActionKind::View, at(1)),
            Ok(ApplyOutcome::Created)
        );
        assert_eq!(store.record(user, event).unwrap().weight, 0.3);

        assert_eq!(
            store.apply_action(user, event, ActionKind::Like, at(2)),
            Ok(ApplyOutcome::Updated)
        );
        assert_eq!(store.record(user, event).unwrap().weight, 0.9);

        store
            .apply_action(user, event, ActionKind::View, at(3))
            .unwrap();
        let record = store.record(user, event).unwrap();
        assert_eq!(record.weight, 0.9);
        assert_eq!(record.last_applied_timestamp, at(3));
    }

    #[test]
    fn test_replaying_an_action_is_idempotent() {
        let store = AffinityStore::default();
        let (user, event) = (UserId(4), EventId(8));

        store
            .apply_action(user, event, ActionKind::Register, at(10))
            .unwrap();
        let first = store.record(user, event).unwrap();

        for _ in 0..5 {
            assert_eq!(
                store.apply_action(user, event, ActionKind::Register, at(10)),
                Ok(ApplyOutcome::Unchanged)
            );
        }
        assert_eq!(store.record(user, event).unwrap(), first);
    }

    #[test]
    fn test_any_arrival_order_yields_the_maximum() {
        let actions = [
            (ActionKind::View, 1),
            (ActionKind::Register, 2),
            (ActionKind::View, 3),
            (ActionKind::Like, 4),
            (ActionKind::Register, 5),
        ];

        let orders: Vec<Vec<usize>> = vec![
            vec![0, 1, 2, 3, 4],
            vec![4, 3, 2, 1, 0],
            vec![3, 0, 4, 1, 2],
            vec![2, 2, 4, 3, 3, 0, 1],
        ];

        for order in orders {
            let store = AffinityStore::default();
            for index in order {
                let (kind, ts) = actions[index];
                store
                    .apply_action(UserId(1), EventId(2), kind, at(ts))
                    .unwrap();
            }
            let record = store.record(UserId(1), EventId(2)).unwrap();
            assert_eq!(record.weight, 0.9);
        }
    }

    #[test]
    fn test_affinities_of_lists_only_that_user() {
        let store = AffinityStore::default();
        store
            .apply_action(UserId(1), EventId(10), ActionKind::Like, at(1))
            .unwrap();
        store
            .apply_action(UserId(1), EventId(11), ActionKind::View, at(1))
            .unwrap();
        store
            .apply_action(UserId(2), EventId(12), ActionKind::Register, at(1))
            .unwrap();

        let affinities = store.affinities_of(UserId(1));
        assert_eq!(affinities.len(), 2);
        assert_eq!(affinities[&EventId(10)], 0.9);
        assert_eq!(affinities[&EventId(11)], 0.3);
        assert!(store.affinities_of(UserId(99)).is_empty());
    }

    #[test]
    fn test_total_weight_sums_across_users() {
        let store = AffinityStore::default();
        store
            .apply_action(UserId(1), EventId(5), ActionKind::Like, at(1))
            .unwrap();
        store
            .apply_action(UserId(2), EventId(5), ActionKind::View, at(1))
            .unwrap();

        assert!((store.total_weight(EventId(5)) - 1.2).abs() < 1e-9);
        assert_eq!(store.total_weight(EventId(6)), 0.0);
    }

    #[test]
    fn test_out_of_range_weight_leaves_key_untouched() {
        let store = AffinityStore::default();
        store
            .apply_action(UserId(1), EventId(1), ActionKind::View, at(1))
            .unwrap();

        let result = store.apply_weight(UserId(1), EventId(1), 1.5, at(2));
        assert!(matches!(result, Err(StoreError::WeightOutOfRange { .. })));
        assert_eq!(store.record(UserId(1), EventId(1)).unwrap().weight, 0.3);
    }

    #[test]
    fn test_concurrent_writers_converge_to_maximum() {
        let store = Arc::new(AffinityStore::default());
        let kinds = [ActionKind::View, ActionKind::Like, ActionKind::Register];

        let handles: Vec<_> = (0..8)
            .map(|thread| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let kind = kinds[(thread + i) % kinds.len()];
                        let event = EventId((i % 10) as i64);
                        store
                            .apply_action(UserId(1), event, kind, at(i as i64))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let affinities = store.affinities_of(UserId(1));
        assert_eq!(affinities.len(), 10);
        assert!(affinities.values().all(|weight| *weight == 0.9));
    }
}
