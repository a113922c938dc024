use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventId;

/// Unordered pair of events stored with the smaller identifier first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventPair {
    first: EventId,
    second: EventId,
}

impl EventPair {
    pub fn new(a: EventId, b: EventId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> EventId {
        self.first
    }

    pub fn second(&self) -> EventId {
        self.second
    }

    /// Returns the member of the pair that is not `event_id`
    pub fn other(&self, event_id: EventId) -> Option<EventId> {
        if self.first == event_id {
            Some(self.second)
        } else if self.second == event_id {
            Some(self.first)
        } else {
            None
        }
    }
}

/// Similarity score between two events as published on the events-similarity stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSimilarityUpdate {
    pub event_a: EventId,
    pub event_b: EventId,
    pub score: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl EventSimilarityUpdate {
    pub fn pair(&self) -> EventPair {
        EventPair::new(self.event_a, self.event_b)
    }
}

/// Latest known similarity of a canonical event pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityRecord {
    pub score: f64,
    pub update_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_canonical_in_both_orders() {
        let forward = EventPair::new(EventId(3), EventId(9));
        let backward = EventPair::new(EventId(9), EventId(3));

        assert_eq!(forward, backward);
        assert_eq!(forward.first(), EventId(3));
        assert_eq!(forward.second(), EventId(9));
    }

    #[test]
    fn test_pair_other_member() {
        let pair = EventPair::new(EventId(1), EventId(2));
        assert_eq!(pair.other(EventId(1)), Some(EventId(2)));
        assert_eq!(pair.other(EventId(2)), Some(EventId(1)));
        assert_eq!(pair.other(EventId(5)), None);
    }

    #[test]
    fn test_decode_similarity_update() {
        let json = r#"{"eventA":10,"eventB":4,"score":0.75,"timestamp":1000}"#;
        let update: EventSimilarityUpdate = serde_json::from_str(json).unwrap();

        assert_eq!(update.pair(), EventPair::new(EventId(4), EventId(10)));
        assert_eq!(update.score, 0.75);
    }
}
