use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, UserId};

/// Kind of interaction a user had with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    View,
    Register,
    Like,
    /// Any action type this analyzer does not know about yet
    #[serde(other)]
    Unrecognized,
}

impl ActionKind {
    pub const KNOWN: [ActionKind; 3] = [ActionKind::View, ActionKind::Register, ActionKind::Like];
}

/// A single user interaction as published on the user-actions stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionEvent {
    pub user_id: UserId,
    pub event_id: EventId,
    #[serde(alias = "actionType")]
    pub action_kind: ActionKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Accumulated interaction signal of one user toward one event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AffinityRecord {
    pub weight: f64,
    pub last_applied_timestamp: DateTime<Utc>,
}

impl AffinityRecord {
    pub fn new(weight: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            weight,
            last_applied_timestamp: timestamp,
        }
    }

    /// Folds another observed action into this record.
    ///
    /// Both fields only move forward, so the merge is commutative and
    /// replaying the same action leaves the record untouched.
    pub fn merged(&self, weight: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            weight: self.weight.max(weight),
            last_applied_timestamp: self.last_applied_timestamp.max(timestamp),
        }
    }
}
