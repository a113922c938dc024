use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

use crate::models::{EventId, UserId};

/// Application-level errors surfaced by the query engine
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No affinity data for user {0}")]
    NoAffinity(UserId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Query exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NoAffinity(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            AppError::Store(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Invariant violations detected while merging into a state store.
///
/// These only fire on a bug upstream of the store; the offending
/// operation is rejected and the stored value for the key is kept.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("weight {weight} for user {user_id} event {event_id} is outside [0, 1]")]
    WeightOutOfRange {
        user_id: UserId,
        event_id: EventId,
        weight: f64,
    },

    #[error("weight for user {user_id} event {event_id} would regress from {current} to {proposed}")]
    WeightRegression {
        user_id: UserId,
        event_id: EventId,
        current: f64,
        proposed: f64,
    },

    #[error("similarity {score} for events {event_a}/{event_b} is outside [0, 1]")]
    ScoreOutOfRange {
        event_a: EventId,
        event_b: EventId,
        score: f64,
    },

    #[error("event {0} cannot be similar to itself")]
    SelfPair(EventId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = vec![
            (AppError::NoAffinity(UserId(1)), StatusCode::NOT_FOUND),
            (AppError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Timeout(Duration::from_millis(5)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                AppError::Store(StoreError::SelfPair(EventId(3))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
