use serde::de::DeserializeOwned;

use crate::models::{EventSimilarityUpdate, UserActionEvent};

/// Reasons a payload could not be turned into a typed record
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    Invalid(String),
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_slice(payload)?)
}

pub fn decode_user_action(payload: &[u8]) -> Result<UserActionEvent, DecodeError> {
    decode(payload)
}

/// Decodes a similarity update and rejects values no producer should emit
pub fn decode_similarity(payload: &[u8]) -> Result<EventSimilarityUpdate, DecodeError> {
    let update: EventSimilarityUpdate = decode(payload)?;

    if update.event_a == update.event_b {
        return Err(DecodeError::Invalid(format!(
            "event {} paired with itself",
            update.event_a
        )));
    }
    if !(0.0..=1.0).contains(&update.score) {
        return Err(DecodeError::Invalid(format!(
            "score {} outside [0, 1]",
            update.score
        )));
    }

    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, EventId};

    #[test]
    fn test_decode_user_action() {
        let action =
            decode_user_action(br#"{"userId":1,"eventId":2,"actionType":"LIKE","timestamp":3}"#)
                .unwrap();
        assert_eq!(action.action_kind, ActionKind::Like);
        assert_eq!(action.event_id, EventId(2));
    }

    #[test]
    fn test_empty_and_garbage_payloads() {
        assert!(matches!(decode_user_action(b""), Err(DecodeError::Empty)));
        assert!(matches!(
            decode_user_action(b"\x00\x01garbage"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_similarity(br#"{"eventA":1}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_similarity_content_is_validated() {
        assert!(matches!(
            decode_similarity(br#"{"eventA":1,"eventB":1,"score":0.5,"timestamp":1}"#),
            Err(DecodeError::Invalid(_))
        ));
        assert!(matches!(
            decode_similarity(br#"{"eventA":1,"eventB":2,"score":-0.5,"timestamp":1}"#),
            Err(DecodeError::Invalid(_))
        ));
        assert!(decode_similarity(br#"{"eventA":1,"eventB":2,"score":1.0,"timestamp":1}"#).is_ok());
    }
}
