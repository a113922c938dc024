use std::sync::Arc;

use crate::error::StoreError;
use crate::services::{AffinityStore, ApplyOutcome, SimilarityStore};

use super::codec::{self, DecodeError};

/// Why a single record was not applied
#[derive(thiserror::Error, Debug)]
pub enum HandleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Decodes one payload of a stream and merges it into the owning store
pub trait StreamHandler: Send + Sync {
    fn handle(&self, payload: &[u8]) -> Result<ApplyOutcome, HandleError>;
}

pub struct UserActionHandler {
    store: Arc<AffinityStore>,
}

impl UserActionHandler {
    pub fn new(store: Arc<AffinityStore>) -> Self {
        Self { store }
    }
}

impl StreamHandler for UserActionHandler {
    fn handle(&self, payload: &[u8]) -> Result<ApplyOutcome, HandleError> {
        let action = codec::decode_user_action(payload)?;
        let outcome = self.store.apply_action(
            action.user_id,
            action.event_id,
            action.action_kind,
            action.timestamp,
        )?;
        Ok(outcome)
    }
}

pub struct SimilarityHandler {
    store: Arc<SimilarityStore>,
}

impl SimilarityHandler {
    pub fn new(store: Arc<SimilarityStore>) -> Self {
        Self { store }
    }
}

impl StreamHandler for SimilarityHandler {
    fn handle(&self, payload: &[u8]) -> Result<ApplyOutcome, HandleError> {
        let update = codec::decode_similarity(payload)?;
        let outcome =
            self.store
                .apply_update(update.event_a, update.event_b, update.score, update.timestamp)?;
        Ok(outcome)
    }
}
