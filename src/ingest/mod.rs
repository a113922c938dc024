use std::time::Duration;

pub mod codec;
pub mod handler;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod offsets;
pub mod pool;
pub mod progress;
pub mod worker;

pub use handler::{SimilarityHandler, StreamHandler, UserActionHandler};
pub use offsets::{BatchOffsets, CommitTracker};
pub use pool::WorkerPool;
pub use progress::{BatchReport, IngestStats, StreamProgress, StreamStatus};
pub use worker::{BatchLimits, IngestWorker};

/// A record as fetched from one partition of an input stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Position to resume a partition from; one past the last processed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PartitionOffset {
    pub partition: i32,
    pub offset: i64,
}

/// Failures of the stream transport itself, as opposed to individual records
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect consumer: {0}")]
    Connect(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Offset commit failed: {0}")]
    Commit(String),

    #[error("Source closed")]
    Closed,
}

/// Partitioned input a worker consumes from
///
/// Implementations own a fixed set of partitions. Offsets are only ever
/// committed through [`RecordSource::commit`], after the batch they cover has
/// been applied to state.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecordSource: Send {
    /// Fetches at most `max_records`, waiting no longer than `max_wait` to fill the batch
    async fn poll_batch(
        &mut self,
        max_records: usize,
        max_wait: Duration,
    ) -> Result<Vec<RawRecord>, TransportError>;

    /// Durably records progress for the given partitions
    async fn commit(&mut self, offsets: &[PartitionOffset]) -> Result<(), TransportError>;
}
