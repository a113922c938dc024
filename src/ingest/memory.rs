use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{PartitionOffset, RawRecord, RecordSource, TransportError};

#[derive(Debug, Default)]
struct LogInner {
    partitions: BTreeMap<i32, Vec<Vec<u8>>>,
    committed: BTreeMap<i32, i64>,
    closed: bool,
}

/// Partitioned in-process log with committed offsets, for local runs and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<LogInner>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a payload and returns its offset
    pub fn append(&self, partition: i32, payload: impl Into<Vec<u8>>) -> i64 {
        let mut inner = self.lock();
        let records = inner.partitions.entry(partition).or_default();
        records.push(payload.into());
        records.len() as i64 - 1
    }

    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.lock().committed.get(&partition).copied()
    }

    /// Sources report [`TransportError::Closed`] once drained after this
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// A source over `partitions`, resuming from their committed offsets
    pub fn source(&self, partitions: Vec<i32>) -> MemorySource {
        let positions = {
            let inner = self.lock();
            partitions
                .iter()
                .map(|p| (*p, inner.committed.get(p).copied().unwrap_or(0)))
                .collect()
        };

        MemorySource {
            log: self.clone(),
            positions,
        }
    }
}

/// Consumer view of a [`MemoryLog`] owning a fixed set of partitions
#[derive(Debug)]
pub struct MemorySource {
    log: MemoryLog,
    positions: BTreeMap<i32, i64>,
}

impl MemorySource {
    /// Takes up to `max_records`, one record per partition in turn so a busy
    /// partition cannot starve the others
    fn take(&mut self, max_records: usize) -> (Vec<RawRecord>, bool) {
        let inner = self.log.lock();
        let mut batch = Vec::new();

        while batch.len() < max_records {
            let before = batch.len();
            for (partition, position) in self.positions.iter_mut() {
                if batch.len() == max_records {
                    break;
                }
                let Some(payload) = inner
                    .partitions
                    .get(partition)
                    .and_then(|records| records.get(*position as usize))
                else {
                    continue;
                };
                batch.push(RawRecord {
                    partition: *partition,
                    offset: *position,
                    payload: payload.clone(),
                });
                *position += 1;
            }
            if batch.len() == before {
                break;
            }
        }

        (batch, inner.closed)
    }
}

#[async_trait::async_trait]
impl RecordSource for MemorySource {
    async fn poll_batch(
        &mut self,
        max_records: usize,
        max_wait: Duration,
    ) -> Result<Vec<RawRecord>, TransportError> {
        let (batch, closed) = self.take(max_records);
        if !batch.is_empty() {
            return Ok(batch);
        }
        if closed {
            return Err(TransportError::Closed);
        }

        tokio::time::sleep(max_wait).await;
        Ok(self.take(max_records).0)
    }

    async fn commit(&mut self, offsets: &[PartitionOffset]) -> Result<(), TransportError> {
        let mut inner = self.log.lock();
        for committed in offsets {
            if !self.positions.contains_key(&committed.partition) {
                return Err(TransportError::Commit(format!(
                    "partition {} is not assigned to this source",
                    committed.partition
                )));
            }
            let current = inner.committed.entry(committed.partition).or_insert(0);
            *current = (*current).max(committed.offset);
        }
        Ok(())
    }
}
