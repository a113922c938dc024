use dashmap::DashMap;
use std::collections::BTreeMap;

use super::PartitionOffset;

/// Highest processed offset per partition within one batch
#[derive(Debug, Default)]
pub struct BatchOffsets {
    next: BTreeMap<i32, i64>,
}

impl BatchOffsets {
    /// Marks a record as processed, whether it was applied or skipped
    pub fn observe(&mut self, partition: i32, offset: i64) {
        let next = offset + 1;
        self.next
            .entry(partition)
            .and_modify(|current| *current = (*current).max(next))
            .or_insert(next);
    }

    /// Offsets to hand to the transport, ordered by partition
    pub fn to_commit(&self) -> Vec<PartitionOffset> {
        self.next
            .iter()
            .map(|(partition, offset)| PartitionOffset {
                partition: *partition,
                offset: *offset,
            })
            .collect()
    }
}

/// Last successfully committed position per partition of one stream
///
/// Shared by every worker of a pool; positions only move forward.
#[derive(Debug, Default)]
pub struct CommitTracker {
    committed: DashMap<i32, i64>,
}

impl CommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records offsets the transport acknowledged
    pub fn record_committed(&self, offsets: &[PartitionOffset]) {
        for committed in offsets {
            self.committed
                .entry(committed.partition)
                .and_modify(|current| *current = (*current).max(committed.offset))
                .or_insert(committed.offset);
        }
    }

    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.committed.get(&partition).map(|offset| *offset)
    }

    pub fn snapshot(&self) -> BTreeMap<i32, i64> {
        self.committed
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}
