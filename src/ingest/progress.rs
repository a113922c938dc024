use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::StreamKind;
use crate::services::ApplyOutcome;

use super::CommitTracker;

/// Tally of what happened to the records of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub stale: u64,
    pub decode_failures: u64,
    pub store_failures: u64,
}

impl BatchReport {
    pub fn count(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Stale => self.stale += 1,
        }
    }

    pub fn applied(&self) -> u64 {
        self.created + self.updated
    }
}

/// Running counters for one stream, shared by all of its workers
#[derive(Debug, Default)]
pub struct IngestStats {
    batches: AtomicU64,
    applied: AtomicU64,
    unchanged: AtomicU64,
    stale: AtomicU64,
    decode_failures: AtomicU64,
    store_failures: AtomicU64,
    poll_failures: AtomicU64,
    commit_failures: AtomicU64,
}

impl IngestStats {
    pub fn record_batch(&self, report: &BatchReport) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.applied.fetch_add(report.applied(), Ordering::Relaxed);
        self.unchanged.fetch_add(report.unchanged, Ordering::Relaxed);
        self.stale.fetch_add(report.stale, Ordering::Relaxed);
        self.decode_failures
            .fetch_add(report.decode_failures, Ordering::Relaxed);
        self.store_failures
            .fetch_add(report.store_failures, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub batches: u64,
    pub applied: u64,
    pub unchanged: u64,
    pub stale: u64,
    pub decode_failures: u64,
    pub store_failures: u64,
    pub poll_failures: u64,
    pub commit_failures: u64,
}

/// Everything a stream's worker pool reports about its progress
#[derive(Debug)]
pub struct StreamProgress {
    pub stream: StreamKind,
    pub stats: IngestStats,
    pub offsets: CommitTracker,
}

impl StreamProgress {
    pub fn new(stream: StreamKind) -> Self {
        Self {
            stream,
            stats: IngestStats::default(),
            offsets: CommitTracker::new(),
        }
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            stream: self.stream.to_string(),
            stats: self.stats.snapshot(),
            committed_offsets: self.offsets.snapshot(),
        }
    }
}

/// Diagnostics view of one stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub stream: String,
    pub stats: IngestStatsSnapshot,
    pub committed_offsets: BTreeMap<i32, i64>,
}
