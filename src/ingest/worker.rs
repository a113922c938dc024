use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::handler::HandleError;
use super::{
    BatchOffsets, BatchReport, RawRecord, RecordSource, StreamHandler, StreamProgress,
    TransportError,
};

/// Bounds on a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_records: usize,
    pub max_wait: Duration,
}

/// Consumes one partition range of a stream and applies it to state
///
/// The loop is poll, apply every record, commit, repeat. A batch is committed
/// only after each of its records was handed to the store; records that fail
/// to decode are skipped but still committed so they cannot block the partition.
pub struct IngestWorker<S> {
    id: usize,
    source: S,
    handler: Arc<dyn StreamHandler>,
    progress: Arc<StreamProgress>,
    limits: BatchLimits,
    retry_backoff: Duration,
}

impl<S: RecordSource> IngestWorker<S> {
    pub fn new(
        id: usize,
        source: S,
        handler: Arc<dyn StreamHandler>,
        progress: Arc<StreamProgress>,
        limits: BatchLimits,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            id,
            source,
            handler,
            progress,
            limits,
            retry_backoff,
        }
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    ///
    /// Shutdown is only observed between batches or while waiting on the
    /// transport, so a batch is never left half applied and half committed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let stream = self.progress.stream;
        tracing::info!(worker = self.id, stream = %stream, "Ingestion worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                polled = self
                    .source
                    .poll_batch(self.limits.max_records, self.limits.max_wait) => polled,
            };

            let failed = match polled {
                Ok(records) if records.is_empty() => false,
                Ok(records) => self.process_batch(records).await.is_err(),
                Err(TransportError::Closed) => {
                    tracing::info!(worker = self.id, stream = %stream, "Record source closed");
                    break;
                }
                Err(e) => {
                    self.progress.stats.record_poll_failure();
                    tracing::warn!(
                        worker = self.id,
                        stream = %stream,
                        error = %e,
                        "Poll failed, retrying after backoff"
                    );
                    true
                }
            };

            if failed {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.retry_backoff) => {}
                }
            }
        }

        tracing::info!(worker = self.id, stream = %stream, "Ingestion worker stopped");
    }

    /// Applies every record of the batch, then commits the batch's offsets
    pub async fn process_batch(
        &mut self,
        records: Vec<RawRecord>,
    ) -> Result<BatchReport, TransportError> {
        let stream = self.progress.stream;
        let mut offsets = BatchOffsets::default();
        let mut report = BatchReport::default();

        for record in &records {
            match self.handler.handle(&record.payload) {
                Ok(outcome) => report.count(outcome),
                Err(HandleError::Decode(e)) => {
                    report.decode_failures += 1;
                    tracing::warn!(
                        worker = self.id,
                        stream = %stream,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Skipping undecodable record"
                    );
                }
                Err(HandleError::Store(e)) => {
                    report.store_failures += 1;
                    tracing::error!(
                        worker = self.id,
                        stream = %stream,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Store rejected record"
                    );
                }
            }
            offsets.observe(record.partition, record.offset);
        }

        self.progress.stats.record_batch(&report);

        let commit = offsets.to_commit();
        if let Err(e) = self.source.commit(&commit).await {
            self.progress.stats.record_commit_failure();
            tracing::error!(
                worker = self.id,
                stream = %stream,
                records = records.len(),
                error = %e,
                "Offset commit failed; batch will be redelivered"
            );
            return Err(e);
        }
        self.progress.offsets.record_committed(&commit);

        tracing::debug!(
            worker = self.id,
            stream = %stream,
            records = records.len(),
            applied = report.applied(),
            stale = report.stale,
            skipped = report.decode_failures,
            "Batch committed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamKind;
    use crate::ingest::{MockRecordSource, PartitionOffset, SimilarityHandler, UserActionHandler};
    use crate::models::{EventId, UserId};
    use crate::services::{AffinityStore, SimilarityStore};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn limits() -> BatchLimits {
        BatchLimits {
            max_records: 10,
            max_wait: Duration::from_millis(5),
        }
    }

    fn action(partition: i32, offset: i64, user: i64, event: i64, kind: &str) -> RawRecord {
        RawRecord {
            partition,
            offset,
            payload: format!(
                r#"{{"userId":{},"eventId":{},"actionType":"{}","timestamp":{}}}"#,
                user, event, kind, offset
            )
            .into_bytes(),
        }
    }

    fn action_worker(
        source: MockRecordSource,
        store: Arc<AffinityStore>,
    ) -> (IngestWorker<MockRecordSource>, Arc<StreamProgress>) {
        let progress = Arc::new(StreamProgress::new(StreamKind::UserActions));
        let worker = IngestWorker::new(
            0,
            source,
            Arc::new(UserActionHandler::new(store)),
            Arc::clone(&progress),
            limits(),
            Duration::from_millis(1),
        );
        (worker, progress)
    }

    #[tokio::test]
    async fn test_poison_record_is_skipped_and_committed() {
        let committed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&committed);

        let mut source = MockRecordSource::new();
        source.expect_commit().times(1).returning(move |offsets| {
            sink.lock().unwrap().extend_from_slice(offsets);
            Ok(())
        });

        let store = Arc::new(AffinityStore::default());
        let (mut worker, progress) = action_worker(source, Arc::clone(&store));

        let records = vec![
            action(0, 0, 1, 10, "VIEW"),
            RawRecord {
                partition: 0,
                offset: 1,
                payload: b"\xde\xad\xbe\xef".to_vec(),
            },
            action(0, 2, 1, 10, "LIKE"),
        ];

        let report = assert_ok!(worker.process_batch(records).await);
        assert_eq!(report.decode_failures, 1);
        assert_eq!(report.applied(), 2);

        assert_eq!(store.record(UserId(1), EventId(10)).unwrap().weight, 0.9);
        assert_eq!(
            *committed.lock().unwrap(),
            vec![PartitionOffset {
                partition: 0,
                offset: 3
            }]
        );
        assert_eq!(progress.offsets.committed(0), Some(3));
    }

    #[tokio::test]
    async fn test_failed_commit_is_not_tracked() {
        let mut source = MockRecordSource::new();
        source
            .expect_commit()
            .times(1)
            .returning(|_| Err(TransportError::Commit("broker unavailable".to_string())));

        let store = Arc::new(AffinityStore::default());
        let (mut worker, progress) = action_worker(source, Arc::clone(&store));

        let result = worker.process_batch(vec![action(3, 41, 2, 20, "REGISTER")]).await;
        assert_err!(result);

        // applied before commit, so a redelivery merges idempotently
        assert_eq!(store.record(UserId(2), EventId(20)).unwrap().weight, 0.7);
        assert_eq!(progress.offsets.committed(3), None);
        assert_eq!(progress.stats.snapshot().commit_failures, 1);
    }

    #[tokio::test]
    async fn test_redelivered_batch_leaves_state_unchanged() {
        let mut source = MockRecordSource::new();
        source.expect_commit().times(2).returning(|_| Ok(()));

        let store = Arc::new(AffinityStore::default());
        let (mut worker, _progress) = action_worker(source, Arc::clone(&store));

        let batch = vec![action(0, 0, 5, 50, "LIKE"), action(0, 1, 5, 51, "VIEW")];
        worker.process_batch(batch.clone()).await.unwrap();
        let before = store.affinities_of(UserId(5));

        let replay = worker.process_batch(batch).await.unwrap();
        assert_eq!(replay.unchanged, 2);
        assert_eq!(store.affinities_of(UserId(5)), before);
    }

    #[tokio::test]
    async fn test_run_applies_polled_batches_until_source_closes() {
        let mut source = MockRecordSource::new();
        let mut first = true;
        source.expect_poll_batch().returning(move |_, _| {
            if std::mem::take(&mut first) {
                Ok(vec![RawRecord {
                    partition: 1,
                    offset: 7,
                    payload: br#"{"eventA":1,"eventB":2,"score":0.5,"timestamp":1}"#.to_vec(),
                }])
            } else {
                Err(TransportError::Closed)
            }
        });
        source.expect_commit().times(1).returning(|_| Ok(()));

        let store = Arc::new(SimilarityStore::new());
        let progress = Arc::new(StreamProgress::new(StreamKind::EventsSimilarity));
        let worker = IngestWorker::new(
            1,
            source,
            Arc::new(SimilarityHandler::new(Arc::clone(&store))),
            Arc::clone(&progress),
            limits(),
            Duration::from_millis(1),
        );

        let (_tx, rx) = watch::channel(false);
        worker.run(rx).await;

        assert_eq!(store.record(EventId(1), EventId(2)).unwrap().score, 0.5);
        assert_eq!(progress.offsets.committed(1), Some(8));
    }

    #[tokio::test]
    async fn test_poll_failure_retries_without_commit() {
        let mut source = MockRecordSource::new();
        let mut calls = 0;
        source.expect_poll_batch().returning(move |_, _| {
            calls += 1;
            match calls {
                1 => Err(TransportError::Poll("connection reset".to_string())),
                _ => Err(TransportError::Closed),
            }
        });
        source.expect_commit().never();

        let store = Arc::new(AffinityStore::default());
        let (worker, progress) = action_worker(source, store);

        let (_tx, rx) = watch::channel(false);
        worker.run(rx).await;

        assert_eq!(progress.stats.snapshot().poll_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_during_commit_finishes_batch() {
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let mut entered_tx = Some(entered_tx);

        let mut source = MockRecordSource::new();
        source
            .expect_poll_batch()
            .times(1)
            .returning(|_, _| Ok(vec![action(2, 9, 4, 40, "LIKE")]));
        source.expect_commit().times(1).returning(move |offsets| {
            assert_eq!(offsets, [PartitionOffset { partition: 2, offset: 10 }]);
            if let Some(tx) = entered_tx.take() {
                let _ = tx.send(());
            }
            // hold the commit open until the test has signalled shutdown
            release_rx.recv().unwrap();
            Ok(())
        });

        let store = Arc::new(AffinityStore::default());
        let (worker, progress) = action_worker(source, Arc::clone(&store));

        let (tx, rx) = watch::channel(false);
        let running = tokio::spawn(worker.run(rx));

        entered_rx.await.unwrap();
        assert_eq!(store.record(UserId(4), EventId(40)).unwrap().weight, 0.9);
        assert_eq!(progress.offsets.committed(2), None);

        tx.send(true).unwrap();
        release_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("worker did not stop after shutdown")
            .unwrap();
        assert_eq!(progress.offsets.committed(2), Some(10));
        assert_eq!(progress.stats.snapshot().batches, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_stops_immediately() {
        let mut source = MockRecordSource::new();
        source.expect_poll_batch().never();

        let (worker, _progress) = action_worker(source, Arc::new(AffinityStore::default()));

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        worker.run(rx).await;
    }
}
