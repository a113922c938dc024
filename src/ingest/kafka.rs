use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use std::time::Duration;

use crate::config::{Config, OffsetReset, StreamKind};

use super::{PartitionOffset, RawRecord, RecordSource, TransportError};

/// Kafka consumer for one worker of a stream's pool
///
/// With a static partition list the consumer is assigned exactly those
/// partitions; otherwise it joins the stream's consumer group and the broker
/// balances partitions across the pool.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSource {
    pub fn connect(
        config: &Config,
        stream: StreamKind,
        partitions: Option<&[i32]>,
    ) -> Result<Self, TransportError> {
        let topic = config.topic(stream).to_string();

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_bootstrap_servers)
            .set("group.id", config.group_id(stream))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", offset_reset(config.auto_offset_reset))
            .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string())
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("heartbeat.interval.ms", config.heartbeat_interval_ms.to_string())
            .set(
                "max.partition.fetch.bytes",
                config.max_partition_fetch_bytes.to_string(),
            )
            .set("fetch.wait.max.ms", config.fetch_max_wait_ms.to_string())
            .create()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        match partitions {
            Some(partitions) => {
                let mut assignment = TopicPartitionList::new();
                for partition in partitions {
                    assignment
                        .add_partition_offset(&topic, *partition, Offset::Stored)
                        .map_err(|e| TransportError::Connect(e.to_string()))?;
                }
                consumer
                    .assign(&assignment)
                    .map_err(|e| TransportError::Connect(e.to_string()))?;
            }
            None => consumer
                .subscribe(&[topic.as_str()])
                .map_err(|e| TransportError::Connect(e.to_string()))?,
        }

        tracing::info!(
            stream = %stream,
            topic = %topic,
            group = config.group_id(stream),
            partitions = ?partitions,
            "Kafka consumer connected"
        );

        Ok(Self { consumer, topic })
    }
}

/// librdkafka spells "fail when there is no committed offset" as `error`
fn offset_reset(policy: OffsetReset) -> &'static str {
    match policy {
        OffsetReset::None => "error",
        other => other.as_str(),
    }
}

#[async_trait::async_trait]
impl RecordSource for KafkaSource {
    async fn poll_batch(
        &mut self,
        max_records: usize,
        max_wait: Duration,
    ) -> Result<Vec<RawRecord>, TransportError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut batch = Vec::new();

        while batch.len() < max_records {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Err(_) => break,
                Ok(Ok(message)) => batch.push(RawRecord {
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                }),
                Ok(Err(e)) if batch.is_empty() => return Err(TransportError::Poll(e.to_string())),
                Ok(Err(e)) => {
                    tracing::warn!(topic = %self.topic, error = %e, "Poll interrupted, returning partial batch");
                    break;
                }
            }
        }

        Ok(batch)
    }

    async fn commit(&mut self, offsets: &[PartitionOffset]) -> Result<(), TransportError> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut list = TopicPartitionList::new();
        for committed in offsets {
            list.add_partition_offset(
                &self.topic,
                committed.partition,
                Offset::Offset(committed.offset),
            )
            .map_err(|e| TransportError::Commit(e.to_string()))?;
        }

        self.consumer
            .commit(&list, CommitMode::Sync)
            .map_err(|e| TransportError::Commit(e.to_string()))
    }
}
