use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

use crate::services::weights::ActionWeights;

/// Where a consumer starts when its group has no committed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Latest,
    Earliest,
    None,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Latest => "latest",
            OffsetReset::Earliest => "earliest",
            OffsetReset::None => "none",
        }
    }
}

/// The two input streams the analyzer consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    UserActions,
    EventsSimilarity,
}

impl Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::UserActions => write!(f, "user-actions"),
            StreamKind::EventsSimilarity => write!(f, "events-similarity"),
        }
    }
}

/// Startup configuration problems; any of these aborts the process
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("weight for {kind} must be within [0, 1], got {value}")]
    WeightOutOfRange { kind: &'static str, value: f64 },

    #[error("heartbeat interval ({heartbeat_ms} ms) must be below session timeout ({session_ms} ms)")]
    HeartbeatTooSlow { heartbeat_ms: u64, session_ms: u64 },

    #[error("auto-commit is not supported; offsets are committed after state is applied")]
    AutoCommitEnabled,

    #[error("partition list for {stream} is invalid: {reason}")]
    InvalidPartitions { stream: StreamKind, reason: String },
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Comma separated Kafka bootstrap servers
    #[serde(default = "default_bootstrap_servers")]
    pub kafka_bootstrap_servers: String,

    #[serde(default = "default_user_action_topic")]
    pub user_action_topic: String,

    #[serde(default = "default_events_similarity_topic")]
    pub events_similarity_topic: String,

    #[serde(default = "default_user_action_group")]
    pub user_action_group: String,

    #[serde(default = "default_events_similarity_group")]
    pub events_similarity_group: String,

    #[serde(default = "default_offset_reset")]
    pub auto_offset_reset: OffsetReset,

    /// Only `false` is accepted
    #[serde(default)]
    pub enable_auto_commit: bool,

    /// Upper bound on records taken per poll
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: u64,

    /// Upper bound on how long one poll waits to fill a batch
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: u64,

    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_max_partition_fetch_bytes")]
    pub max_partition_fetch_bytes: u64,

    /// Workers in the user-actions pool
    #[serde(default = "default_concurrency")]
    pub user_action_concurrency: u64,

    /// Workers in the events-similarity pool
    #[serde(default = "default_concurrency")]
    pub events_similarity_concurrency: u64,

    /// Static partition assignment; broker-managed when unset
    #[serde(default)]
    pub user_action_partitions: Option<Vec<i32>>,

    #[serde(default)]
    pub events_similarity_partitions: Option<Vec<i32>>,

    /// Delay before a worker retries after a transport failure
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_weight_view")]
    pub weight_view: f64,

    #[serde(default = "default_weight_register")]
    pub weight_register: f64,

    #[serde(default = "default_weight_like")]
    pub weight_like: f64,

    /// Deadline for a single recommendation query
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_user_action_topic() -> String {
    "user-actions".to_string()
}

fn default_events_similarity_topic() -> String {
    "events-similarity".to_string()
}

fn default_user_action_group() -> String {
    "analyzer-user-action-group".to_string()
}

fn default_events_similarity_group() -> String {
    "analyzer-events-similarity-group".to_string()
}

fn default_offset_reset() -> OffsetReset {
    OffsetReset::Latest
}

fn default_max_poll_records() -> u64 {
    500
}

fn default_fetch_max_wait_ms() -> u64 {
    500
}

fn default_max_poll_interval_ms() -> u64 {
    300_000
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    3_000
}

fn default_max_partition_fetch_bytes() -> u64 {
    1_048_576
}

fn default_concurrency() -> u64 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_weight_view() -> f64 {
    0.3
}

fn default_weight_register() -> f64 {
    0.7
}

fn default_weight_like() -> f64 {
    0.9
}

fn default_query_timeout_ms() -> u64 {
    2_000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment variables and validate it
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;
        Ok(config)
    }

    /// Checks every bound the consumers and the weight table rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("KAFKA_BOOTSTRAP_SERVERS", &self.kafka_bootstrap_servers),
            ("USER_ACTION_TOPIC", &self.user_action_topic),
            ("EVENTS_SIMILARITY_TOPIC", &self.events_similarity_topic),
            ("USER_ACTION_GROUP", &self.user_action_group),
            ("EVENTS_SIMILARITY_GROUP", &self.events_similarity_group),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }

        if self.enable_auto_commit {
            return Err(ConfigError::AutoCommitEnabled);
        }

        let minimums = [
            ("MAX_POLL_RECORDS", self.max_poll_records, 1),
            ("FETCH_MAX_WAIT_MS", self.fetch_max_wait_ms, 1),
            ("MAX_POLL_INTERVAL_MS", self.max_poll_interval_ms, 1_000),
            ("SESSION_TIMEOUT_MS", self.session_timeout_ms, 1_000),
            ("HEARTBEAT_INTERVAL_MS", self.heartbeat_interval_ms, 1_000),
            ("MAX_PARTITION_FETCH_BYTES", self.max_partition_fetch_bytes, 1_024),
            ("USER_ACTION_CONCURRENCY", self.user_action_concurrency, 1),
            ("EVENTS_SIMILARITY_CONCURRENCY", self.events_similarity_concurrency, 1),
            ("QUERY_TIMEOUT_MS", self.query_timeout_ms, 1),
        ];
        for (field, value, min) in minimums {
            if value < min {
                return Err(ConfigError::TooSmall { field, min, value });
            }
        }

        if self.heartbeat_interval_ms >= self.session_timeout_ms {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat_ms: self.heartbeat_interval_ms,
                session_ms: self.session_timeout_ms,
            });
        }

        validate_partitions(StreamKind::UserActions, self.user_action_partitions.as_deref())?;
        validate_partitions(
            StreamKind::EventsSimilarity,
            self.events_similarity_partitions.as_deref(),
        )?;

        self.action_weights().map(|_| ())
    }

    /// Builds the weight lookup table from the configured values
    pub fn action_weights(&self) -> Result<ActionWeights, ConfigError> {
        ActionWeights::new(self.weight_view, self.weight_register, self.weight_like)
    }

    pub fn topic(&self, stream: StreamKind) -> &str {
        match stream {
            StreamKind::UserActions => &self.user_action_topic,
            StreamKind::EventsSimilarity => &self.events_similarity_topic,
        }
    }

    pub fn group_id(&self, stream: StreamKind) -> &str {
        match stream {
            StreamKind::UserActions => &self.user_action_group,
            StreamKind::EventsSimilarity => &self.events_similarity_group,
        }
    }

    pub fn concurrency(&self, stream: StreamKind) -> usize {
        let workers = match stream {
            StreamKind::UserActions => self.user_action_concurrency,
            StreamKind::EventsSimilarity => self.events_similarity_concurrency,
        };
        usize::try_from(workers).unwrap_or(usize::MAX)
    }

    /// Statically assigned partitions for a stream, if any
    pub fn partitions(&self, stream: StreamKind) -> Option<&[i32]> {
        match stream {
            StreamKind::UserActions => self.user_action_partitions.as_deref(),
            StreamKind::EventsSimilarity => self.events_similarity_partitions.as_deref(),
        }
    }

    pub fn max_poll_records(&self) -> usize {
        usize::try_from(self.max_poll_records).unwrap_or(usize::MAX)
    }

    pub fn fetch_max_wait(&self) -> Duration {
        Duration::from_millis(self.fetch_max_wait_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn validate_partitions(stream: StreamKind, partitions: Option<&[i32]>) -> Result<(), ConfigError> {
    let Some(partitions) = partitions else {
        return Ok(());
    };

    if partitions.is_empty() {
        return Err(ConfigError::InvalidPartitions {
            stream,
            reason: "list is empty".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for partition in partitions {
        if *partition < 0 {
            return Err(ConfigError::InvalidPartitions {
                stream,
                reason: format!("negative partition {}", partition),
            });
        }
        if !seen.insert(*partition) {
            return Err(ConfigError::InvalidPartitions {
                stream,
                reason: format!("partition {} listed twice", partition),
            });
        }
    }

    Ok(())
}

/// Splits a static partition list into one disjoint range per worker.
///
/// Workers beyond the number of partitions receive nothing and are not started.
pub fn split_partitions(partitions: &[i32], workers: usize) -> Vec<Vec<i32>> {
    let workers = workers.max(1).min(partitions.len().max(1));
    let mut ranges = vec![Vec::new(); workers];
    for (index, partition) in partitions.iter().enumerate() {
        ranges[index % workers].push(*partition);
    }
    ranges.retain(|range| !range.is_empty());
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config_from(&[]);

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.user_action_topic, "user-actions");
        assert_eq!(config.events_similarity_group, "analyzer-events-similarity-group");
        assert_eq!(config.auto_offset_reset, OffsetReset::Latest);
        assert_eq!(config.max_poll_records(), 500);
        assert_eq!(config.concurrency(StreamKind::UserActions), 3);
        assert_eq!(config.partitions(StreamKind::UserActions), None);
    }

    #[test]
    fn test_reads_overrides_from_environment() {
        let config = config_from(&[
            ("AUTO_OFFSET_RESET", "earliest"),
            ("USER_ACTION_PARTITIONS", "0,2,4"),
            ("WEIGHT_LIKE", "1.0"),
            ("EVENTS_SIMILARITY_CONCURRENCY", "5"),
        ]);

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.auto_offset_reset, OffsetReset::Earliest);
        assert_eq!(config.partitions(StreamKind::UserActions), Some(&[0, 2, 4][..]));
        assert_eq!(config.concurrency(StreamKind::EventsSimilarity), 5);
        assert_eq!(config.weight_like, 1.0);
    }

    #[test]
    fn test_weight_out_of_range_is_rejected() {
        let config = config_from(&[("WEIGHT_REGISTER", "1.5")]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::WeightOutOfRange {
                kind: "REGISTER",
                value: 1.5
            })
        );
    }

    #[test]
    fn test_empty_broker_address_is_rejected() {
        let config = config_from(&[("KAFKA_BOOTSTRAP_SERVERS", " ")]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Empty("KAFKA_BOOTSTRAP_SERVERS"))
        );
    }

    #[test]
    fn test_auto_commit_is_rejected() {
        let config = config_from(&[("ENABLE_AUTO_COMMIT", "true")]);
        assert_eq!(config.validate(), Err(ConfigError::AutoCommitEnabled));
    }

    #[test]
    fn test_timing_bounds() {
        let config = config_from(&[("SESSION_TIMEOUT_MS", "500")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooSmall {
                field: "SESSION_TIMEOUT_MS",
                ..
            })
        ));

        let config = config_from(&[
            ("SESSION_TIMEOUT_MS", "3000"),
            ("HEARTBEAT_INTERVAL_MS", "3000"),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HeartbeatTooSlow { .. })
        ));
    }

    #[test]
    fn test_duplicate_partitions_are_rejected() {
        let config = config_from(&[("EVENTS_SIMILARITY_PARTITIONS", "1,1")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPartitions {
                stream: StreamKind::EventsSimilarity,
                ..
            })
        ));
    }

    #[test]
    fn test_split_partitions_is_disjoint() {
        assert_eq!(
            split_partitions(&[0, 1, 2, 3, 4], 2),
            vec![vec![0, 2, 4], vec![1, 3]]
        );
        assert_eq!(split_partitions(&[7], 3), vec![vec![7]]);
    }
}
