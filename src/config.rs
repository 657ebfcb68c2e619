use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

const COMPRESSION_CODECS: [&str; 5] = ["none", "gzip", "snappy", "lz4", "zstd"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub topic: TopicConfig,
}

/// Connection template shared by every producer and admin client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

/// Producer pool limits. Leaving a field unset means "no limit".
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub max_total_per_key: Option<usize>,
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicConfig {
    #[serde(default = "default_topic_name")]
    pub name: String,
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,
    #[serde(default = "default_create_timeout_secs")]
    pub create_timeout_secs: u64,
}

/// Read when no file is named on the command line; may be absent.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Loads `path` (which must exist) with environment overrides on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(config::File::from(path.as_ref()).required(true))
    }

    /// Loads [`DEFAULT_CONFIG_FILE`] from the working directory if there is
    /// one, otherwise defaults plus environment overrides.
    pub fn from_default_location() -> Result<Self> {
        Self::load(config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false))
    }

    fn load(file: config::File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("TELEMETRY_RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config("kafka.brokers must list at least one endpoint".to_string()));
        }

        if !COMPRESSION_CODECS.contains(&self.kafka.compression.as_str()) {
            return Err(Error::Config(format!(
                "kafka.compression '{}' is not one of {:?}",
                self.kafka.compression, COMPRESSION_CODECS
            )));
        }

        if self.pool.max_total_per_key == Some(0) {
            return Err(Error::Config(
                "pool.max_total_per_key must be positive; leave it unset for no cap".to_string(),
            ));
        }

        if self.topic.partitions == 0 {
            return Err(Error::Config("topic.partitions must be positive".to_string()));
        }

        if self.topic.replication_factor <= 0 {
            return Err(Error::Config("topic.replication_factor must be positive".to_string()));
        }

        Ok(())
    }
}

impl KafkaConfig {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            client_id: default_client_id(),
            compression: default_compression(),
            max_request_size: default_max_request_size(),
            acks: default_acks(),
            linger_ms: default_linger_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

impl PoolConfig {
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

impl TopicConfig {
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            name: default_topic_name(),
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
            create_timeout_secs: default_create_timeout_secs(),
        }
    }
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_client_id() -> String {
    "telemetry-relay".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_max_request_size() -> usize {
    1_048_576 // 1MB
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_flush_timeout_secs() -> u64 {
    10
}

fn default_topic_name() -> String {
    "test-telemetry".to_string()
}

fn default_partitions() -> usize {
    3
}

fn default_replication_factor() -> i32 {
    3
}

fn default_create_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.kafka.bootstrap_servers(), "localhost:9092");
        assert_eq!(config.topic.replication_factor, 3);
        assert_eq!(config.topic.create_timeout(), Duration::from_secs(10));
        assert!(config.pool.max_total_per_key.is_none());
        assert!(config.pool.max_wait().is_none());
    }

    #[test]
    fn test_rejects_unknown_compression() {
        let mut config = Config::default();
        config.kafka.compression = "brotli".to_string();

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut config = Config::default();
        config.pool.max_total_per_key = Some(0);

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_empty_brokers() {
        let mut config = Config::default();
        config.kafka.brokers = vec![" ".to_string()];

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
