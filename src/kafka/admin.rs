use async_trait::async_trait;
use rdkafka::admin::{
    AdminClient, AdminOptions, NewPartitions, NewTopic, TopicReplication, TopicResult,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::AdminOperation;
use crate::{Error, Result};

/// Desired end state of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: usize,
    pub replication_factor: i32,
}

impl TopicSpec {
    pub fn new(
        name: impl Into<String>,
        partitions: usize,
        replication_factor: i32,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Config("topic name must not be empty".to_string()));
        }
        if partitions == 0 {
            return Err(Error::Config(format!("topic '{}' needs at least one partition", name)));
        }
        if replication_factor <= 0 {
            return Err(Error::Config(format!(
                "topic '{}' needs a positive replication factor, got {}",
                name, replication_factor
            )));
        }

        Ok(Self {
            name,
            partitions,
            replication_factor,
        })
    }
}

/// Partition layout observed on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: usize,
}

/// One topic of a metadata response, with the broker's per-topic error.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TopicEntry {
    name: String,
    partitions: usize,
    error: Option<RDKafkaErrorCode>,
}

/// Broker topic administration. Every call fails with
/// [`Error::AdminOperation`] tagged with the phase that failed.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn list_topic_names(&self) -> Result<Vec<String>>;

    async fn exists(&self, name: &str) -> Result<bool>;

    async fn describe(&self, name: &str) -> Result<TopicDescription>;

    async fn create(&self, spec: &TopicSpec) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn increase_partitions(&self, name: &str, new_count: usize) -> Result<()>;

    /// Closes the admin connection. Safe to call more than once.
    async fn teardown(&self);
}

pub struct KafkaAdminGateway {
    client: Mutex<Option<Arc<AdminClient<DefaultClientContext>>>>,
    request_timeout: Duration,
    create_timeout: Duration,
}

impl KafkaAdminGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", config.kafka.bootstrap_servers())
            .set("client.id", format!("{}-admin", config.kafka.client_id))
            // Metadata lookups must not create the topic they ask about.
            .set("allow.auto.create.topics", "false")
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            client: Mutex::new(Some(Arc::new(client))),
            request_timeout: config.kafka.request_timeout(),
            create_timeout: config.topic.create_timeout(),
        })
    }

    fn client(
        &self,
        operation: AdminOperation,
        topic: &str,
    ) -> Result<Arc<AdminClient<DefaultClientContext>>> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                failed(
                    operation,
                    topic,
                    Error::Connection("admin connection closed".to_string()),
                )
            })
    }

    fn options(&self) -> AdminOptions {
        AdminOptions::new().request_timeout(Some(self.request_timeout))
    }

    /// Fetches metadata for `topic` (all topics when `None`) off the async runtime.
    async fn metadata(
        &self,
        operation: AdminOperation,
        topic: Option<&str>,
    ) -> Result<Vec<TopicEntry>> {
        let label = topic.unwrap_or("*").to_string();
        let client = self.client(operation, &label)?;
        let wanted = topic.map(str::to_string);
        let timeout = self.request_timeout;

        let fetched = tokio::task::spawn_blocking(move || {
            let metadata = client.inner().fetch_metadata(wanted.as_deref(), timeout)?;
            Ok::<_, rdkafka::error::KafkaError>(
                metadata
                    .topics()
                    .iter()
                    .map(|t| TopicEntry {
                        name: t.name().to_string(),
                        partitions: t.partitions().len(),
                        error: t.error().map(RDKafkaErrorCode::from),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await;

        match fetched {
            Ok(Ok(topics)) => Ok(topics),
            Ok(Err(e)) => Err(failed(operation, &label, Error::Kafka(e))),
            Err(e) => Err(failed(
                operation,
                &label,
                Error::Connection(format!("metadata task failed: {}", e)),
            )),
        }
    }
}

fn failed(operation: AdminOperation, topic: &str, cause: Error) -> Error {
    error!(operation = ?operation, topic = %topic, "{} '{}': {}", operation, topic, cause);
    Error::admin(operation, topic, cause)
}

/// Picks `name` out of a metadata response. `Ok(None)` means the broker does
/// not know the topic; any other per-topic error is a failure.
fn find_topic(
    operation: AdminOperation,
    name: &str,
    entries: Vec<TopicEntry>,
) -> Result<Option<TopicDescription>> {
    let Some(entry) = entries.into_iter().find(|t| t.name == name) else {
        return Ok(None);
    };

    match entry.error {
        None => Ok(Some(TopicDescription {
            name: entry.name,
            partitions: entry.partitions,
        })),
        Some(RDKafkaErrorCode::UnknownTopicOrPartition) => Ok(None),
        Some(code) => Err(failed(
            operation,
            name,
            Error::Broker {
                message: format!("{} ({:?})", code, code),
            },
        )),
    }
}

/// Turns per-topic results of a batch admin call into one outcome.
fn check_results(operation: AdminOperation, topic: &str, results: Vec<TopicResult>) -> Result<()> {
    for result in results {
        if let Err((name, code)) = result {
            return Err(failed(
                operation,
                &name,
                Error::Broker {
                    message: format!("{} ({:?})", code, code),
                },
            ));
        }
    }
    debug!(operation = ?operation, topic = %topic, "Admin operation succeeded");
    Ok(())
}

#[async_trait]
impl TopicAdmin for KafkaAdminGateway {
    async fn list_topic_names(&self) -> Result<Vec<String>> {
        let topics = self.metadata(AdminOperation::ListTopics, None).await?;
        Ok(topics
            .into_iter()
            .filter(|t| t.error != Some(RDKafkaErrorCode::UnknownTopicOrPartition))
            .map(|t| t.name)
            .collect())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let op = AdminOperation::CheckExistence;
        let topics = self.metadata(op, Some(name)).await?;
        Ok(find_topic(op, name, topics)?.is_some())
    }

    async fn describe(&self, name: &str) -> Result<TopicDescription> {
        let op = AdminOperation::Describe;
        let topics = self.metadata(op, Some(name)).await?;
        find_topic(op, name, topics)?.ok_or_else(|| {
            failed(
                op,
                name,
                Error::Broker {
                    message: "topic not found".to_string(),
                },
            )
        })
    }

    async fn create(&self, spec: &TopicSpec) -> Result<()> {
        let op = AdminOperation::Create;
        let client = self.client(op, &spec.name)?;
        let partitions = i32::try_from(spec.partitions).map_err(|_| {
            let cause = Error::Config(format!("{} partitions is too many", spec.partitions));
            failed(op, &spec.name, cause)
        })?;

        let new_topic = NewTopic::new(
            &spec.name,
            partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        let opts = self.options().operation_timeout(Some(self.create_timeout));

        let new_topics = [new_topic];
        let request = client.create_topics(&new_topics, &opts);
        let results = tokio::time::timeout(self.create_timeout, request)
            .await
            .map_err(|_| {
                failed(
                    op,
                    &spec.name,
                    Error::Timeout {
                        message: format!("no answer within {:?}", self.create_timeout),
                    },
                )
            })?
            .map_err(|e| failed(op, &spec.name, Error::Kafka(e)))?;

        check_results(op, &spec.name, results)?;
        info!(
            topic = %spec.name,
            partitions = spec.partitions,
            replication_factor = spec.replication_factor,
            "Created topic"
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let op = AdminOperation::Delete;
        let client = self.client(op, name)?;

        let results = client
            .delete_topics(&[name], &self.options())
            .await
            .map_err(|e| failed(op, name, Error::Kafka(e)))?;

        check_results(op, name, results)?;
        info!(topic = %name, "Deleted topic");
        Ok(())
    }

    async fn increase_partitions(&self, name: &str, new_count: usize) -> Result<()> {
        let op = AdminOperation::IncreasePartitions;
        let client = self.client(op, name)?;

        let results = client
            .create_partitions(&[NewPartitions::new(name, new_count)], &self.options())
            .await
            .map_err(|e| failed(op, name, Error::Kafka(e)))?;

        check_results(op, name, results)?;
        info!(topic = %name, partitions = new_count, "Increased partition count");
        Ok(())
    }

    async fn teardown(&self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if client.is_some() {
            debug!("Closing admin connection");
        }
    }
}
