use tracing::{error, info, instrument};

use crate::config::Config;
use crate::kafka::{KafkaAdminGateway, TopicAdmin, TopicSpec};
use crate::{Error, Result};

/// What `create_or_update` had to do to reach the requested layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created { partitions: usize },
    Grown { from: usize, to: usize },
    Unchanged { observed: usize },
}

/// Ensures a topic exists with at least the requested partition count.
///
/// A provisioner is single-use: [`TopicProvisioner::create_or_update`]
/// consumes it and always tears the admin connection down before returning.
/// Partition counts are only ever grown, and the replication factor of an
/// existing topic is left alone.
pub struct TopicProvisioner<A: TopicAdmin = KafkaAdminGateway> {
    admin: A,
    replication_factor: i32,
}

impl TopicProvisioner<KafkaAdminGateway> {
    pub fn connect(config: &Config) -> Result<Self> {
        let admin = KafkaAdminGateway::new(config)?;
        Ok(Self::new(admin, config.topic.replication_factor))
    }
}

impl<A: TopicAdmin> TopicProvisioner<A> {
    pub fn new(admin: A, replication_factor: i32) -> Self {
        Self {
            admin,
            replication_factor,
        }
    }

    #[instrument(skip_all, fields(topic = %topic_name, partitions = desired_partitions))]
    pub async fn create_or_update(
        self,
        topic_name: &str,
        desired_partitions: usize,
    ) -> Result<ProvisionOutcome> {
        let result = self.reconcile(topic_name, desired_partitions).await;
        self.admin.teardown().await;

        result.map_err(|e| {
            error!(
                topic = %topic_name,
                partitions = desired_partitions,
                "Topic provisioning failed: {}", e
            );
            Error::Provisioning {
                topic: topic_name.to_string(),
                partitions: desired_partitions,
                cause: Box::new(e),
            }
        })
    }

    async fn reconcile(
        &self,
        topic_name: &str,
        desired_partitions: usize,
    ) -> Result<ProvisionOutcome> {
        let spec = TopicSpec::new(topic_name, desired_partitions, self.replication_factor)?;

        if !self.admin.exists(topic_name).await? {
            self.admin.create(&spec).await?;
            info!("Topic created with {} partitions", desired_partitions);
            return Ok(ProvisionOutcome::Created {
                partitions: desired_partitions,
            });
        }

        let description = self.admin.describe(topic_name).await?;
        if description.partitions >= desired_partitions {
            info!(observed = description.partitions, "Topic already has enough partitions");
            return Ok(ProvisionOutcome::Unchanged {
                observed: description.partitions,
            });
        }

        self.admin.increase_partitions(topic_name, desired_partitions).await?;
        info!(from = description.partitions, "Topic partitions increased");
        Ok(ProvisionOutcome::Grown {
            from: description.partitions,
            to: desired_partitions,
        })
    }
}
