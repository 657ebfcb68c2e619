use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::kafka::{BrokerProducer, KafkaProducer, PooledProducer, ProducerKind};
use crate::Result;

/// Builds, tears down and health-checks producers for the pool.
#[async_trait]
pub trait ProducerFactory: Send + Sync + 'static {
    /// Opens a new broker connection for `kind`.
    fn create(&self, kind: ProducerKind) -> Result<Box<dyn BrokerProducer>>;

    /// Flushes and closes `producer`. Close failures are logged, never returned.
    async fn destroy(&self, producer: Box<dyn BrokerProducer>);

    fn validate(&self, handle: &PooledProducer) -> bool {
        handle.producer().map_or(false, |p| p.is_usable())
    }
}

pub struct KafkaProducerFactory {
    config: KafkaConfig,
}

impl KafkaProducerFactory {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProducerFactory for KafkaProducerFactory {
    fn create(&self, kind: ProducerKind) -> Result<Box<dyn BrokerProducer>> {
        info!(
            kind = %kind,
            brokers = %self.config.bootstrap_servers(),
            "Opening producer connection"
        );
        let producer = KafkaProducer::new(kind, &self.config)?;
        Ok(Box::new(producer))
    }

    async fn destroy(&self, producer: Box<dyn BrokerProducer>) {
        destroy_with_flush(producer, self.config.flush_timeout()).await;
    }
}

/// Flush then close on a blocking thread; librdkafka's flush blocks.
pub(crate) async fn destroy_with_flush(
    producer: Box<dyn BrokerProducer>,
    timeout: std::time::Duration,
) {
    let outcome = tokio::task::spawn_blocking(move || {
        if let Err(e) = producer.flush(timeout) {
            warn!("Flush before close failed: {}", e);
        }
        producer.close()
    })
    .await;

    match outcome {
        Ok(Ok(())) => debug!("Producer closed"),
        Ok(Err(e)) => warn!("Ignoring error while closing producer: {}", e),
        Err(e) => warn!("Producer close task failed: {}", e),
    }
}
