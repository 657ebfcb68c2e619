use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::debug;

use crate::kafka::{OutboundRecord, ProducerKind};
use crate::{config::KafkaConfig, Error, Result};

/// One live connection able to append records to topics.
#[async_trait]
pub trait BrokerProducer: Send + Sync + 'static {
    async fn send(&self, record: &OutboundRecord) -> Result<()>;

    /// Blocks until buffered records are delivered or `timeout` elapses.
    fn flush(&self, timeout: Duration) -> Result<()>;

    /// False once the connection hit an unrecoverable error.
    fn is_usable(&self) -> bool;

    fn close(self: Box<Self>) -> Result<()>;
}

pub struct KafkaProducer {
    kind: ProducerKind,
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(kind: ProducerKind, config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = client_config(kind, config)
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self { kind, producer })
    }
}

/// Connection template for a producer of `kind`.
pub fn client_config(kind: ProducerKind, config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("client.id", format!("{}-{}", config.client_id, kind))
        .set("compression.type", &config.compression)
        .set("message.max.bytes", config.max_request_size.to_string())
        .set("acks", &config.acks)
        .set("linger.ms", config.linger_ms.to_string());

    match kind {
        ProducerKind::Json => {}
        // A binary batch may fill a whole request, never more.
        ProducerKind::Binary => {
            client.set("batch.size", config.max_request_size.to_string());
        }
    }

    client
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn send(&self, record: &OutboundRecord) -> Result<()> {
        let headers = OwnedHeaders::new().insert(Header {
            key: "content-type",
            value: Some(self.kind.content_type()),
        });

        let mut future_record = FutureRecord::<str, [u8]>::to(&record.topic)
            .payload(&record.payload[..])
            .timestamp(record.timestamp.timestamp_millis())
            .headers(headers);
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(future_record, Timeout::Never)
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        debug!(topic = %record.topic, partition, offset, "Delivered record");
        Ok(())
    }

    fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout).map_err(Error::Kafka)
    }

    fn is_usable(&self) -> bool {
        self.producer.client().fatal_error().is_none()
    }

    fn close(self: Box<Self>) -> Result<()> {
        let in_flight = self.producer.in_flight_count();
        drop(self);

        if in_flight > 0 {
            return Err(Error::Timeout {
                message: format!("{} records still in flight at close", in_flight),
            });
        }
        Ok(())
    }
}
