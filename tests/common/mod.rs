#![allow(dead_code)]

use async_trait::async_trait;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_relay::config::{Config, KafkaConfig};
use telemetry_relay::kafka::{BrokerProducer, ProducerFactory};
use telemetry_relay::{OutboundRecord, ProducerKind, Result};

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        client_id: format!("telemetry-relay-test-{}", std::process::id()),
        compression: "none".to_string(), // No compression for tests
        linger_ms: 0,                    // Immediate sending for tests
        ..KafkaConfig::default()
    };

    let mut config = Config {
        kafka,
        ..Config::default()
    };
    config.topic.name = format!("test_telemetry_{}", std::process::id());
    config.topic.replication_factor = 1; // Single-broker test cluster
    config
}

/// Counts what the pool does with the producers it gets.
#[derive(Default)]
pub struct Tally {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub in_use: AtomicUsize,
    pub peak_in_use: AtomicUsize,
    pub sent: Mutex<Vec<(usize, OutboundRecord)>>,
}

pub struct CountingProducer {
    serial: usize,
    send_delay: Duration,
    tally: Arc<Tally>,
}

#[async_trait]
impl BrokerProducer for CountingProducer {
    async fn send(&self, record: &OutboundRecord) -> Result<()> {
        let now = self.tally.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.peak_in_use.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.send_delay).await;
        self.tally.sent.lock().unwrap().push((self.serial, record.clone()));

        self.tally.in_use.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn is_usable(&self) -> bool {
        true
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

pub struct CountingFactory {
    pub tally: Arc<Tally>,
    pub send_delay: Duration,
}

impl CountingFactory {
    pub fn new(send_delay: Duration) -> (Self, Arc<Tally>) {
        let tally = Arc::new(Tally::default());
        (
            Self {
                tally: tally.clone(),
                send_delay,
            },
            tally,
        )
    }
}

#[async_trait]
impl ProducerFactory for CountingFactory {
    fn create(&self, _kind: ProducerKind) -> Result<Box<dyn BrokerProducer>> {
        let serial = self.tally.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingProducer {
            serial,
            send_delay: self.send_delay,
            tally: self.tally.clone(),
        }))
    }

    async fn destroy(&self, producer: Box<dyn BrokerProducer>) {
        self.tally.destroyed.fetch_add(1, Ordering::SeqCst);
        let _ = producer.close();
    }
}
