mod common;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Headers;
use rdkafka::Message;
use serde_json::{json, Value};
use std::time::Duration;
use telemetry_relay::config::KafkaConfig;
use telemetry_relay::kafka::{KafkaAdminGateway, ProvisionOutcome, TopicAdmin};
use telemetry_relay::{KeyedProducerPool, OutboundRecord, ProducerKind, TopicProvisioner};
use tokio::time::timeout;
use tracing::info;

#[tokio::test]
#[ignore] // Run with: cargo test --ignored integration_test::test_provision_then_publish
async fn test_provision_then_publish() {
    tracing_subscriber::fmt()
        .with_env_filter("telemetry_relay=debug,rdkafka=info")
        .try_init()
        .ok();

    let config = common::get_test_config();
    let topic = config.topic.name.clone();

    let outcome = TopicProvisioner::connect(&config)
        .unwrap()
        .create_or_update(&topic, 2)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ProvisionOutcome::Created { partitions: 2 } | ProvisionOutcome::Unchanged { .. }
    ));

    // Growing is applied, shrinking is not.
    let outcome = TopicProvisioner::connect(&config)
        .unwrap()
        .create_or_update(&topic, 4)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ProvisionOutcome::Grown { to: 4, .. } | ProvisionOutcome::Unchanged { .. }
    ));

    let outcome = TopicProvisioner::connect(&config)
        .unwrap()
        .create_or_update(&topic, 1)
        .await
        .unwrap();
    assert!(matches!(outcome, ProvisionOutcome::Unchanged { observed } if observed >= 4));

    let pool = KeyedProducerPool::from_config(&config).unwrap();
    let events = vec![
        json!({"suite": "Login", "test": "valid user", "status": "PASS"}),
        json!({"suite": "Login", "test": "locked user", "status": "FAIL"}),
    ];
    for event in &events {
        let record = OutboundRecord::json(&topic, Some("run-42".to_string()), event).unwrap();
        pool.publish(&record, ProducerKind::Json).await.unwrap();
    }
    pool.shutdown().await;

    let consumer = create_test_consumer(&config.kafka, &topic);
    let mut received = Vec::new();
    let start = tokio::time::Instant::now();

    while received.len() < events.len() && start.elapsed() < Duration::from_secs(15) {
        if let Ok(Ok(message)) = timeout(Duration::from_secs(1), consumer.recv()).await {
            let content_type = message
                .headers()
                .and_then(|h| h.iter().find(|header| header.key == "content-type"))
                .and_then(|header| header.value)
                .map(|v| String::from_utf8_lossy(v).to_string());
            assert_eq!(content_type.as_deref(), Some("application/json"));
            assert_eq!(message.key(), Some("run-42".as_bytes()));

            let payload: Value = serde_json::from_slice(message.payload().unwrap()).unwrap();
            info!("Received event: {}", payload);
            received.push(payload);
        }
    }

    assert_eq!(received.len(), events.len());
    for event in &events {
        assert!(received.contains(event));
    }

    let gateway = KafkaAdminGateway::new(&config).unwrap();
    gateway.delete(&topic).await.unwrap();
    gateway.teardown().await;
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_describe_missing_topic_fails() {
    let config = common::get_test_config();
    let gateway = KafkaAdminGateway::new(&config).unwrap();

    assert!(!gateway.exists("telemetry-relay-no-such-topic").await.unwrap());
    assert!(gateway.describe("telemetry-relay-no-such-topic").await.is_err());

    gateway.teardown().await;
}

fn create_test_consumer(kafka_config: &KafkaConfig, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", kafka_config.bootstrap_servers())
        .set("group.id", format!("test_consumer_{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("Failed to create consumer");

    consumer
        .subscribe(&[topic])
        .expect("Failed to subscribe to topic");

    consumer
}
