pub mod admin;
pub mod factory;
pub mod pool;
pub mod producer;
pub mod provisioner;
pub mod record;

pub use admin::{KafkaAdminGateway, TopicAdmin, TopicDescription, TopicSpec};
pub use factory::{KafkaProducerFactory, ProducerFactory};
pub use pool::{BorrowedProducer, KeyedProducerPool, PooledProducer, ProducerManager};
pub use producer::{BrokerProducer, KafkaProducer};
pub use provisioner::{ProvisionOutcome, TopicProvisioner};
pub use record::{OutboundRecord, ProducerKind};
