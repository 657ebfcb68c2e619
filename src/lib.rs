pub mod config;
pub mod error;

pub mod kafka;

pub use config::Config;
pub use error::{AdminOperation, Error, Result};
pub use kafka::{KeyedProducerPool, OutboundRecord, ProducerKind, TopicProvisioner};
