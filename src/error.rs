//! Error types and result handling for telemetry-relay.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use telemetry_relay::{Error, Result};
//!
//! fn parse_kind(raw: &str) -> Result<()> {
//!     Err(Error::Config(format!("unknown producer kind '{}'", raw)))
//! }
//!
//! match parse_kind("xml") {
//!     Ok(()) => println!("Parsed"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::kafka::ProducerKind;

/// The administrative call that failed.
///
/// The `Display` form is the message template used when an
/// [`Error::AdminOperation`] is rendered, so callers can tell which phase
/// of topic administration went wrong from a single error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOperation {
    ListTopics,
    CheckExistence,
    Create,
    Describe,
    Delete,
    IncreasePartitions,
}

impl fmt::Display for AdminOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let template = match self {
            AdminOperation::ListTopics => "Failed to list topics",
            AdminOperation::CheckExistence => "Failed to check whether topic exists",
            AdminOperation::Create => "Failed to create topic",
            AdminOperation::Describe => "Failed to describe topic",
            AdminOperation::Delete => "Failed to delete topic",
            AdminOperation::IncreasePartitions => "Failed to increase partitions of topic",
        };
        f.write_str(template)
    }
}

/// The main error type for telemetry-relay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized producer kind or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No producer of `kind` became available within the pool's max wait.
    #[error("Producer pool exhausted for '{kind}': {max_total} busy after waiting {waited:?}")]
    PoolExhausted {
        kind: ProducerKind,
        max_total: usize,
        waited: Duration,
    },

    /// A broker administrative call failed or timed out.
    #[error("{operation} '{topic}': {cause}")]
    AdminOperation {
        operation: AdminOperation,
        /// Topic the call targeted, `*` for cluster-wide calls
        topic: String,
        #[source]
        cause: Box<Error>,
    },

    /// `create_or_update` could not bring the topic to the requested state.
    ///
    /// Treat this as "topic is not guaranteed ready".
    #[error("Provisioning of topic '{topic}' with {partitions} partitions failed: {cause}")]
    Provisioning {
        topic: String,
        partitions: usize,
        #[source]
        cause: Box<Error>,
    },

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding records.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from reading stdin in the CLI.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The handle has no live broker connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker answered, but reported an error for the request.
    #[error("Broker error: {message}")]
    Broker {
        /// Description of what the broker reported
        message: String,
    },

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// The producer pool has been shut down.
    #[error("Shutdown requested")]
    Shutdown,
}

impl Error {
    pub(crate) fn admin(operation: AdminOperation, topic: impl Into<String>, cause: Error) -> Self {
        Error::AdminOperation {
            operation,
            topic: topic.into(),
            cause: Box::new(cause),
        }
    }
}

/// A convenient Result type alias for telemetry-relay operations.
///
/// This is equivalent to `std::result::Result<T, telemetry_relay::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_error_uses_operation_template() {
        let err = Error::admin(
            AdminOperation::IncreasePartitions,
            "events",
            Error::Timeout {
                message: "no answer".to_string(),
            },
        );

        assert_eq!(
            err.to_string(),
            "Failed to increase partitions of topic 'events': Timeout error: no answer"
        );
    }

    #[test]
    fn test_admin_templates_are_distinct() {
        let ops = [
            AdminOperation::ListTopics,
            AdminOperation::CheckExistence,
            AdminOperation::Create,
            AdminOperation::Describe,
            AdminOperation::Delete,
            AdminOperation::IncreasePartitions,
        ];
        let rendered: std::collections::HashSet<String> =
            ops.iter().map(|op| op.to_string()).collect();

        assert_eq!(rendered.len(), ops.len());
    }

    #[test]
    fn test_provisioning_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Provisioning {
            topic: "events".to_string(),
            partitions: 4,
            cause: Box::new(Error::Config("bad".to_string())),
        };

        assert!(err.source().is_some());
        assert!(err.to_string().contains("4 partitions"));
    }
}
