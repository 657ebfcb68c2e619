use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Producer variant; selects the value encoding and is the pool's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    Json,
    Binary,
}

impl ProducerKind {
    pub const ALL: [ProducerKind; 2] = [ProducerKind::Json, ProducerKind::Binary];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProducerKind::Json => "json",
            ProducerKind::Binary => "binary",
        }
    }

    /// Value of the `content-type` header attached to every record.
    pub fn content_type(&self) -> &'static str {
        match self {
            ProducerKind::Json => "application/json",
            ProducerKind::Binary => "application/octet-stream",
        }
    }
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProducerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ProducerKind::Json),
            "binary" => Ok(ProducerKind::Binary),
            other => Err(Error::Config(format!("unknown producer kind '{}'", other))),
        }
    }
}

/// An encoded event ready to be sent, with its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl OutboundRecord {
    pub fn json<T: Serialize + ?Sized>(
        topic: impl Into<String>,
        key: Option<String>,
        event: &T,
    ) -> Result<Self> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self::binary(topic, key, payload))
    }

    pub fn binary(
        topic: impl Into<String>,
        key: Option<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            key,
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }
}
