//! Frame protocol spoken between harness sessions and the stress publisher
//!
//! Frames are JSON objects tagged by `type`. Stream transports terminate each
//! frame with a newline, the WebSocket transport sends one frame per text
//! message.

use crate::common::ClientIdentifier;
use crate::errors::{ErrorContext, Result};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Whether a topic message carries the full topic state or an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Full-state load, sent once right after subscribing
    Load,
    /// Incremental update
    Delta,
}

/// A message published on a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    pub data: String,
}

impl TopicMessage {
    pub fn load(topic: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: MessageKind::Load,
            headers: Vec::new(),
            data: data.into(),
        }
    }

    pub fn delta(topic: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: MessageKind::Delta,
            headers: Vec::new(),
            data: data.into(),
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Delta sequence number carried in the first header, if any
    pub fn sequence(&self) -> Option<u64> {
        self.headers.first().and_then(|h| h.parse().ok())
    }
}

/// Frames sent by a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Send { topic: String, data: String },
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected { client_id: ClientIdentifier },
    Message(TopicMessage),
}

/// Encode a frame as a single JSON line (without the terminator)
pub fn encode<T: Serialize>(frame: &T) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a frame from one JSON line
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim_end())
        .with_protocol_context(&format!("Malformed frame '{}'", line.trim_end()))
}
