//! # Message Envelope
//!
//! The wire-level unit delivered by the bus: topic, unique id, ISO-8601
//! timestamp and payload.
//!
//! ## Properties
//!
//! - **Stamped once**: the transport assigns `id` and `timestamp` when it
//!   accepts a send. Nothing edits an envelope afterwards.
//! - **No retention**: envelopes are dropped once every current subscriber has
//!   seen them.
//! - **Wire compatibility**: deserialisation also accepts the older `guid` /
//!   `data` member names.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    /// Routing topic, e.g. `orders.created`.
    pub topic: String,

    /// Globally unique message id.
    #[serde(alias = "guid")]
    pub id: Uuid,

    /// Send time, RFC 3339 in UTC with millisecond precision.
    pub timestamp: String,

    /// Message body.
    #[serde(alias = "data")]
    pub payload: T,
}

/// Envelope whose payload has not been validated yet.
pub type RawEnvelope = MessageEnvelope<Value>;

impl<T> MessageEnvelope<T> {
    /// Create a new envelope with a fresh id and the current time.
    pub fn stamp(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            id: Uuid::new_v4(),
            timestamp: now_iso8601(),
            payload,
        }
    }

    /// Same envelope header, different payload.
    pub fn with_payload<U>(&self, payload: U) -> MessageEnvelope<U> {
        MessageEnvelope {
            topic: self.topic.clone(),
            id: self.id,
            timestamp: self.timestamp.clone(),
            payload,
        }
    }

    /// Transform the payload, keeping the header.
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> MessageEnvelope<U> {
        MessageEnvelope {
            topic: self.topic,
            id: self.id,
            timestamp: self.timestamp,
            payload: f(self.payload),
        }
    }

    /// Parsed send time, if the timestamp is well formed.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Outbound unit handed to a transport by `publish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Routing topic.
    pub topic: String,
    /// Unvalidated body; receivers decode it.
    pub payload: Value,
}

impl OutboundMessage {
    /// Create an outbound message.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Stamp the message into a deliverable envelope.
    pub fn into_envelope(self) -> RawEnvelope {
        MessageEnvelope::stamp(self.topic, self.payload)
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
