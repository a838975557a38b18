//! # Error Types
//!
//! Defines error types shared by the bus, the host and module code.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// One step of the path from the decoded root to the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object member.
    Field(String),
    /// Array element.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Structured decode failure.
///
/// Carries the location of the mismatch (`path`), the shape the decoder
/// wanted (`expected`) and a short description of what it got (`found`).
/// A field that is absent reports `found == "missing"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", self.describe())]
pub struct DecodeError {
    /// Location of the mismatch, outermost first.
    pub path: Vec<PathSegment>,
    /// Expected shape, e.g. `number` or `object`.
    pub expected: String,
    /// What was actually present.
    pub found: String,
}

impl DecodeError {
    /// Marker used in `found` when an object member is absent.
    pub const MISSING: &'static str = "missing";

    /// Create a failure at the current position.
    pub fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a failure describing the kind of `value` that was found instead.
    pub fn unexpected(expected: impl Into<String>, value: &Value) -> Self {
        Self::new(expected, kind_of(value))
    }

    /// Create a failure for an absent object member.
    pub fn missing(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::new(expected, Self::MISSING).at_field(field)
    }

    /// Prefix the path with an object member.
    #[must_use]
    pub fn at_field(mut self, name: impl Into<String>) -> Self {
        self.path.insert(0, PathSegment::Field(name.into()));
        self
    }

    /// Prefix the path with an array index.
    #[must_use]
    pub fn at_index(mut self, index: usize) -> Self {
        self.path.insert(0, PathSegment::Index(index));
        self
    }

    /// Returns true if the failure is an absent member.
    pub fn is_missing(&self) -> bool {
        self.found == Self::MISSING
    }

    /// Name of the innermost field in the path, if any.
    pub fn field(&self) -> Option<&str> {
        self.path.iter().rev().find_map(|segment| match segment {
            PathSegment::Field(name) => Some(name.as_str()),
            PathSegment::Index(_) => None,
        })
    }

    /// Render the path in `$.items[0].total` notation.
    pub fn path_string(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.path {
            out.push_str(&segment.to_string());
        }
        out
    }

    fn describe(&self) -> String {
        if self.path.is_empty() {
            format!("expected {}, found {}", self.expected, self.found)
        } else {
            format!(
                "at {}: expected {}, found {}",
                self.path_string(),
                self.expected,
                self.found
            )
        }
    }
}

/// Short JSON kind name used in diagnostics.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors reported by an [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    /// The response body did not match the expected shape.
    #[error("Response body rejected: {0}")]
    Decode(#[from] DecodeError),

    /// The caller cancelled the request through its signal.
    #[error("Request to {url} was aborted")]
    Aborted { url: String },
}

/// Errors raised by a message transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport was shut down.
    #[error("Transport closed")]
    Closed,

    /// The transport refused the outbound message.
    #[error("Transport rejected message on topic {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    /// Inbound delivery could not be attached.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}
