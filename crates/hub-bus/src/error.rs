//! # Bus Errors

use hub_types::TransportError;
use thiserror::Error;

/// Errors surfaced to publishers and to callers attaching a hub to its transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The transport refused the operation. Not retried by the bus.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The payload could not be converted to JSON.
    #[error("Payload for topic {topic} could not be encoded: {reason}")]
    Encode { topic: String, reason: String },

    /// The hub already has a delivery loop attached to its transport.
    #[error("Delivery loop already running for this hub")]
    AlreadyRunning,
}
