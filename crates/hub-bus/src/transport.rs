//! # Transport Port
//!
//! The transport physically moves messages (broadcast channel, WebSocket,
//! long-poll ...). The hub hands it [`OutboundMessage`]s and consumes the
//! [`RawEnvelope`]s it produces; the hub never looks at the wire format.
//!
//! [`LoopbackTransport`] is the in-process implementation: a thin wrapper
//! around [`tokio::sync::broadcast`]. Several hubs may attach to one loopback
//! transport, which is how separate windows of one host see each other.
//!
//! ## Loopback rules
//! - **Non-blocking send**: `send()` stamps the envelope and returns.
//! - **No retention**: envelopes are dropped if no hub is attached.
//! - **Lag handling**: a hub that falls more than `capacity` envelopes behind
//!   skips the oldest ones and logs how many were lost.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hub_types::{OutboundMessage, RawEnvelope, TransportError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::DEFAULT_CHANNEL_CAPACITY;

/// Stream of stamped envelopes delivered to one hub.
pub type InboundStream = Pin<Box<dyn Stream<Item = RawEnvelope> + Send>>;

/// Moves messages between hubs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept an outbound message. Resolves once the transport has taken it,
    /// not once anyone has processed it.
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Attach a new consumer. Only envelopes sent after this call are seen.
    fn inbound(&self) -> Result<InboundStream, TransportError>;
}

/// In-process transport over a broadcast channel.
pub struct LoopbackTransport {
    sender: broadcast::Sender<RawEnvelope>,
    closed: AtomicBool,
    capacity: usize,
}

impl LoopbackTransport {
    /// Create a loopback transport with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a loopback transport with the given capacity (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Refuse all further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("Loopback transport closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of attached consumers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let envelope = message.into_envelope();
        let topic = envelope.topic.clone();
        let id = envelope.id;

        match self.sender.send(envelope) {
            Ok(receivers) => {
                debug!(topic = %topic, id = %id, receivers, "Envelope sent");
            }
            Err(_) => {
                warn!(topic = %topic, id = %id, "Envelope dropped (no receivers)");
            }
        }
        Ok(())
    }

    fn inbound(&self) -> Result<InboundStream, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Unavailable(
                "loopback transport is closed".to_string(),
            ));
        }

        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(envelope) => Some(envelope),
            Err(BroadcastStreamRecvError::Lagged(count)) => {
                warn!(lagged = count, "Hub lagged, envelopes dropped");
                None
            }
        });
        Ok(Box::pin(stream))
    }
}
