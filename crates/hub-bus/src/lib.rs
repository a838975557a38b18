//! # Hub Bus - Typed Message Bus for Module Communication
//!
//! Publishers and subscribers live in independently built modules and never
//! reference each other; they agree only on a topic name and on the JSON
//! shape each subscriber checks with its own decoder.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  publish(topic, json)  ┌─────────────┐
//! │   Module A   │ ─────────────────────► │  Transport  │ stamps id + timestamp
//! └──────────────┘                        └──────┬──────┘
//!                                                │ RawEnvelope
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │ MessageHub  │ per-topic registry
//!                                         └──────┬──────┘
//!                        ┌───────────────────────┼───────────────────────┐
//!                        ▼                       ▼                       ▼
//!                  decoder B1               decoder B2              decoder C
//!                   ok │ err                 ok │ err                ok │ err
//!               on_message on_error      on_message on_error     on_message (dropped)
//! ```
//!
//! ## Rules
//!
//! - Payloads are never validated on publish; each subscriber validates
//!   independently on receipt.
//! - Delivery is sequential, in registration order, FIFO per topic.
//! - Decode failures go to the subscriber's error handler only.
//! - `Unsubscribe` is synchronous, idempotent and total.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod hub;
mod registry;
pub mod subscription;
pub mod transport;

pub use error::BusError;
pub use hub::{Handler, MessageHub};
pub use subscription::{SubscriptionGuard, SubscriptionId, Unsubscribe};
pub use transport::{InboundStream, LoopbackTransport, Transport};

/// Envelopes buffered by a loopback transport before slow hubs start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
