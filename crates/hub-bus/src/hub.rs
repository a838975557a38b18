//! # Message Hub
//!
//! The bus every module reaches through its service context.
//!
//! - `publish` hands JSON to the transport and resolves when the transport
//!   accepts it. Delivery happens later, on the hub's delivery loop.
//! - `subscribe` registers a decoder and callbacks for one topic and returns
//!   an [`Unsubscribe`] handle.
//! - `dispatch` fans one inbound envelope out to the topic's registrations,
//!   one after another. Each registration decodes the payload itself; a
//!   rejection goes to that registration's error handler and nowhere else.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hub_telemetry::{
    metric_inc, time_histogram, ACTIVE_SUBSCRIPTIONS, DECODE_FAILURES, DISPATCH_DURATION,
    MESSAGES_DELIVERED, MESSAGES_PUBLISHED, SUBSCRIBER_PANICS,
};
use hub_types::{
    DecodeError, DecoderRef, MessageEnvelope, OutboundMessage, RawEnvelope, TransportError,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::BusError;
use crate::registry::{Deliver, Slot, TopicRegistry};
use crate::subscription::Unsubscribe;
use crate::transport::{InboundStream, LoopbackTransport, Transport};

type MessageFn<T> = dyn Fn(MessageEnvelope<T>) + Send + Sync;
type ErrorFn = dyn Fn(RawEnvelope, DecodeError) + Send + Sync;

/// Callbacks of one registration.
///
/// `on_message` only ever sees payloads its decoder accepted; `on_error`
/// receives the raw envelope together with the decode failure.
pub struct Handler<T> {
    on_message: Arc<MessageFn<T>>,
    on_error: Option<Arc<ErrorFn>>,
}

impl<T> Handler<T> {
    pub fn new<F>(on_message: F) -> Self
    where
        F: Fn(MessageEnvelope<T>) + Send + Sync + 'static,
    {
        Self {
            on_message: Arc::new(on_message),
            on_error: None,
        }
    }

    /// Attach an error handler for rejected payloads.
    #[must_use]
    pub fn with_error<E>(mut self, on_error: E) -> Self
    where
        E: Fn(RawEnvelope, DecodeError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            on_message: Arc::clone(&self.on_message),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Shared state behind every clone of a [`MessageHub`].
pub(crate) struct HubShared {
    transport: Arc<dyn Transport>,
    registry: Mutex<TopicRegistry>,
    published: AtomicU64,
    delivered: AtomicU64,
    shutdown: watch::Sender<bool>,
    /// Set once a delivery loop owns the inbound stream.
    attached: AtomicBool,
}

impl HubShared {
    /// Retire `slot` at `epoch` and drop it from the registry. Waits for an
    /// in-flight callback of `slot` on another thread to finish.
    pub(crate) fn retire(&self, slot: &Slot, epoch: u64) {
        let _gate = slot.hold();
        let mut registry = self.registry.lock();
        if slot.retire(epoch) {
            registry.remove(slot);
            ACTIVE_SUBSCRIPTIONS.dec();
            debug!(topic = %slot.topic, subscription = %slot.id, "Unsubscribed");
        }
    }
}

/// Typed publish/subscribe bus. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct MessageHub {
    shared: Arc<HubShared>,
}

impl MessageHub {
    /// Create a hub on top of `transport`. Call [`spawn`](Self::spawn) to
    /// start delivering inbound envelopes.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(HubShared {
                transport,
                registry: Mutex::new(TopicRegistry::default()),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                shutdown,
                attached: AtomicBool::new(false),
            }),
        }
    }

    /// Hub over a private loopback transport.
    pub fn loopback() -> Self {
        Self::new(Arc::new(LoopbackTransport::new()))
    }

    /// Returns true if both handles refer to the same bus.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Send `payload` under `topic`.
    ///
    /// Resolves once the transport accepted the message. The payload is not
    /// validated here; receivers validate it against their own decoders.
    /// Transport failures are returned as-is and never retried.
    pub async fn publish(&self, topic: impl Into<String>, payload: Value) -> Result<(), BusError> {
        let topic = topic.into();
        if self.is_closed() {
            return Err(TransportError::Closed.into());
        }

        if let Err(e) = self
            .shared
            .transport
            .send(OutboundMessage::new(topic.clone(), payload))
            .await
        {
            warn!(topic = %topic, error = %e, "Publish rejected by transport");
            return Err(e.into());
        }

        self.shared.published.fetch_add(1, Ordering::Relaxed);
        metric_inc!(MESSAGES_PUBLISHED);
        debug!(topic = %topic, "Message published");
        Ok(())
    }

    /// Serialise `payload` to JSON and publish it.
    pub async fn publish_as<P>(&self, topic: impl Into<String>, payload: &P) -> Result<(), BusError>
    where
        P: Serialize + ?Sized,
    {
        let topic = topic.into();
        let value = serde_json::to_value(payload).map_err(|e| BusError::Encode {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;
        self.publish(topic, value).await
    }

    // =========================================================================
    // SUBSCRIBE
    // =========================================================================

    /// Register `on_message` for `topic`. Rejected payloads are dropped for
    /// this subscriber.
    pub fn subscribe<T, F>(&self, topic: &str, decoder: DecoderRef<T>, on_message: F) -> Unsubscribe
    where
        T: 'static,
        F: Fn(MessageEnvelope<T>) + Send + Sync + 'static,
    {
        self.register(topic, decoder, Handler::new(on_message))
    }

    /// Register `on_message` for `topic`, reporting rejected payloads to `on_error`.
    pub fn subscribe_with_error<T, F, E>(
        &self,
        topic: &str,
        decoder: DecoderRef<T>,
        on_message: F,
        on_error: E,
    ) -> Unsubscribe
    where
        T: 'static,
        F: Fn(MessageEnvelope<T>) + Send + Sync + 'static,
        E: Fn(RawEnvelope, DecodeError) + Send + Sync + 'static,
    {
        self.register(topic, decoder, Handler::new(on_message).with_error(on_error))
    }

    /// Register a prepared handler for `topic`.
    pub fn register<T: 'static>(
        &self,
        topic: &str,
        decoder: DecoderRef<T>,
        handler: Handler<T>,
    ) -> Unsubscribe {
        let deliver = erase(decoder, handler);
        let slot = self.shared.registry.lock().insert(topic, deliver);
        ACTIVE_SUBSCRIPTIONS.inc();
        debug!(topic = %topic, subscription = %slot.id, "Subscribed");

        Unsubscribe {
            hub: Arc::downgrade(&self.shared),
            slot,
            epoch: 0,
        }
    }

    /// Replace `previous` with a new registration in one step.
    ///
    /// When `previous` belongs to this hub the removal and the installation
    /// happen under one registry lock; on the same topic the new handler even
    /// takes over the old registration's position. No envelope reaches both
    /// handlers, and there is no moment where neither is registered. If the
    /// old handler is running on another thread, the swap waits for it, so the
    /// old handler never runs after this returns.
    ///
    /// A `previous` handle from another hub is unsubscribed there first.
    pub fn swap<T: 'static>(
        &self,
        previous: &Unsubscribe,
        topic: &str,
        decoder: DecoderRef<T>,
        handler: Handler<T>,
    ) -> Unsubscribe {
        if !previous.belongs_to(&self.shared) {
            previous.unsubscribe();
            return self.register(topic, decoder, handler);
        }

        let deliver = erase(decoder, handler);
        let _gate = previous.slot.hold();
        let mut registry = self.shared.registry.lock();

        if previous.slot.topic == topic {
            if let Some(epoch) = previous.slot.replace(previous.epoch, &deliver) {
                debug!(topic = %topic, subscription = %previous.slot.id, epoch, "Handler swapped");
                return Unsubscribe {
                    hub: Arc::downgrade(&self.shared),
                    slot: Arc::clone(&previous.slot),
                    epoch,
                };
            }
        }

        if previous.slot.retire(previous.epoch) {
            registry.remove(&previous.slot);
            ACTIVE_SUBSCRIPTIONS.dec();
        }
        let slot = registry.insert(topic, deliver);
        ACTIVE_SUBSCRIPTIONS.inc();
        debug!(
            from = %previous.slot.topic,
            topic = %topic,
            subscription = %slot.id,
            "Registration moved"
        );

        Unsubscribe {
            hub: Arc::downgrade(&self.shared),
            slot,
            epoch: 0,
        }
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Deliver one inbound envelope to every live registration for its topic.
    ///
    /// Registrations run sequentially in registration order. A registration
    /// removed by an earlier callback is skipped. A panicking callback is
    /// logged and does not stop the fan-out.
    ///
    /// Each registration's gate is held while its callbacks run, so
    /// unsubscribing or swapping it from another thread waits for them.
    ///
    /// Returns the number of registrations whose decoder accepted the payload.
    pub fn dispatch(&self, raw: &RawEnvelope) -> usize {
        let _timer = time_histogram!(DISPATCH_DURATION);
        let slots = self.shared.registry.lock().snapshot(&raw.topic);
        if slots.is_empty() {
            debug!(topic = %raw.topic, id = %raw.id, "No subscribers for envelope");
            return 0;
        }

        let mut accepted = 0;
        for slot in slots {
            let _gate = slot.hold();
            let Some(deliver) = slot.current() else {
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| deliver(raw))) {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                Err(panic) => {
                    metric_inc!(SUBSCRIBER_PANICS);
                    error!(
                        topic = %raw.topic,
                        id = %raw.id,
                        subscription = %slot.id,
                        panic = %panic_message(panic.as_ref()),
                        "Subscriber panicked"
                    );
                }
            }
        }

        self.shared
            .delivered
            .fetch_add(accepted as u64, Ordering::Relaxed);
        MESSAGES_DELIVERED.inc_by(accepted as f64);
        accepted
    }

    /// Attach to the transport and start the delivery loop on the current
    /// tokio runtime.
    ///
    /// The inbound stream is attached before this returns, so messages
    /// published afterwards are delivered. The loop ends on [`close`](Self::close)
    /// or when the transport's stream ends.
    ///
    /// A hub has at most one delivery loop: a second `spawn` or
    /// [`run`](Self::run) returns [`BusError::AlreadyRunning`].
    pub fn spawn(&self) -> Result<JoinHandle<()>, BusError> {
        let inbound = self.attach()?;
        let hub = self.clone();
        Ok(tokio::spawn(async move { hub.deliver_from(inbound).await }))
    }

    /// Run the delivery loop on the caller's task until closed.
    pub async fn run(&self) -> Result<(), BusError> {
        let inbound = self.attach()?;
        self.deliver_from(inbound).await;
        Ok(())
    }

    /// Claim the hub's single inbound stream.
    fn attach(&self) -> Result<InboundStream, BusError> {
        if self
            .shared
            .attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BusError::AlreadyRunning);
        }
        self.shared.transport.inbound().map_err(|e| {
            self.shared.attached.store(false, Ordering::Release);
            e.into()
        })
    }

    async fn deliver_from(&self, mut inbound: InboundStream) {
        let mut shutdown = self.shared.shutdown.subscribe();
        info!("Delivery loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = inbound.next() => match next {
                    Some(raw) => {
                        self.dispatch(&raw);
                    }
                    None => {
                        debug!("Inbound stream ended");
                        break;
                    }
                },
            }
        }

        info!("Delivery loop stopped");
    }

    /// Stop the delivery loop and refuse further publishes.
    pub fn close(&self) {
        self.shared.shutdown.send_replace(true);
        info!("Message hub closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Live registrations for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.registry.lock().count(topic)
    }

    /// Live registrations across all topics.
    pub fn total_subscriptions(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Messages accepted by the transport through this hub.
    pub fn messages_published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// Typed deliveries made by this hub.
    pub fn messages_delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MessageHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHub")
            .field("subscriptions", &self.total_subscriptions())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Bind a decoder and typed callbacks into one registry entry.
fn erase<T: 'static>(decoder: DecoderRef<T>, handler: Handler<T>) -> Deliver {
    Arc::new(move |raw: &RawEnvelope| match decoder.decode(&raw.payload) {
        Ok(payload) => {
            (handler.on_message)(raw.with_payload(payload));
            true
        }
        Err(err) => {
            metric_inc!(DECODE_FAILURES, &[raw.topic.as_str()]);
            match &handler.on_error {
                Some(on_error) => on_error(raw.clone(), err),
                None => warn!(
                    topic = %raw.topic,
                    id = %raw.id,
                    error = %err,
                    "Payload rejected, subscriber has no error handler"
                ),
            }
            false
        }
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
