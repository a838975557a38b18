//! # Subscription Binding
//!
//! Ties one bus registration to the lifetime of its owner (a mounted module
//! or any other activation scope).
//!
//! The owner calls [`MessageHandlerBinding::use_message_handler`] on every
//! activation. The registration key is `(hub, topic, decoder, deps)`:
//!
//! - key unchanged: nothing happens, the callbacks captured earlier stay;
//! - key changed: the new callbacks are captured and the registration is
//!   swapped in one step on the bus, so no envelope reaches both the old and
//!   the new callback;
//! - owner deactivated or dropped: the registration is removed.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use hub_bus::{Handler, MessageHub, Unsubscribe};
use hub_types::DecoderRef;
use tracing::debug;

use crate::context::ContextScope;

struct Active<T, D> {
    hub: MessageHub,
    topic: String,
    decoder: DecoderRef<T>,
    deps: D,
    handle: Unsubscribe,
}

impl<T, D: PartialEq> Active<T, D> {
    fn matches(&self, hub: &MessageHub, topic: &str, decoder: &DecoderRef<T>, deps: &D) -> bool {
        self.hub.ptr_eq(hub)
            && self.topic == topic
            && std::ptr::addr_eq(Arc::as_ptr(&self.decoder), Arc::as_ptr(decoder))
            && self.deps == *deps
    }
}

/// Scoped subscription owned by one activation.
///
/// `D` is the dependency list; any value comparison works, a tuple is typical.
pub struct MessageHandlerBinding<T, D = ()> {
    active: Option<Active<T, D>>,
    epoch: u64,
    _payload: PhantomData<fn(T)>,
}

impl<T: 'static, D: PartialEq> MessageHandlerBinding<T, D> {
    pub fn new() -> Self {
        Self {
            active: None,
            epoch: 0,
            _payload: PhantomData,
        }
    }

    /// Make sure a registration for `topic` exists on the hub provided to
    /// `scope`, delivering to `handler`.
    ///
    /// Returns true if this call installed a new registration.
    ///
    /// # Panics
    ///
    /// Panics when no context provider encloses `scope`.
    #[track_caller]
    pub fn use_message_handler(
        &mut self,
        scope: &ContextScope,
        topic: &str,
        decoder: &DecoderRef<T>,
        handler: Handler<T>,
        deps: D,
    ) -> bool {
        let ctx = scope.use_app_context();
        let hub = ctx.message_hub();

        if let Some(active) = &self.active {
            if active.matches(hub, topic, decoder, &deps) {
                return false;
            }
        }

        let handle = match self.active.take() {
            Some(previous) => hub.swap(&previous.handle, topic, Arc::clone(decoder), handler),
            None => hub.register(topic, Arc::clone(decoder), handler),
        };
        self.epoch += 1;
        debug!(topic = %topic, subscription = %handle.id(), epoch = self.epoch, "Message handler bound");

        self.active = Some(Active {
            hub: hub.clone(),
            topic: topic.to_string(),
            decoder: Arc::clone(decoder),
            deps,
            handle,
        });
        true
    }
}

impl<T, D> MessageHandlerBinding<T, D> {
    /// Remove the registration, if any. Safe to call repeatedly.
    pub fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.unsubscribe();
            debug!(topic = %active.topic, subscription = %active.handle.id(), "Message handler released");
        }
    }

    /// Number of registrations installed so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.handle.is_active())
    }

    /// Handle of the current registration.
    pub fn handle(&self) -> Option<&Unsubscribe> {
        self.active.as_ref().map(|active| &active.handle)
    }
}

impl<T: 'static, D: PartialEq> Default for MessageHandlerBinding<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D> Drop for MessageHandlerBinding<T, D> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl<T, D: fmt::Debug> fmt::Debug for MessageHandlerBinding<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MessageHandlerBinding");
        s.field("epoch", &self.epoch);
        if let Some(active) = &self.active {
            s.field("topic", &active.topic).field("deps", &active.deps);
        }
        s.finish()
    }
}
