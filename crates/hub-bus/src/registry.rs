//! # Per-topic subscriber registry
//!
//! Owned by one `MessageHub` and only reachable through it. Each registration
//! is a [`Slot`]; a slot keeps its position in the topic list for its whole
//! life, and its handler can be replaced in place, which is how an atomic
//! resubscribe on the same topic is implemented.
//!
//! A slot's gate is held for the whole of a callback invocation, and retiring
//! or replacing the slot takes the same gate. Once either returns, the old
//! handler is not running and will not run again. The gate is reentrant so a
//! callback can unsubscribe or swap its own registration.
//!
//! Lock order: slot gate, then registry lock, then slot state lock.

use std::collections::HashMap;
use std::sync::Arc;

use hub_types::RawEnvelope;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::subscription::SubscriptionId;

/// Type-erased subscriber: decodes the raw envelope and invokes the typed
/// callbacks. Returns true when the decoder accepted the payload.
pub(crate) type Deliver = Arc<dyn Fn(&RawEnvelope) -> bool + Send + Sync>;

pub(crate) struct Slot {
    pub(crate) id: SubscriptionId,
    pub(crate) topic: String,
    gate: ReentrantMutex<()>,
    state: Mutex<SlotState>,
}

struct SlotState {
    /// Bumped every time the handler is replaced.
    epoch: u64,
    /// `None` once the slot has been retired.
    deliver: Option<Deliver>,
}

impl Slot {
    /// Hold the gate. Blocks while a callback of this slot runs on another
    /// thread.
    pub(crate) fn hold(&self) -> ReentrantMutexGuard<'_, ()> {
        self.gate.lock()
    }

    /// Handler to invoke right now, if the slot is still live. Call with the
    /// gate held and keep it held until the handler returns.
    pub(crate) fn current(&self) -> Option<Deliver> {
        self.state.lock().deliver.clone()
    }

    pub(crate) fn is_live_at(&self, epoch: u64) -> bool {
        let state = self.state.lock();
        state.epoch == epoch && state.deliver.is_some()
    }

    /// Retire the slot if `epoch` is still current. Returns true if this call
    /// retired it.
    pub(crate) fn retire(&self, epoch: u64) -> bool {
        let _gate = self.hold();
        let mut state = self.state.lock();
        if state.epoch == epoch && state.deliver.is_some() {
            state.deliver = None;
            true
        } else {
            false
        }
    }

    /// Install `deliver` in place of the handler of `epoch`. Returns the new
    /// epoch, or `None` if `epoch` is no longer current.
    pub(crate) fn replace(&self, epoch: u64, deliver: &Deliver) -> Option<u64> {
        let _gate = self.hold();
        let mut state = self.state.lock();
        if state.epoch != epoch || state.deliver.is_none() {
            return None;
        }
        state.epoch += 1;
        state.deliver = Some(Arc::clone(deliver));
        Some(state.epoch)
    }
}

#[derive(Default)]
pub(crate) struct TopicRegistry {
    topics: HashMap<String, Vec<Arc<Slot>>>,
    next_id: u64,
}

impl TopicRegistry {
    /// Append a live slot for `topic`. The new slot starts at epoch 0.
    pub(crate) fn insert(&mut self, topic: &str, deliver: Deliver) -> Arc<Slot> {
        self.next_id += 1;
        let slot = Arc::new(Slot {
            id: SubscriptionId(self.next_id),
            topic: topic.to_string(),
            gate: ReentrantMutex::new(()),
            state: Mutex::new(SlotState {
                epoch: 0,
                deliver: Some(deliver),
            }),
        });
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::clone(&slot));
        slot
    }

    /// Drop `slot` from its topic list. Empty topics are forgotten.
    pub(crate) fn remove(&mut self, slot: &Slot) {
        let Some(slots) = self.topics.get_mut(&slot.topic) else {
            return;
        };
        slots.retain(|s| s.id != slot.id);
        if slots.is_empty() {
            self.topics.remove(&slot.topic);
        }
    }

    /// Registrations for `topic` in registration order.
    pub(crate) fn snapshot(&self, topic: &str) -> Vec<Arc<Slot>> {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    pub(crate) fn len(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }
}
