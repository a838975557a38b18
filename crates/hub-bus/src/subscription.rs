//! # Subscription handles
//!
//! [`Unsubscribe`] is the only cancellation primitive of the bus. It is a
//! plain handle: dropping it leaves the registration in place. Convert it with
//! [`Unsubscribe::into_guard`] to get scope-bound release instead.

use std::fmt;
use std::sync::{Arc, Weak};

use hub_telemetry::ACTIVE_SUBSCRIPTIONS;

use crate::hub::HubShared;
use crate::registry::Slot;

/// Opaque registration id, unique within one hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Removes exactly one registration.
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once, or on a handle
/// whose registration was already swapped out, is a no-op. Once the call
/// returns the callback is never invoked again; if it is running on another
/// thread at that moment, the call waits for it to finish.
#[must_use = "dropping an Unsubscribe keeps the subscription alive; call unsubscribe() or into_guard()"]
#[derive(Clone)]
pub struct Unsubscribe {
    pub(crate) hub: Weak<HubShared>,
    pub(crate) slot: Arc<Slot>,
    pub(crate) epoch: u64,
}

impl Unsubscribe {
    /// Remove the registration.
    pub fn unsubscribe(&self) {
        match self.hub.upgrade() {
            Some(hub) => hub.retire(&self.slot, self.epoch),
            // Hub is gone; make sure a stray snapshot cannot call us.
            None => {
                if self.slot.retire(self.epoch) {
                    ACTIVE_SUBSCRIPTIONS.dec();
                }
            }
        }
    }

    /// Returns true while this handle's registration can still receive messages.
    pub fn is_active(&self) -> bool {
        self.slot.is_live_at(self.epoch)
    }

    pub fn id(&self) -> SubscriptionId {
        self.slot.id
    }

    pub fn topic(&self) -> &str {
        &self.slot.topic
    }

    /// Release the registration when the returned guard is dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard { handle: self }
    }

    pub(crate) fn belongs_to(&self, hub: &Arc<HubShared>) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|owner| Arc::ptr_eq(&owner, hub))
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.slot.id)
            .field("topic", &self.slot.topic)
            .field("epoch", &self.epoch)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Scope-bound subscription: unsubscribes on drop.
#[derive(Debug)]
pub struct SubscriptionGuard {
    handle: Unsubscribe,
}

impl SubscriptionGuard {
    /// Borrow the underlying handle.
    pub fn handle(&self) -> &Unsubscribe {
        &self.handle
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}
