//! # Module Wrapper
//!
//! [`UiModule`] marks a component as something the host can register and
//! mount. It carries no behaviour of its own.

use std::fmt;
use std::sync::Arc;

use crate::context::ContextScope;

/// A renderable unit shipped by one module bundle.
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Activate under `scope`. The returned value lives as long as the
    /// component stays mounted; dropping it is the unmount.
    fn mount(&self, scope: &ContextScope) -> Box<dyn Mounted>;
}

/// A mounted component instance.
pub trait Mounted: Send {
    /// Re-activation after the provided context changed.
    fn update(&mut self, _scope: &ContextScope) {}
}

/// Module descriptor. Identity is by reference: clones are the same module.
#[derive(Clone)]
pub struct UiModule {
    component: Arc<dyn Component>,
}

impl UiModule {
    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// Returns true if both descriptors wrap the same component instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.component), Arc::as_ptr(&other.component))
    }
}

impl fmt::Debug for UiModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiModule").field("name", &self.name()).finish()
    }
}

/// Wrap `component` as a platform module.
pub fn create_module<C: Component + 'static>(component: C) -> UiModule {
    UiModule {
        component: Arc::new(component),
    }
}

impl From<Arc<dyn Component>> for UiModule {
    fn from(component: Arc<dyn Component>) -> Self {
        Self { component }
    }
}
