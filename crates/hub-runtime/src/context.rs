//! # Service Context
//!
//! Platform services (language, API client, message hub, toaster) handed to a
//! module subtree through an explicit [`ContextScope`].
//!
//! ```text
//! root ──provide(ctx A)──► scope A ──child()──► scope A' ──provide(ctx B)──► scope B
//!                            │                    │                            │
//!                      use_app_context       use_app_context             use_app_context
//!                          = A                   = A                         = B
//! ```
//!
//! There is no global: a scope only sees providers on its own parent chain,
//! so two hosts in one process stay isolated.

use std::fmt;
use std::sync::Arc;

use hub_bus::MessageHub;
use hub_types::{ApiClient, Toaster};
use parking_lot::RwLock;
use thiserror::Error;

/// Misuse of the context tree. These are integration defects, not runtime
/// conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("use_app_context called outside of any context provider; wrap the module in ContextScope::provide")]
    NoProvider,
}

/// Services shared by every module below one provider. Immutable once built;
/// changing it means providing a new instance.
pub struct AppContext {
    lang: String,
    api: Arc<dyn ApiClient>,
    message_hub: MessageHub,
    toaster: Option<Arc<dyn Toaster>>,
}

impl AppContext {
    pub fn new(lang: impl Into<String>, api: Arc<dyn ApiClient>, message_hub: MessageHub) -> Self {
        Self {
            lang: lang.into(),
            api,
            message_hub,
            toaster: None,
        }
    }

    #[must_use]
    pub fn with_toaster(mut self, toaster: Arc<dyn Toaster>) -> Self {
        self.toaster = Some(toaster);
        self
    }

    /// Copy of this context with a different language. The services are shared.
    #[must_use]
    pub fn with_lang(&self, lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            api: Arc::clone(&self.api),
            message_hub: self.message_hub.clone(),
            toaster: self.toaster.clone(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn api(&self) -> &Arc<dyn ApiClient> {
        &self.api
    }

    pub fn message_hub(&self) -> &MessageHub {
        &self.message_hub
    }

    pub fn toaster(&self) -> Option<&Arc<dyn Toaster>> {
        self.toaster.as_ref()
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("lang", &self.lang)
            .field("message_hub", &self.message_hub)
            .field("toaster", &self.toaster.is_some())
            .finish_non_exhaustive()
    }
}

/// Write side of a provided context. Held by whoever installed it.
#[derive(Clone)]
pub struct ContextProvider {
    current: Arc<RwLock<Arc<AppContext>>>,
}

impl ContextProvider {
    fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            current: Arc::new(RwLock::new(ctx)),
        }
    }

    /// Install a new instance for the whole subtree. Consumers pick it up on
    /// their next `use_app_context`.
    pub fn replace(&self, ctx: impl Into<Arc<AppContext>>) {
        *self.current.write() = ctx.into();
    }

    /// The instance currently provided.
    pub fn current(&self) -> Arc<AppContext> {
        Arc::clone(&self.current.read())
    }
}

impl fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProvider")
            .field("lang", &self.current.read().lang)
            .finish()
    }
}

struct ScopeNode {
    parent: Option<ContextScope>,
    provider: Option<ContextProvider>,
}

/// Position in the component tree. Cheap to clone.
#[derive(Clone)]
pub struct ContextScope {
    node: Arc<ScopeNode>,
}

impl ContextScope {
    /// Top of a tree. Nothing is provided here.
    pub fn root() -> Self {
        Self {
            node: Arc::new(ScopeNode {
                parent: None,
                provider: None,
            }),
        }
    }

    /// Child scope that provides `ctx` to everything below it.
    pub fn provide(&self, ctx: impl Into<Arc<AppContext>>) -> (ContextScope, ContextProvider) {
        let provider = ContextProvider::new(ctx.into());
        let scope = Self {
            node: Arc::new(ScopeNode {
                parent: Some(self.clone()),
                provider: Some(provider.clone()),
            }),
        };
        (scope, provider)
    }

    /// Child scope that inherits whatever is provided above.
    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(ScopeNode {
                parent: Some(self.clone()),
                provider: None,
            }),
        }
    }

    /// Nearest provided context, or [`WiringError::NoProvider`].
    pub fn try_app_context(&self) -> Result<Arc<AppContext>, WiringError> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(provider) = &current.node.provider {
                return Ok(provider.current());
            }
            scope = current.node.parent.as_ref();
        }
        Err(WiringError::NoProvider)
    }

    /// Nearest provided context.
    ///
    /// # Panics
    ///
    /// Panics when no provider encloses this scope. Do not hold on to the
    /// returned value past the current activation; the provider may replace it.
    #[track_caller]
    pub fn use_app_context(&self) -> Arc<AppContext> {
        match self.try_app_context() {
            Ok(ctx) => ctx,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns true if some provider encloses this scope.
    pub fn has_provider(&self) -> bool {
        self.try_app_context().is_ok()
    }
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut parent = self.node.parent.as_ref();
        while let Some(p) = parent {
            depth += 1;
            parent = p.node.parent.as_ref();
        }
        f.debug_struct("ContextScope")
            .field("depth", &depth)
            .field("provides", &self.node.provider.is_some())
            .finish()
    }
}
