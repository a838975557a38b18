//! # Hub Runtime
//!
//! Everything a module needs at activation time, and the host that mounts
//! modules.
//!
//! - `context/` - service context and the scope tree it is resolved through
//! - `binding/` - bus registrations tied to a module's lifetime
//! - `module/` - the module descriptor the host recognises
//! - `host/` - registration, mounting and context replacement
//! - `shared_runtime/` - singleton runtime libraries shared by all modules
//! - `api/`, `toast/` - in-process implementations of the platform services
//!
//! ## Activation
//!
//! ```text
//! ModuleHost::mount(name)
//!     │
//!     ▼
//! Component::mount(scope) ──► scope.use_app_context() ──► AppContext
//!     │                                                       │
//!     │                                    message_hub() ─────┘
//!     ▼
//! MessageHandlerBinding::use_message_handler(scope, topic, decoder, handler, deps)
//!     │
//!     ▼
//! MessageHub::register / swap
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod api;
pub mod binding;
pub mod config;
pub mod context;
pub mod host;
pub mod module;
pub mod shared_runtime;
pub mod toast;

pub use api::FixtureApiClient;
pub use binding::MessageHandlerBinding;
pub use config::{ConfigError, HostConfig};
pub use context::{AppContext, ContextProvider, ContextScope, WiringError};
pub use host::{HostError, ModuleHost};
pub use module::{create_module, Component, Mounted, UiModule};
pub use shared_runtime::{SharedRuntimeError, SharedRuntimeRegistry};
pub use toast::LogToaster;
