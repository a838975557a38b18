//! # Module Host
//!
//! Registers module descriptors and mounts them under one provided service
//! context.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      ModuleHost                          │
//! │                                                          │
//! │  registered: orders  cart  chat                          │
//! │  mounted:    orders ──┐    chat ──┐                      │
//! │                       ▼           ▼                      │
//! │               scope (ContextProvider: AppContext)        │
//! │                       │                                  │
//! │          lang · api · message hub · toaster              │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use hub_telemetry::{log_event, MOUNTED_MODULES};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{AppContext, ContextProvider, ContextScope};
use crate::module::{Mounted, UiModule};
use crate::shared_runtime::SharedRuntimeRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("Module '{0}' is not registered")]
    UnknownModule(String),

    #[error("Module '{0}' is already mounted")]
    AlreadyMounted(String),

    #[error("Module '{0}' is not mounted")]
    NotMounted(String),
}

/// Owns the root provider and every mounted module instance.
pub struct ModuleHost {
    scope: ContextScope,
    provider: ContextProvider,
    modules: RwLock<HashMap<String, UiModule>>,
    /// Mount order is kept so teardown runs in reverse.
    mounted: Mutex<Vec<(String, Box<dyn Mounted>)>>,
    shared_runtime: SharedRuntimeRegistry,
}

impl ModuleHost {
    /// Create a host providing `ctx` to every module it mounts.
    pub fn new(ctx: impl Into<Arc<AppContext>>) -> Self {
        let (scope, provider) = ContextScope::root().provide(ctx);
        Self {
            scope,
            provider,
            modules: RwLock::new(HashMap::new()),
            mounted: Mutex::new(Vec::new()),
            shared_runtime: SharedRuntimeRegistry::new(),
        }
    }

    /// Scope the modules are mounted under.
    pub fn scope(&self) -> &ContextScope {
        &self.scope
    }

    /// Context currently provided.
    pub fn context(&self) -> Arc<AppContext> {
        self.provider.current()
    }

    pub fn shared_runtime(&self) -> &SharedRuntimeRegistry {
        &self.shared_runtime
    }

    /// Register a module under `name`.
    pub fn register(&self, name: &str, module: UiModule) -> Result<(), HostError> {
        let mut modules = self.modules.write();
        if modules.contains_key(name) {
            return Err(HostError::DuplicateModule(name.to_string()));
        }
        info!("[Host] Registering module: {}", name);
        modules.insert(name.to_string(), module);
        Ok(())
    }

    /// Names of registered modules, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<_> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Mount a registered module under the host scope.
    pub fn mount(&self, name: &str) -> Result<(), HostError> {
        let module = self
            .modules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::UnknownModule(name.to_string()))?;

        if self.is_mounted(name) {
            return Err(HostError::AlreadyMounted(name.to_string()));
        }

        log_event!(
            info,
            "host",
            "Mounting module",
            module = %name,
            component_name = %module.name()
        );
        let instance = module.component().mount(&self.scope);

        let mut mounted = self.mounted.lock();
        if mounted.iter().any(|(n, _)| n == name) {
            drop(mounted);
            warn!("[Host] {} was mounted concurrently, discarding instance", name);
            return Err(HostError::AlreadyMounted(name.to_string()));
        }
        mounted.push((name.to_string(), instance));
        MOUNTED_MODULES.inc();
        drop(mounted);
        log_event!(info, "host", "Module mounted", module = %name);
        Ok(())
    }

    /// Unmount a module. Its instance is dropped before this returns.
    pub fn unmount(&self, name: &str) -> Result<(), HostError> {
        let instance = {
            let mut mounted = self.mounted.lock();
            let index = mounted
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| HostError::NotMounted(name.to_string()))?;
            mounted.remove(index).1
        };

        drop(instance);
        MOUNTED_MODULES.dec();
        log_event!(info, "host", "Module unmounted", module = %name);
        Ok(())
    }

    /// Unmount everything, last mounted first.
    pub fn unmount_all(&self) {
        let instances = std::mem::take(&mut *self.mounted.lock());
        for (name, instance) in instances.into_iter().rev() {
            drop(instance);
            MOUNTED_MODULES.dec();
            log_event!(info, "host", "Module unmounted", module = %name);
        }
    }

    /// Provide a new context instance and re-activate every mounted module.
    pub fn replace_context(&self, ctx: impl Into<Arc<AppContext>>) {
        let ctx = ctx.into();
        info!("[Host] Replacing context (lang={})", ctx.lang());
        self.provider.replace(ctx);

        let mut mounted = self.mounted.lock();
        for (name, instance) in mounted.iter_mut() {
            debug!("[Host] Updating {}", name);
            instance.update(&self.scope);
        }
    }

    /// Names of mounted modules in mount order.
    pub fn mounted(&self) -> Vec<String> {
        self.mounted.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.mounted.lock().iter().any(|(n, _)| n == name)
    }

    /// Log registry status.
    pub fn print_status(&self) {
        info!("===========================================");
        info!("  MODULE HOST STATUS");
        info!("===========================================");
        let mounted = self.mounted();
        for name in self.registered() {
            let state = if mounted.contains(&name) { "mounted" } else { "registered" };
            info!("  {:30} {}", name, state);
        }
        for name in self.shared_runtime.missing_well_known() {
            debug!("  shared runtime '{}' not exposed", name);
        }
        info!("===========================================");
    }
}

impl Drop for ModuleHost {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
