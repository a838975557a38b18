//! # Shared Runtime Registry
//!
//! Every module must observe the same instance of the heavyweight runtime
//! libraries (rendering engine, router, localisation). The host exposes them
//! here once; modules resolve them by name instead of bringing their own.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

/// Names the host is expected to expose.
pub mod names {
    pub const I18N: &str = "i18n";
    pub const REACT: &str = "react";
    pub const REACT_DOM_CLIENT: &str = "react-dom-client";
    pub const ROUTER: &str = "router";
    pub const ROUTER_DOM: &str = "router-dom";
    pub const HISTORY: &str = "history";

    pub const ALL: [&str; 6] = [I18N, REACT, REACT_DOM_CLIENT, ROUTER, ROUTER_DOM, HISTORY];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharedRuntimeError {
    /// A different instance is already exposed under this name.
    #[error("Shared runtime '{name}' is already exposed with a different instance")]
    Conflict { name: String },

    #[error("Shared runtime '{name}' has not been exposed")]
    Missing { name: String },

    #[error("Shared runtime '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

type Instance = Arc<dyn Any + Send + Sync>;

/// Name -> singleton instance.
#[derive(Default)]
pub struct SharedRuntimeRegistry {
    entries: RwLock<HashMap<String, Instance>>,
}

impl SharedRuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `instance` under `name`. Exposing the same instance again is a
    /// no-op.
    pub fn expose<T>(&self, name: &str, instance: Arc<T>) -> Result<(), SharedRuntimeError>
    where
        T: Any + Send + Sync,
    {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(name) {
            if std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&instance)) {
                debug!(name, "Shared runtime already exposed");
                return Ok(());
            }
            return Err(SharedRuntimeError::Conflict {
                name: name.to_string(),
            });
        }

        entries.insert(name.to_string(), instance);
        info!(name, kind = type_name::<T>(), "Shared runtime exposed");
        Ok(())
    }

    /// The instance exposed under `name`.
    pub fn resolve<T>(&self, name: &str) -> Result<Arc<T>, SharedRuntimeError>
    where
        T: Any + Send + Sync,
    {
        let existing = self
            .entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SharedRuntimeError::Missing {
                name: name.to_string(),
            })?;

        existing
            .downcast::<T>()
            .map_err(|_| SharedRuntimeError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Well-known names that have not been exposed yet.
    pub fn missing_well_known(&self) -> Vec<&'static str> {
        let entries = self.entries.read();
        names::ALL
            .into_iter()
            .filter(|name| !entries.contains_key(*name))
            .collect()
    }
}
