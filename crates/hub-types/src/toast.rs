//! # Toaster Port
//!
//! User-facing notifications. Rendering is the host's business; modules call
//! the `show*` helpers and get back an id they can use to replace the toast.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a displayed toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToastId(pub u64);

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "toast-{}", self.0)
    }
}

/// Visual category of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToastKind {
    Default,
    Info,
    Error,
    Warning,
    Success,
}

/// Display options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToastOptions {
    /// Dismiss automatically after this long. `None` keeps the renderer default.
    pub auto_close: Option<Duration>,
    /// Reuse an existing id, replacing that toast.
    pub toast_id: Option<ToastId>,
}

/// Notification sink injected through the service context.
pub trait Toaster: Send + Sync {
    /// Display `content` and return its id.
    fn notify(&self, kind: ToastKind, content: &str, options: ToastOptions) -> ToastId;

    fn show(&self, content: &str, options: ToastOptions) -> ToastId {
        self.notify(ToastKind::Default, content, options)
    }

    fn show_info(&self, content: &str, options: ToastOptions) -> ToastId {
        self.notify(ToastKind::Info, content, options)
    }

    fn show_error(&self, content: &str, options: ToastOptions) -> ToastId {
        self.notify(ToastKind::Error, content, options)
    }

    fn show_warning(&self, content: &str, options: ToastOptions) -> ToastId {
        self.notify(ToastKind::Warning, content, options)
    }

    fn show_success(&self, content: &str, options: ToastOptions) -> ToastId {
        self.notify(ToastKind::Success, content, options)
    }
}
