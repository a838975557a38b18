//! [`Toaster`] that renders notifications as log events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hub_types::{ToastId, ToastKind, ToastOptions, Toaster};
use tracing::{error, info, warn};

/// Writes every toast to the log and hands out sequential ids.
#[derive(Debug, Default)]
pub struct LogToaster {
    next_id: AtomicU64,
}

impl LogToaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toasts issued so far under fresh ids.
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

fn millis_saturating(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Toaster for LogToaster {
    fn notify(&self, kind: ToastKind, content: &str, options: ToastOptions) -> ToastId {
        let id = options
            .toast_id
            .unwrap_or_else(|| ToastId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1));
        let auto_close_ms = options.auto_close.map(millis_saturating);

        match kind {
            ToastKind::Error => error!(toast = %id, ?auto_close_ms, "{content}"),
            ToastKind::Warning => warn!(toast = %id, ?auto_close_ms, "{content}"),
            _ => info!(toast = %id, ?kind, ?auto_close_ms, "{content}"),
        }
        id
    }
}
