//! Shared fixtures for the integration suites.

use std::sync::Arc;
use std::time::Duration;

use hub_bus::MessageHub;
use hub_runtime::{AppContext, ContextProvider, ContextScope, FixtureApiClient, LogToaster};
use hub_types::decode::{boolean, field, number, string};
use hub_types::{DecodeError, Decoder, DecoderExt, DecoderRef};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long a test waits for a delivery that should happen.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a test waits to be confident a delivery did not happen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub total: f64,
}

/// `{ id: string, total: number }`
pub fn order_decoder() -> DecoderRef<Order> {
    (|input: &Value| -> Result<Order, DecodeError> {
        Ok(Order {
            id: field("id", string()).decode(input)?,
            total: field("total", number()).decode(input)?,
        })
    })
    .shared()
}

/// `{ text: string }`
pub fn chat_text_decoder() -> DecoderRef<String> {
    field("text", string()).shared()
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrgentChat {
    pub text: String,
    pub urgent: bool,
}

/// `{ text: string, urgent: boolean }`
pub fn urgent_chat_decoder() -> DecoderRef<UrgentChat> {
    (|input: &Value| -> Result<UrgentChat, DecodeError> {
        Ok(UrgentChat {
            text: field("text", string()).decode(input)?,
            urgent: field("urgent", boolean()).decode(input)?,
        })
    })
    .shared()
}

/// Loopback hub with its delivery loop running.
pub fn running_hub() -> MessageHub {
    hub_telemetry::init_test_logging();
    let hub = MessageHub::loopback();
    hub.spawn().expect("loopback transport accepts consumers");
    hub
}

/// Context over `hub` with a fixture API client and a log toaster.
pub fn app_context(lang: &str, hub: &MessageHub) -> AppContext {
    AppContext::new(lang, Arc::new(FixtureApiClient::new()), hub.clone())
        .with_toaster(Arc::new(LogToaster::new()))
}

/// Root scope providing `app_context(lang, hub)`.
pub fn provided_scope(lang: &str, hub: &MessageHub) -> (ContextScope, ContextProvider) {
    ContextScope::root().provide(app_context(lang, hub))
}

/// Receives whatever the callbacks built by [`Collector::sink`] push.
pub struct Collector<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> Collector<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Callback that forwards its argument to this collector.
    pub fn sink(&self) -> impl Fn(T) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |item| {
            let _ = tx.send(item);
        }
    }

    /// Next item, failing the test if none arrives in time.
    pub async fn next(&mut self) -> T {
        timeout(DELIVERY_TIMEOUT, self.rx.recv())
            .await
            .expect("timeout waiting for delivery")
            .expect("collector channel closed")
    }

    /// Assert nothing arrives during the quiet period.
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(_)) = timeout(QUIET_PERIOD, self.rx.recv()).await {
            panic!("unexpected delivery");
        }
    }

    /// Items already delivered, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}
