//! Modules mounted by the `module-host` binary.

use std::collections::HashMap;
use std::sync::Arc;

use hub_bus::Handler;
use hub_runtime::{Component, ContextScope, MessageHandlerBinding, Mounted};
use hub_types::decode::{
    array, boolean, deserialize, field, integer, number, optional_field, string,
};
use hub_types::{
    ApiClientExt, DecodeError, Decoder, DecoderExt, DecoderRef, GetQuery, MessageEnvelope,
    ToastOptions,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Translations exposed to every module as the shared `i18n` runtime.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<(String, String), String>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for (lang, key, text) in [
            ("en", "order.created", "Order received"),
            ("en", "order.rejected", "Malformed order ignored"),
            ("de", "order.created", "Bestellung eingegangen"),
            ("de", "order.rejected", "Fehlerhafte Bestellung ignoriert"),
        ] {
            catalog
                .entries
                .insert((lang.to_string(), key.to_string()), text.to_string());
        }
        catalog
    }

    /// Text for `key`, falling back to English and then to the key itself.
    pub fn text(&self, lang: &str, key: &str) -> String {
        self.entries
            .get(&(lang.to_string(), key.to_string()))
            .or_else(|| self.entries.get(&("en".to_string(), key.to_string())))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[derive(Debug, Clone)]
struct Order {
    id: String,
    total: f64,
}

fn order_decoder() -> DecoderRef<Order> {
    (|input: &Value| -> Result<Order, DecodeError> {
        Ok(Order {
            id: field("id", string()).decode(input)?,
            total: field("total", number()).decode(input)?,
        })
    })
    .shared()
}

// =============================================================================
// ORDERS
// =============================================================================

/// Announces incoming orders through the toaster.
pub struct OrdersModule {
    catalog: Arc<Catalog>,
}

impl OrdersModule {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

struct OrdersView {
    binding: MessageHandlerBinding<Order, String>,
    decoder: DecoderRef<Order>,
    catalog: Arc<Catalog>,
}

impl OrdersView {
    fn activate(&mut self, scope: &ContextScope) {
        let ctx = scope.use_app_context();
        let lang = ctx.lang().to_string();
        let toaster = ctx.toaster().cloned();

        let on_message = {
            let toaster = toaster.clone();
            let catalog = Arc::clone(&self.catalog);
            let lang = lang.clone();
            move |env: MessageEnvelope<Order>| {
                info!(order = %env.payload.id, total = env.payload.total, "Order received");
                if let Some(toaster) = &toaster {
                    let text = catalog.text(&lang, "order.created");
                    toaster.show_success(&text, ToastOptions::default());
                }
            }
        };
        let on_error = {
            let catalog = Arc::clone(&self.catalog);
            let lang = lang.clone();
            move |raw: MessageEnvelope<Value>, err: DecodeError| {
                warn!(id = %raw.id, error = %err, "Order payload rejected");
                if let Some(toaster) = &toaster {
                    let text = catalog.text(&lang, "order.rejected");
                    toaster.show_warning(&text, ToastOptions::default());
                }
            }
        };

        self.binding.use_message_handler(
            scope,
            "orders.created",
            &self.decoder,
            Handler::new(on_message).with_error(on_error),
            lang,
        );
    }
}

impl Mounted for OrdersView {
    fn update(&mut self, scope: &ContextScope) {
        self.activate(scope);
    }
}

impl Component for OrdersModule {
    fn name(&self) -> &str {
        "orders"
    }

    fn mount(&self, scope: &ContextScope) -> Box<dyn Mounted> {
        let mut view = OrdersView {
            binding: MessageHandlerBinding::new(),
            decoder: order_decoder(),
            catalog: Arc::clone(&self.catalog),
        };
        view.activate(scope);
        Box::new(view)
    }
}

// =============================================================================
// CHAT
// =============================================================================

#[derive(Debug, Deserialize)]
struct UrgentMessage {
    text: String,
    urgent: bool,
}

/// Two views of one topic with different payload expectations.
pub struct ChatModule;

struct ChatView {
    feed: MessageHandlerBinding<String>,
    alerts: MessageHandlerBinding<UrgentMessage>,
    feed_decoder: DecoderRef<String>,
    alert_decoder: DecoderRef<UrgentMessage>,
}

impl ChatView {
    fn activate(&mut self, scope: &ContextScope) {
        self.feed.use_message_handler(
            scope,
            "chat.message",
            &self.feed_decoder,
            Handler::new(|env: MessageEnvelope<String>| info!(text = %env.payload, "Chat")),
            (),
        );

        let toaster = scope.use_app_context().toaster().cloned();
        self.alerts.use_message_handler(
            scope,
            "chat.message",
            &self.alert_decoder,
            Handler::new(move |env: MessageEnvelope<UrgentMessage>| {
                if env.payload.urgent {
                    if let Some(toaster) = &toaster {
                        toaster.show_info(&env.payload.text, ToastOptions::default());
                    }
                }
            }),
            (),
        );
    }
}

impl Mounted for ChatView {
    fn update(&mut self, scope: &ContextScope) {
        self.activate(scope);
    }
}

impl Component for ChatModule {
    fn name(&self) -> &str {
        "chat"
    }

    fn mount(&self, scope: &ContextScope) -> Box<dyn Mounted> {
        let mut view = ChatView {
            feed: MessageHandlerBinding::new(),
            alerts: MessageHandlerBinding::new(),
            feed_decoder: field("text", string()).shared(),
            alert_decoder: deserialize::<UrgentMessage>().shared(),
        };
        view.activate(scope);
        Box::new(view)
    }
}

// =============================================================================
// CART
// =============================================================================

/// Loads the cart once per mount and republishes it on the bus.
pub struct CartModule;

struct CartView {
    cancel: CancellationToken,
}

impl Drop for CartView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Mounted for CartView {}

impl Component for CartModule {
    fn name(&self) -> &str {
        "cart"
    }

    fn mount(&self, scope: &ContextScope) -> Box<dyn Mounted> {
        let ctx = scope.use_app_context();
        let cancel = CancellationToken::new();
        let query = GetQuery::new("/api/cart").with_signal(cancel.clone());
        let items = field(
            "items",
            array(
                |input: &Value| -> Result<(String, i64, Option<bool>), DecodeError> {
                    Ok((
                        field("sku", string()).decode(input)?,
                        field("qty", integer()).decode(input)?,
                        optional_field("gift", boolean()).decode(input)?,
                    ))
                },
            ),
        );

        tokio::spawn(async move {
            let api = Arc::clone(ctx.api());
            match api.get(&items, query).await {
                Ok(lines) => {
                    let payload = json!({
                        "lines": lines.len(),
                        "units": lines.iter().map(|(_, qty, _)| qty).sum::<i64>(),
                    });
                    if let Err(e) = ctx.message_hub().publish("cart.loaded", payload).await {
                        warn!(error = %e, "Could not publish cart");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Cart request failed");
                    if let Some(toaster) = ctx.toaster() {
                        toaster.show_error(&e.to_string(), ToastOptions::default());
                    }
                }
            }
        });

        Box::new(CartView { cancel })
    }
}
