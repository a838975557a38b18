//! # Module Host
//!
//! Runs the hub in one process: a loopback bus, a fixture API client and a
//! log toaster, with the demo modules registered and the ones named in
//! `HUB_MODULES` (or all of them) mounted.
//!
//! ## Startup Sequence
//!
//! 1. Initialise telemetry (logging + metrics)
//! 2. Load and validate `HostConfig`
//! 3. Start the bus delivery loop
//! 4. Expose shared runtimes, register and mount modules
//! 5. Publish a few sample messages
//! 6. Wait for Ctrl+C, then unmount everything and close the bus

mod demo;

use std::sync::Arc;

use anyhow::{Context, Result};
use hub_bus::{LoopbackTransport, MessageHub};
use hub_runtime::shared_runtime::names;
use hub_runtime::{
    create_module, AppContext, FixtureApiClient, HostConfig, LogToaster, ModuleHost,
};
use hub_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::demo::{CartModule, Catalog, ChatModule, OrdersModule};

fn fixture_api() -> FixtureApiClient {
    FixtureApiClient::new().with_get(
        "/api/cart",
        json!({
            "items": [
                { "sku": "tea-01", "qty": 2 },
                { "sku": "mug-07", "qty": 1, "gift": true }
            ]
        }),
    )
}

async fn publish_samples(hub: &MessageHub) -> Result<()> {
    hub.publish("orders.created", json!({ "id": "o1", "total": 42 }))
        .await?;
    hub.publish("orders.created", json!({ "id": "o2" })).await?;
    hub.publish("chat.message", json!({ "text": "hello" })).await?;
    hub.publish("chat.message", json!({ "text": "deploy at 5", "urgent": true }))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_service("module-host"))
        .context("failed to initialise telemetry")?;

    let config = HostConfig::from_env();
    config.validate().context("invalid host configuration")?;

    let transport = Arc::new(LoopbackTransport::with_capacity(config.bus_capacity));
    let hub = MessageHub::new(transport);
    let delivery = hub.spawn().context("failed to start delivery loop")?;

    let ctx = AppContext::new(config.lang.clone(), Arc::new(fixture_api()), hub.clone())
        .with_toaster(Arc::new(LogToaster::new()));
    let host = ModuleHost::new(ctx);

    host.shared_runtime()
        .expose(names::I18N, Arc::new(Catalog::builtin()))?;
    let catalog = host.shared_runtime().resolve::<Catalog>(names::I18N)?;

    host.register("orders", create_module(OrdersModule::new(catalog)))?;
    host.register("chat", create_module(ChatModule))?;
    host.register("cart", create_module(CartModule))?;

    let to_mount = if config.modules.is_empty() {
        host.registered()
    } else {
        config.modules.clone()
    };
    for name in &to_mount {
        host.mount(name)
            .with_context(|| format!("failed to mount module '{name}'"))?;
    }
    host.print_status();

    publish_samples(&hub).await?;

    info!("Module host is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    host.unmount_all();
    hub.close();
    if let Err(e) = delivery.await {
        warn!(error = %e, "Delivery loop ended abnormally");
    }

    match encode_metrics() {
        Ok(text) => debug!("Final metrics:\n{}", text),
        Err(e) => warn!(error = %e, "Could not encode metrics"),
    }
    Ok(())
}
