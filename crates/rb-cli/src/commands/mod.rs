//! CLI command implementations

mod call;
mod config;
mod listen;
mod publish;
mod serve;

pub use call::{call_command, get_command, send_command};
pub use config::{config_init, config_show, load_endpoint_config, resolve_config_path};
pub use listen::{listen_command, subscription_items};
pub use publish::publish_command;
pub use serve::serve_command;

use std::sync::Arc;

use anyhow::{Context, Result};

use rb_bus::{BusContext, Client, ClientHandler, NoopHandler};
use rb_core::config::EndpointConfig;

/// Parse an event code written in decimal or as `0x` hex
pub fn parse_code(value: &str) -> Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid event code '{}': {}", value, e))
}

/// Start a context and connect a one-shot client to `url`
pub(crate) async fn connect_client(
    url: &str,
    config: &EndpointConfig,
    handler: Option<Arc<dyn ClientHandler>>,
) -> Result<(BusContext, Client)> {
    let ctx = BusContext::start();
    let handler = handler.unwrap_or_else(|| Arc::new(NoopHandler));
    let client = Client::with_config(&ctx, "relaybus-cli", handler, config.clone());
    client
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    Ok((ctx, client))
}
