//! Publish command implementation

use anyhow::Result;

use rb_core::config::EndpointConfig;

use super::connect_client;
use crate::output::{format_code, print_success};

/// Publish an event through the server at `url`
pub async fn publish_command(
    url: &str,
    code: u32,
    payload: &str,
    topic: Option<&str>,
    always_update: bool,
    config: &EndpointConfig,
) -> Result<()> {
    let (_ctx, client) = connect_client(url, config, None).await?;
    client.publish(code, topic, payload.as_bytes().to_vec(), always_update)?;
    // Disconnecting flushes the queued frame before the session closes
    client.disconnect().await?;

    match topic {
        Some(topic) => print_success(&format!("Published {} [{}]", format_code(code), topic)),
        None => print_success(&format!("Published {}", format_code(code))),
    }
    Ok(())
}
