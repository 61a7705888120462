//! Call, send and get command implementations

use std::time::Duration;

use anyhow::Result;

use rb_core::config::EndpointConfig;

use super::connect_client;
use crate::output::{format_reply, print_error, print_success};

/// Invoke `code` and print the reply
pub async fn call_command(
    url: &str,
    code: u32,
    payload: &str,
    timeout: Option<Duration>,
    config: &EndpointConfig,
) -> Result<()> {
    let (_ctx, client) = connect_client(url, config, None).await?;
    let timeout = timeout.unwrap_or(config.default_timeout);

    let reply = client
        .invoke_sync(code, payload.as_bytes().to_vec(), timeout)
        .await?;
    let ok = reply.is_ok();
    print!("{}", format_reply(&reply));
    client.disconnect().await?;

    if !ok {
        print_error(&format!("Call failed with {}", reply.status));
        anyhow::bail!("call to {} failed: {}", code, reply.status);
    }
    Ok(())
}

/// Send a one-way message
pub async fn send_command(
    url: &str,
    code: u32,
    payload: &str,
    config: &EndpointConfig,
) -> Result<()> {
    let (_ctx, client) = connect_client(url, config, None).await?;
    client.send(code, payload.as_bytes().to_vec())?;
    client.disconnect().await?;
    print_success(&format!("Sent {} to {}", code, url));
    Ok(())
}

/// Read the cached value of an event
pub async fn get_command(
    url: &str,
    code: u32,
    topic: Option<&str>,
    config: &EndpointConfig,
) -> Result<()> {
    let (_ctx, client) = connect_client(url, config, None).await?;
    let reply = client.get_sync(code, topic, config.default_timeout).await?;
    client.disconnect().await?;

    if !reply.is_ok() {
        print_error(&format!("No cached value for {}: {}", code, reply.status));
        anyhow::bail!("get {} failed: {}", code, reply.status);
    }
    print!("{}", format_reply(&reply));
    Ok(())
}
