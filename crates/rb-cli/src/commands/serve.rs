//! Serve command implementation
//!
//! Runs an echo server: every invoke is answered with its own payload and
//! client publishes are fanned out to subscribers through the cache.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

use rb_bus::{BusContext, ReplyHandle, Server, ServerHandler, SessionId};
use rb_core::config::EndpointConfig;

use crate::output::{format_code, print_info, print_success, print_warning};

/// Answers invokes with their payload
struct EchoHandler;

#[async_trait]
impl ServerHandler for EchoHandler {
    async fn on_online(&self, session: SessionId, is_first: bool) {
        tracing::info!("{} online (first: {})", session, is_first);
    }

    async fn on_offline(&self, session: SessionId, is_last: bool) {
        tracing::info!("{} offline (last: {})", session, is_last);
    }

    async fn on_invoke(
        &self,
        session: SessionId,
        code: u32,
        payload: Bytes,
        mut reply: ReplyHandle,
    ) {
        tracing::debug!("{} from {}: {} bytes", format_code(code), session, payload.len());
        if reply.expects_reply() {
            if let Err(e) = reply.reply(payload) {
                tracing::warn!("Failed to answer {}: {}", session, e);
            }
        }
    }
}

/// Bind `bind` and serve until interrupted
pub async fn serve_command(bind: &str, cache: bool, config: &EndpointConfig) -> Result<()> {
    let mut config = config.clone();
    config.event_cache |= cache;

    let ctx = BusContext::start();
    let server = Server::with_config(&ctx, "relaybus", Arc::new(EchoHandler), config.clone());
    let address = server
        .bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    print_success(&format!("Serving on {}", address));
    if config.event_cache {
        print_info("Event cache enabled");
    }
    if let Some(max) = config.max_sessions {
        print_info(&format!("Accepting at most {} sessions", max));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    print_info("Shutting down...");
    let open = server.sessions().len();
    if open > 0 {
        print_warning(&format!("Closing {} open sessions", open));
    }
    server.unbind().await?;
    ctx.shutdown();
    print_success("Server stopped");
    Ok(())
}
