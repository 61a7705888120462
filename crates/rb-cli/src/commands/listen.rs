//! Listen command implementation

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use rb_bus::{ClientHandler, Event, SessionId, SubscribeItem};
use rb_core::config::EndpointConfig;

use super::connect_client;
use crate::output::{format_event, format_events, print_info, print_warning};

/// Forwards broadcasts to the command loop
struct Forwarder {
    events: mpsc::UnboundedSender<Event>,
    offline: mpsc::UnboundedSender<SessionId>,
}

#[async_trait]
impl ClientHandler for Forwarder {
    async fn on_offline(&self, session: SessionId) {
        let _ = self.offline.send(session);
    }

    async fn on_broadcast(&self, _session: SessionId, event: Event) {
        let _ = self.events.send(event);
    }
}

/// Build the subscription list for `listen`
pub fn subscription_items(
    codes: &[u32],
    group: bool,
    topic: Option<&str>,
) -> Result<Vec<SubscribeItem>> {
    codes
        .iter()
        .map(|&code| {
            if group {
                let group = u8::try_from(code)
                    .map_err(|_| anyhow::anyhow!("group {} does not fit in a byte", code))?;
                Ok(SubscribeItem::group(group, topic))
            } else {
                Ok(SubscribeItem::event(code, topic))
            }
        })
        .collect()
}

/// Subscribe and print events until `count` arrive, the server goes away,
/// or the user interrupts
pub async fn listen_command(
    url: &str,
    items: Vec<SubscribeItem>,
    count: Option<usize>,
    config: &EndpointConfig,
) -> Result<()> {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (offline_tx, mut offline) = mpsc::unbounded_channel();
    let handler = Arc::new(Forwarder {
        events: events_tx,
        offline: offline_tx,
    });
    let (_ctx, client) = connect_client(url, config, Some(handler)).await?;

    let ack = client
        .subscribe_sync(&items, config.default_timeout)
        .await?;
    if !ack.is_ok() {
        anyhow::bail!("subscribe failed: {}", ack.status);
    }
    print_info(&format!("Listening on {} ({} subscriptions)", url, items.len()));

    let mut received = Vec::new();
    loop {
        if count.is_some_and(|count| received.len() >= count) {
            break;
        }
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    println!("{}", format_event(&event));
                    received.push(event);
                }
                None => break,
            },
            _ = offline.recv() => {
                print_warning("Server closed the session");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if client.session_id().is_some() {
        client.disconnect().await?;
    }
    println!("{}", format_events(&received));
    Ok(())
}
