//! Endpoint callback traits
//!
//! Every method has a no-op default, so a handler only implements what it
//! cares about. Callbacks of one session run one at a time, in the order the
//! peer sent the messages, on that session's connection task. A callback
//! must not await a `*_sync` call of the same client: the reply could only be
//! delivered by the task that is waiting.

use async_trait::async_trait;
use bytes::Bytes;

use rb_protocol::{EventCode, SessionId, SubscribeItem};

use crate::event::Event;
use crate::pending::Reply;
use crate::reply::ReplyHandle;

/// Callbacks of a client endpoint
#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    /// The session to the server completed its handshake
    async fn on_online(&self, _session: SessionId) {}

    /// The session to the server is gone
    async fn on_offline(&self, _session: SessionId) {}

    /// Result of an `invoke_async`, including timeouts and lost sessions
    async fn on_reply(&self, _session: SessionId, _reply: Reply) {}

    /// Result of a `get_async`
    async fn on_get_event(&self, _session: SessionId, _reply: Reply) {}

    /// An event the client is subscribed to
    async fn on_broadcast(&self, _session: SessionId, _event: Event) {}
}

/// Callbacks of a server endpoint
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// A client completed its handshake. `is_first` is set when it is the
    /// only online session.
    async fn on_online(&self, _session: SessionId, _is_first: bool) {}

    /// A client session closed. `is_last` is set when no online session
    /// remains.
    async fn on_offline(&self, _session: SessionId, _is_last: bool) {}

    /// An invoke or one-way send. Dropping `reply` without answering an
    /// invoke sends an automatic status to the caller.
    async fn on_invoke(
        &self,
        session: SessionId,
        code: EventCode,
        _payload: Bytes,
        _reply: ReplyHandle,
    ) {
        tracing::warn!("Unhandled message {} from {}", code, session);
    }

    /// New subscriptions, already registered. Initial values may be sent
    /// through `reply.broadcast`; the acknowledgement follows its release.
    async fn on_subscribe(
        &self,
        _session: SessionId,
        _items: Vec<SubscribeItem>,
        _reply: ReplyHandle,
    ) {
    }
}

/// Handler that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}

impl ServerHandler for NoopHandler {}
