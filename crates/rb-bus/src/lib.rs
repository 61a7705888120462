//! rb-bus: Client and server endpoints of the relaybus message bus
//!
//! A server binds a name (`svc://<name>` in-process, or `tcp://host:port`)
//! and answers invocations from clients. Clients subscribe to events by
//! exact code or by group, optionally scoped to a topic; the server fans
//! broadcasts out to every matching session and can serve the last value of
//! each event from its cache.
//!
//! The registries that carry the bus state live in their own modules:
//!
//! - [`session::SessionTable`]: open sessions and first/last tracking
//! - [`pending::PendingCallRegistry`]: outstanding calls, replies, timeouts
//! - [`subscription::SubscriptionRegistry`]: selector/topic → sessions
//! - [`cache::EventCache`]: last value per event and topic

pub mod cache;
pub mod client;
pub mod context;
pub mod event;
pub mod handler;
pub mod pending;
pub mod reply;
pub mod server;
pub mod session;
pub mod subscription;
pub mod transport;

pub use cache::EventCache;
pub use client::Client;
pub use context::BusContext;
pub use event::Event;
pub use handler::{ClientHandler, NoopHandler, ServerHandler};
pub use pending::{CallKind, PendingCallRegistry, PendingReply, Reply};
pub use reply::{ReplyHandle, ReplyKind};
pub use server::Server;
pub use session::{SessionState, SessionTable};
pub use subscription::SubscriptionRegistry;

pub use rb_core::{Address, BusError, CallError, ConnectionError, UsageError};
pub use rb_protocol::{
    CallId, EventCode, SessionId, Selector, StatusCode, SubscribeItem, MAX_PAYLOAD_SIZE,
};
