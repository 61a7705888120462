//! Server endpoint
//!
//! A server binds one address and runs a task per accepted connection.
//! Invokes, sends and subscribes are handed to the [`ServerHandler`] with a
//! [`ReplyHandle`]; publishes and [`Server::broadcast`] fan out to every
//! session whose subscriptions match, after passing the event cache.

use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rb_core::config::EndpointConfig;
use rb_core::{Address, BusError, ConnectionError};
use rb_protocol::{
    normalize_topic, CallId, EventCode, Frame, FrameCodec, Message, SessionId, StatusCode,
    SubscribeItem,
};

use crate::cache::EventCache;
use crate::context::BusContext;
use crate::handler::ServerHandler;
use crate::reply::{ReplyHandle, ReplyKind};
use crate::session::{SessionLink, SessionTable};
use crate::subscription::SubscriptionRegistry;
use crate::transport::{self, BoxedStream, Listener};

struct Binding {
    address: Address,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

struct ServerInner {
    name: String,
    ctx: BusContext,
    config: EndpointConfig,
    handler: Arc<dyn ServerHandler>,
    sessions: SessionTable,
    subscriptions: Arc<SubscriptionRegistry>,
    cache: EventCache,
    binding: Mutex<Option<Binding>>,
    /// Connection tasks by accept order
    tasks: DashMap<u64, JoinHandle<()>>,
    next_task: AtomicU64,
}

/// Server endpoint
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Create a server with the default configuration
    pub fn new(ctx: &BusContext, name: impl Into<String>, handler: Arc<dyn ServerHandler>) -> Self {
        Self::with_config(ctx, name, handler, EndpointConfig::default())
    }

    /// Create a server with an explicit configuration
    pub fn with_config(
        ctx: &BusContext,
        name: impl Into<String>,
        handler: Arc<dyn ServerHandler>,
        config: EndpointConfig,
    ) -> Self {
        let cache = EventCache::new();
        cache.enable(config.event_cache);
        Self {
            inner: Arc::new(ServerInner {
                name: name.into(),
                ctx: ctx.clone(),
                config,
                handler,
                sessions: SessionTable::new(),
                subscriptions: Arc::new(SubscriptionRegistry::new()),
                cache,
                binding: Mutex::new(None),
                tasks: DashMap::new(),
                next_task: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Start accepting connections. Returns the address clients can dial,
    /// with the actual port for `tcp://host:0`.
    pub async fn bind(&self, url: &str) -> Result<Address, BusError> {
        let inner = &self.inner;
        inner.ctx.ensure_running()?;
        let address: Address = url.parse()?;
        if inner.binding.lock().is_some() {
            return Err(ConnectionError::AlreadyBound.into());
        }

        let listener = Listener::bind(&inner.ctx, &address, inner.config.service_backlog).await?;
        let local = listener.local_address()?;

        let mut binding = inner.binding.lock();
        if binding.is_some() {
            if let Address::Service(name) = &local {
                inner.ctx.unregister(name);
            }
            return Err(ConnectionError::AlreadyBound.into());
        }
        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            Arc::clone(inner),
            listener,
            shutdown.clone(),
            local.clone(),
        ));
        *binding = Some(Binding {
            address: local.clone(),
            shutdown,
            accept_task,
        });

        tracing::info!("{} listening on {}", inner.name, local);
        Ok(local)
    }

    /// Stop accepting and close every session.
    ///
    /// Returns once every session has run its offline cascade.
    pub async fn unbind(&self) -> Result<(), BusError> {
        let binding = self
            .inner
            .binding
            .lock()
            .take()
            .ok_or(ConnectionError::NotBound)?;

        if let Address::Service(name) = &binding.address {
            self.inner.ctx.unregister(name);
        }
        binding.shutdown.cancel();
        if let Err(e) = binding.accept_task.await {
            tracing::warn!("Accept task of {} failed: {}", self.inner.name, e);
        }

        for session in self.inner.sessions.ids() {
            if let Some(link) = self.inner.sessions.link(session) {
                link.close();
            }
        }

        let ids: Vec<u64> = self.inner.tasks.iter().map(|entry| *entry.key()).collect();
        let tasks: Vec<JoinHandle<()>> = ids
            .into_iter()
            .filter_map(|id| self.inner.tasks.remove(&id).map(|(_, task)| task))
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Connection task of {} failed: {}", self.inner.name, e);
            }
        }

        tracing::info!("{} stopped listening on {}", self.inner.name, binding.address);
        Ok(())
    }

    /// Bound address, if any
    pub fn local_address(&self) -> Option<Address> {
        self.inner
            .binding
            .lock()
            .as_ref()
            .map(|binding| binding.address.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.lock().is_some()
    }

    /// Send an event to every subscribed session.
    ///
    /// Returns the number of sessions it was queued for; 0 when the cache
    /// suppressed an unchanged value.
    pub fn broadcast(&self, code: EventCode, topic: Option<&str>, payload: impl Into<Bytes>) -> usize {
        self.inner.route(code, topic, payload.into(), false)
    }

    /// [`Server::broadcast`] that bypasses cache suppression when
    /// `always_update` is set
    pub fn publish(
        &self,
        code: EventCode,
        topic: Option<&str>,
        payload: impl Into<Bytes>,
        always_update: bool,
    ) -> usize {
        self.inner.route(code, topic, payload.into(), always_update)
    }

    /// Turn the event cache on or off; turning it off forgets every entry
    pub fn enable_event_cache(&self, enabled: bool) {
        self.inner.cache.enable(enabled);
    }

    /// Seed a cache entry without broadcasting it
    pub fn init_event_cache(
        &self,
        code: EventCode,
        topic: Option<&str>,
        payload: impl Into<Bytes>,
        always_update: bool,
    ) -> bool {
        self.inner
            .cache
            .init(code, topic, payload.into(), always_update)
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    pub fn event_cache(&self) -> &EventCache {
        &self.inner.cache
    }
}

async fn accept_loop(
    inner: Arc<ServerInner>,
    mut listener: Listener,
    shutdown: CancellationToken,
    address: Address,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Some(Ok((stream, peer))) => {
                    tracing::debug!("Accepted connection from {}", peer);
                    inner.spawn_session(stream, peer, &address, shutdown.clone());
                }
                Some(Err(e)) => tracing::error!("Failed to accept on {}: {}", address, e),
                None => {
                    tracing::info!("Listener {} closed", address);
                    break;
                }
            },
        }
    }
}

impl ServerInner {
    fn spawn_session(
        self: &Arc<Self>,
        stream: BoxedStream,
        peer: String,
        address: &Address,
        shutdown: CancellationToken,
    ) {
        let task_id = self.next_task.fetch_add(1, Ordering::SeqCst);
        let expected = match address {
            Address::Service(name) => Some(name.clone()),
            Address::Tcp(_) => None,
        };

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.run_session(stream, peer, expected, shutdown).await;
            inner.tasks.remove(&task_id);
        });
        self.tasks.insert(task_id, task);
        if self
            .tasks
            .get(&task_id)
            .is_some_and(|task| task.is_finished())
        {
            self.tasks.remove(&task_id);
        }
    }

    async fn run_session(
        &self,
        stream: BoxedStream,
        peer: String,
        expected: Option<String>,
        shutdown: CancellationToken,
    ) {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let hello = tokio::select! {
            _ = shutdown.cancelled() => return,
            hello = transport::read_hello(&mut framed, self.config.handshake_timeout) => hello,
        };
        let name = match hello {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("Handshake with {} failed: {}", peer, e);
                return;
            }
        };

        if expected.as_deref().is_some_and(|expected| expected != name) {
            let reason = format!("no service named {}", name);
            tracing::warn!("Refusing {}: {}", peer, reason);
            let _ = transport::send_hello_ack(&mut framed, false, Some(reason)).await;
            return;
        }

        let (link, outbound) = SessionLink::new();
        let admit = |open| self.config.admits(open);
        let session = match self.sessions.try_connect(peer.clone(), link.clone(), admit) {
            Ok(session) => session,
            Err(open) => {
                tracing::warn!("Refusing {}: {} sessions open", peer, open);
                let _ = transport::send_hello_ack(
                    &mut framed,
                    false,
                    Some("session limit reached".to_string()),
                )
                .await;
                return;
            }
        };

        let is_first = self.sessions.mark_online(session).unwrap_or(false);
        if let Err(e) = transport::send_hello_ack(&mut framed, true, None).await {
            tracing::warn!("Lost {} during handshake: {}", peer, e);
            self.sessions.on_disconnect(session);
            return;
        }
        tracing::info!("{} online from {}", session, peer);

        let (sink, mut stream) = framed.split();
        let writer = transport::spawn_writer(sink, outbound, link.close_token());
        self.handler.on_online(session, is_first).await;

        let closed = link.close_token();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = closed.cancelled() => break,
                frame = stream.next() => match frame {
                    Some(Ok(frame)) => self.dispatch(session, &link, frame).await,
                    Some(Err(e)) => {
                        tracing::warn!("Dropping {}: {}", session, e);
                        break;
                    }
                    None => {
                        tracing::debug!("{} closed by peer", session);
                        break;
                    }
                },
            }
        }

        link.close();
        if let Err(e) = writer.await {
            tracing::debug!("Writer of {} failed: {}", session, e);
        }
        self.finish_session(session).await;
    }

    async fn finish_session(&self, session: SessionId) {
        let Some(closed) = self.sessions.on_disconnect(session) else {
            return;
        };
        if closed.was_online {
            self.handler.on_offline(session, closed.is_last).await;
        }
        let dropped = self.subscriptions.drop_session(session);
        tracing::info!("{} offline ({} subscriptions dropped)", session, dropped);
    }

    fn reply_handle(
        &self,
        session: SessionId,
        serial: CallId,
        code: EventCode,
        kind: ReplyKind,
        link: &SessionLink,
    ) -> ReplyHandle {
        ReplyHandle::new(
            session,
            serial,
            code,
            kind,
            link.clone(),
            Arc::clone(&self.subscriptions),
        )
    }

    async fn dispatch(&self, session: SessionId, link: &SessionLink, frame: Frame) {
        let serial = frame.serial;
        match frame.message {
            Message::Invoke { code, payload } => {
                let kind = if serial.expects_reply() {
                    ReplyKind::Invoke
                } else {
                    ReplyKind::OneWay
                };
                let reply = self.reply_handle(session, serial, code, kind, link);
                self.handler.on_invoke(session, code, payload, reply).await;
            }
            Message::Send { code, payload } => {
                let reply = self.reply_handle(session, CallId::NONE, code, ReplyKind::OneWay, link);
                self.handler.on_invoke(session, code, payload, reply).await;
            }
            Message::Subscribe { items } => self.subscribe(session, serial, items, link).await,
            Message::Unsubscribe { items } => {
                for item in items.iter().map(SubscribeItem::normalized) {
                    if !self.subscriptions.unsubscribe(session, &item) {
                        tracing::warn!(
                            "{} was not subscribed to {} (topic {:?})",
                            session,
                            item.selector,
                            item.topic
                        );
                    }
                }
                if serial.expects_reply() {
                    let code = items.first().map(|i| i.selector.as_u32()).unwrap_or(0);
                    link.send(Frame::new(
                        serial,
                        Message::status(code, StatusCode::UNSUBSCRIBE_OK, None),
                    ));
                }
            }
            Message::Publish {
                code,
                topic,
                payload,
                always_update,
            } => {
                self.route(code, topic.as_deref(), payload, always_update);
            }
            Message::GetEvent { code, topic } => {
                let message = match self.cache.get(code, topic.as_deref()) {
                    Some(payload) => Message::EventValue {
                        code,
                        topic: normalize_topic(topic.as_deref()),
                        payload,
                    },
                    None => Message::status(
                        code,
                        StatusCode::NON_EXIST,
                        Some("no cached value".to_string()),
                    ),
                };
                if serial.expects_reply() {
                    link.send(Frame::new(serial, message));
                }
            }
            other => {
                tracing::warn!("Unexpected {:?} from {}", other.message_type(), session);
            }
        }
    }

    async fn subscribe(
        &self,
        session: SessionId,
        serial: CallId,
        items: Vec<SubscribeItem>,
        link: &SessionLink,
    ) {
        let items: Vec<SubscribeItem> = items.iter().map(SubscribeItem::normalized).collect();
        for item in &items {
            self.subscriptions.subscribe(session, item);
        }
        let code = items.first().map(|i| i.selector.as_u32()).unwrap_or(0);

        if !self.cache.is_enabled() {
            let reply = self.reply_handle(session, serial, code, ReplyKind::Subscribe, link);
            self.handler.on_subscribe(session, items, reply).await;
            return;
        }

        // Initial values come from the cache; an event covered by several
        // items is sent once.
        let mut sent = HashSet::new();
        for item in &items {
            for event in self.cache.matching(item.selector, item.topic.as_deref()) {
                if !sent.insert((event.code, event.topic.clone())) {
                    continue;
                }
                link.send(Frame::one_way(Message::Broadcast {
                    code: event.code,
                    topic: event.topic,
                    payload: event.payload,
                }));
            }
        }
        if serial.expects_reply() {
            link.send(Frame::new(
                serial,
                Message::status(code, StatusCode::SUBSCRIBE_OK, None),
            ));
        }
    }

    fn route(&self, code: EventCode, topic: Option<&str>, payload: Bytes, always_update: bool) -> usize {
        let topic = normalize_topic(topic);
        let frame = Frame::one_way(Message::Broadcast {
            code,
            topic: topic.clone(),
            payload: payload.clone(),
        });
        if let Err(e) = frame.check_size() {
            tracing::warn!("Not routing event {}: {}", code, e);
            return 0;
        }

        if !self
            .cache
            .publish(code, topic.as_deref(), payload, always_update)
        {
            tracing::debug!("Suppressed unchanged event {}", code);
            return 0;
        }

        let mut delivered = 0;
        for session in self.subscriptions.matching_sessions(code, topic.as_deref()) {
            match self.sessions.link(session) {
                Some(link) if link.send(frame.clone()) => delivered += 1,
                _ => tracing::warn!("Failed to deliver event {} to {}", code, session),
            }
        }
        delivered
    }
}
