//! Client endpoint
//!
//! A client holds at most one session to a server. Calls are correlated
//! through the [`PendingCallRegistry`]; replies of async calls, broadcasts
//! and session changes are delivered to the [`ClientHandler`] from the
//! session's connection task, one at a time.

use bytes::Bytes;
use futures::stream::SplitStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use rb_core::config::EndpointConfig;
use rb_core::{Address, BusError, ConnectionError};
use rb_protocol::{
    normalize_topic, CallId, EventCode, Frame, FrameCodec, Message, SessionId, StatusCode,
    SubscribeItem,
};

use crate::context::BusContext;
use crate::event::Event;
use crate::handler::ClientHandler;
use crate::pending::{CallKind, PendingCallRegistry, PendingReply, Reply};
use crate::session::{SessionLink, SessionState, SessionTable};
use crate::transport::{self, FramedStream};

/// The live connection of a client
struct Connection {
    session: SessionId,
    link: SessionLink,
    /// Queue async call results are pushed onto
    completions: mpsc::UnboundedSender<Reply>,
    task: Option<JoinHandle<()>>,
}

struct ClientInner {
    name: String,
    ctx: BusContext,
    config: EndpointConfig,
    handler: Arc<dyn ClientHandler>,
    sessions: SessionTable,
    pending: PendingCallRegistry,
    connection: Mutex<Option<Connection>>,
}

/// Client endpoint
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with the default configuration
    pub fn new(ctx: &BusContext, name: impl Into<String>, handler: Arc<dyn ClientHandler>) -> Self {
        Self::with_config(ctx, name, handler, EndpointConfig::default())
    }

    /// Create a client with an explicit configuration
    pub fn with_config(
        ctx: &BusContext,
        name: impl Into<String>,
        handler: Arc<dyn ClientHandler>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                ctx: ctx.clone(),
                config,
                handler,
                sessions: SessionTable::new(),
                pending: PendingCallRegistry::new(),
                connection: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Connect to a server and complete the handshake
    pub async fn connect(&self, url: &str) -> Result<SessionId, BusError> {
        let inner = &self.inner;
        inner.ctx.ensure_running()?;
        let address: Address = url.parse()?;
        if inner.connection.lock().is_some() {
            return Err(ConnectionError::AlreadyConnected.into());
        }

        let (stream, peer) = transport::connect(&inner.ctx, &address).await?;
        let mut framed = Framed::new(stream, FrameCodec::new());
        transport::client_handshake(
            &mut framed,
            address.service_name(),
            inner.config.handshake_timeout,
        )
        .await?;

        let (link, outbound) = SessionLink::new();
        let (completions, completed) = mpsc::unbounded_channel();
        let session = inner.sessions.on_connect(peer, link.clone());
        {
            let mut current = inner.connection.lock();
            if current.is_some() {
                drop(current);
                inner.sessions.on_disconnect(session);
                return Err(ConnectionError::AlreadyConnected.into());
            }
            *current = Some(Connection {
                session,
                link: link.clone(),
                completions,
                task: None,
            });
        }
        inner.sessions.mark_online(session);

        let (sink, stream) = framed.split();
        let writer = transport::spawn_writer(sink, outbound, link.close_token());
        let task = tokio::spawn(run_session(
            Arc::clone(inner),
            session,
            stream,
            link,
            writer,
            completed,
        ));
        if let Some(connection) = inner
            .connection
            .lock()
            .as_mut()
            .filter(|c| c.session == session)
        {
            connection.task = Some(task);
        }

        tracing::info!("{} connected to {} as {}", inner.name, address, session);
        Ok(session)
    }

    /// Close the session and wait until its offline cascade has run.
    ///
    /// Must not be awaited from a [`ClientHandler`] callback of this client;
    /// use [`Client::close`] there.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        let connection = self
            .inner
            .connection
            .lock()
            .take()
            .ok_or(ConnectionError::NotConnected)?;

        connection.link.close();
        if let Some(task) = connection.task {
            if let Err(e) = task.await {
                tracing::warn!("Session task of {} failed: {}", self.inner.name, e);
            }
        }
        Ok(())
    }

    /// Ask the session to close without waiting
    pub fn close(&self) {
        if let Some(connection) = self.inner.connection.lock().as_ref() {
            connection.link.close();
        }
    }

    /// Current session, if connected
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.connection.lock().as_ref().map(|c| c.session)
    }

    pub fn is_online(&self) -> bool {
        self.session_id()
            .and_then(|id| self.inner.sessions.state(id))
            .is_some_and(|state| state == SessionState::Online)
    }

    /// Number of calls waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Invoke `code`; the result arrives through [`ClientHandler::on_reply`].
    ///
    /// A zero `timeout` waits forever.
    pub fn invoke_async(
        &self,
        code: EventCode,
        payload: impl Into<Bytes>,
        timeout: Duration,
        token: Option<u64>,
    ) -> Result<CallId, BusError> {
        let message = Message::Invoke {
            code,
            payload: payload.into(),
        };
        self.inner
            .call_async(code, CallKind::Invoke, timeout, token, message)
    }

    /// Invoke `code` and wait for the result
    pub async fn invoke_sync(
        &self,
        code: EventCode,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Reply, BusError> {
        let message = Message::Invoke {
            code,
            payload: payload.into(),
        };
        let pending = self
            .inner
            .call_sync(code, CallKind::Invoke, timeout, message)?;
        Ok(pending.wait().await)
    }

    /// Send a one-way message
    pub fn send(&self, code: EventCode, payload: impl Into<Bytes>) -> Result<(), BusError> {
        self.inner.send_one_way(Message::Send {
            code,
            payload: payload.into(),
        })
    }

    /// Publish an event through the server to every matching subscriber
    pub fn publish(
        &self,
        code: EventCode,
        topic: Option<&str>,
        payload: impl Into<Bytes>,
        always_update: bool,
    ) -> Result<(), BusError> {
        self.inner.send_one_way(Message::Publish {
            code,
            topic: normalize_topic(topic),
            payload: payload.into(),
            always_update,
        })
    }

    /// Ask for the cached value of an event; the result arrives through
    /// [`ClientHandler::on_get_event`]
    pub fn get_async(
        &self,
        code: EventCode,
        topic: Option<&str>,
        timeout: Duration,
        token: Option<u64>,
    ) -> Result<CallId, BusError> {
        let message = Message::GetEvent {
            code,
            topic: normalize_topic(topic),
        };
        self.inner
            .call_async(code, CallKind::GetEvent, timeout, token, message)
    }

    /// Ask for the cached value of an event and wait for it
    pub async fn get_sync(
        &self,
        code: EventCode,
        topic: Option<&str>,
        timeout: Duration,
    ) -> Result<Reply, BusError> {
        let message = Message::GetEvent {
            code,
            topic: normalize_topic(topic),
        };
        let pending = self
            .inner
            .call_sync(code, CallKind::GetEvent, timeout, message)?;
        Ok(pending.wait().await)
    }

    /// Subscribe without waiting for the acknowledgement
    pub fn subscribe(&self, items: &[SubscribeItem]) -> Result<(), BusError> {
        self.inner.send_one_way(Message::Subscribe {
            items: normalized(items),
        })
    }

    /// Subscribe and wait for the acknowledgement.
    ///
    /// Initial values the server sends for the new subscriptions have been
    /// delivered to [`ClientHandler::on_broadcast`] by the time this returns.
    pub async fn subscribe_sync(
        &self,
        items: &[SubscribeItem],
        timeout: Duration,
    ) -> Result<Reply, BusError> {
        let code = items.first().map(|i| i.selector.as_u32()).unwrap_or(0);
        let message = Message::Subscribe {
            items: normalized(items),
        };
        let pending = self
            .inner
            .call_sync(code, CallKind::Subscribe, timeout, message)?;
        Ok(pending.wait().await)
    }

    /// Remove subscriptions
    pub fn unsubscribe(&self, items: &[SubscribeItem]) -> Result<(), BusError> {
        self.inner.send_one_way(Message::Unsubscribe {
            items: normalized(items),
        })
    }
}

fn normalized(items: &[SubscribeItem]) -> Vec<SubscribeItem> {
    items.iter().map(SubscribeItem::normalized).collect()
}

impl ClientInner {
    fn current(
        &self,
    ) -> Result<(SessionId, SessionLink, mpsc::UnboundedSender<Reply>), ConnectionError> {
        let connection = self.connection.lock();
        let connection = connection.as_ref().ok_or(ConnectionError::NotConnected)?;
        Ok((
            connection.session,
            connection.link.clone(),
            connection.completions.clone(),
        ))
    }

    fn send_one_way(&self, message: Message) -> Result<(), BusError> {
        let (session, link, _) = self.current()?;
        let frame = Frame::one_way(message);
        frame.check_size()?;
        if link.send(frame) {
            Ok(())
        } else {
            Err(ConnectionError::Lost(format!("{} is closing", session)).into())
        }
    }

    fn call_sync(
        &self,
        code: EventCode,
        kind: CallKind,
        timeout: Duration,
        message: Message,
    ) -> Result<PendingReply, BusError> {
        let (session, link, _) = self.current()?;
        let pending = self.pending.issue(session, code, kind, timeout, None);
        self.transmit(&link, pending.call_id(), message);
        Ok(pending)
    }

    fn call_async(
        &self,
        code: EventCode,
        kind: CallKind,
        timeout: Duration,
        token: Option<u64>,
        message: Message,
    ) -> Result<CallId, BusError> {
        let (session, link, completions) = self.current()?;
        let call_id = self
            .pending
            .issue_notify(session, code, kind, timeout, token, completions);
        self.transmit(&link, call_id, message);
        Ok(call_id)
    }

    fn transmit(&self, link: &SessionLink, call_id: CallId, message: Message) {
        let frame = Frame::new(call_id, message);
        if let Err(e) = frame.check_size() {
            tracing::warn!("Not sending {}: {}", call_id, e);
            self.pending
                .cancel(call_id, StatusCode::BAD_PARAMETER, Some(e.to_string()));
            return;
        }
        if !link.send(frame) {
            self.pending.cancel(
                call_id,
                StatusCode::UNABLE_TO_SEND,
                Some("session is closing".to_string()),
            );
        }
    }

    async fn deliver(&self, session: SessionId, reply: Reply) {
        match reply.kind {
            CallKind::GetEvent => self.handler.on_get_event(session, reply).await,
            CallKind::Invoke | CallKind::Subscribe => self.handler.on_reply(session, reply).await,
        }
    }

    async fn dispatch(&self, session: SessionId, frame: Frame) {
        let serial = frame.serial;
        match frame.message {
            Message::Reply { payload, .. } => {
                self.pending
                    .resolve(serial, StatusCode::OK, payload, None, None);
            }
            Message::Status {
                status,
                description,
                ..
            } => {
                self.pending
                    .resolve(serial, status, Bytes::new(), None, description);
            }
            Message::EventValue { topic, payload, .. } => {
                self.pending
                    .resolve(serial, StatusCode::OK, payload, topic, None);
            }
            Message::Broadcast {
                code,
                topic,
                payload,
            } => {
                self.handler
                    .on_broadcast(session, Event::new(code, topic, payload))
                    .await;
            }
            other => {
                tracing::warn!(
                    "Unexpected {:?} from server on {}",
                    other.message_type(),
                    session
                );
            }
        }
    }

    /// Offline cascade; runs once, on the session's own task
    async fn finish_session(
        &self,
        session: SessionId,
        completed: &mut mpsc::UnboundedReceiver<Reply>,
    ) {
        {
            let mut current = self.connection.lock();
            if current.as_ref().is_some_and(|c| c.session == session) {
                *current = None;
            }
        }

        let Some(closed) = self.sessions.on_disconnect(session) else {
            return;
        };
        if closed.was_online {
            self.handler.on_offline(session).await;
        }

        let cancelled = self.pending.cancel_on_disconnect(session);
        while let Ok(reply) = completed.try_recv() {
            self.deliver(session, reply).await;
        }
        tracing::info!(
            "{} disconnected {} ({} pending calls cancelled)",
            self.name,
            session,
            cancelled
        );
    }
}

/// Connection task of a client session
async fn run_session(
    inner: Arc<ClientInner>,
    session: SessionId,
    mut stream: SplitStream<FramedStream>,
    link: SessionLink,
    writer: JoinHandle<()>,
    mut completed: mpsc::UnboundedReceiver<Reply>,
) {
    inner.handler.on_online(session).await;

    let closed = link.close_token();
    loop {
        tokio::select! {
            biased;
            Some(reply) = completed.recv() => inner.deliver(session, reply).await,
            _ = closed.cancelled() => {
                tracing::debug!("{} closed locally", session);
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(frame)) => inner.dispatch(session, frame).await,
                Some(Err(e)) => {
                    tracing::warn!("Dropping {}: {}", session, e);
                    break;
                }
                None => {
                    tracing::info!("Server closed {}", session);
                    break;
                }
            },
        }
    }

    link.close();
    if let Err(e) = writer.await {
        tracing::debug!("Writer of {} failed: {}", session, e);
    }
    inner.finish_session(session, &mut completed).await;
}
