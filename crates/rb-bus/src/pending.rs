//! Pending call registry
//!
//! Correlates outstanding calls with their replies. Every call resolves
//! exactly once: by a reply from the peer, by its timeout timer, or by the
//! loss of its session. Removal from the registry under the lock decides
//! which of those wins; the losers find nothing to resolve.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use rb_core::CallError;
use rb_protocol::{CallId, EventCode, SessionId, StatusCode};

/// What a pending call is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Invoke,
    GetEvent,
    Subscribe,
}

/// Result of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub call_id: CallId,
    pub code: EventCode,
    pub kind: CallKind,
    pub status: StatusCode,
    pub payload: Bytes,
    /// Topic of a get-event answer
    pub topic: Option<String>,
    /// Opaque value supplied when the call was issued
    pub token: Option<u64>,
    pub description: Option<String>,
}

impl Reply {
    /// Whether the call succeeded
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Payload on success, the failure otherwise
    pub fn into_result(self) -> Result<Bytes, CallError> {
        if self.status.is_ok() {
            Ok(self.payload)
        } else {
            Err(CallError::from_status(
                self.code,
                self.status,
                self.description,
            ))
        }
    }
}

/// Where the reply of a call is delivered
enum Completion {
    /// A task awaiting [`PendingReply::wait`]
    Waiter(oneshot::Sender<Reply>),
    /// A delivery queue drained by the connection task
    Notify(mpsc::UnboundedSender<Reply>),
}

struct PendingCall {
    session: SessionId,
    code: EventCode,
    kind: CallKind,
    token: Option<u64>,
    completion: Completion,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    fn complete(self, reply: Reply) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        let delivered = match self.completion {
            Completion::Waiter(tx) => tx.send(reply).is_ok(),
            Completion::Notify(tx) => tx.send(reply).is_ok(),
        };
        if !delivered {
            tracing::debug!("Nobody is waiting for the reply to {}", self.code);
        }
    }
}

struct RegistryInner {
    calls: Mutex<HashMap<CallId, PendingCall>>,
    next_id: AtomicU32,
}

/// Registry of calls waiting for a reply
#[derive(Clone)]
pub struct PendingCallRegistry {
    inner: Arc<RegistryInner>,
}

/// Handle to await the reply of one call
#[derive(Debug)]
pub struct PendingReply {
    call_id: CallId,
    code: EventCode,
    kind: CallKind,
    token: Option<u64>,
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Wait until the call is resolved or times out
    pub async fn wait(self) -> Reply {
        match self.rx.await {
            Ok(reply) => reply,
            // Registry dropped with the call still pending
            Err(_) => Reply {
                call_id: self.call_id,
                code: self.code,
                kind: self.kind,
                status: StatusCode::PEER_VANISH,
                payload: Bytes::new(),
                topic: None,
                token: self.token,
                description: None,
            },
        }
    }
}

impl PendingCallRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                calls: Mutex::new(HashMap::new()),
                next_id: AtomicU32::new(1),
            }),
        }
    }

    /// Register a call whose reply is awaited through the returned handle.
    ///
    /// A zero `timeout` waits forever. Must be called inside a tokio runtime
    /// when a timeout is set.
    pub fn issue(
        &self,
        session: SessionId,
        code: EventCode,
        kind: CallKind,
        timeout: Duration,
        token: Option<u64>,
    ) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let call_id = self.register(
            session,
            code,
            kind,
            timeout,
            token,
            Completion::Waiter(tx),
        );
        PendingReply {
            call_id,
            code,
            kind,
            token,
            rx,
        }
    }

    /// Register a call whose reply is pushed onto `notify`
    pub fn issue_notify(
        &self,
        session: SessionId,
        code: EventCode,
        kind: CallKind,
        timeout: Duration,
        token: Option<u64>,
        notify: mpsc::UnboundedSender<Reply>,
    ) -> CallId {
        self.register(
            session,
            code,
            kind,
            timeout,
            token,
            Completion::Notify(notify),
        )
    }

    fn register(
        &self,
        session: SessionId,
        code: EventCode,
        kind: CallKind,
        timeout: Duration,
        token: Option<u64>,
        completion: Completion,
    ) -> CallId {
        let call = PendingCall {
            session,
            code,
            kind,
            token,
            completion,
            timer: None,
        };

        let call_id = {
            let mut calls = self.inner.calls.lock();
            let call_id = loop {
                let id = CallId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
                if id != CallId::NONE && !calls.contains_key(&id) {
                    break id;
                }
            };
            calls.insert(call_id, call);
            call_id
        };

        if !timeout.is_zero() {
            let registry = self.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                registry.expire(call_id);
            });
            match self.inner.calls.lock().get_mut(&call_id) {
                Some(call) => call.timer = Some(timer.abort_handle()),
                None => timer.abort(),
            }
        }

        tracing::debug!("Issued {} for code {} ({:?})", call_id, code, kind);
        call_id
    }

    /// Resolve a call with the peer's answer.
    ///
    /// Returns false for unknown or already resolved calls.
    pub fn resolve(
        &self,
        call_id: CallId,
        status: StatusCode,
        payload: Bytes,
        topic: Option<String>,
        description: Option<String>,
    ) -> bool {
        let Some(call) = self.take(call_id) else {
            tracing::debug!("Discarding late or unknown reply for {}", call_id);
            return false;
        };
        let reply = Reply {
            call_id,
            code: call.code,
            kind: call.kind,
            status,
            payload,
            topic,
            token: call.token,
            description,
        };
        call.complete(reply);
        true
    }

    /// Fail a call locally
    pub fn cancel(&self, call_id: CallId, status: StatusCode, description: Option<String>) -> bool {
        self.resolve(call_id, status, Bytes::new(), None, description)
    }

    /// Resolve every call of a session with `PEER_VANISH`
    pub fn cancel_on_disconnect(&self, session: SessionId) -> usize {
        let calls: Vec<(CallId, PendingCall)> = {
            let mut calls = self.inner.calls.lock();
            let ids: Vec<CallId> = calls
                .iter()
                .filter(|(_, call)| call.session == session)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                .collect()
        };

        let count = calls.len();
        for (call_id, call) in calls {
            let reply = failed_reply(call_id, &call, StatusCode::PEER_VANISH);
            call.complete(reply);
        }
        if count > 0 {
            tracing::debug!("Cancelled {} pending calls of {}", count, session);
        }
        count
    }

    fn expire(&self, call_id: CallId) {
        let Some(mut call) = self.take(call_id) else {
            return;
        };
        // This is the timer task itself
        call.timer = None;
        tracing::debug!("{} timed out", call_id);
        let reply = failed_reply(call_id, &call, StatusCode::TIMEOUT);
        call.complete(reply);
    }

    fn take(&self, call_id: CallId) -> Option<PendingCall> {
        self.inner.calls.lock().remove(&call_id)
    }

    /// Whether a call is still pending
    pub fn contains(&self, call_id: CallId) -> bool {
        self.inner.calls.lock().contains_key(&call_id)
    }

    /// Pending calls of a session, sorted
    pub fn pending_for(&self, session: SessionId) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self
            .inner
            .calls
            .lock()
            .iter()
            .filter(|(_, call)| call.session == session)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of pending calls
    pub fn len(&self) -> usize {
        self.inner.calls.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.calls.lock().is_empty()
    }
}

impl Default for PendingCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn failed_reply(call_id: CallId, call: &PendingCall, status: StatusCode) -> Reply {
    Reply {
        call_id,
        code: call.code,
        kind: call.kind,
        status,
        payload: Bytes::new(),
        topic: None,
        token: call.token,
        description: None,
    }
}
