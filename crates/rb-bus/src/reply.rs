//! Reply handles
//!
//! A server handler receives a [`ReplyHandle`] with every invoke, send and
//! subscribe. The handle is released exactly once: explicitly through
//! [`ReplyHandle::destroy`], or when it is dropped. Releasing an invoke that
//! was never answered sends `AUTO_REPLY_OK` so the caller is not left
//! waiting; releasing a subscribe handle sends the subscribe
//! acknowledgement.

use bytes::Bytes;
use std::sync::Arc;

use rb_core::UsageError;
use rb_protocol::{normalize_topic, CallId, EventCode, Frame, Message, SessionId, StatusCode};

use crate::session::SessionLink;
use crate::subscription::SubscriptionRegistry;

/// What the peer expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Exactly one reply
    Invoke,
    /// Nothing
    OneWay,
    /// Initial values, then an acknowledgement on release
    Subscribe,
}

/// Single-use capability to answer one request
pub struct ReplyHandle {
    session: SessionId,
    serial: CallId,
    code: EventCode,
    kind: ReplyKind,
    link: SessionLink,
    subscriptions: Arc<SubscriptionRegistry>,
    used: bool,
    released: bool,
}

impl ReplyHandle {
    pub(crate) fn new(
        session: SessionId,
        serial: CallId,
        code: EventCode,
        kind: ReplyKind,
        link: SessionLink,
        subscriptions: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            session,
            serial,
            code,
            kind,
            link,
            subscriptions,
            used: false,
            released: false,
        }
    }

    /// Session the request came from
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn code(&self) -> EventCode {
        self.code
    }

    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// Whether the caller waits for a reply
    pub fn expects_reply(&self) -> bool {
        self.kind == ReplyKind::Invoke
    }

    /// Whether the invoke has been answered
    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Answer the invoke with a payload
    pub fn reply(&mut self, payload: Bytes) -> Result<(), UsageError> {
        self.claim_reply()?;
        self.send(Message::Reply {
            code: self.code,
            payload,
        });
        Ok(())
    }

    /// Answer the invoke with a failure status
    pub fn fail(
        &mut self,
        status: StatusCode,
        description: Option<String>,
    ) -> Result<(), UsageError> {
        self.claim_reply()?;
        self.send(Message::status(self.code, status, description));
        Ok(())
    }

    /// Send an event to the requesting session only.
    ///
    /// Returns `Ok(false)` when the session is not subscribed to it or the
    /// event is too large for a frame. The event travels as its own message,
    /// so an invoke keeps its reply slot: releasing it unanswered still
    /// sends `AUTO_REPLY_OK`.
    pub fn broadcast(
        &mut self,
        code: EventCode,
        topic: Option<&str>,
        payload: Bytes,
    ) -> Result<bool, UsageError> {
        if !self.subscriptions.is_subscribed(self.session, code, topic) {
            tracing::debug!("{} is not subscribed to {}", self.session, code);
            return Ok(false);
        }

        let frame = Frame::one_way(Message::Broadcast {
            code,
            topic: normalize_topic(topic),
            payload,
        });
        if let Err(e) = frame.check_size() {
            tracing::warn!("Not broadcasting {} to {}: {}", code, self.session, e);
            return Ok(false);
        }
        Ok(self.link.send(frame))
    }

    /// Release the handle.
    ///
    /// Returns `ReleasedWithoutReply` when an invoke was never answered; the
    /// caller has already been sent `AUTO_REPLY_OK` in that case.
    pub fn destroy(mut self) -> Result<(), UsageError> {
        self.release()
    }

    fn claim_reply(&mut self) -> Result<(), UsageError> {
        match self.kind {
            ReplyKind::Invoke if self.used => Err(UsageError::AlreadyReplied { code: self.code }),
            ReplyKind::Invoke => {
                self.used = true;
                Ok(())
            }
            ReplyKind::OneWay | ReplyKind::Subscribe => {
                Err(UsageError::NoReplyExpected { code: self.code })
            }
        }
    }

    fn release(&mut self) -> Result<(), UsageError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match self.kind {
            ReplyKind::Invoke if !self.used => {
                self.used = true;
                self.send(Message::status(self.code, StatusCode::AUTO_REPLY_OK, None));
                Err(UsageError::ReleasedWithoutReply { code: self.code })
            }
            ReplyKind::Subscribe if self.serial.expects_reply() => {
                self.send(Message::status(self.code, StatusCode::SUBSCRIBE_OK, None));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn send(&self, message: Message) {
        let mut frame = Frame::new(self.serial, message);
        if let Err(e) = frame.check_size() {
            tracing::warn!("Answer to {} from {} dropped: {}", self.code, self.session, e);
            frame = Frame::new(
                self.serial,
                Message::status(self.code, StatusCode::BAD_PARAMETER, Some(e.to_string())),
            );
        }
        if !self.link.send(frame) {
            tracing::debug!(
                "Dropping answer to {} for closed {}",
                self.code,
                self.session
            );
        }
    }
}

impl Drop for ReplyHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("{} from {}", e, self.session);
        }
    }
}

impl std::fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("session", &self.session)
            .field("serial", &self.serial)
            .field("code", &self.code)
            .field("kind", &self.kind)
            .field("used", &self.used)
            .finish()
    }
}
