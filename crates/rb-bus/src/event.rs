//! Delivered events

use bytes::Bytes;

use rb_protocol::EventCode;

/// An event as delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: EventCode,
    /// Topic the event was published under, if any
    pub topic: Option<String>,
    pub payload: Bytes,
}

impl Event {
    /// Create a new event
    pub fn new(code: EventCode, topic: Option<String>, payload: Bytes) -> Self {
        Self {
            code,
            topic,
            payload,
        }
    }
}
