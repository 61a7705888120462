//! Message types for the relaybus protocol
//!
//! Messages travel inside frames (see `codec.rs`). The frame header carries
//! the call serial, so a reply is correlated with its request by the serial
//! alone and the message bodies stay free of bookkeeping.
//!
//! # Message Flow
//!
//! 1. Client connects and sends `Hello` with the service name it expects
//! 2. Server answers `HelloAck` (refused when the name is wrong or the
//!    server is full)
//! 3. Calls: `Invoke` / `GetEvent` / `Subscribe` with a non-zero serial are
//!    answered by `Reply`, `EventValue` or `Status` carrying the same serial
//! 4. One-way traffic: `Send`, `Publish`, `Unsubscribe`, `Broadcast` use
//!    serial 0

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::selector::SubscribeItem;
use crate::status::StatusCode;

/// Current protocol version string, sent in `Hello`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Application message or event code
pub type EventCode = u32;

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Handshake request (client → server)
    Hello = 0x01,
    /// Handshake answer
    HelloAck = 0x02,
    /// Request expecting a reply
    Invoke = 0x03,
    /// One-way request
    Send = 0x04,
    /// Successful reply to an invoke
    Reply = 0x05,
    /// Status-only reply (failures and acknowledgements)
    Status = 0x06,
    /// Register subscriptions
    Subscribe = 0x07,
    /// Remove subscriptions
    Unsubscribe = 0x08,
    /// Event delivered to a subscriber
    Broadcast = 0x09,
    /// Event published by a client for redistribution
    Publish = 0x0A,
    /// Request for a cached event value
    GetEvent = 0x0B,
    /// Cached event value
    EventValue = 0x0C,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::HelloAck),
            0x03 => Some(Self::Invoke),
            0x04 => Some(Self::Send),
            0x05 => Some(Self::Reply),
            0x06 => Some(Self::Status),
            0x07 => Some(Self::Subscribe),
            0x08 => Some(Self::Unsubscribe),
            0x09 => Some(Self::Broadcast),
            0x0A => Some(Self::Publish),
            0x0B => Some(Self::GetEvent),
            0x0C => Some(Self::EventValue),
            _ => None,
        }
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client handshake.
    ///
    /// `name` is the service name the client dialled; a server bound under a
    /// different name refuses it. Over TCP the name may be empty.
    Hello {
        name: String,
        version: Option<String>,
    },

    /// Handshake answer
    HelloAck {
        accepted: bool,
        /// Reason if not accepted
        reason: Option<String>,
    },

    /// Invocation expecting a reply
    Invoke { code: EventCode, payload: Bytes },

    /// Fire-and-forget request
    Send { code: EventCode, payload: Bytes },

    /// Reply payload for an invocation
    Reply { code: EventCode, payload: Bytes },

    /// Status reply.
    ///
    /// Used for failed invocations, automatic replies and subscribe
    /// acknowledgements.
    Status {
        code: EventCode,
        status: StatusCode,
        description: Option<String>,
    },

    Subscribe { items: Vec<SubscribeItem> },

    Unsubscribe { items: Vec<SubscribeItem> },

    /// Event delivered to a subscriber
    Broadcast {
        code: EventCode,
        topic: Option<String>,
        payload: Bytes,
    },

    /// Client-originated event; the server routes it like its own broadcast
    Publish {
        code: EventCode,
        topic: Option<String>,
        payload: Bytes,
        always_update: bool,
    },

    GetEvent {
        code: EventCode,
        topic: Option<String>,
    },

    /// Answer to `GetEvent`
    EventValue {
        code: EventCode,
        topic: Option<String>,
        payload: Bytes,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::HelloAck { .. } => MessageType::HelloAck,
            Message::Invoke { .. } => MessageType::Invoke,
            Message::Send { .. } => MessageType::Send,
            Message::Reply { .. } => MessageType::Reply,
            Message::Status { .. } => MessageType::Status,
            Message::Subscribe { .. } => MessageType::Subscribe,
            Message::Unsubscribe { .. } => MessageType::Unsubscribe,
            Message::Broadcast { .. } => MessageType::Broadcast,
            Message::Publish { .. } => MessageType::Publish,
            Message::GetEvent { .. } => MessageType::GetEvent,
            Message::EventValue { .. } => MessageType::EventValue,
        }
    }

    /// Create a status message
    pub fn status(code: EventCode, status: StatusCode, description: Option<String>) -> Self {
        Message::Status {
            code,
            status,
            description,
        }
    }
}
