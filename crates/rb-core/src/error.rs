//! Core error types for relaybus

use rb_protocol::{EventCode, ProtocolError, StatusCode};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for bus endpoints
#[derive(Error, Debug)]
pub enum BusError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Misuse of a reply handle
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// A call completed with a failure status
    #[error("Call failed: {0}")]
    Call(#[from] CallError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Endpoint-level connection errors. Never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No server is bound under the service name
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Address already in use: {0}")]
    AddressInUse(String),

    /// Server refused the handshake
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Already bound")]
    AlreadyBound,

    #[error("Not bound")]
    NotBound,

    /// The bus context was shut down
    #[error("Bus context stopped")]
    ContextStopped,

    /// Connection lost
    #[error("Connection lost: {0}")]
    Lost(String),
}

/// Protocol usage errors raised by reply handles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// A reply was already sent for this request
    #[error("Request {code} was already replied")]
    AlreadyReplied { code: EventCode },

    /// The request was one-way or a subscription
    #[error("Request {code} does not expect a reply")]
    NoReplyExpected { code: EventCode },

    /// The handle was released before replying; an automatic status was sent
    #[error("Request {code} released without reply")]
    ReleasedWithoutReply { code: EventCode },
}

/// Failure outcome of a call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// No reply arrived before the deadline
    #[error("Call {code} timed out")]
    Timeout { code: EventCode },

    /// The session was lost while the call was pending
    #[error("Peer vanished during call {code}")]
    PeerGone { code: EventCode },

    /// The peer answered with a failure status
    #[error("Call {code} failed with {status}{}", describe(.description))]
    Failed {
        code: EventCode,
        status: StatusCode,
        description: Option<String>,
    },
}

impl CallError {
    /// Classify a failure status
    pub fn from_status(code: EventCode, status: StatusCode, description: Option<String>) -> Self {
        match status {
            StatusCode::TIMEOUT => CallError::Timeout { code },
            StatusCode::PEER_VANISH => CallError::PeerGone { code },
            _ => CallError::Failed {
                code,
                status,
                description,
            },
        }
    }

    /// Status code equivalent of this failure
    pub fn status(&self) -> StatusCode {
        match self {
            CallError::Timeout { .. } => StatusCode::TIMEOUT,
            CallError::PeerGone { .. } => StatusCode::PEER_VANISH,
            CallError::Failed { status, .. } => *status,
        }
    }
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
