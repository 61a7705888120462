//! Call status codes
//!
//! Zero means success. Negative values are failures, except the `*_OK`
//! acknowledgements the engine generates on behalf of a handler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status carried by a reply or status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);
    /// Handler released the request without replying
    pub const AUTO_REPLY_OK: StatusCode = StatusCode(-11);
    pub const SUBSCRIBE_OK: StatusCode = StatusCode(-12);
    pub const SUBSCRIBE_FAIL: StatusCode = StatusCode(-13);
    pub const UNSUBSCRIBE_OK: StatusCode = StatusCode(-14);
    pub const UNSUBSCRIBE_FAIL: StatusCode = StatusCode(-15);
    /// No reply within the caller's deadline
    pub const TIMEOUT: StatusCode = StatusCode(-16);
    pub const INVALID_ID: StatusCode = StatusCode(-17);
    /// Session dropped while the call was pending
    pub const PEER_VANISH: StatusCode = StatusCode(-18);
    pub const UNABLE_TO_SEND: StatusCode = StatusCode(-20);
    pub const NON_EXIST: StatusCode = StatusCode(-21);
    pub const MSG_DECODE_FAIL: StatusCode = StatusCode(-23);
    pub const BAD_PARAMETER: StatusCode = StatusCode(-24);
    pub const NOT_AVAILABLE: StatusCode = StatusCode(-25);
    pub const INTERNAL_FAIL: StatusCode = StatusCode(-26);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(-28);

    /// Get the raw status value
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Whether the status reports success
    pub fn is_ok(&self) -> bool {
        matches!(
            *self,
            Self::OK | Self::AUTO_REPLY_OK | Self::SUBSCRIBE_OK | Self::UNSUBSCRIBE_OK
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match *self {
            Self::OK => "ok",
            Self::AUTO_REPLY_OK => "auto-reply-ok",
            Self::SUBSCRIBE_OK => "subscribe-ok",
            Self::SUBSCRIBE_FAIL => "subscribe-fail",
            Self::UNSUBSCRIBE_OK => "unsubscribe-ok",
            Self::UNSUBSCRIBE_FAIL => "unsubscribe-fail",
            Self::TIMEOUT => "timeout",
            Self::INVALID_ID => "invalid-id",
            Self::PEER_VANISH => "peer-vanish",
            Self::UNABLE_TO_SEND => "unable-to-send",
            Self::NON_EXIST => "non-exist",
            Self::MSG_DECODE_FAIL => "msg-decode-fail",
            Self::BAD_PARAMETER => "bad-parameter",
            Self::NOT_AVAILABLE => "not-available",
            Self::INTERNAL_FAIL => "internal-fail",
            Self::NOT_IMPLEMENTED => "not-implemented",
            _ => "unknown",
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::OK
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl From<i32> for StatusCode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
