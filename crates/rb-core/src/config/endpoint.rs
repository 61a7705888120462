//! Endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Settings shared by client and server endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Timeout applied to sync calls issued without one
    #[serde(with = "duration_millis")]
    pub default_timeout: Duration,

    /// How long a client waits for the server's handshake answer
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,

    /// Maximum number of concurrent sessions a server accepts
    pub max_sessions: Option<u32>,

    /// Whether a server starts with its event cache enabled
    pub event_cache: bool,

    /// Pending in-process connections a service may queue
    pub service_backlog: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(5000),
            handshake_timeout: Duration::from_millis(3000),
            max_sessions: None,
            event_cache: false,
            service_backlog: 64,
        }
    }
}

impl EndpointConfig {
    /// Whether another session may be admitted given the current count
    pub fn admits(&self, open_sessions: usize) -> bool {
        match self.max_sessions {
            Some(max) => open_sessions < max as usize,
            None => true,
        }
    }
}
