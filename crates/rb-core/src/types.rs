//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConnectionError;

/// URL scheme of in-process services
pub const SERVICE_SCHEME: &str = "svc://";

/// URL scheme of TCP endpoints
pub const TCP_SCHEME: &str = "tcp://";

/// Endpoint address
///
/// `svc://<name>` resolves through the bus context's service registry;
/// `tcp://<host>:<port>` dials or listens on a socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Address {
    /// In-process service name
    Service(String),
    /// TCP `host:port`
    Tcp(String),
}

impl Address {
    /// Create an in-process service address
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service(name.into())
    }

    /// Name sent in the handshake; empty for TCP
    pub fn service_name(&self) -> &str {
        match self {
            Address::Service(name) => name,
            Address::Tcp(_) => "",
        }
    }
}

impl FromStr for Address {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix(SERVICE_SCHEME) {
            if name.is_empty() || name.contains('/') {
                return Err(ConnectionError::InvalidAddress(s.to_string()));
            }
            return Ok(Address::Service(name.to_string()));
        }

        if let Some(hostport) = s.strip_prefix(TCP_SCHEME) {
            match hostport.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    return Ok(Address::Tcp(hostport.to_string()));
                }
                _ => return Err(ConnectionError::InvalidAddress(s.to_string())),
            }
        }

        Err(ConnectionError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Service(name) => write!(f, "{}{}", SERVICE_SCHEME, name),
            Address::Tcp(hostport) => write!(f, "{}{}", TCP_SCHEME, hostport),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = ConnectionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}
