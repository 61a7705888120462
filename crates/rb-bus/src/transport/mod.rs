//! Transport layer
//!
//! Turns an [`Address`] into a byte stream. `svc://` names are resolved
//! through the [`BusContext`] and carried over in-memory duplex pipes;
//! `tcp://` addresses use sockets. Both carry the same framed protocol.

mod connection;

pub(crate) use connection::{
    client_handshake, read_hello, send_hello_ack, spawn_writer, FramedStream,
};

use std::io;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use rb_core::{Address, BusError, ConnectionError};

use crate::context::BusContext;

/// Byte stream a connection runs over
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

/// Open a stream to a server. Returns the stream and a peer label for logs.
pub async fn connect(ctx: &BusContext, address: &Address) -> Result<(BoxedStream, String), BusError> {
    ctx.ensure_running()?;
    match address {
        Address::Service(name) => {
            let stream = ctx.dial(name).await?;
            Ok((Box::new(stream) as BoxedStream, address.to_string()))
        }
        Address::Tcp(hostport) => {
            let stream = tokio::net::TcpStream::connect(hostport.as_str())
                .await
                .map_err(|e| ConnectionError::Refused(format!("{}: {}", hostport, e)))?;
            stream.set_nodelay(true)?;
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| hostport.clone());
            Ok((Box::new(stream) as BoxedStream, peer))
        }
    }
}

/// Accepting side of an address
pub enum Listener {
    Service {
        name: String,
        incoming: mpsc::Receiver<DuplexStream>,
    },
    Tcp(TcpListener),
}

impl Listener {
    /// Start listening on an address
    pub async fn bind(ctx: &BusContext, address: &Address, backlog: usize) -> Result<Self, BusError> {
        ctx.ensure_running()?;
        match address {
            Address::Service(name) => {
                let incoming = ctx.register(name, backlog)?;
                Ok(Listener::Service {
                    name: name.clone(),
                    incoming,
                })
            }
            Address::Tcp(hostport) => {
                let listener = TcpListener::bind(hostport.as_str()).await.map_err(|e| {
                    if e.kind() == io::ErrorKind::AddrInUse {
                        BusError::from(ConnectionError::AddressInUse(address.to_string()))
                    } else {
                        BusError::from(e)
                    }
                })?;
                Ok(Listener::Tcp(listener))
            }
        }
    }

    /// Address clients can reach this listener at.
    ///
    /// For TCP this reports the port actually bound, so `tcp://host:0`
    /// resolves to a concrete port.
    pub fn local_address(&self) -> io::Result<Address> {
        match self {
            Listener::Service { name, .. } => Ok(Address::Service(name.clone())),
            Listener::Tcp(listener) => Ok(Address::Tcp(listener.local_addr()?.to_string())),
        }
    }

    /// Accept the next connection. `None` once the listener is closed.
    pub async fn accept(&mut self) -> Option<io::Result<(BoxedStream, String)>> {
        match self {
            Listener::Service { name, incoming } => {
                let stream = incoming.recv().await?;
                Some(Ok((Box::new(stream) as BoxedStream, format!("svc://{}", name))))
            }
            Listener::Tcp(listener) => Some(listener.accept().await.and_then(|(stream, peer)| {
                stream.set_nodelay(true)?;
                Ok((Box::new(stream) as BoxedStream, peer.to_string()))
            })),
        }
    }
}
