//! Framed connection helpers: handshake and writer task

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rb_core::ConnectionError;
use rb_protocol::{Frame, FrameCodec, Message, ProtocolError, PROTOCOL_VERSION};

use super::BoxedStream;

pub(crate) type FramedStream = Framed<BoxedStream, FrameCodec>;

/// Send `Hello` and wait for the server's answer
pub(crate) async fn client_handshake(
    framed: &mut FramedStream,
    name: &str,
    timeout: Duration,
) -> Result<(), ConnectionError> {
    framed
        .send(Frame::one_way(Message::Hello {
            name: name.to_string(),
            version: Some(PROTOCOL_VERSION.to_string()),
        }))
        .await
        .map_err(|e| ConnectionError::Lost(e.to_string()))?;

    let answer = tokio::time::timeout(timeout, framed.next())
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)?;

    match answer {
        Some(Ok(Frame {
            message: Message::HelloAck { accepted: true, .. },
            ..
        })) => Ok(()),
        Some(Ok(Frame {
            message: Message::HelloAck {
                accepted: false,
                reason,
            },
            ..
        })) => Err(ConnectionError::Refused(
            reason.unwrap_or_else(|| "no reason given".to_string()),
        )),
        Some(Ok(frame)) => Err(ConnectionError::Lost(format!(
            "unexpected {:?} during handshake",
            frame.message.message_type()
        ))),
        Some(Err(e)) => Err(ConnectionError::Lost(e.to_string())),
        None => Err(ConnectionError::Lost("closed during handshake".to_string())),
    }
}

/// Wait for the client's `Hello`; returns the service name it dialled
pub(crate) async fn read_hello(
    framed: &mut FramedStream,
    timeout: Duration,
) -> Result<String, ConnectionError> {
    let hello = tokio::time::timeout(timeout, framed.next())
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)?;

    match hello {
        Some(Ok(Frame {
            message: Message::Hello { name, version },
            ..
        })) => {
            if version.as_deref() != Some(PROTOCOL_VERSION) {
                tracing::debug!("Client speaks protocol {:?}", version);
            }
            Ok(name)
        }
        Some(Ok(frame)) => Err(ConnectionError::Lost(format!(
            "expected Hello, got {:?}",
            frame.message.message_type()
        ))),
        Some(Err(e)) => Err(ConnectionError::Lost(e.to_string())),
        None => Err(ConnectionError::Lost("closed during handshake".to_string())),
    }
}

/// Answer a client's `Hello`
pub(crate) async fn send_hello_ack(
    framed: &mut FramedStream,
    accepted: bool,
    reason: Option<String>,
) -> Result<(), ConnectionError> {
    framed
        .send(Frame::one_way(Message::HelloAck { accepted, reason }))
        .await
        .map_err(|e| ConnectionError::Lost(e.to_string()))
}

/// Drain a session's outbound queue into the sink until the link closes.
///
/// Frames queued before the close are still flushed, then the write side is
/// shut down so the peer sees end of stream.
pub(crate) fn spawn_writer(
    mut sink: SplitSink<FramedStream, Frame>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    closed: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    match sink.send(frame).await {
                        Ok(()) => {}
                        Err(ProtocolError::Io(e)) => {
                            tracing::warn!("Failed to write frame: {}", e);
                            closed.cancel();
                            return;
                        }
                        Err(e) => tracing::warn!("Skipping unencodable frame: {}", e),
                    }
                }
                _ = closed.cancelled() => break,
            }
        }

        while let Ok(frame) = outbound.try_recv() {
            match sink.feed(frame).await {
                Ok(()) => {}
                Err(ProtocolError::Io(_)) => break,
                Err(e) => tracing::warn!("Skipping unencodable frame: {}", e),
            }
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("Error closing connection: {}", e);
        }
    })
}
