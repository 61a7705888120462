//! Outbound side of a session

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rb_protocol::Frame;

/// Outbound frame queue and close signal of one session.
///
/// Cloning is cheap; every clone feeds the same writer task.
#[derive(Debug, Clone)]
pub struct SessionLink {
    tx: mpsc::UnboundedSender<Frame>,
    closed: CancellationToken,
}

impl SessionLink {
    /// Create a link and the receiver its writer task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Queue a frame for the writer task.
    ///
    /// Returns false once the link is closed or the writer has gone away.
    pub fn send(&self, frame: Frame) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.tx.send(frame).is_ok()
    }

    /// Ask the connection tasks to stop
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Token cancelled when the link closes
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_protocol::{Message, StatusCode};

    #[tokio::test]
    async fn test_send_and_close() {
        let (link, mut rx) = SessionLink::new();
        assert!(link.send(Frame::one_way(Message::status(1, StatusCode::OK, None))));
        assert!(rx.recv().await.is_some());

        link.close();
        assert!(link.is_closed());
        assert!(!link.send(Frame::one_way(Message::status(1, StatusCode::OK, None))));
    }

    #[test]
    fn test_dropped_receiver_closes_link() {
        let (link, rx) = SessionLink::new();
        drop(rx);
        assert!(link.is_closed());
        assert!(!link.send(Frame::one_way(Message::status(1, StatusCode::OK, None))));
    }
}
