//! Outbound half of a client connection.
//!
//! The registry owns one boxed [`Outbound`] per live connection and only the
//! coordinator ever writes to it.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::watch;

use lanchat_shared::RelayMessage;

use crate::error::TransportError;

#[async_trait]
pub trait Outbound: Send {
    /// Deliver one message. Any error means the connection is unusable.
    async fn send_message(&mut self, message: &RelayMessage) -> Result<(), TransportError>;

    /// Release the transport. Errors are ignored; the peer may already be gone.
    async fn close(&mut self);
}

/// Resolves once the transport it was created with is closed or dropped.
///
/// The read half of a connection waits on this so that a connection the
/// coordinator gave up on stops submitting messages too.
#[derive(Clone)]
pub struct Released(watch::Receiver<bool>);

impl Released {
    fn pair() -> (watch::Sender<bool>, Released) {
        let (tx, rx) = watch::channel(false);
        (tx, Released(rx))
    }

    pub async fn wait(mut self) {
        // Err means the sender is gone, which counts as released.
        let _ = self.0.wait_for(|released| *released).await;
    }
}

/// Write half of an upgraded WebSocket.
pub struct SocketTransport {
    sink: SplitSink<WebSocket, Message>,
    released: watch::Sender<bool>,
}

impl SocketTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> (Self, Released) {
        let (released, signal) = Released::pair();
        (Self { sink, released }, signal)
    }
}

#[async_trait]
impl Outbound for SocketTransport {
    async fn send_message(&mut self, message: &RelayMessage) -> Result<(), TransportError> {
        let json = message.to_json()?;
        self.sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::Closed(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
        self.released.send_replace(true);
    }
}

#[cfg(test)]
pub mod testing {
    //! Channel-backed transport for tests. Dropping the receiver makes every
    //! subsequent send fail, the same way a closed socket would.

    use tokio::sync::mpsc;

    use super::*;

    pub struct ChannelTransport {
        tx: mpsc::UnboundedSender<RelayMessage>,
        released: watch::Sender<bool>,
    }

    pub struct ChannelPeer {
        pub rx: mpsc::UnboundedReceiver<RelayMessage>,
        released: Released,
    }

    impl ChannelPeer {
        pub fn was_closed(&self) -> bool {
            *self.released.0.borrow()
        }

        pub fn released(&self) -> Released {
            self.released.clone()
        }
    }

    pub fn channel_transport() -> (ChannelTransport, ChannelPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (released, signal) = Released::pair();
        (
            ChannelTransport { tx, released },
            ChannelPeer {
                rx,
                released: signal,
            },
        )
    }

    #[async_trait]
    impl Outbound for ChannelTransport {
        async fn send_message(&mut self, message: &RelayMessage) -> Result<(), TransportError> {
            self.tx
                .send(message.clone())
                .map_err(|_| TransportError::Closed("receiver dropped".into()))
        }

        async fn close(&mut self) {
            self.released.send_replace(true);
        }
    }
}
