//! Per-connection read loop.
//!
//! A session registers its connection with the coordinator, decodes inbound
//! frames one at a time and forwards every non-empty message as a broadcast
//! request. It never touches the registry or the blob store itself.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use lanchat_shared::ClientMessage;

use crate::coordinator::CoordinatorHandle;
use crate::error::CoordinatorError;
use crate::registry::ConnectionId;
use crate::transport::{Outbound, Released, SocketTransport};

/// Serve one upgraded WebSocket until it closes, sends garbage or the
/// coordinator drops it.
pub async fn handle_socket(socket: WebSocket, peer: SocketAddr, coordinator: CoordinatorHandle) {
    let (sink, stream) = socket.split();
    let (transport, released) = SocketTransport::new(sink);

    match Session::open(coordinator, peer.ip().to_string(), Box::new(transport)) {
        Ok(session) => session.run(stream, released).await,
        Err(e) => warn!(peer = %peer, error = %e, "Could not register connection"),
    }
}

/// A registered connection. Unregisters itself when dropped, so every exit
/// path out of [`Session::run`] releases the registration exactly once.
pub struct Session {
    conn_id: ConnectionId,
    address: String,
    coordinator: CoordinatorHandle,
}

impl Session {
    pub fn open(
        coordinator: CoordinatorHandle,
        address: String,
        transport: Box<dyn Outbound>,
    ) -> Result<Self, CoordinatorError> {
        let conn_id = ConnectionId::new();
        coordinator.register(conn_id, address.clone(), transport)?;
        Ok(Self {
            conn_id,
            address,
            coordinator,
        })
    }

    /// Read until the peer goes away or `released` fires. Once the
    /// coordinator has released this connection's transport nothing more is
    /// read from it.
    pub async fn run<S>(self, mut inbound: S, released: Released)
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let released = released.wait();
        tokio::pin!(released);

        loop {
            let frame = tokio::select! {
                frame = inbound.next() => frame,
                _ = &mut released => {
                    debug!(conn = %self.conn_id, addr = %self.address, "Transport released, ending session");
                    break;
                }
            };
            let Some(frame) = frame else {
                break;
            };

            let decoded = match frame {
                Ok(Message::Text(text)) => ClientMessage::from_json(text.as_str()),
                Ok(Message::Binary(data)) => ClientMessage::from_slice(&data),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => {
                    debug!(conn = %self.conn_id, addr = %self.address, "Client closed connection");
                    break;
                }
                Err(e) => {
                    warn!(conn = %self.conn_id, addr = %self.address, error = %e, "WebSocket error");
                    break;
                }
            };

            let mut message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    warn!(conn = %self.conn_id, addr = %self.address, error = %e, "Dropping connection");
                    break;
                }
            };

            if message.is_empty() {
                debug!(conn = %self.conn_id, "Ignoring message without text or file");
                continue;
            }
            message.ensure_id();

            if let Err(e) = self.coordinator.submit(message, self.conn_id) {
                warn!(conn = %self.conn_id, error = %e, "Cannot forward message");
                break;
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.coordinator.unregister(self.conn_id).is_err() {
            debug!(conn = %self.conn_id, "Coordinator already stopped");
        }
    }
}
