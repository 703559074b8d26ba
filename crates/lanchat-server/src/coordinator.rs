//! The coordinator: a single task that owns the connection registry and
//! serializes every registration, deregistration and broadcast.
//!
//! Sessions talk to it through a cloneable [`CoordinatorHandle`]. Events are
//! processed strictly one at a time in arrival order, so a broadcast never
//! observes a half-applied registry change and the sender's address is always
//! resolved against the membership at the moment the broadcast runs.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use lanchat_shared::{ClientMessage, RelayMessage};

use crate::blob_store::{BlobStore, FileRecord};
use crate::error::CoordinatorError;
use crate::registry::{Connection, ConnectionId, Registry};
use crate::transport::Outbound;

/// Events consumed by the coordinator task.
pub enum CoordinatorEvent {
    Register {
        conn_id: ConnectionId,
        address: String,
        transport: Box<dyn Outbound>,
    },
    Unregister {
        conn_id: ConnectionId,
    },
    Broadcast {
        message: ClientMessage,
        sender: ConnectionId,
    },
}

/// Cloneable entry point into the coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
    clients: watch::Receiver<usize>,
}

impl CoordinatorHandle {
    pub fn register(
        &self,
        conn_id: ConnectionId,
        address: String,
        transport: Box<dyn Outbound>,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorEvent::Register {
            conn_id,
            address,
            transport,
        })
    }

    /// Never blocks, so it is safe to call from `Drop`.
    pub fn unregister(&self, conn_id: ConnectionId) -> Result<(), CoordinatorError> {
        self.send(CoordinatorEvent::Unregister { conn_id })
    }

    pub fn submit(
        &self,
        message: ClientMessage,
        sender: ConnectionId,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorEvent::Broadcast { message, sender })
    }

    /// Number of currently registered connections.
    pub fn client_count(&self) -> usize {
        *self.clients.borrow()
    }

    fn send(&self, event: CoordinatorEvent) -> Result<(), CoordinatorError> {
        self.tx.send(event).map_err(|_| CoordinatorError::Stopped)
    }
}

/// Start the coordinator task. It runs until every handle has been dropped.
pub fn spawn(store: BlobStore) -> CoordinatorHandle {
    let (tx, events) = mpsc::unbounded_channel();
    let (clients_tx, clients) = watch::channel(0);

    let coordinator = Coordinator {
        registry: Registry::new(),
        store,
        events,
        clients: clients_tx,
    };
    tokio::spawn(coordinator.run());

    CoordinatorHandle { tx, clients }
}

struct Coordinator {
    registry: Registry,
    store: BlobStore,
    events: mpsc::UnboundedReceiver<CoordinatorEvent>,
    clients: watch::Sender<usize>,
}

impl Coordinator {
    async fn run(mut self) {
        debug!("Coordinator started");
        while let Some(event) = self.events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Coordinator stopped, all handles dropped");
    }

    async fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Register {
                conn_id,
                address,
                transport,
            } => self.on_register(conn_id, address, transport).await,
            CoordinatorEvent::Unregister { conn_id } => self.on_unregister(conn_id).await,
            CoordinatorEvent::Broadcast { message, sender } => {
                self.on_broadcast(message, sender).await
            }
        }
    }

    async fn on_register(
        &mut self,
        conn_id: ConnectionId,
        address: String,
        transport: Box<dyn Outbound>,
    ) {
        match self.registry.register(conn_id, address.clone(), transport) {
            Ok(()) => {
                self.publish_count();
                info!(
                    conn = %conn_id,
                    addr = %address,
                    total = self.registry.len(),
                    "Client connected"
                );
            }
            Err(rejected) => self.release(rejected).await,
        }
    }

    async fn on_unregister(&mut self, conn_id: ConnectionId) {
        match self.registry.unregister(&conn_id) {
            Some(connection) => {
                let address = connection.address.clone();
                self.release(connection).await;
                info!(
                    conn = %conn_id,
                    addr = %address,
                    total = self.registry.len(),
                    "Client disconnected"
                );
            }
            None => debug!(conn = %conn_id, "Unregister for unknown connection ignored"),
        }
    }

    async fn on_broadcast(&mut self, message: ClientMessage, sender: ConnectionId) {
        let sender_ip = self.registry.address(&sender).unwrap_or_default().to_string();
        let outbound = prepare(&self.store, message, sender_ip).await;
        self.fan_out(&outbound).await;
    }

    /// Deliver to every registered connection. A connection whose write
    /// fails is dropped on the spot; delivery to the rest continues.
    async fn fan_out(&mut self, message: &RelayMessage) {
        for conn_id in self.registry.ids() {
            let Some(transport) = self.registry.transport_mut(&conn_id) else {
                continue;
            };

            if let Err(e) = transport.send_message(message).await {
                warn!(conn = %conn_id, error = %e, "Error writing message, dropping client");
                if let Some(connection) = self.registry.unregister(&conn_id) {
                    self.release(connection).await;
                }
            }
        }
    }

    async fn release(&mut self, mut connection: Connection) {
        connection.transport.close().await;
        self.publish_count();
    }

    fn publish_count(&self) {
        self.clients.send_replace(self.registry.len());
    }
}

/// Tag the message with its sender, store any attached content and replace
/// the attachment with a content-free reference.
async fn prepare(store: &BlobStore, message: ClientMessage, sender_ip: String) -> RelayMessage {
    let ClientMessage { id, text, file } = message;

    let file = match file {
        None => None,
        Some(upload) if id.is_empty() => {
            let file_id = upload.id.clone();
            Some(upload.to_reference(file_id))
        }
        Some(upload) => {
            let file_id = upload.resolve_id(&id).to_string();
            let reference = upload.to_reference(file_id.clone());

            if upload.has_content() {
                let content_len = upload.content.len();
                store.set(&file_id, FileRecord::from(upload)).await;
                info!(
                    file_id = %file_id,
                    name = %reference.name,
                    content_len,
                    "Stored file during broadcast"
                );
            } else if let Some(existing) = store.get(&file_id).await {
                debug!(
                    file_id = %file_id,
                    name = %existing.name,
                    content_len = existing.content.len(),
                    "File already exists in store"
                );
            } else {
                warn!(
                    file_id = %file_id,
                    "File not found in store and no content provided"
                );
            }

            Some(reference)
        }
    };

    RelayMessage {
        id,
        text,
        sender_ip,
        file,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use lanchat_shared::FileUpload;

    use super::*;
    use crate::transport::testing::{channel_transport, ChannelPeer};

    async fn next(peer: &mut ChannelPeer) -> RelayMessage {
        tokio::time::timeout(Duration::from_secs(1), peer.rx.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("transport dropped")
    }

    fn connect(handle: &CoordinatorHandle, address: &str) -> (ConnectionId, ChannelPeer) {
        let conn_id = ConnectionId::new();
        let (transport, peer) = channel_transport();
        handle
            .register(conn_id, address.to_string(), Box::new(transport))
            .unwrap();
        (conn_id, peer)
    }

    async fn wait_for_clients(handle: &CoordinatorHandle, n: usize) {
        let mut clients = handle.clients.clone();
        tokio::time::timeout(Duration::from_secs(1), clients.wait_for(|count| *count == n))
            .await
            .expect("timed out waiting for client count")
            .unwrap();
    }

    fn text(id: &str, body: &str) -> ClientMessage {
        ClientMessage {
            id: id.into(),
            text: body.into(),
            file: None,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_with_sender_address() {
        let handle = spawn(BlobStore::new());
        let (a, mut peer_a) = connect(&handle, "192.168.1.10");
        let (_b, mut peer_b) = connect(&handle, "192.168.1.11");

        handle.submit(text("m1", "hello"), a).unwrap();

        for peer in [&mut peer_a, &mut peer_b] {
            let got = next(peer).await;
            assert_eq!(got.id, "m1");
            assert_eq!(got.text, "hello");
            assert_eq!(got.sender_ip, "192.168.1.10");
        }
        assert_eq!(handle.client_count(), 2);
    }

    #[tokio::test]
    async fn test_upload_via_message_is_stored_and_stripped() {
        let store = BlobStore::new();
        let handle = spawn(store.clone());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");
        let (_b, mut peer_b) = connect(&handle, "10.0.0.2");

        let message = ClientMessage {
            id: "m1".into(),
            text: String::new(),
            file: Some(FileUpload {
                name: "pic.png".into(),
                size: 10,
                content: Bytes::from_static(b"0123456789"),
                ..Default::default()
            }),
        };
        handle.submit(message, a).unwrap();

        for peer in [&mut peer_a, &mut peer_b] {
            let got = next(peer).await;
            assert!(!got.to_json().unwrap().contains("content"));
            let file = got.file.unwrap();
            assert_eq!(file.id, "m1");
            assert_eq!(file.name, "pic.png");
            assert_eq!(file.size, 10);
        }

        let stored = store.get("m1").await.unwrap();
        assert_eq!(stored.content.as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn test_reannounce_does_not_touch_store() {
        let store = BlobStore::new();
        let handle = spawn(store.clone());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");
        let (b, mut peer_b) = connect(&handle, "10.0.0.2");

        let upload = ClientMessage {
            id: "m1".into(),
            text: String::new(),
            file: Some(FileUpload {
                name: "pic.png".into(),
                size: 10,
                content: Bytes::from_static(b"0123456789"),
                ..Default::default()
            }),
        };
        handle.submit(upload, a).unwrap();

        let reannounce = ClientMessage {
            id: "m2".into(),
            text: String::new(),
            file: Some(FileUpload {
                id: "m1".into(),
                name: "pic.png".into(),
                size: 10,
                ..Default::default()
            }),
        };
        handle.submit(reannounce, b).unwrap();

        next(&mut peer_a).await;
        let got = next(&mut peer_a).await;
        assert_eq!(got.id, "m2");
        assert_eq!(got.sender_ip, "10.0.0.2");
        assert_eq!(got.file.unwrap().id, "m1");
        next(&mut peer_b).await;
        next(&mut peer_b).await;

        assert_eq!(store.file_count().await, 1);
        assert_eq!(
            store.get("m1").await.unwrap().content.as_ref(),
            b"0123456789"
        );
    }

    #[tokio::test]
    async fn test_unknown_file_reference_still_broadcast() {
        let store = BlobStore::new();
        let handle = spawn(store.clone());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");

        let message = ClientMessage {
            id: "m9".into(),
            text: "look".into(),
            file: Some(FileUpload {
                id: "ghost".into(),
                name: "ghost.bin".into(),
                ..Default::default()
            }),
        };
        handle.submit(message, a).unwrap();

        let got = next(&mut peer_a).await;
        assert_eq!(got.file.unwrap().id, "ghost");
        assert!(store.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_recipient_is_dropped_and_others_still_receive() {
        let handle = spawn(BlobStore::new());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");
        let (_b, peer_b) = connect(&handle, "10.0.0.2");
        let (_c, mut peer_c) = connect(&handle, "10.0.0.3");
        wait_for_clients(&handle, 3).await;

        drop(peer_b);
        handle.submit(text("m1", "first"), a).unwrap();

        assert_eq!(next(&mut peer_a).await.id, "m1");
        assert_eq!(next(&mut peer_c).await.id, "m1");
        wait_for_clients(&handle, 2).await;

        handle.submit(text("m2", "second"), a).unwrap();
        assert_eq!(next(&mut peer_a).await.id, "m2");
        assert_eq!(next(&mut peer_c).await.id, "m2");
        assert_eq!(handle.client_count(), 2);
    }

    #[tokio::test]
    async fn test_unregister_releases_transport_once() {
        let handle = spawn(BlobStore::new());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");
        wait_for_clients(&handle, 1).await;

        handle.unregister(a).unwrap();
        handle.unregister(a).unwrap();
        wait_for_clients(&handle, 0).await;

        // Transport released and dropped, so the peer sees end of stream.
        assert!(peer_a.rx.recv().await.is_none());
        assert!(peer_a.was_closed());
    }

    #[tokio::test]
    async fn test_vanished_sender_gets_empty_address() {
        let handle = spawn(BlobStore::new());
        let (_a, mut peer_a) = connect(&handle, "10.0.0.1");

        handle.submit(text("m1", "orphan"), ConnectionId::new()).unwrap();

        let got = next(&mut peer_a).await;
        assert_eq!(got.text, "orphan");
        assert!(got.sender_ip.is_empty());
    }

    #[tokio::test]
    async fn test_colliding_message_ids_are_not_deduplicated() {
        let handle = spawn(BlobStore::new());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");
        let (b, _peer_b) = connect(&handle, "10.0.0.2");

        handle.submit(text("same", "from a"), a).unwrap();
        handle.submit(text("same", "from b"), b).unwrap();

        assert_eq!(next(&mut peer_a).await.text, "from a");
        assert_eq!(next(&mut peer_a).await.text, "from b");
    }

    #[tokio::test]
    async fn test_contentless_reference_leaves_store_untouched() {
        let store = BlobStore::new();
        let handle = spawn(store.clone());
        let (a, mut peer_a) = connect(&handle, "10.0.0.1");

        store
            .set(
                "f1",
                FileRecord {
                    name: "a.txt".into(),
                    size: 1,
                    media_type: String::new(),
                    content: Bytes::from_static(b"X"),
                },
            )
            .await;

        let message = ClientMessage {
            id: "m5".into(),
            text: String::new(),
            file: Some(FileUpload {
                id: "f1".into(),
                name: "b.txt".into(),
                ..Default::default()
            }),
        };
        handle.submit(message, a).unwrap();

        assert_eq!(next(&mut peer_a).await.file.unwrap().name, "b.txt");
        let stored = store.get("f1").await.unwrap();
        assert_eq!(stored.name, "a.txt");
        assert_eq!(stored.content.as_ref(), b"X");
    }

    #[tokio::test]
    async fn test_stopped_coordinator_reports_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_clients_tx, clients) = watch::channel(0);
        drop(rx);
        let handle = CoordinatorHandle { tx, clients };

        assert!(matches!(
            handle.submit(text("m1", "x"), ConnectionId::new()),
            Err(CoordinatorError::Stopped)
        ));
    }
}
