//! Connection registry.
//!
//! Maps each live connection to its transport and remote address. Owned by
//! the coordinator task and never shared, so it needs no lock.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::Outbound;

/// Handle identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered connection.
pub struct Connection {
    pub address: String,
    pub transport: Box<dyn Outbound>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly connected client.
    ///
    /// Ids are unique per connection; a duplicate is refused and the rejected
    /// connection is handed back so the caller can release it.
    pub fn register(
        &mut self,
        id: ConnectionId,
        address: String,
        transport: Box<dyn Outbound>,
    ) -> Result<(), Connection> {
        let connection = Connection { address, transport };
        if self.connections.contains_key(&id) {
            warn!(conn = %id, "Connection id already registered");
            return Err(connection);
        }
        debug!(conn = %id, addr = %connection.address, "Tracking new connection");
        self.connections.insert(id, connection);
        Ok(())
    }

    /// Remove a connection, returning it so its transport can be released.
    pub fn unregister(&mut self, id: &ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(id);
        if removed.is_some() {
            debug!(conn = %id, "Removed connection from registry");
        }
        removed
    }

    pub fn address(&self, id: &ConnectionId) -> Option<&str> {
        self.connections.get(id).map(|c| c.address.as_str())
    }

    /// Snapshot of the current membership, in iteration order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn transport_mut(&mut self, id: &ConnectionId) -> Option<&mut (dyn Outbound + 'static)> {
        self.connections.get_mut(id).map(|c| c.transport.as_mut())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}
