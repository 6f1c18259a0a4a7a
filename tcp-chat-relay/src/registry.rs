use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::Mutex;

use crate::{
    connection::{Connection, ConnectionId},
    error::RegistryError,
};

/// The set of live connections.
///
/// Keyed by id, which is allocated in accept order, so snapshots come out in
/// the order clients connected. The lock is only ever held for a map
/// operation or a copy; no I/O happens under it.
pub struct ConnectionRegistry {
    connections: Mutex<BTreeMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn add(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        if connection.is_closed() {
            return Err(RegistryError::ClosedConnection(connection.id()));
        }

        let mut connections = self.connections.lock().await;
        match connections.entry(connection.id()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateIdentifier(connection.id())),
            Entry::Vacant(slot) => {
                slot.insert(connection);
                Ok(())
            }
        }
    }

    /// Removes `id` and closes the connection.
    ///
    /// Only one caller ever gets `Some` back for a given id; everyone else
    /// sees `None`. Whoever gets the connection owns the follow-up work.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().await.remove(&id)?;
        removed.mark_closed();
        Some(removed)
    }

    /// Point-in-time copy of the registered connections, in accept order.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Removes and closes every connection.
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let drained = std::mem::take(&mut *self.connections.lock().await);
        drained
            .into_values()
            .inspect(|connection| {
                connection.mark_closed();
            })
            .collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
