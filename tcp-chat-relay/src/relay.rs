use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    connection::{Connection, ConnectionId},
    message::Message,
    registry::ConnectionRegistry,
};

/// Outcome of one broadcast call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients whose write succeeded, in accept order.
    pub delivered: Vec<ConnectionId>,
    /// Recipients this call removed after their write failed. A recipient
    /// that failed but was already removed elsewhere appears in neither list.
    pub dropped: Vec<ConnectionId>,
}

/// Fans payloads out to every registered connection but the sender.
///
/// Broadcasting is best effort. A recipient that cannot be written to is
/// removed and announced as gone; it never fails the broadcast for anyone
/// else.
#[derive(Clone)]
pub struct BroadcastRelay {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Option<Duration>,
}

impl BroadcastRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            write_timeout: None,
        }
    }

    /// Bounds every delivery attempt; a write that takes longer counts as failed.
    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = Some(limit);
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Relays `payload` from `sender` to everyone else.
    ///
    /// The sender does not need to be registered any more.
    pub async fn broadcast(&self, sender: ConnectionId, payload: &[u8]) -> BroadcastReport {
        self.dispatch(Message::chat(sender, payload)).await
    }

    pub async fn announce_join(&self, connection: &Connection) -> BroadcastReport {
        self.dispatch(Message::join(connection.id(), connection.peer_addr()))
            .await
    }

    /// Tells everyone else that `connection` is gone, using its own address.
    pub async fn announce_leave(&self, connection: &Connection) -> BroadcastReport {
        self.dispatch(Message::leave(connection.id(), connection.peer_addr()))
            .await
    }

    /// Handles a client going away. Returns `false` if someone else already did.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let Some(connection) = self.registry.remove(id).await else {
            return false;
        };

        connection.shutdown().await;
        info!(id = %id, peer = %connection.peer_addr(), "client offline");
        self.announce_leave(&connection).await;
        true
    }

    /// Closes every connection without notices. Returns how many were open.
    pub async fn close_all(&self) -> usize {
        let closed = self.registry.drain().await;
        for connection in &closed {
            connection.shutdown().await;
        }
        closed.len()
    }

    async fn dispatch(&self, message: Message) -> BroadcastReport {
        let mut departed = VecDeque::new();
        let report = self.deliver(&message, &mut departed).await;

        // Each failed recipient is removed exactly once, so this terminates.
        while let Some(connection) = departed.pop_front() {
            let notice = Message::leave(connection.id(), connection.peer_addr());
            let cascade = self.deliver(&notice, &mut departed).await;
            debug!(
                id = %connection.id(),
                delivered = cascade.delivered.len(),
                dropped = cascade.dropped.len(),
                "announced dropped client"
            );
        }

        report
    }

    /// Makes one delivery attempt per recipient and retires the ones that fail.
    ///
    /// A failed recipient is removed as soon as its own attempt fails, while
    /// slower writes to other recipients are still in flight. Connections this
    /// call removed are pushed onto `departed`.
    async fn deliver(
        &self,
        message: &Message,
        departed: &mut VecDeque<Arc<Connection>>,
    ) -> BroadcastReport {
        let recipients = self.registry.snapshot().await;
        let registry = &self.registry;
        let limit = self.write_timeout;

        let attempts = recipients
            .into_iter()
            .filter(|connection| connection.id() != message.sender())
            .map(move |connection| async move {
                let failure = match connection.send(message.payload(), limit).await {
                    Ok(()) => return Attempt::Delivered(connection.id()),
                    Err(failure) => failure,
                };

                let Some(removed) = registry.remove(connection.id()).await else {
                    debug!(
                        id = %connection.id(),
                        error = %failure,
                        "delivery failed, client already gone"
                    );
                    return Attempt::Skipped;
                };

                warn!(
                    id = %removed.id(),
                    peer = %removed.peer_addr(),
                    kind = ?message.kind(),
                    error = %failure,
                    "delivery failed, dropping client"
                );
                removed.shutdown().await;
                Attempt::Dropped(removed)
            });

        let mut report = BroadcastReport::default();
        for attempt in join_all(attempts).await {
            match attempt {
                Attempt::Delivered(id) => report.delivered.push(id),
                Attempt::Dropped(connection) => {
                    report.dropped.push(connection.id());
                    departed.push_back(connection);
                }
                Attempt::Skipped => {}
            }
        }

        report
    }
}

enum Attempt {
    Delivered(ConnectionId),
    Dropped(Arc<Connection>),
    /// Failed, but someone else had already removed the recipient.
    Skipped,
}
