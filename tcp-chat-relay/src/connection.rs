use std::{fmt, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, watch},
    time::timeout,
};
use tracing::debug;

use crate::error::DeliveryFailure;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Identifier handed out by the registry when a connection is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    /// Terminal. Entered once, when the connection leaves the registry.
    Closed,
}

/// One connected client: its identity, its address, and the write half of
/// its stream.
///
/// The read half stays with the read loop that accepted the client. Writes
/// from concurrent broadcasts are serialized by the writer lock, so a
/// stream never sees two interleaved payloads.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<BoxedWriter>,
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new<W>(id: ConnectionId, peer: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            writer: Mutex::new(Box::new(writer)),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        if *self.closed.borrow() {
            ConnectionState::Closed
        } else {
            ConnectionState::Active
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Moves the connection to `Closed`. Returns `false` if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        let mut state = self.closed.subscribe();
        // The sender lives as long as `self`, so this only returns once closed.
        let _ = state.wait_for(|closed| *closed).await;
    }

    /// Makes one attempt to write `payload` in full, bounded by `limit`.
    ///
    /// The limit covers waiting for the writer lock too, so a peer stuck
    /// behind another broadcast's write fails the same way.
    pub async fn send(
        &self,
        payload: &[u8],
        limit: Option<Duration>,
    ) -> Result<(), DeliveryFailure> {
        if self.is_closed() {
            return Err(DeliveryFailure::Closed);
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(payload).await?;
            writer.flush().await
        };

        let result = match limit {
            Some(limit) => timeout(limit, write)
                .await
                .map_err(|_| DeliveryFailure::TimedOut)?,
            None => write.await,
        };
        result.map_err(DeliveryFailure::from)
    }

    /// Shuts down the write half if no write is in flight.
    ///
    /// A busy writer is left alone; the socket is released when the last
    /// handle to this connection is dropped.
    pub async fn shutdown(&self) {
        let Ok(mut writer) = self.writer.try_lock() else {
            debug!(id = %self.id, "writer busy, deferring close to drop");
            return;
        };
        if let Err(error) = writer.shutdown().await {
            debug!(id = %self.id, ?error, "failed to shut down writer cleanly");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
