use std::{future::Future, io, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::{TcpListener, TcpSocket, TcpStream, tcp::OwnedReadHalf},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    cli::ServerConfig,
    connection::Connection,
    registry::ConnectionRegistry,
    relay::BroadcastRelay,
};

const LISTEN_BACKLOG: u32 = 10;

/// Binds a listener with `SO_REUSEADDR` so restarts don't trip over
/// sockets lingering in `TIME_WAIT`.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

pub struct Server {
    listener: TcpListener,
    relay: BroadcastRelay,
    recv_buffer: usize,
}

impl Server {
    pub fn new(listener: TcpListener, config: &ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            listener,
            relay: BroadcastRelay::new(registry).with_write_timeout(config.write_timeout),
            recv_buffer: config.recv_buffer,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn relay(&self) -> &BroadcastRelay {
        &self.relay
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            relay,
            recv_buffer,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&relay).await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &relay, recv_buffer).await?;
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_shutdown(relay: &BroadcastRelay) {
    let closed = relay.close_all().await;
    info!(closed, "chat server shutting down");
}

async fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    relay: &BroadcastRelay,
    recv_buffer: usize,
) -> Result<()> {
    match result {
        Ok((stream, peer)) => admit_connection(stream, peer, relay, recv_buffer).await,
        Err(err) => {
            warn!(error = ?err, "failed to accept connection");
            Ok(())
        }
    }
}

async fn admit_connection(
    stream: TcpStream,
    peer: SocketAddr,
    relay: &BroadcastRelay,
    recv_buffer: usize,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let registry = relay.registry();
    let connection = Arc::new(Connection::new(registry.next_id(), peer, writer));

    registry
        .add(Arc::clone(&connection))
        .await
        .with_context(|| format!("failed to register client {peer}"))?;

    info!(id = %connection.id(), %peer, "client connected");
    spawn_connection_handler(connection, reader, relay, recv_buffer);
    Ok(())
}

fn spawn_connection_handler(
    connection: Arc<Connection>,
    reader: OwnedReadHalf,
    relay: &BroadcastRelay,
    recv_buffer: usize,
) {
    let relay = relay.clone();
    tokio::spawn(async move {
        relay.announce_join(&connection).await;

        if let Err(err) = run_read_loop(&relay, &connection, reader, recv_buffer).await {
            debug!(id = %connection.id(), error = ?err, "read failed");
        }
        relay.disconnect(connection.id()).await;
    });
}

/// Relays everything `reader` produces until EOF, a read error, or the
/// connection being closed from elsewhere.
async fn run_read_loop<R>(
    relay: &BroadcastRelay,
    connection: &Connection,
    mut reader: R,
    recv_buffer: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; recv_buffer];

    loop {
        let bytes = select! {
            _ = connection.closed() => return Ok(()),
            read = reader.read(&mut buffer) => read?,
        };
        if bytes == 0 {
            return Ok(());
        }
        relay.broadcast(connection.id(), &buffer[..bytes]).await;
    }
}
