//! TCP transport producing one [`Connection`] per driver session.
//!
//! Two topologies are supported:
//! - the worker binds and accepts the driver ([`WorkerListener`])
//! - the driver listens and the worker dials back ([`connect`])

use std::io;
use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use super::protocol::SessionId;

/// One driver session: the two halves of a stream plus identity for logging.
///
/// Consumed by the session that serves it; the stream closes when both halves drop.
pub struct Connection<R = OwnedReadHalf, W = OwnedWriteHalf> {
    session: SessionId,
    peer: Option<SocketAddr>,
    local_port: Option<u16>,
    reader: R,
    writer: W,
}

impl Connection {
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let local_port = stream.local_addr()?.port();
        let (reader, writer) = stream.into_split();

        let mut connection = Connection::new(reader, writer);
        connection.peer = peer;
        connection.local_port = Some(local_port);
        Ok(connection)
    }
}

impl<R, W> Connection<R, W> {
    /// Wrap an arbitrary read/write pair (pipes, in-memory duplex streams).
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            session: SessionId::new(),
            peer: None,
            local_port: None,
            reader,
            writer,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Local port of the underlying socket, if it has one.
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub fn into_split(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

/// Listening side for the worker-accepts topology.
pub struct WorkerListener {
    inner: TcpListener,
}

impl WorkerListener {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        tracing::debug!(addr = ?inner.local_addr().ok(), "Worker listener bound");
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Wait for the next driver connection.
    pub async fn accept(&self) -> io::Result<Connection> {
        let (stream, peer) = self.inner.accept().await?;
        tracing::info!(%peer, "Driver connected");
        Connection::from_tcp(stream)
    }
}

/// Dial a listening driver.
pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Connection> {
    let stream = TcpStream::connect(addr).await?;
    tracing::info!(peer = ?stream.peer_addr().ok(), "Connected to driver");
    Connection::from_tcp(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_and_connect_produce_matching_connections() {
        let listener = WorkerListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (accepted, dialed) = tokio::join!(listener.accept(), connect(addr));
        let accepted = accepted.unwrap();
        let dialed = dialed.unwrap();

        assert_eq!(accepted.local_port(), Some(addr.port()));
        assert_eq!(dialed.peer(), Some(addr));
        assert_ne!(accepted.session(), dialed.session());
    }

    #[test]
    fn in_memory_connection_has_no_socket_identity() {
        let (a, _b) = tokio::io::duplex(16);
        let (r, w) = tokio::io::split(a);
        let connection = Connection::new(r, w);

        assert!(connection.peer().is_none());
        assert!(connection.local_port().is_none());
    }
}
