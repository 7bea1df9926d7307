//! Per-connection loop.
//!
//! Every client gets its own task running a simple cycle:
//!
//! ```text
//! read bytes ──> CommandHandler::process ──> write reply ──> (repeat)
//! ```
//!
//! Each successful read is treated as exactly one request and gets exactly
//! one reply. Bytes past the first command in a read are dropped along with
//! the rest of the buffer; there is no pipelining queue.

use crate::commands::CommandHandler;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Capacity of the per-connection read buffer. A single read never returns
/// more than this, so it also caps the size of one request.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Counters shared by every connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently open connections
    pub active_connections: AtomicU64,
    /// Requests answered, including error replies
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// State for one connected client.
///
/// Owns the socket (behind a `BufWriter`) and the read buffer. The command
/// handler and the stats are shared with every other connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a handler and counts the connection as open.
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted TCP stream
    /// * `addr` - The client's address, used in log fields
    /// * `command_handler` - The shared dispatcher
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            command_handler,
            stats,
        }
    }

    /// Serves the client until it disconnects or the socket fails.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.read_request().await?;

            let reply = self.command_handler.process(&self.buffer);
            self.buffer.clear();
            self.stats.command_processed();

            self.stream.write_all(&reply).await?;
            self.stream.flush().await?;
            self.stats.bytes_written(reply.len());
            trace!(client = %self.addr, bytes = reply.len(), "Sent reply");
        }
    }

    /// Fills the buffer with the next request.
    async fn read_request(&mut self) -> Result<(), ConnectionError> {
        self.buffer.reserve(READ_BUFFER_SIZE);

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(ConnectionError::ClientDisconnected);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read request");
        Ok(())
    }
}

/// Reasons a connection loop ends.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The peer closed its side of the socket.
    #[error("Client disconnected")]
    ClientDisconnected,
}

/// Runs a [`ConnectionHandler`] to completion, swallowing the ordinary ways
/// a client goes away.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, Duration};

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let handler = CommandHandler::new(Arc::clone(&storage));
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = handler.clone();
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, stats));
            }
        });

        (addr, storage, stats)
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8]) -> Vec<u8> {
        client.write_all(request).await.unwrap();
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, storage, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(&mut client, b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nruby\r\n").await;
        assert_eq!(reply, b"+OK\r\n");

        let reply = roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").await;
        assert_eq!(reply, b"$4\r\nruby\r\n");

        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection_usable() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(&mut client, b"*2\r\n$3\r\nfoo").await;
        assert_eq!(reply, b"-ERR empty command\r\n");

        let reply = roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n").await;
        assert_eq!(reply, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_inline_command() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(roundtrip(&mut client, b"SET greeting hi\r\n").await, b"+OK\r\n");
        assert_eq!(roundtrip(&mut client, b"GET greeting\r\n").await, b"$2\r\nhi\r\n");
    }

    #[tokio::test]
    async fn test_clients_share_one_store() {
        let (addr, _, _) = create_test_server().await;
        let mut writer = TcpStream::connect(addr).await.unwrap();
        let mut reader = TcpStream::connect(addr).await.unwrap();

        assert_eq!(roundtrip(&mut writer, b"SET shared 42").await, b"+OK\r\n");
        assert_eq!(roundtrip(&mut reader, b"GET shared").await, b"$2\r\n42\r\n");

        drop(writer);
        assert_eq!(roundtrip(&mut reader, b"DEL shared").await, b":1\r\n");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n").await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 14);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 7);

        drop(client);
        sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
