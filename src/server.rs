//! Accept loop.
//!
//! Shutdown is requested by the launcher through a `watch` channel rather
//! than any process-wide state. The listener is borrowed so the caller
//! decides when the port is released.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Accepts clients until `shutdown` flips to `true` (or its sender is
/// dropped), spawning one task per connection.
///
/// Connections already running are left to finish on their own.
pub async fn run(
    listener: &TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let handler = handler.clone();
                    let stats = Arc::clone(&stats);
                    tokio::spawn(handle_connection(stream, addr, handler, stats));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Stopped accepting connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));
        let stats = Arc::new(ConnectionStats::new());
        let (tx, rx) = watch::channel(false);

        let server = tokio::spawn(async move {
            run(&listener, handler, stats, rx).await;
            listener
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"SET k v").await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        tx.send(true).unwrap();
        let listener = timeout(Duration::from_secs(2), server)
            .await
            .expect("accept loop did not stop")
            .unwrap();

        // The open connection outlives the accept loop.
        client.write_all(b"GET k").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$1\r\nv\r\n");

        drop(listener);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
        let (tx, rx) = watch::channel(false);
        drop(tx);

        timeout(
            Duration::from_secs(2),
            run(&listener, handler, Arc::new(ConnectionStats::new()), rx),
        )
        .await
        .expect("accept loop did not stop");
    }
}
