//! TCP server and shutdown sequencing.
//!
//! ```text
//! accept ──> spawn connection task (tracked in a JoinSet)
//!   │
//! shutdown future resolves
//!   │
//!   ├─> stop accepting
//!   ├─> tell every connection to finish its batch and hang up
//!   ├─> wait for the connection tasks (aborted after DRAIN_TIMEOUT)
//!   └─> Store::close: stop the scheduler, write the final snapshot
//! ```
//!
//! Every write a client has been told `+OK` about is in the store before the
//! final snapshot is taken.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{Store, StoreError};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// How long open connections get to finish before they are aborted.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves on Ctrl+C, or on SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// A bound listener plus the store it serves.
pub struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    pub fn new(listener: TcpListener, store: Arc<Store>) -> Self {
        Self {
            listener,
            store,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Serves clients until `shutdown` resolves, then drains the open
    /// connections and closes the store.
    ///
    /// The returned error is the final snapshot's; connection errors are
    /// only logged.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), StoreError> {
        let Server {
            listener,
            store,
            stats,
        } = self;
        let handler = CommandHandler::new(Arc::clone(&store));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tasks.spawn(handle_connection(
                            stream,
                            addr,
                            handler.clone(),
                            Arc::clone(&stats),
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        drop(listener);
        info!(connections = tasks.len(), "Shutting down, draining connections");
        // Receivers also close on a dropped sender, so the result is moot
        let _ = stop_tx.send(true);

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, drain(&mut tasks))
            .await
            .is_ok();
        if !drained {
            warn!(
                remaining = tasks.len(),
                "Connections did not finish in time, aborting them"
            );
            tasks.abort_all();
            drain(&mut tasks).await;
        }

        store.close().await
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageEngine, StoreConfig};
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_shutdown_drains_connections_then_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.snapshot");
        let store = Arc::new(Store::open(&path, StoreConfig::default()).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(listener, Arc::clone(&store));
        let addr = server.local_addr().unwrap();
        let stats = server.stats();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run(async {
            let _ = stop_rx.await;
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // The idle client was hung up on, not left dangling
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let restored = StorageEngine::restore(&path).unwrap();
        assert_eq!(restored.get("name").unwrap(), "Ariz");
    }

    #[tokio::test]
    async fn test_stops_accepting_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(Store::open(dir.path().join("accept.snapshot"), StoreConfig::default()).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(listener, store);
        let addr = server.local_addr().unwrap();

        server.run(async {}).await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let waiter = tokio::spawn(shutdown_signal());
        // Let the task install its handlers before the signal arrives
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
