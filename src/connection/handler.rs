//! Per-client connection loop.
//!
//! ```text
//! accept ──> read into buffer ──> parse every complete request
//!                 ▲                        │
//!                 │                        ▼
//!                 └──────── write replies, flush once per batch
//! ```
//!
//! TCP is a stream: one read may carry half a request or several
//! pipelined ones. The buffer keeps partial requests until the rest
//! arrives, and replies to a pipelined batch are flushed together.
//!
//! A server shutdown is observed between batches: a request that has been
//! read is executed and answered, then the connection closes.

use crate::commands::{command_name, CommandHandler};
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::BytesMut;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Upper bound on buffered, not yet parsed input (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent bytes that are not RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The client closed the socket in the middle of a request
    #[error("connection closed with a partial request buffered")]
    UnexpectedEof,

    #[error("request exceeds the 64 KB buffer limit")]
    BufferFull,
}

/// What the loop should do after a batch of requests.
enum Flow {
    Continue,
    Quit,
}

/// State for one connected client.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    command_handler: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
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
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Serves the client until it disconnects, sends QUIT, fails, or
    /// `shutdown` turns `true`.
    ///
    /// A clean disconnect between requests is `Ok(())`, and so is a
    /// shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.serve(&mut shutdown).await;
        self.stats.connection_closed();

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(e)) if e.kind() == ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }
        result
    }

    async fn serve(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ConnectionError> {
        loop {
            let flow = match self.process_buffered().await {
                Ok(flow) => flow,
                Err(ConnectionError::Protocol(e)) => {
                    // No way to resynchronize after bad input; reply, then hang up
                    let reply = RespValue::error(format!("ERR protocol error: {}", e));
                    self.write_reply(&reply).await?;
                    self.stream.flush().await?;
                    return Err(ConnectionError::Protocol(e));
                }
                Err(e) => return Err(e),
            };
            self.stream.flush().await?;

            if let Flow::Quit = flow {
                return Ok(());
            }
            if *shutdown.borrow() {
                debug!(client = %self.addr, "Closing connection for shutdown");
                return Ok(());
            }

            let addr = self.addr;
            let more = tokio::select! {
                read = self.read_more() => read?,
                // A dropped sender means the server is gone as well
                _ = shutdown.changed() => {
                    debug!(client = %addr, "Closing connection for shutdown");
                    false
                }
            };
            if !more {
                return Ok(());
            }
        }
    }

    /// Executes every complete request in the buffer.
    async fn process_buffered(&mut self) -> Result<Flow, ConnectionError> {
        while let Some((request, consumed)) = self.parser.parse(&self.buffer)? {
            let _ = self.buffer.split_to(consumed);
            let quit = command_name(&request).as_deref() == Some("QUIT");

            let reply = self.command_handler.execute(request).await;
            self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
            self.write_reply(&reply).await?;

            if quit {
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Reads from the socket. Returns `false` on a clean EOF.
    async fn read_more(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull);
        }
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            // Leftover blank lines are not a partial request
            return if self.buffer.iter().all(u8::is_ascii_whitespace) {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        trace!(client = %self.addr, bytes = n, buffered = self.buffer.len(), "Read data");
        Ok(true)
    }

    async fn write_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Runs a [`ConnectionHandler`] to completion. Errors are logged by the
/// handler itself.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) {
    let _ = ConnectionHandler::new(stream, addr, command_handler, stats)
        .run(shutdown)
        .await;
}
