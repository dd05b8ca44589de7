//! Connection Handler
//!
//! Each client gets its own handler task that runs in a loop, reading
//! requests and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, handler spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Read up to 4 KB             │
//!    │        │                     │
//!    │        ▼                     │
//!    │  Decode frames in the chunk  │
//!    │        │                     │
//!    │        ▼                     │
//!    │  Execute, one reply each     │
//!    │        │                     │
//!    │        ▼                     │
//!    │  Write replies, loop back    │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. Peer closes (read returns 0) or I/O error: task ends
//! ```
//!
//! Every read is decoded on its own. A request split across two reads is a
//! protocol error, answered with a single `+Protocol error: ...` line; the
//! connection stays open for the next request.

use crate::commands::CommandHandler;
use crate::protocol::FrameDecoder;
use bytes::BytesMut;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Largest number of bytes taken from the socket per read
pub const READ_CHUNK_SIZE: usize = 4096;

/// Counters shared by every connection
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub protocol_errors: AtomicU64,
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

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the byte stream so tests can drive it without a socket.
pub struct ConnectionHandler<S> {
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes of the current read
    buffer: BytesMut,

    command_handler: CommandHandler,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            command_handler,
            stats,
        }
    }

    /// Serves the client until it disconnects or the socket fails.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(e)) if e.kind() == ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.read_chunk().await? == 0 {
                return Ok(());
            }
            self.process_chunk().await?;
        }
    }

    /// Reads the next chunk into the buffer. Returns 0 on clean shutdown.
    async fn read_chunk(&mut self) -> Result<usize, ConnectionError> {
        self.buffer.clear();
        self.buffer.resize(READ_CHUNK_SIZE, 0);

        loop {
            match self.stream.read(&mut self.buffer[..]).await {
                Ok(n) => {
                    self.buffer.truncate(n);
                    if n > 0 {
                        self.stats.bytes_read(n);
                        trace!(client = %self.addr, bytes = n, "Read data");
                    }
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.clear();
                    return Err(e.into());
                }
            }
        }
    }

    /// Answers every request in the buffer, in order.
    async fn process_chunk(&mut self) -> Result<(), ConnectionError> {
        let mut out = Vec::new();

        for decoded in FrameDecoder::new(&self.buffer) {
            match decoded {
                Ok(frame) => {
                    trace!(client = %self.addr, args = frame.len(), "Decoded frame");
                    let reply = self.command_handler.execute(frame);
                    trace!(client = %self.addr, reply = %reply, "Executed command");
                    reply.serialize_into(&mut out);
                    self.stats.command_processed();
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error");
                    CommandHandler::protocol_error(&e).serialize_into(&mut out);
                    self.stats.protocol_error();
                }
            }
        }

        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(out.len());
        trace!(client = %self.addr, bytes = out.len(), "Sent replies");

        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs a [`ConnectionHandler`] to completion.
///
/// Errors are already logged by the handler, so nothing is returned.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
