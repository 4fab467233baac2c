//! Line-oriented connection over one TCP socket
//!
//! A [`Connection`] is shared behind an `Arc` between the task that reads
//! from it and any task that writes to it. Reads are serialized by one
//! lock and writes by another, so one reader and one writer can make
//! progress at the same time but two readers or two writers never
//! interleave on the socket.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::{CodecError, Utf32LineCodec, CODE_UNIT_LEN};

/// Connection error
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    Closed,
}

impl ConnectionError {
    /// Whether this error comes from a local `close()` rather than the socket
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// One socket with a line-read / line-write contract
pub struct Connection {
    reader: Mutex<FramedRead<OwnedReadHalf, Utf32LineCodec>>,
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, Utf32LineCodec>>>,
    closed: CancellationToken,
    peer_addr: Option<SocketAddr>,
}

impl Connection {
    /// Wrap an established stream
    ///
    /// `buffer_size` is the initial read buffer capacity in characters.
    /// Longer lines are still read whole.
    pub fn new(stream: TcpStream, buffer_size: usize) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        Self {
            reader: Mutex::new(FramedRead::with_capacity(
                read_half,
                Utf32LineCodec::new(),
                buffer_size.max(1) * CODE_UNIT_LEN,
            )),
            writer: Mutex::new(Some(FramedWrite::new(write_half, Utf32LineCodec::new()))),
            closed: CancellationToken::new(),
            peer_addr,
        }
    }

    /// Open a TCP connection to `addr`
    pub async fn connect<A: ToSocketAddrs>(addr: A, buffer_size: usize) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream, buffer_size))
    }

    /// Remote address, if the socket reported one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait for the next line
    ///
    /// Returns `Ok(None)` once the peer has closed the socket cleanly.
    /// A pending read is woken by `close()` and fails with
    /// [`ConnectionError::Closed`].
    pub async fn read_line(&self) -> Result<Option<String>, ConnectionError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ConnectionError::Closed),
            result = self.read_frame() => result,
        }
    }

    async fn read_frame(&self) -> Result<Option<String>, ConnectionError> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(line)) => {
                trace!(peer = ?self.peer_addr, len = line.len(), "line received");
                Ok(Some(line))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Encode and flush one line
    pub async fn write_line(&self, text: &str) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(ConnectionError::Closed)?;
        sink.send(text).await?;
        trace!(peer = ?self.peer_addr, len = text.len(), "line sent");
        Ok(())
    }

    /// Release the socket
    ///
    /// Idempotent. Shuts down the write direction so the peer sees end of
    /// stream; the read half is dropped with the connection.
    pub async fn close(&self) {
        self.closed.cancel();

        let mut writer = self.writer.lock().await;
        if let Some(sink) = writer.take() {
            let mut write_half = sink.into_inner();
            if let Err(e) = write_half.shutdown().await {
                debug!(peer = ?self.peer_addr, "socket shutdown failed: {}", e);
            }
            debug!(peer = ?self.peer_addr, "connection closed");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
