//! Client connection plumbing: line framing on the read side and a writer task
//! fed by an unbounded queue on the write side.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{MessageWrite, Response, split_frame};
use crate::room::Outbound;
use crate::{Error, Result};

static CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub fn next_connection_id() -> ConnectionId {
    ConnectionId(CONNECTION_ID.fetch_add(1, Ordering::SeqCst))
}

/// Reads newline-delimited frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
    idle_timeout: Option<Duration>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_len: usize, idle_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(max_len.min(65536) + 1),
            max_len,
            idle_timeout,
            eof: false,
        }
    }

    /// Next non-blank frame, or `None` once the peer has closed the stream.
    ///
    /// Bytes left over after the last line terminator are returned as a final
    /// frame when the stream ends.
    pub async fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        loop {
            if let Some(frame) = split_frame(&mut self.buf, self.max_len)? {
                if is_blank(&frame) {
                    continue;
                }
                return Ok(Some(frame));
            }

            if self.eof {
                if is_blank(&self.buf) {
                    self.buf.clear();
                    return Ok(None);
                }
                return Ok(Some(self.buf.split()));
            }

            let n = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, self.inner.read_buf(&mut self.buf))
                    .await
                    .map_err(|_| Error::IdleTimeout)??,
                None => self.inner.read_buf(&mut self.buf).await?,
            };
            if n == 0 {
                self.eof = true;
            }
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// One client connection, owned by its session.
pub struct Connection<S> {
    id: ConnectionId,
    reader: FrameReader<ReadHalf<S>>,
    tx: Outbound,
    writer: JoinHandle<()>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split the stream and start its writer task.
    pub fn new(stream: S, max_len: usize, idle_timeout: Option<Duration>) -> Self {
        let id = next_connection_id();
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

        // Writer task
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    tracing::debug!(conn = %id, error = %e, "Write failed");
                    return;
                }
            }
            let _ = write_half.shutdown().await;
        });

        Self {
            id,
            reader: FrameReader::new(read_half, max_len, idle_timeout),
            tx,
            writer,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// A sender for this connection's outbound queue, for seating it in a room.
    pub fn outbound(&self) -> Outbound {
        self.tx.clone()
    }

    pub fn send(&self, message: &Response) -> bool {
        self.tx.send(message.to_frame()).is_ok()
    }

    pub async fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        self.reader.next_frame().await
    }

    /// Flush queued frames and close the stream.
    ///
    /// Every other sender for this connection (a room slot) must already be
    /// gone, otherwise this waits until it is dropped.
    pub async fn close(self) {
        let Connection {
            id, tx, writer, ..
        } = self;
        drop(tx);
        if let Err(e) = writer.await {
            tracing::warn!(conn = %id, error = %e, "Writer task failed");
        }
    }
}
