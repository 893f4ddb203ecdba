//! Blockable buffered streams.
//!
//! # Responsibilities
//! - Buffer socket reads and cut them into AJP frames
//! - Buffer outbound packets and write them in one go on flush
//! - Let an external watcher pause reads or writes at a safe point
//! - Serialize writers so partial frames never interleave
//!
//! # Design Decisions
//! - Blocking suspends, it never discards: buffered bytes survive a
//!   block/unblock round trip
//! - Safe points are "before touching the socket": a blocked reader still
//!   hands out frames that are already buffered
//! - Acquire/release is a plain `tokio::sync::Mutex` guard, held for one
//!   logical packet sequence
//! - `discard` resets buffers when a connection is torn down abnormally

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::net::connection::ConnectionError;
use crate::protocol::{Frame, INBOUND_MAGIC, MAX_PACKET_SIZE};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to block and unblock one connection's streams.
#[derive(Debug, Clone)]
pub struct StreamControl {
    reads: Arc<watch::Sender<bool>>,
    writes: Arc<watch::Sender<bool>>,
}

impl StreamControl {
    pub fn new() -> Self {
        let (reads, _) = watch::channel(false);
        let (writes, _) = watch::channel(false);
        Self {
            reads: Arc::new(reads),
            writes: Arc::new(writes),
        }
    }

    pub fn block_reads(&self) {
        self.reads.send_replace(true);
    }

    pub fn unblock_reads(&self) {
        self.reads.send_replace(false);
    }

    pub fn block_writes(&self) {
        self.writes.send_replace(true);
    }

    pub fn unblock_writes(&self) {
        self.writes.send_replace(false);
    }

    pub fn reads_blocked(&self) -> bool {
        *self.reads.borrow()
    }

    pub fn writes_blocked(&self) -> bool {
        *self.writes.borrow()
    }

    async fn wait_until_clear(flag: &watch::Sender<bool>) {
        let mut rx = flag.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|blocked| !*blocked).await;
    }

    pub(crate) async fn reads_unblocked(&self) {
        Self::wait_until_clear(&self.reads).await;
    }

    /// Resolves once reads are (or become) blocked.
    pub(crate) async fn until_reads_blocked(&self) {
        let mut rx = self.reads.subscribe();
        let _ = rx.wait_for(|blocked| *blocked).await;
    }

    pub(crate) async fn writes_unblocked(&self) {
        Self::wait_until_clear(&self.writes).await;
    }
}

impl Default for StreamControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffered frame reader over one side of a connection.
pub struct BlockableReader {
    inner: BoxedReader,
    buf: BytesMut,
    control: StreamControl,
}

impl BlockableReader {
    pub fn new(inner: BoxedReader, control: StreamControl) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_PACKET_SIZE),
            control,
        }
    }

    /// Read the next inbound frame.
    ///
    /// `Ok(None)` means the peer closed the connection on a frame boundary.
    /// Cancel-safe: bytes already read stay buffered.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        self.next_frame(None).await
    }

    /// Like [`read_frame`](Self::read_frame), but each socket wait is bounded
    /// by `limit`. Time spent blocked is not counted: the clock starts when
    /// reads are unblocked and restarts after every block.
    pub async fn read_frame_timed(&mut self, limit: Duration) -> Result<Option<Frame>, ConnectionError> {
        self.next_frame(Some(limit)).await
    }

    /// Read a frame that must arrive within `limit`; a clean close counts
    /// as an unexpected EOF.
    pub async fn read_frame_within(&mut self, limit: Duration) -> Result<Frame, ConnectionError> {
        match self.read_frame_timed(limit).await? {
            Some(frame) => Ok(frame),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection in the middle of a request",
            )
            .into()),
        }
    }

    async fn next_frame(&mut self, limit: Option<Duration>) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some(frame) = Frame::parse(&mut self.buf, INBOUND_MAGIC)? {
                return Ok(Some(frame));
            }

            self.control.reads_unblocked().await;
            self.buf.reserve(MAX_PACKET_SIZE);

            let Self { inner, buf, control } = &mut *self;
            // `None` when reads were blocked before the socket produced data.
            let socket = async {
                tokio::select! {
                    biased;
                    _ = control.until_reads_blocked() => None,
                    read = inner.read_buf(buf) => Some(read),
                }
            };
            let read = match limit {
                Some(limit) => tokio::time::timeout(limit, socket)
                    .await
                    .map_err(|_| ConnectionError::Timeout(limit))?,
                None => socket.await,
            };
            let Some(read) = read else {
                continue;
            };

            if read? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("peer closed mid-frame with {} byte(s) buffered", self.buf.len()),
                )
                .into());
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Bytes read but not yet handed out as a frame.
    pub fn buffered_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn discard(&mut self) {
        self.buf.clear();
    }

    pub fn control(&self) -> &StreamControl {
        &self.control
    }
}

/// Buffered packet writer; all access goes through [`acquire`](Self::acquire).
pub struct BlockableWriter {
    inner: Mutex<WriterState>,
    control: StreamControl,
}

struct WriterState {
    sink: BoxedWriter,
    buf: BytesMut,
}

/// Exclusive access to the writer for one logical packet sequence.
/// Dropping the guard releases it.
pub struct WriterGuard<'a> {
    state: MutexGuard<'a, WriterState>,
    control: &'a StreamControl,
}

impl BlockableWriter {
    pub fn new(sink: BoxedWriter, control: StreamControl) -> Self {
        Self {
            inner: Mutex::new(WriterState {
                sink,
                buf: BytesMut::with_capacity(MAX_PACKET_SIZE),
            }),
            control,
        }
    }

    pub async fn acquire(&self) -> WriterGuard<'_> {
        WriterGuard {
            state: self.inner.lock().await,
            control: &self.control,
        }
    }

    /// Queue one packet and flush it.
    pub async fn send(&self, packet: &[u8]) -> io::Result<()> {
        let mut guard = self.acquire().await;
        guard.queue(packet);
        guard.flush().await
    }

    pub fn control(&self) -> &StreamControl {
        &self.control
    }
}

impl WriterGuard<'_> {
    pub fn queue(&mut self, packet: &[u8]) {
        self.state.buf.extend_from_slice(packet);
    }

    pub fn buffered(&self) -> usize {
        self.state.buf.len()
    }

    /// Write everything queued, waiting first while writes are blocked.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.control.writes_unblocked().await;
        let WriterState { sink, buf } = &mut *self.state;
        if !buf.is_empty() {
            sink.write_all(&buf[..]).await?;
            buf.clear();
        }
        sink.flush().await
    }

    pub fn discard(&mut self) {
        self.state.buf.clear();
    }
}
