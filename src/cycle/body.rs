//! Request body bookkeeping and the GET_BODY_CHUNK handshake.
//!
//! # Data Flow
//! ```text
//! Forward Request decoded (Content-Length / Transfer-Encoding)
//!     → BodyState seeded
//!     → web server pushes first chunk unprompted (if a body is expected)
//!     → application wants more:
//!           GET_BODY_CHUNK(min(remaining, 8186)) → flush
//!           ← body chunk [u16 len][bytes]   (len 0 / empty = no more data)
//! ```

use std::time::Duration;

use bytes::Bytes;

use crate::net::{BlockableReader, BlockableWriter, ConnectionError};
use crate::observability::metrics;
use crate::protocol::{packet, PacketReader, ProtocolError, MAX_BODY_CHUNK_SIZE};

/// Sentinel for an undeclared content length.
pub const NOT_SET: i64 = -1;

/// Outcome of one inbound body packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyChunk {
    Data(Bytes),
    /// The web server has no more data. `premature` is set when the
    /// declared content length was not reached.
    Terminated { premature: bool },
}

/// How much of the request body has been pulled from the web server.
#[derive(Debug, Clone)]
pub struct BodyState {
    content_length: i64,
    total_requested: u64,
    is_form_data: bool,
    chunked: bool,
    terminated: bool,
}

impl BodyState {
    pub fn new(content_length: Option<u64>, chunked: bool, is_form_data: bool) -> Self {
        Self {
            content_length: content_length.map_or(NOT_SET, |cl| cl.min(i64::MAX as u64) as i64),
            total_requested: 0,
            is_form_data,
            chunked,
            terminated: false,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        (self.content_length != NOT_SET).then_some(self.content_length as u64)
    }

    pub fn total_requested(&self) -> u64 {
        self.total_requested
    }

    pub fn is_form_data(&self) -> bool {
        self.is_form_data
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// True once no further body bytes can arrive for this request.
    ///
    /// Without a declared length only a chunked request carries a body, and
    /// it ends at the empty terminator chunk.
    pub fn all_data_read(&self) -> bool {
        if self.terminated {
            return true;
        }
        match self.content_length() {
            Some(cl) => self.total_requested >= cl,
            None => !self.chunked,
        }
    }

    /// The web server sends the first chunk right after the Forward Request
    /// whenever a body is expected.
    pub fn expects_initial_chunk(&self) -> bool {
        self.total_requested == 0 && !self.all_data_read()
    }

    /// Byte count to put into the next GET_BODY_CHUNK.
    pub fn next_request_size(&self) -> usize {
        match self.content_length() {
            Some(cl) => {
                let remaining = cl.saturating_sub(self.total_requested);
                remaining.min(MAX_BODY_CHUNK_SIZE as u64) as usize
            }
            None => MAX_BODY_CHUNK_SIZE,
        }
    }

    /// Consume one body packet payload (no type byte).
    pub fn accept_chunk(&mut self, reader: &mut PacketReader<'_>) -> Result<BodyChunk, ProtocolError> {
        let len = if reader.has_next() { reader.parse_int16()? } else { 0 };

        if len == 0 {
            let premature = self
                .content_length()
                .is_some_and(|cl| self.total_requested < cl);
            self.terminated = true;
            if premature {
                tracing::warn!(
                    content_length = self.content_length,
                    received = self.total_requested,
                    "Empty body chunk although more data was expected; treating as end of body"
                );
                metrics::record_body_chunk_anomaly();
            }
            return Ok(BodyChunk::Terminated { premature });
        }

        let data = reader.byte_sequence(len as usize)?;
        self.total_requested += data.len() as u64;
        Ok(BodyChunk::Data(data))
    }
}

/// Pulls body chunks over one connection's stream pair.
pub struct BodyRelay<'a> {
    input: &'a mut BlockableReader,
    output: &'a BlockableWriter,
    state: &'a mut BodyState,
    read_timeout: Duration,
}

impl<'a> BodyRelay<'a> {
    pub fn new(
        input: &'a mut BlockableReader,
        output: &'a BlockableWriter,
        state: &'a mut BodyState,
        read_timeout: Duration,
    ) -> Self {
        Self {
            input,
            output,
            state,
            read_timeout,
        }
    }

    /// Read one body packet that the web server sends on its own or in
    /// answer to a GET_BODY_CHUNK.
    pub async fn receive_chunk(&mut self) -> Result<BodyChunk, ConnectionError> {
        let frame = self.input.read_frame_within(self.read_timeout).await?;
        let mut reader = PacketReader::new(&frame);
        let chunk = self.state.accept_chunk(&mut reader)?;
        tracing::trace!(
            received = self.state.total_requested(),
            content_length = ?self.state.content_length(),
            "Body chunk received"
        );
        Ok(chunk)
    }

    /// Ask the web server for more body bytes and wait for its answer.
    pub async fn request_chunk(&mut self) -> Result<BodyChunk, ConnectionError> {
        if self.state.all_data_read() {
            return Ok(BodyChunk::Terminated { premature: false });
        }
        let request = packet::get_body_chunk(self.state.next_request_size());
        {
            let mut guard = self.output.acquire().await;
            guard.queue(&request);
            guard.flush().await?;
        }
        self.receive_chunk().await
    }
}
