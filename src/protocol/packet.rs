//! Frame envelope and outbound packet construction.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    hex_dump, kind, response_header_code, ProtocolError, HEADER_LEN, MAX_PAYLOAD_SIZE,
    MAX_SEND_BODY_CHUNK_SIZE, OUTBOUND_MAGIC, WELL_KNOWN_HEADER,
};

/// One AJP frame: magic bytes plus the payload they announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    magic: [u8; 2],
    payload: Bytes,
}

impl Frame {
    pub fn new(magic: [u8; 2], payload: Bytes) -> Self {
        Self { magic, payload }
    }

    pub fn magic(&self) -> [u8; 2] {
        self.magic
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Declared length, always equal to the payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Re-encode the whole frame as it travelled on the wire.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_slice(&self.magic);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Split one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` while the buffer holds only part of a frame. The
    /// magic must match `expected`; a declared length beyond the physical
    /// packet buffer is a broken cycle.
    pub fn parse(buf: &mut BytesMut, expected: [u8; 2]) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        if buf[..2] != expected {
            return Err(ProtocolError::InvalidMagic(buf[0], buf[1]));
        }
        let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if declared > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge(declared));
        }
        if buf.len() < HEADER_LEN + declared {
            return Ok(None);
        }

        let magic = [buf[0], buf[1]];
        buf.advance(HEADER_LEN);
        let payload = buf.split_to(declared).freeze();
        Ok(Some(Frame { magic, payload }))
    }

    /// Hex dump of the full frame, used in broken-cycle diagnostics.
    pub fn dump(&self) -> String {
        hex_dump(&self.encode())
    }
}

/// Builds one frame field by field; the length is patched in on `finish`.
#[derive(Debug)]
pub struct PacketBuilder {
    buf: BytesMut,
}

impl PacketBuilder {
    /// Start a container → web server packet of the given type.
    pub fn outbound(packet_kind: u8) -> Self {
        let mut builder = Self::with_magic(OUTBOUND_MAGIC);
        builder.put_byte(packet_kind);
        builder
    }

    /// Start a frame with arbitrary magic and an empty payload.
    pub fn with_magic(magic: [u8; 2]) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(&magic);
        buf.put_u16(0);
        Self { buf }
    }

    pub fn put_byte(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_int16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Length-prefixed, 0x00-terminated string.
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u16(value.len() as u16);
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        self
    }

    /// The 0xFFFF length that marks an absent string.
    pub fn put_absent_string(&mut self) -> &mut Self {
        self.buf.put_u16(0xFFFF);
        self
    }

    pub fn payload_len(&self) -> usize {
        self.buf.len() - HEADER_LEN
    }

    /// Patch the length field. Callers building variable-size packets check
    /// [`payload_len`](Self::payload_len) against [`MAX_PAYLOAD_SIZE`] first.
    pub fn finish(mut self) -> Bytes {
        debug_assert!(self.payload_len() <= u16::MAX as usize);
        let len = self.payload_len() as u16;
        self.buf[2..4].copy_from_slice(&len.to_be_bytes());
        self.buf.freeze()
    }
}

/// `SEND_BODY_CHUNK`: at most [`MAX_SEND_BODY_CHUNK_SIZE`] bytes of body.
pub fn send_body_chunk(data: &[u8]) -> Bytes {
    debug_assert!(data.len() <= MAX_SEND_BODY_CHUNK_SIZE);
    let mut packet = PacketBuilder::outbound(kind::SEND_BODY_CHUNK);
    packet
        .put_int16(data.len() as u16)
        .put_bytes(data)
        .put_byte(0);
    packet.finish()
}

/// `SEND_HEADERS`: status line plus response headers.
///
/// Fails when the headers do not fit one packet; there is no continuation
/// packet for headers.
pub fn send_headers<'h, I>(status: u16, reason: &str, headers: I) -> Result<Bytes, ProtocolError>
where
    I: IntoIterator<Item = (&'h str, &'h str)>,
    I::IntoIter: ExactSizeIterator,
{
    let headers = headers.into_iter();
    let mut packet = PacketBuilder::outbound(kind::SEND_HEADERS);
    packet
        .put_int16(status)
        .put_string(reason)
        .put_int16(headers.len() as u16);
    for (name, value) in headers {
        match response_header_code(name) {
            Some(code) => {
                packet.put_byte(WELL_KNOWN_HEADER).put_byte(code);
            }
            None => {
                packet.put_string(name);
            }
        }
        packet.put_string(value);
    }
    if packet.payload_len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::HeadersTooLarge(packet.payload_len()));
    }
    Ok(packet.finish())
}

/// `END_RESPONSE`; `reuse` tells the web server whether to keep the socket.
pub fn end_response(reuse: bool) -> Bytes {
    let mut packet = PacketBuilder::outbound(kind::END_RESPONSE);
    packet.put_bool(reuse);
    packet.finish()
}

/// `GET_BODY_CHUNK` asking for up to `requested` more body bytes.
pub fn get_body_chunk(requested: usize) -> Bytes {
    let mut packet = PacketBuilder::outbound(kind::GET_BODY_CHUNK);
    packet.put_int16(requested as u16);
    packet.finish()
}

/// `CPONG`, the answer to a CPing.
pub fn cpong() -> Bytes {
    PacketBuilder::outbound(kind::CPONG).finish()
}
