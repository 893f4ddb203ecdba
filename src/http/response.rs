//! Response half of an HTTP exchange.
//!
//! # Responsibilities
//! - Collect status, headers and body bytes pushed by the application
//! - Track whether headers were committed to the wire
//! - Cut buffered body bytes into `SEND_BODY_CHUNK`-sized pieces

use bytes::{Bytes, BytesMut};

use super::HeaderList;
use crate::protocol::{packet, ProtocolError, MAX_SEND_BODY_CHUNK_SIZE};

#[derive(Debug)]
pub struct HttpResponse {
    status: u16,
    reason: String,
    pub headers: HeaderList,
    body: BytesMut,
    committed: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status: 200,
            reason: reason_phrase(200).to_string(),
            headers: HeaderList::new(),
            body: BytesMut::new(),
            committed: false,
        }
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Set the status with its standard reason phrase.
    pub fn set_status(&mut self, status: u16) {
        self.set_status_with_reason(status, reason_phrase(status));
    }

    pub fn set_status_with_reason(&mut self, status: u16, reason: impl Into<String>) {
        self.status = status;
        self.reason = reason.into();
    }

    /// True once `SEND_HEADERS` has been produced.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn buffered(&self) -> usize {
        self.body.len()
    }

    pub fn buffer_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// Produce `SEND_HEADERS` the first time it succeeds. Headers that do
    /// not fit one packet leave the response uncommitted.
    pub fn commit(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.committed {
            return Ok(None);
        }
        let packet = packet::send_headers(self.status, &self.reason, self.headers.iter())?;
        self.committed = true;
        Ok(Some(packet))
    }

    /// Take every full-size body chunk, leaving a partial tail buffered.
    pub fn take_full_chunks(&mut self) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while self.body.len() >= MAX_SEND_BODY_CHUNK_SIZE {
            let chunk = self.body.split_to(MAX_SEND_BODY_CHUNK_SIZE);
            chunks.push(packet::send_body_chunk(&chunk));
        }
        chunks
    }

    /// Take everything buffered as body chunks.
    pub fn take_all_chunks(&mut self) -> Vec<Bytes> {
        let mut chunks = self.take_full_chunks();
        if !self.body.is_empty() {
            let rest = self.body.split();
            chunks.push(packet::send_body_chunk(&rest));
        }
        chunks
    }

    /// Back to a fresh 200 carrying only `headers`; only valid before commit.
    pub fn reset_with(&mut self, headers: HeaderList) {
        debug_assert!(!self.committed);
        *self = Self {
            headers,
            ..Self::default()
        };
    }
}

/// Standard reason phrase, `"Unknown"` for unlisted codes.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        423 => "Locked",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
