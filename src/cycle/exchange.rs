//! The request/response pair handed to the application.
//!
//! # Responsibilities
//! - Expose the decoded request
//! - Pull body bytes on demand through the GET_BODY_CHUNK handshake
//! - Buffer response output and stream it in `SEND_BODY_CHUNK` packets
//! - Mint sessions and admit long-running requests

use bytes::{Buf, Bytes, BytesMut};

use crate::http::{HeaderList, HttpRequest, HttpResponse};
use crate::net::{BlockableReader, BlockableWriter, ConnectionError, StreamControl};
use crate::protocol::{packet, MAX_SEND_BODY_CHUNK_SIZE};
use crate::session::{LongRunningGuard, LongRunningKey};

use super::{BodyChunk, BodyRelay, BodyState, CycleContext};

/// State of the request in flight, owned by the cycle until `reset`.
#[derive(Debug)]
pub struct ExchangeState {
    pub(crate) request: HttpRequest,
    pub(crate) body: BodyState,
    /// Body bytes received but not yet read by the application.
    pub(crate) pending: BytesMut,
    pub(crate) response: HttpResponse,
    /// Headers the cycle queued before the handler ran (echo header,
    /// replacement session cookies). An error response keeps them.
    pub(crate) baseline_headers: HeaderList,
    pub(crate) long_running: Option<LongRunningGuard>,
}

impl ExchangeState {
    pub(crate) fn new(request: HttpRequest, body: BodyState) -> Self {
        Self {
            request,
            body,
            pending: BytesMut::new(),
            response: HttpResponse::new(),
            baseline_headers: HeaderList::new(),
            long_running: None,
        }
    }

    /// Remember the headers queued so far as the baseline for error responses.
    pub(crate) fn mark_baseline(&mut self) {
        self.baseline_headers = self.response.headers.clone();
    }

    /// Replace an uncommitted response with an empty one of `status`,
    /// keeping the baseline headers.
    pub(crate) fn replace_response(&mut self, status: u16) {
        self.response.reset_with(self.baseline_headers.clone());
        self.response.set_status(status);
    }

    pub(crate) fn push_chunk(&mut self, chunk: BodyChunk) {
        if let BodyChunk::Data(data) = chunk {
            self.pending.extend_from_slice(&data);
        }
    }
}

/// Write the committed headers (once), body chunks and optionally
/// `END_RESPONSE` under one writer acquisition.
///
/// With `all` unset only full-size chunks leave the buffer.
pub(crate) async fn flush_response(
    output: &BlockableWriter,
    response: &mut HttpResponse,
    all: bool,
    end: Option<bool>,
) -> Result<(), ConnectionError> {
    let headers = response.commit()?;
    let chunks = if all {
        response.take_all_chunks()
    } else {
        response.take_full_chunks()
    };

    let mut guard = output.acquire().await;
    if let Some(headers) = headers {
        guard.queue(&headers);
    }
    for chunk in &chunks {
        guard.queue(chunk);
    }
    if let Some(reuse) = end {
        guard.queue(&packet::end_response(reuse));
    }
    guard.flush().await?;
    Ok(())
}

/// One request as seen by a [`Handler`](super::Handler).
pub struct Exchange<'a> {
    state: &'a mut ExchangeState,
    input: &'a mut BlockableReader,
    output: &'a BlockableWriter,
    ctx: &'a CycleContext,
}

impl<'a> Exchange<'a> {
    pub(crate) fn new(
        state: &'a mut ExchangeState,
        input: &'a mut BlockableReader,
        output: &'a BlockableWriter,
        ctx: &'a CycleContext,
    ) -> Self {
        Self {
            state,
            input,
            output,
            ctx,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.state.request
    }

    /// Mutable access, e.g. for [`HttpRequest::set_servlet_match`].
    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.state.request
    }

    pub fn response(&self) -> &HttpResponse {
        &self.state.response
    }

    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.state.response
    }

    pub fn set_status(&mut self, status: u16) {
        self.state.response.set_status(status);
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.state.response.headers.append(name, value);
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.state.response.headers.set(name, value);
    }

    pub fn is_committed(&self) -> bool {
        self.state.response.is_committed()
    }

    /// True once every body byte has been handed to the application.
    pub fn all_data_read(&self) -> bool {
        self.state.pending.is_empty() && self.state.body.all_data_read()
    }

    /// Read body bytes into `buf`; `Ok(0)` means end of body.
    pub async fn read_body(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        if buf.is_empty() || !self.fill().await? {
            return Ok(0);
        }
        let n = buf.len().min(self.state.pending.len());
        buf[..n].copy_from_slice(&self.state.pending[..n]);
        self.state.pending.advance(n);
        Ok(n)
    }

    /// Read the rest of the body.
    pub async fn read_to_end(&mut self) -> Result<Bytes, ConnectionError> {
        let mut body = BytesMut::new();
        while self.fill().await? {
            body.extend_from_slice(&self.state.pending.split());
        }
        Ok(body.freeze())
    }

    /// Make sure `pending` holds data, pulling a chunk if needed. Returns
    /// false at end of body.
    async fn fill(&mut self) -> Result<bool, ConnectionError> {
        while self.state.pending.is_empty() {
            if self.state.body.all_data_read() {
                return Ok(false);
            }
            let chunk = BodyRelay::new(
                &mut *self.input,
                self.output,
                &mut self.state.body,
                self.ctx.settings.read_timeout,
            )
            .request_chunk()
            .await?;
            self.state.push_chunk(chunk);
        }
        Ok(true)
    }

    /// Append response body bytes. Headers are committed and full chunks
    /// sent as soon as a whole `SEND_BODY_CHUNK` is buffered.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.state.response.buffer_body(data);
        if self.state.response.buffered() >= MAX_SEND_BODY_CHUNK_SIZE {
            flush_response(self.output, &mut self.state.response, false, None).await?;
        }
        Ok(())
    }

    /// Commit headers and send everything buffered.
    pub async fn flush(&mut self) -> Result<(), ConnectionError> {
        flush_response(self.output, &mut self.state.response, true, None).await?;
        Ok(())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.state.request.session_id.as_deref()
    }

    /// Mint a session for this client and queue its cookie.
    pub fn create_session(&mut self) -> String {
        let request = &self.state.request;
        let secure = self.ctx.affinity.is_secure(request.secure, request.remote_ip());
        let (id, cookie) = self.ctx.affinity.issue(secure);
        if self.state.response.is_committed() {
            tracing::warn!(session_id = %id, "Session created after headers were sent; cookie dropped");
        }
        self.state.response.headers.append("Set-Cookie", cookie.to_string());
        self.state.request.session_id = Some(id.clone());
        id
    }

    /// Admit this request as long-running. Returns false when the same
    /// (user, host, port) already has one in flight. The slot is released
    /// when the cycle resets.
    pub fn register_long_running(&mut self) -> bool {
        if self.state.long_running.is_some() {
            return true;
        }
        let request = &self.state.request;
        let host = if request.remote_host.is_empty() {
            &request.remote_addr
        } else {
            &request.remote_host
        };
        let key = LongRunningKey::new(
            request.remote_user().unwrap_or_default(),
            host.clone(),
            request.remote_port,
        );
        match self.ctx.registry.try_acquire(key) {
            Some(guard) => {
                self.state.long_running = Some(guard);
                true
            }
            None => false,
        }
    }

    /// Block/unblock handle for this connection's streams.
    pub fn stream_control(&self) -> &StreamControl {
        self.output.control()
    }
}
