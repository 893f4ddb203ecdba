//! Per-connection packet loop.
//!
//! # State Machine
//! ```text
//! IDLE ──Forward Request──▶ ASSIGNED ──END_RESPONSE sent, reset()──▶ IDLE
//! IDLE ──CPing/Ping──▶ CPONG, IDLE
//! IDLE ──Shutdown──▶ logged, IDLE
//! any  ──undecodable / truncated packet──▶ connection closed
//! ```
//!
//! # Design Decisions
//! - One cycle owns one connection; nothing here is shared except the
//!   long-running registry inside `CycleContext`
//! - Idle waits race the shutdown signal; in-flight requests always finish
//! - Any error discards both stream buffers before the socket is dropped

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::http::params;
use crate::lifecycle::ShutdownSignal;
use crate::net::{
    BlockableReader, BlockableWriter, BoxedReader, BoxedWriter, ConnectionError, ConnectionId,
    ConnectionState, StreamControl,
};
use crate::observability::metrics;
use crate::protocol::{hex_dump, packet, prefix, Frame, PacketReader, ProtocolError};
use crate::session::SessionDecision;

use super::exchange::{flush_response, ExchangeState};
use super::{BodyRelay, CycleContext, Exchange, HandlerError};

/// Bytes of unparsed input included when a framing error has no frame dump.
const DIAGNOSTIC_DUMP_LIMIT: usize = 64;

/// Drives one persistent AJP connection.
pub struct RequestCycle {
    id: ConnectionId,
    ctx: Arc<CycleContext>,
    input: BlockableReader,
    output: BlockableWriter,
    state: ConnectionState,
    exchange: Option<ExchangeState>,
}

impl RequestCycle {
    pub fn new(id: ConnectionId, ctx: Arc<CycleContext>, reader: BoxedReader, writer: BoxedWriter) -> Self {
        let control = StreamControl::new();
        Self {
            id,
            ctx,
            input: BlockableReader::new(reader, control.clone()),
            output: BlockableWriter::new(writer, control),
            state: ConnectionState::Idle,
            exchange: None,
        }
    }

    /// Split a bidirectional stream into the cycle's reader and writer.
    pub fn from_stream<S>(id: ConnectionId, ctx: Arc<CycleContext>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(id, ctx, Box::new(reader), Box::new(writer))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Block/unblock handle for an external watcher.
    pub fn control(&self) -> &StreamControl {
        self.input.control()
    }

    /// Serve requests until the peer closes, the keep-alive expires,
    /// shutdown is signalled while idle, or a fatal error occurs.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<(), ConnectionError> {
        let id = self.id;
        let keep_alive = self.ctx.settings.keep_alive;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => None,
                read = self.input.read_frame_timed(keep_alive) => Some(read),
            };

            let frame = match next {
                None => {
                    tracing::debug!(connection_id = %id, "Closing idle connection for shutdown");
                    return Ok(());
                }
                Some(Err(ConnectionError::Timeout(_))) => {
                    tracing::debug!(connection_id = %id, keep_alive = ?keep_alive, "Keep-alive expired");
                    return Ok(());
                }
                Some(Ok(None)) => {
                    tracing::debug!(connection_id = %id, "Peer closed connection");
                    return Ok(());
                }
                Some(Ok(Some(frame))) => frame,
                Some(Err(e)) => return Err(self.abort(e).await),
            };

            if let Err(e) = self.process(frame).await {
                return Err(self.abort(e).await);
            }
        }
    }

    /// Dispatch one packet received while IDLE.
    async fn process(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        let mut reader = PacketReader::new(&frame);
        match reader.next_byte()? {
            prefix::FORWARD_REQUEST => self.serve_request(&mut reader).await,
            code @ (prefix::CPING | prefix::PING) => {
                tracing::trace!(connection_id = %self.id, prefix = code, "CPing");
                metrics::record_cping();
                self.output.send(&packet::cpong()).await?;
                Ok(())
            }
            prefix::SHUTDOWN => {
                tracing::warn!(connection_id = %self.id, "Ignoring shutdown packet from web server");
                Ok(())
            }
            other => Err(ProtocolError::UnknownPacketType(other).into()),
        }
    }

    async fn serve_request(&mut self, reader: &mut PacketReader<'_>) -> Result<(), ConnectionError> {
        let (request, body) = self.ctx.settings.decoder.decode(reader)?;
        self.state = ConnectionState::Assigned;
        metrics::record_request(&request.method);
        tracing::debug!(
            connection_id = %self.id,
            method = %request.method,
            uri = %request.request_uri,
            remote_addr = %request.remote_addr,
            content_length = ?body.content_length(),
            "Forward request"
        );

        let ctx = Arc::clone(&self.ctx);
        let id = self.id;
        let Self {
            input,
            output,
            exchange,
            ..
        } = &mut *self;
        let current = exchange.insert(ExchangeState::new(request, body));

        prepare(&ctx, input, output, current).await?;
        current.mark_baseline();

        let outcome = {
            let mut exchange = Exchange::new(current, input, output, &ctx);
            ctx.handler.handle(&mut exchange).await
        };
        let outcome = match outcome {
            Ok(()) => flush_response(output, &mut current.response, true, Some(true))
                .await
                .map_err(HandlerError::Connection),
            failed => failed,
        };

        match outcome {
            Ok(()) => {}
            Err(HandlerError::Connection(ConnectionError::Protocol(e @ ProtocolError::HeadersTooLarge(_))))
                if !current.response.is_committed() =>
            {
                metrics::record_connection_error("headers_too_large");
                tracing::warn!(connection_id = %id, error = %e, "Response headers do not fit one packet; answering 500");
                current.replace_response(500);
                flush_response(output, &mut current.response, true, Some(true)).await?;
            }
            Err(HandlerError::Connection(e)) => return Err(e),
            Err(HandlerError::Application(message)) if !current.response.is_committed() => {
                tracing::warn!(connection_id = %id, error = %message, "Handler failed; answering 500");
                current.replace_response(500);
                flush_response(output, &mut current.response, true, Some(true)).await?;
            }
            Err(HandlerError::Application(message)) => {
                tracing::error!(
                    connection_id = %id,
                    error = %message,
                    "Handler failed after the response was committed; closing connection"
                );
                flush_response(output, &mut current.response, true, Some(false)).await?;
                return Err(ConnectionError::HandlerAborted(message));
            }
        }

        self.reset();
        Ok(())
    }

    /// Drop the exchange and its body state; the connection is reusable.
    fn reset(&mut self) {
        if let Some(done) = self.exchange.take() {
            tracing::trace!(
                connection_id = %self.id,
                status = done.response.status(),
                body_read = done.body.total_requested(),
                "Request cycle complete"
            );
        }
        self.state = ConnectionState::Idle;
    }

    /// Log `error`, throw away both buffers and return to IDLE.
    async fn abort(&mut self, error: ConnectionError) -> ConnectionError {
        let unparsed = hex_dump(&self.input.buffered_bytes()[..self.input.buffered().min(DIAGNOSTIC_DUMP_LIMIT)]);
        self.input.discard();
        self.output.acquire().await.discard();

        let id = self.id;
        match &error {
            e if e.is_broken_pipe() => {
                metrics::record_connection_error("broken_pipe");
                tracing::debug!(connection_id = %id, error = %e, "Peer went away mid-cycle");
            }
            ConnectionError::Protocol(e @ ProtocolError::BrokenCycle { .. }) => {
                metrics::record_broken_cycle();
                tracing::error!(connection_id = %id, error = %e, "Broken AJP cycle; closing connection");
            }
            ConnectionError::Protocol(e) if e.is_broken_cycle() => {
                metrics::record_broken_cycle();
                tracing::error!(
                    connection_id = %id,
                    error = %e,
                    unparsed = %unparsed,
                    "Broken AJP cycle; closing connection"
                );
            }
            ConnectionError::Protocol(e @ ProtocolError::HeadersTooLarge(_)) => {
                metrics::record_connection_error("headers_too_large");
                tracing::error!(connection_id = %id, error = %e, "Response headers do not fit one packet; closing connection");
            }
            ConnectionError::Protocol(e) => {
                metrics::record_connection_error("decode");
                tracing::warn!(connection_id = %id, error = %e, "Undecodable packet; closing connection");
            }
            ConnectionError::Io(e) => {
                metrics::record_connection_error("io");
                tracing::warn!(connection_id = %id, error = %e, "I/O error; closing connection");
            }
            ConnectionError::Timeout(limit) => {
                metrics::record_connection_error("timeout");
                tracing::warn!(connection_id = %id, timeout = ?limit, "Read timed out; closing connection");
            }
            ConnectionError::HandlerAborted(_) => {
                metrics::record_connection_error("handler");
            }
        }

        self.reset();
        error
    }
}

/// Everything between decoding and calling the handler: initial body
/// chunk, session affinity, form parameters, echo header.
async fn prepare(
    ctx: &CycleContext,
    input: &mut BlockableReader,
    output: &BlockableWriter,
    current: &mut ExchangeState,
) -> Result<(), ConnectionError> {
    let settings = &ctx.settings;

    if current.body.expects_initial_chunk() {
        let chunk = BodyRelay::new(&mut *input, output, &mut current.body, settings.read_timeout)
            .receive_chunk()
            .await?;
        current.push_chunk(chunk);
    }

    apply_session(ctx, current);

    if current.body.is_form_data() {
        read_form(ctx, input, output, current).await?;
    }

    if let Some(name) = &settings.echo_header {
        if let Some(value) = current.request.header(name).map(str::to_string) {
            current.response.headers.set(name.clone(), value);
        }
    }
    Ok(())
}

fn apply_session(ctx: &CycleContext, current: &mut ExchangeState) {
    let Some(requested) = current.request.requested_session_id.clone() else {
        return;
    };
    let decision = ctx.affinity.validate(
        &requested,
        ctx.validator.as_ref(),
        current.request.secure,
        current.request.remote_ip(),
    );
    match decision {
        SessionDecision::Accepted(id) => current.request.session_id = Some(id),
        SessionDecision::Rejected {
            reason,
            expired,
            new_id,
            new_cookie,
        } => {
            tracing::debug!(
                requested = %requested,
                issued = %new_id,
                reason = %reason,
                "Session rejected; issuing a new one"
            );
            metrics::record_session_rejected(reason.label());
            current.response.headers.append("Set-Cookie", expired.to_string());
            current.response.headers.append("Set-Cookie", new_cookie.to_string());
            current.request.session_id = Some(new_id);
        }
    }
}

/// Pull the whole urlencoded body and merge its parameters.
async fn read_form(
    ctx: &CycleContext,
    input: &mut BlockableReader,
    output: &BlockableWriter,
    current: &mut ExchangeState,
) -> Result<(), ConnectionError> {
    let settings = &ctx.settings;
    let limit = settings.max_form_size;
    let too_large = || ConnectionError::from(ProtocolError::FormTooLarge { limit });

    if current.body.content_length().is_some_and(|cl| cl > limit as u64) {
        return Err(too_large());
    }
    while !current.body.all_data_read() {
        if current.pending.len() > limit {
            return Err(too_large());
        }
        let chunk = BodyRelay::new(&mut *input, output, &mut current.body, settings.read_timeout)
            .request_chunk()
            .await?;
        current.push_chunk(chunk);
    }
    if current.pending.len() > limit {
        return Err(too_large());
    }

    params::parse_into(&mut current.request.parameters, &current.pending, settings.max_parameters)?;
    Ok(())
}
