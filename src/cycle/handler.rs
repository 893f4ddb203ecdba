//! The application boundary.

use futures_util::future::BoxFuture;

use crate::net::ConnectionError;

use super::Exchange;

/// Failure reported by a [`Handler`].
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Reading the body or writing the response failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The application gave up on the request.
    #[error("{0}")]
    Application(String),
}

impl HandlerError {
    pub fn application(message: impl Into<String>) -> Self {
        HandlerError::Application(message.into())
    }
}

/// Consumes one decoded request and produces its response.
///
/// The cycle flushes whatever is still buffered and sends `END_RESPONSE`
/// after `handle` returns.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange<'_>) -> BoxFuture<'a, Result<(), HandlerError>>;
}

/// Reports method, URI and body size as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange<'_>) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            let body = exchange.read_to_end().await?;
            let request = exchange.request();
            let mut text = format!(
                "method: {}\nuri: {}\nprotocol: {}\nremote: {}\n",
                request.method, request.request_uri, request.protocol, request.remote_addr
            );
            if let Some(query) = &request.query_string {
                text.push_str(&format!("query: {}\n", query));
            }
            for (name, value) in &request.parameters {
                text.push_str(&format!("param: {}={}\n", name, value));
            }
            if let Some(session) = &request.session_id {
                text.push_str(&format!("session: {}\n", session));
            }
            text.push_str(&format!("body bytes: {}\n", body.len()));

            exchange.set_header("Content-Type", "text/plain; charset=utf-8");
            exchange.set_header("Content-Length", text.len().to_string());
            exchange.write(text.as_bytes()).await?;
            Ok(())
        })
    }
}
