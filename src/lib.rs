//! AJP13 container endpoint.
//!
//! Accepts persistent AJP13 connections from a front-end web server,
//! decodes forwarded requests, hands them to an application [`Handler`]
//! and streams the response back over the same connection.
//!
//! # Architecture Overview
//!
//! ```text
//!   web server (mod_jk / mod_proxy_ajp)
//!        │ AJP13 frames
//!        ▼
//!   net::Listener ──▶ net::AjpServer (acceptor pool, one task per connection)
//!        │
//!        ▼
//!   net::stream (BlockableReader / BlockableWriter)
//!        │
//!        ▼
//!   cycle::RequestCycle ──▶ http::ForwardRequestDecoder ──▶ protocol codec
//!        │                   cycle::BodyRelay (GET_BODY_CHUNK handshake)
//!        │                   session::SessionAffinity / LongRunningRegistry
//!        ▼
//!   cycle::Handler (application) ──▶ SEND_HEADERS / SEND_BODY_CHUNK / END_RESPONSE
//! ```

// Wire format
pub mod protocol;
pub mod http;

// Connection handling
pub mod cycle;
pub mod net;
pub mod session;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::AjpConfig;
pub use cycle::{EchoHandler, Exchange, Handler, HandlerError};
pub use lifecycle::Shutdown;
pub use net::AjpServer;
