//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (shared by N acceptor tasks, connection limits)
//!     → server.rs (spawn one task per connection)
//!     → stream.rs (blockable buffered reader/writer pair)
//!     → cycle::RequestCycle (packet loop)
//!
//! Connection States:
//!     Idle → Assigned → Idle → ... → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept via semaphore prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Streams are type-erased so tests can drive cycles over in-memory pipes

pub mod connection;
pub mod listener;
pub mod server;
pub mod stream;

pub use connection::{ConnectionError, ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use server::AjpServer;
pub use stream::{BlockableReader, BlockableWriter, BoxedReader, BoxedWriter, StreamControl, WriterGuard};
