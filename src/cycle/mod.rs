//! Request cycle subsystem.
//!
//! # Data Flow
//! ```text
//! BlockableReader ─frame─▶ request_cycle.rs (dispatch by prefix byte)
//!     Forward Request → http::ForwardRequestDecoder → ExchangeState
//!     → body.rs (initial chunk, form body via GET_BODY_CHUNK)
//!     → session affinity, echo header
//!     → handler.rs (application) with an exchange.rs view
//!     → SEND_HEADERS, SEND_BODY_CHUNK*, END_RESPONSE
//!     → reset() → IDLE
//! ```
//!
//! # Design Decisions
//! - The application sees a borrowed `Exchange`, never the streams
//! - Expected protocol branches are values (`BodyChunk::Terminated`,
//!   `SessionDecision::Rejected`); only fatal conditions are errors
//! - Handler failure before commit becomes a 500 on a reusable connection

pub mod body;
pub mod context;
pub mod exchange;
pub mod handler;
pub mod request_cycle;

pub use body::{BodyChunk, BodyRelay, BodyState, NOT_SET};
pub use context::{CycleContext, CycleSettings};
pub use exchange::{Exchange, ExchangeState};
pub use handler::{EchoHandler, Handler, HandlerError};
pub use request_cycle::RequestCycle;
