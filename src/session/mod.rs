//! Session affinity and request admission.
//!
//! # Data Flow
//! ```text
//! requested session id (URI ;jsessionid= or cookie)
//!     → affinity.rs (route check, external validity check)
//!     → Accepted(id) | Rejected { expire old cookie, mint new id }
//!
//! Exchange::register_long_running()
//!     → long_running.rs (insert-if-absent on a shared DashMap)
//!     → guard deregisters when the cycle resets or fails
//! ```
//!
//! # Design Decisions
//! - The registry is the only state shared across connections
//! - Registration is RAII so every successful register has exactly one deregister

pub mod affinity;
pub mod long_running;

pub use affinity::{
    AcceptAllSessions, RejectReason, SessionAffinity, SessionCookie, SessionDecision, SessionValidator,
};
pub use long_running::{LongRunningGuard, LongRunningKey, LongRunningRegistry};
