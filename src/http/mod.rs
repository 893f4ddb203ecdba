//! HTTP exchange representation.
//!
//! # Data Flow
//! ```text
//! Forward Request frame
//!     → decoder.rs (fields, headers, attributes)
//!         → cookie.rs (Cookie header, with salvage of malformed values)
//!         → params.rs (query string / form body parameters)
//!     → request.rs (HttpRequest, owned by one request cycle)
//!
//! Application output
//!     → response.rs (status, headers, buffered body)
//!     → protocol::packet (SEND_HEADERS / SEND_BODY_CHUNK)
//! ```
//!
//! # Design Decisions
//! - No HTTP wire syntax: the web server already parsed it
//! - Header names compare case-insensitively but keep arrival order
//! - Cookie salvage mirrors what proxies actually send, not RFC 6265

pub mod cookie;
pub mod decoder;
pub mod headers;
pub mod params;
pub mod request;
pub mod response;

pub use cookie::{parse_cookie_header, Cookie};
pub use decoder::ForwardRequestDecoder;
pub use headers::HeaderList;
pub use request::{HttpRequest, ServletMatch};
pub use response::{reason_phrase, HttpResponse};
