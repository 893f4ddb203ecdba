//! AJP13 wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → packet.rs (frame envelope: magic + u16 length + payload)
//!     → codec.rs (cursor over the payload: bytes, ints, booleans, strings)
//!     → http::decoder (Forward Request → HttpRequest)
//!
//! response side:
//!     HttpResponse / body bytes
//!     → packet.rs (PacketBuilder: SEND_HEADERS, SEND_BODY_CHUNK, ...)
//!     → socket bytes
//! ```
//!
//! # Frame Layout
//! ```text
//! +---------+---------+--------------------+------------------------+
//! | magic 0 | magic 1 | payload len (u16)  | payload                |
//! +---------+---------+--------------------+------------------------+
//!   web server → container: 0x12 0x34
//!   container → web server: 'A'  'B'
//! ```
//!
//! # Design Decisions
//! - Single-pass cursor decoding, no backtracking
//! - Every out-of-range read is a broken cycle carrying a hex dump
//! - Tables are indexed by the 1-based wire codes

pub mod codec;
pub mod error;
pub mod packet;

pub use codec::{hex_dump, Charset, PacketReader};
pub use error::ProtocolError;
pub use packet::{Frame, PacketBuilder};

/// Magic bytes of frames sent by the web server.
pub const INBOUND_MAGIC: [u8; 2] = [0x12, 0x34];

/// Magic bytes of frames sent by the container.
pub const OUTBOUND_MAGIC: [u8; 2] = [b'A', b'B'];

/// Magic (2) + payload length (2).
pub const HEADER_LEN: usize = 4;

/// Largest frame either side may send.
pub const MAX_PACKET_SIZE: usize = 8192;

/// Largest payload that fits the physical packet buffer.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_LEN;

/// Largest request body chunk: payload minus its 2-byte chunk length.
pub const MAX_BODY_CHUNK_SIZE: usize = MAX_PAYLOAD_SIZE - 2;

/// Largest response body chunk: type byte, 2-byte length and the trailing
/// terminator come out of the payload.
pub const MAX_SEND_BODY_CHUNK_SIZE: usize = MAX_PAYLOAD_SIZE - 4;

/// Ends the attribute list, marks an absent string and a deferred method.
pub const TERMINATOR: u8 = 0xFF;

/// First byte of a two-byte well-known header code.
pub const WELL_KNOWN_HEADER: u8 = 0xA0;

/// Packet types sent by the web server.
pub mod prefix {
    pub const FORWARD_REQUEST: u8 = 2;
    pub const SHUTDOWN: u8 = 7;
    pub const PING: u8 = 8;
    pub const CPING: u8 = 10;
}

/// Packet types sent by the container.
pub mod kind {
    pub const SEND_BODY_CHUNK: u8 = 3;
    pub const SEND_HEADERS: u8 = 4;
    pub const END_RESPONSE: u8 = 5;
    pub const GET_BODY_CHUNK: u8 = 6;
    pub const CPONG: u8 = 9;
}

/// Request attribute codes.
pub mod attr {
    pub const CONTEXT: u8 = 0x01;
    pub const SERVLET_PATH: u8 = 0x02;
    pub const REMOTE_USER: u8 = 0x03;
    pub const AUTH_TYPE: u8 = 0x04;
    pub const QUERY_STRING: u8 = 0x05;
    pub const JVM_ROUTE: u8 = 0x06;
    pub const SSL_CERT: u8 = 0x07;
    pub const SSL_CIPHER: u8 = 0x08;
    pub const SSL_SESSION: u8 = 0x09;
    pub const REQ_ATTRIBUTE: u8 = 0x0A;
    pub const SSL_KEY_SIZE: u8 = 0x0B;
    pub const SECRET: u8 = 0x0C;
    pub const STORED_METHOD: u8 = 0x0D;
    pub const ARE_DONE: u8 = super::TERMINATOR;
}

/// Methods by wire code (code 1 is index 0).
pub const METHODS: [&str; 27] = [
    "OPTIONS",
    "GET",
    "HEAD",
    "POST",
    "PUT",
    "DELETE",
    "TRACE",
    "PROPFIND",
    "PROPPATCH",
    "MKCOL",
    "COPY",
    "MOVE",
    "LOCK",
    "UNLOCK",
    "ACL",
    "REPORT",
    "VERSION-CONTROL",
    "CHECKIN",
    "CHECKOUT",
    "UNCHECKOUT",
    "SEARCH",
    "MKWORKSPACE",
    "UPDATE",
    "LABEL",
    "MERGE",
    "BASELINE-CONTROL",
    "MKACTIVITY",
];

/// Well-known request header names by second code byte (0xA001 is index 0).
pub const REQUEST_HEADERS: [&str; 14] = [
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "authorization",
    "connection",
    "content-type",
    "content-length",
    "cookie",
    "cookie2",
    "host",
    "pragma",
    "referer",
    "user-agent",
];

/// Well-known response header names by second code byte (0xA001 is index 0).
pub const RESPONSE_HEADERS: [&str; 11] = [
    "Content-Type",
    "Content-Language",
    "Content-Length",
    "Date",
    "Last-Modified",
    "Location",
    "Set-Cookie",
    "Set-Cookie2",
    "Servlet-Engine",
    "Status",
    "WWW-Authenticate",
];

/// Look up a method by its wire code.
pub fn method_name(code: u8) -> Option<&'static str> {
    code.checked_sub(1)
        .and_then(|i| METHODS.get(usize::from(i)))
        .copied()
}

/// Look up a request header by the second byte of its well-known code.
pub fn request_header_name(code: u8) -> Option<&'static str> {
    code.checked_sub(1)
        .and_then(|i| REQUEST_HEADERS.get(usize::from(i)))
        .copied()
}

/// Find the well-known code of a response header, case-insensitively.
pub fn response_header_code(name: &str) -> Option<u8> {
    RESPONSE_HEADERS
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .map(|i| i as u8 + 1)
}

/// Attribute name for the codes that carry a single string value.
pub fn attribute_name(code: u8) -> Option<&'static str> {
    let name = match code {
        attr::CONTEXT => "context",
        attr::SERVLET_PATH => "servlet_path",
        attr::REMOTE_USER => "remote_user",
        attr::AUTH_TYPE => "auth_type",
        attr::QUERY_STRING => "query_string",
        attr::JVM_ROUTE => "jvm_route",
        attr::SSL_CERT => "ssl_cert",
        attr::SSL_CIPHER => "ssl_cipher",
        attr::SSL_SESSION => "ssl_session",
        attr::SECRET => "secret_attribute",
        attr::STORED_METHOD => "stored_method",
        _ => return None,
    };
    Some(name)
}
