//! Protocol error taxonomy.
//!
//! Decode variants are fatal to the cycle they occur in; the connection is
//! not assumed salvageable mid-packet. `HeadersTooLarge` is raised before
//! anything is written, so the cycle can still answer. Expected protocol
//! branches (an empty body chunk, an unknown session) are modelled as values
//! elsewhere.

use super::MAX_PAYLOAD_SIZE;

/// A frame or payload that cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A field length points past the end of the payload.
    #[error("broken AJP cycle: {reason}\n{dump}")]
    BrokenCycle { reason: String, dump: String },

    #[error("invalid magic bytes {0:#04x} {1:#04x}")]
    InvalidMagic(u8, u8),

    #[error("declared payload length {0} exceeds the {MAX_PAYLOAD_SIZE} byte packet buffer")]
    FrameTooLarge(usize),

    #[error("string of length {0} is not followed by a 0x00 terminator")]
    MissingStringTerminator(usize),

    #[error("unknown well-known header code 0xa0{0:02x}")]
    UnknownHeaderCode(u8),

    #[error("unknown attribute code {0:#04x}")]
    UnknownAttributeCode(u8),

    #[error("unknown method code {0}")]
    UnknownMethodCode(u8),

    #[error("method deferred to stored_method, but no stored_method attribute was sent")]
    MissingStoredMethod,

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("more than {0} request parameters")]
    TooManyParameters(usize),

    #[error("form body exceeds {limit} bytes")]
    FormTooLarge { limit: usize },

    #[error("response headers need {0} bytes, more than the {MAX_PAYLOAD_SIZE} byte packet payload")]
    HeadersTooLarge(usize),

    #[error("invalid cookie header: {0:?}")]
    InvalidCookieHeader(String),
}

impl ProtocolError {
    /// True for framing corruption, where the peer and the container no
    /// longer agree on packet boundaries.
    pub fn is_broken_cycle(&self) -> bool {
        matches!(
            self,
            ProtocolError::BrokenCycle { .. }
                | ProtocolError::InvalidMagic(..)
                | ProtocolError::FrameTooLarge(_)
        )
    }
}
