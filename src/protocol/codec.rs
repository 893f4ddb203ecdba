//! Cursor-based decoding of AJP payload fields.

use std::fmt::Write as _;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{Frame, ProtocolError, TERMINATOR};

/// Charset used for string fields that carry bytes above 127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "utf-8", alias = "UTF-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "iso-8859-1", alias = "ISO-8859-1", alias = "latin1")]
    Latin1,
}

impl Charset {
    /// Decode raw string bytes. Pure ASCII needs no charset; invalid UTF-8
    /// sequences become U+FFFD.
    pub fn decode(self, raw: &[u8]) -> String {
        if raw.is_ascii() {
            return String::from_utf8_lossy(raw).into_owned();
        }
        match self {
            Charset::Utf8 => String::from_utf8_lossy(raw).into_owned(),
            Charset::Latin1 => raw.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Quoted-printable decoding over raw string bytes.
///
/// Non-ASCII strings are treated as if every byte above 127 had been
/// escaped to `=XX` first, so those bytes pass through unchanged while
/// literal `=XX` sequences already in the string are decoded. Soft line
/// breaks (`=` before CRLF or LF) disappear; any other `=` stays literal.
pub(crate) fn decode_quoted_printable(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'=' {
            match &raw[i + 1..] {
                [b'\r', b'\n', ..] => {
                    i += 3;
                    continue;
                }
                [b'\n', ..] => {
                    i += 2;
                    continue;
                }
                [hi, lo, ..] => {
                    if let (Some(hi), Some(lo)) = (hex_value(*hi), hex_value(*lo)) {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                }
                _ => {}
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|d| d as u8)
}

/// Read cursor over one frame's payload.
///
/// Reads past the end never touch memory outside the payload; they fail
/// with [`ProtocolError::BrokenCycle`] carrying a dump of the whole frame.
#[derive(Debug)]
pub struct PacketReader<'a> {
    frame: &'a Frame,
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self { frame, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.frame.len() - self.pos
    }

    pub fn has_next(&self) -> bool {
        self.remaining() > 0
    }

    /// Non-consuming check of the next byte.
    pub fn compare_next_byte(&self, value: u8) -> bool {
        self.frame.payload().get(self.pos) == Some(&value)
    }

    pub fn next_byte(&mut self) -> Result<u8, ProtocolError> {
        let byte = *self
            .frame
            .payload()
            .get(self.pos)
            .ok_or_else(|| self.broken(1))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Big-endian unsigned 16-bit integer.
    pub fn parse_int16(&mut self) -> Result<u16, ProtocolError> {
        if self.remaining() < 2 {
            return Err(self.broken(2));
        }
        let payload = self.frame.payload();
        let value = u16::from_be_bytes([payload[self.pos], payload[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    pub fn parse_boolean(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.next_byte()? > 0)
    }

    /// Length-prefixed string. A length of 0xFFFF marks an absent string,
    /// which decodes as empty after consuming only the two length bytes.
    pub fn parse_string(&mut self, charset: Charset) -> Result<String, ProtocolError> {
        let len = self.parse_int16()?;
        if len == u16::from_be_bytes([TERMINATOR, TERMINATOR]) {
            return Ok(String::new());
        }
        self.parse_string_body(len as usize, charset)
    }

    fn parse_string_body(&mut self, len: usize, charset: Charset) -> Result<String, ProtocolError> {
        let raw = self.byte_sequence(len)?;
        if !self.compare_next_byte(0) {
            return Err(ProtocolError::MissingStringTerminator(len));
        }
        self.pos += 1;
        if raw.is_ascii() {
            return Ok(charset.decode(&raw));
        }
        Ok(charset.decode(&decode_quoted_printable(&raw)))
    }

    /// Copy the next `n` payload bytes.
    pub fn byte_sequence(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        if n > self.remaining() {
            return Err(self.broken(n));
        }
        let bytes = self.frame.payload().slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    fn broken(&self, wanted: usize) -> ProtocolError {
        ProtocolError::BrokenCycle {
            reason: format!(
                "wanted {} byte(s) at offset {} of a {} byte payload",
                wanted,
                self.pos,
                self.frame.len()
            ),
            dump: self.frame.dump(),
        }
    }
}

/// Classic 16-bytes-per-line hex dump with an ASCII column.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4 + 16);
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", line * 16);
        for byte in chunk {
            let _ = write!(out, "{:02x} ", byte);
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push(' ');
        for &byte in chunk {
            out.push(if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            });
        }
        out.push('\n');
    }
    out
}
