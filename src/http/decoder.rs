//! Forward Request decoding.
//!
//! # Payload Layout (after the prefix byte)
//! ```text
//! method (u8, or 0xFF = see stored_method)
//! protocol, req_uri, remote_addr, remote_host, server_name   (strings)
//! server_port (u16), is_ssl (bool)
//! num_headers (u16), then per header:
//!     name:  0xA0 <code>  |  string
//!     value: string
//! attributes: <code> [value...] ... 0xFF
//! ```

use crate::config::AjpConfig;
use crate::cycle::BodyState;
use crate::protocol::{
    attr, attribute_name, method_name, request_header_name, Charset, PacketReader, ProtocolError,
    TERMINATOR, WELL_KNOWN_HEADER,
};

use super::{params, parse_cookie_header, HttpRequest};

const JSESSIONID_PARAM: &str = ";jsessionid=";
const REMOTE_PORT_ATTRIBUTE: &str = "AJP_REMOTE_PORT";

/// Turns a Forward Request payload into an [`HttpRequest`] plus the body
/// bookkeeping the cycle needs.
#[derive(Debug, Clone)]
pub struct ForwardRequestDecoder {
    charset: Charset,
    max_parameters: usize,
    session_cookie: String,
}

impl ForwardRequestDecoder {
    pub fn new(charset: Charset, max_parameters: usize, session_cookie: impl Into<String>) -> Self {
        Self {
            charset,
            max_parameters,
            session_cookie: session_cookie.into(),
        }
    }

    pub fn from_config(config: &AjpConfig) -> Self {
        Self::new(
            config.request.default_charset,
            config.request.max_parameters,
            config.session.cookie_name.clone(),
        )
    }

    /// Decode the payload following the `FORWARD_REQUEST` prefix byte.
    pub fn decode(&self, reader: &mut PacketReader<'_>) -> Result<(HttpRequest, BodyState), ProtocolError> {
        let cs = self.charset;
        let mut request = HttpRequest::default();

        let method_code = reader.next_byte()?;
        let method = if method_code == TERMINATOR {
            None
        } else {
            Some(method_name(method_code).ok_or(ProtocolError::UnknownMethodCode(method_code))?)
        };

        request.protocol = reader.parse_string(cs)?;
        request.request_uri = reader.parse_string(cs)?;
        request.remote_addr = reader.parse_string(cs)?;
        request.remote_host = reader.parse_string(cs)?;
        request.server_name = reader.parse_string(cs)?;
        request.server_port = reader.parse_int16()?;
        request.secure = reader.parse_boolean()?;

        self.decode_headers(reader, &mut request)?;
        self.decode_attributes(reader, &mut request)?;

        request.method = match method {
            Some(m) => m.to_string(),
            None => request
                .attribute("stored_method")
                .filter(|m| !m.is_empty())
                .ok_or(ProtocolError::MissingStoredMethod)?
                .to_string(),
        };

        self.split_uri(&mut request)?;
        if request.requested_session_id.is_none() {
            request.requested_session_id = request
                .cookie(&self.session_cookie)
                .map(|c| c.value.clone())
                .filter(|v| !v.is_empty());
        }

        request.content_length = request
            .header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        let chunked = request
            .header("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        let body = BodyState::new(request.content_length, chunked, request.is_form_data());

        Ok((request, body))
    }

    fn decode_headers(&self, reader: &mut PacketReader<'_>, request: &mut HttpRequest) -> Result<(), ProtocolError> {
        let count = reader.parse_int16()?;
        for _ in 0..count {
            let name = if reader.compare_next_byte(WELL_KNOWN_HEADER) {
                reader.next_byte()?;
                let code = reader.next_byte()?;
                request_header_name(code)
                    .ok_or(ProtocolError::UnknownHeaderCode(code))?
                    .to_string()
            } else {
                reader.parse_string(self.charset)?
            };
            let value = reader.parse_string(self.charset)?;

            if name.eq_ignore_ascii_case("content-type") {
                request.content_type = Some(value.clone());
            } else if name.eq_ignore_ascii_case("cookie") {
                request.cookies.extend(parse_cookie_header(&value)?);
            }
            request.headers.append(name, value);
        }
        Ok(())
    }

    fn decode_attributes(&self, reader: &mut PacketReader<'_>, request: &mut HttpRequest) -> Result<(), ProtocolError> {
        while reader.has_next() {
            let code = reader.next_byte()?;
            match code {
                attr::ARE_DONE => break,
                attr::SSL_KEY_SIZE => {
                    let size = reader.parse_int16()?;
                    request.attributes.insert("ssl_key_size".to_string(), size.to_string());
                }
                attr::REQ_ATTRIBUTE => {
                    let name = reader.parse_string(self.charset)?;
                    let value = reader.parse_string(self.charset)?;
                    if name == REMOTE_PORT_ATTRIBUTE {
                        request.remote_port = value.trim().parse().unwrap_or(0);
                    }
                    request.attributes.insert(name, value);
                }
                attr::QUERY_STRING => {
                    let query = reader.parse_string(self.charset)?;
                    request.attributes.insert("query_string".to_string(), query.clone());
                    request.query_string = Some(query);
                }
                _ => {
                    let name = attribute_name(code).ok_or(ProtocolError::UnknownAttributeCode(code))?;
                    let value = reader.parse_string(self.charset)?;
                    request.attributes.insert(name.to_string(), value);
                }
            }
        }
        Ok(())
    }

    /// Peel a stray `?query` and a `;jsessionid=` segment off the URI, then
    /// parse the query string into parameters.
    fn split_uri(&self, request: &mut HttpRequest) -> Result<(), ProtocolError> {
        if let Some((path, query)) = request.request_uri.split_once('?') {
            if request.query_string.is_none() {
                request.query_string = Some(query.to_string());
            }
            request.request_uri = path.to_string();
        }

        if let Some(start) = request.request_uri.to_ascii_lowercase().find(JSESSIONID_PARAM) {
            let value_start = start + JSESSIONID_PARAM.len();
            let value_end = request.request_uri[value_start..]
                .find(';')
                .map_or(request.request_uri.len(), |i| value_start + i);
            let id = request.request_uri[value_start..value_end].to_string();
            request.request_uri.replace_range(start..value_end, "");
            if !id.is_empty() {
                request.requested_session_id = Some(id);
                request.session_id_from_url = true;
            }
        }

        if let Some(query) = request.query_string.as_deref() {
            params::parse_into(&mut request.parameters, query.as_bytes(), self.max_parameters)?;
        }
        Ok(())
    }
}
