//! `Cookie` request header parsing.
//!
//! # Responsibilities
//! - Extract name/value pairs plus `$Version`, `$Path` and `$Domain`
//! - Never emit the reserved `$` parameters as cookies
//! - Salvage values that upstream proxies forwarded with unescaped `;` or `,`
//!
//! # Salvage
//! The primary pattern stops a value at the first `;` or `,`. Text the
//! pattern skips between two matches belongs to the previous cookie: the
//! whole region from that cookie's value to the next match is re-scanned for
//! `$Path=` / `$Domain=` fragments and the rest becomes the value.
//!
//! ```text
//! a=x;y; b=2
//!   ^--------- value region of `a`: "x;y; "  →  a = "x;y"
//!        ^---- next match
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::ProtocolError;

static COOKIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?:\$(?i:Version)\s*=\s*"?(\d+)"?\s*[;,]\s*)?"#,
        r#"([^\s=;,]+)\s*=\s*("[^"]*"|[^;,]*)"#,
        r#"(?:[;,]\s*\$(?i:Path)\s*=\s*("[^"]*"|[^;,]*))?"#,
        r#"(?:[;,]\s*\$(?i:Domain)\s*=\s*("[^"]*"|[^;,]*))?"#,
        r#"(?:[;,]\s*\$(?i:Port)(?:\s*=\s*("[^"]*"|[^;,]*))?)?"#,
        r#"[;,]?\s*"#,
    ))
    .expect("cookie pattern is valid")
});

static ATTRIBUTE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[;,]\s*\$((?i:Path|Domain))\s*=\s*("[^"]*"|[^;,]*)"#)
        .expect("cookie attribute pattern is valid")
});

const RESERVED: [&str; 4] = ["$Version", "$Path", "$Domain", "$Port"];

/// One cookie sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub version: u32,
    pub path: Option<String>,
    pub domain: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            version: 0,
            path: None,
            domain: None,
        }
    }
}

struct Parsed {
    cookie: Cookie,
    value_start: usize,
}

/// Parse a raw `Cookie` header value.
///
/// A blank header yields no cookies. A non-blank header in which the
/// pattern finds nothing at all is an [`ProtocolError::InvalidCookieHeader`].
pub fn parse_cookie_header(header: &str) -> Result<Vec<Cookie>, ProtocolError> {
    if header.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parsed: Vec<Parsed> = Vec::new();
    let mut version = 0;
    let mut last_end = 0;
    let mut matched = false;

    for caps in COOKIE.captures_iter(header) {
        let (Some(whole), Some(name), Some(value)) = (caps.get(0), caps.get(2), caps.get(3)) else {
            continue;
        };
        matched = true;
        salvage(header, &mut parsed, last_end, whole.start());
        last_end = whole.end();

        if let Some(v) = caps.get(1).and_then(|v| v.as_str().parse().ok()) {
            version = v;
        }

        if is_reserved(name.as_str()) {
            merge_reserved(&mut parsed, name.as_str(), value.as_str(), &mut version);
            continue;
        }

        parsed.push(Parsed {
            cookie: Cookie {
                name: name.as_str().to_string(),
                value: clean_value(value.as_str()),
                version,
                path: caps.get(4).map(|m| clean_value(m.as_str())),
                domain: caps.get(5).map(|m| clean_value(m.as_str())),
            },
            value_start: value.start(),
        });
    }
    salvage(header, &mut parsed, last_end, header.len());

    if !matched {
        return Err(ProtocolError::InvalidCookieHeader(header.to_string()));
    }
    Ok(parsed.into_iter().map(|p| p.cookie).collect())
}

fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// A `$` parameter that showed up as its own match belongs to the cookie
/// before it.
fn merge_reserved(parsed: &mut [Parsed], name: &str, value: &str, version: &mut u32) {
    let value = clean_value(value);
    if name.eq_ignore_ascii_case("$Version") {
        if let Ok(v) = value.parse() {
            *version = v;
        }
        return;
    }
    let Some(prev) = parsed.last_mut() else {
        return;
    };
    if name.eq_ignore_ascii_case("$Path") {
        prev.cookie.path.get_or_insert(value);
    } else if name.eq_ignore_ascii_case("$Domain") {
        prev.cookie.domain.get_or_insert(value);
    }
}

fn salvage(header: &str, parsed: &mut [Parsed], from: usize, to: usize) {
    let skipped = header[from..to].trim_matches(|c: char| c.is_whitespace() || c == ';' || c == ',');
    if skipped.is_empty() {
        return;
    }
    if let Some(prev) = parsed.last_mut() {
        reparse(&mut prev.cookie, &header[prev.value_start..to]);
    }
}

fn reparse(cookie: &mut Cookie, region: &str) {
    let mut value = String::with_capacity(region.len());
    let mut last = 0;
    for caps in ATTRIBUTE_FRAGMENT.captures_iter(region) {
        let (Some(whole), Some(attr), Some(attr_value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        value.push_str(&region[last..whole.start()]);
        last = whole.end();
        let attr_value = clean_value(attr_value.as_str());
        if attr.as_str().eq_ignore_ascii_case("path") {
            cookie.path = Some(attr_value);
        } else {
            cookie.domain = Some(attr_value);
        }
    }
    value.push_str(&region[last..]);
    cookie.value = clean_value(&value);
}

fn clean_value(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches([';', ','])
        .trim_end();
    let unquoted = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    unquoted.to_string()
}
