//! Decoded request half of an HTTP exchange.
//!
//! # Responsibilities
//! - Hold everything the Forward Request packet carried
//! - Expose typed lookups for headers, cookies, attributes and parameters
//! - Derive servlet path / path info once the application reports its match

use std::collections::HashMap;
use std::net::IpAddr;

use super::{Cookie, HeaderList};

/// How the application matched the request URI to a servlet mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServletMatch {
    /// Exact path mapping; there is no path info.
    Exact(String),
    /// Prefix mapping (`/prefix/*`); path info is the remainder.
    Prefix(String),
    /// Catch-all mapping; the full URI is the path info.
    Wildcard,
}

/// The request as forwarded by the web server.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub protocol: String,
    /// URI path without query string and without a `;jsessionid=` segment.
    pub request_uri: String,
    pub query_string: Option<String>,
    pub remote_addr: String,
    pub remote_host: String,
    /// From the `AJP_REMOTE_PORT` request attribute; 0 when absent.
    pub remote_port: u16,
    pub server_name: String,
    pub server_port: u16,
    pub secure: bool,
    pub headers: HeaderList,
    pub cookies: Vec<Cookie>,
    pub attributes: HashMap<String, String>,
    pub parameters: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Session id the client asked for, before affinity checks.
    pub requested_session_id: Option<String>,
    pub session_id_from_url: bool,
    /// Session id after affinity checks.
    pub session_id: Option<String>,
    servlet_path: String,
    path_info: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First value of a request parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameter_values(name).next()
    }

    pub fn parameter_values<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
        self.parameters
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remote_user(&self) -> Option<&str> {
        self.attribute("remote_user").filter(|u| !u.is_empty())
    }

    pub fn auth_type(&self) -> Option<&str> {
        self.attribute("auth_type").filter(|t| !t.is_empty())
    }

    /// Client address as an IP, when the web server sent a literal one.
    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_addr.trim().parse().ok()
    }

    pub fn context_path(&self) -> &str {
        self.attribute("context").unwrap_or("")
    }

    pub fn is_form_data(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            ct.trim_start()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
    }

    /// Hook for the application to report its servlet mapping.
    pub fn set_servlet_match(&mut self, matched: ServletMatch) {
        match matched {
            ServletMatch::Exact(path) => {
                self.servlet_path = path;
                self.path_info = None;
            }
            ServletMatch::Prefix(prefix) => {
                let rest = self
                    .request_uri
                    .strip_prefix(prefix.as_str())
                    .unwrap_or("")
                    .to_string();
                self.servlet_path = prefix;
                self.path_info = (!rest.is_empty()).then_some(rest);
            }
            ServletMatch::Wildcard => {
                self.servlet_path = String::new();
                self.path_info = Some(self.request_uri.clone());
            }
        }
    }

    pub fn servlet_path(&self) -> &str {
        &self.servlet_path
    }

    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }
}
