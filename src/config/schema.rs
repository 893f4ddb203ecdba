//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the AJP
//! endpoint. All types derive Serde traits for deserialization from config
//! files; every section falls back to its defaults.

use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::protocol::Charset;

/// Root configuration for the AJP13 server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AjpConfig {
    /// Listener configuration (bind address, acceptor pool, limits).
    pub listener: ListenerConfig,

    /// Socket timeouts.
    pub timeouts: TimeoutConfig,

    /// Request decoding limits.
    pub request: RequestConfig,

    /// Session cookie and JVM route settings.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8009").
    pub bind_address: String,

    /// Acceptor tasks sharing the listening socket.
    pub acceptors: usize,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8009".to_string(),
            acceptors: 4,
            max_connections: 256,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on every packet read while a request is in flight.
    pub read_secs: u64,

    /// Bound on waiting for the next request on an idle connection.
    pub keep_alive_secs: u64,

    /// How long shutdown waits for in-flight connections.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 30,
            keep_alive_secs: 300,
            shutdown_grace_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Request decoding limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Maximum query + form parameters per request.
    pub max_parameters: usize,

    /// Maximum urlencoded form body in bytes.
    pub max_form_size: usize,

    /// Charset for string fields carrying non-ASCII bytes.
    pub default_charset: Charset,

    /// Request header copied verbatim onto the response (request-id correlation).
    pub echo_header: Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_parameters: 1000,
            max_form_size: 2 * 1024 * 1024, // 2MB
            default_charset: Charset::Utf8,
            echo_header: None,
        }
    }
}

/// Session affinity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// This node's route, appended to session ids as `<uid>.<route>`.
    pub jvm_route: Option<String>,

    /// Session cookie name.
    pub cookie_name: String,

    /// Mark session cookies `Secure` for clients outside `local_networks`.
    pub force_https: bool,

    /// Networks exempt from `force_https`.
    pub local_networks: Vec<IpNet>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jvm_route: None,
            cookie_name: "JSESSIONID".to_string(),
            force_https: false,
            local_networks: default_local_networks(),
        }
    }
}

fn default_local_networks() -> Vec<IpNet> {
    ["127.0.0.0/8", "::1/128", "10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"]
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9009".to_string(),
        }
    }
}
