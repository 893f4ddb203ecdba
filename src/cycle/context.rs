//! Per-server state shared by every request cycle.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AjpConfig;
use crate::http::ForwardRequestDecoder;
use crate::session::{AcceptAllSessions, LongRunningRegistry, SessionAffinity, SessionValidator};

use super::Handler;

/// Limits and timeouts a cycle applies, resolved once from [`AjpConfig`].
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub read_timeout: Duration,
    pub keep_alive: Duration,
    pub max_form_size: usize,
    pub max_parameters: usize,
    pub echo_header: Option<String>,
    pub decoder: ForwardRequestDecoder,
}

impl CycleSettings {
    pub fn from_config(config: &AjpConfig) -> Self {
        Self {
            read_timeout: config.timeouts.read(),
            keep_alive: config.timeouts.keep_alive(),
            max_form_size: config.request.max_form_size,
            max_parameters: config.request.max_parameters,
            echo_header: config.request.echo_header.clone().filter(|h| !h.is_empty()),
            decoder: ForwardRequestDecoder::from_config(config),
        }
    }
}

/// Everything a [`RequestCycle`](super::RequestCycle) borrows from the server.
pub struct CycleContext {
    pub settings: CycleSettings,
    pub affinity: SessionAffinity,
    pub registry: LongRunningRegistry,
    pub validator: Arc<dyn SessionValidator>,
    pub handler: Arc<dyn Handler>,
}

impl CycleContext {
    pub fn new(config: &AjpConfig, handler: Arc<dyn Handler>) -> Self {
        Self {
            settings: CycleSettings::from_config(config),
            affinity: SessionAffinity::from_config(&config.session),
            registry: LongRunningRegistry::new(),
            validator: Arc::new(AcceptAllSessions),
            handler,
        }
    }

    pub fn with_session_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Share an existing registry, e.g. with an external request watcher.
    pub fn with_registry(mut self, registry: LongRunningRegistry) -> Self {
        self.registry = registry;
        self
    }
}

impl std::fmt::Debug for CycleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleContext")
            .field("settings", &self.settings)
            .field("affinity", &self.affinity)
            .field("long_running_in_flight", &self.registry.in_flight())
            .finish_non_exhaustive()
    }
}
