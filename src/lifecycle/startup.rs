//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize metrics before traffic arrives
//! - Bind the listener and run the server until a stop signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{validate_config, AjpConfig, ValidationError};
use crate::cycle::Handler;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{AjpServer, Listener, ListenerError};
use crate::observability::metrics;

/// Error type for startup.
#[derive(Debug)]
pub enum StartupError {
    Config(Vec<ValidationError>),
    Listener(ListenerError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Config(errors) => {
                write!(f, "Invalid configuration: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            StartupError::Listener(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<ListenerError> for StartupError {
    fn from(e: ListenerError) -> Self {
        StartupError::Listener(e)
    }
}

/// Run `handler` behind an AJP listener until SIGINT/SIGTERM.
pub async fn serve(config: AjpConfig, handler: Arc<dyn Handler>) -> Result<(), StartupError> {
    validate_config(&config).map_err(StartupError::Config)?;

    if config.observability.metrics_enabled {
        // Address already checked by validation.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = AjpServer::new(&config, handler);

    let shutdown = Shutdown::new();
    let running = server.run(listener, shutdown.subscribe());
    tokio::pin!(running);

    tokio::select! {
        _ = &mut running => {}
        _ = signals::wait_for_signal() => {
            tracing::info!("Starting graceful shutdown");
            shutdown.trigger();
            running.await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::EchoHandler;

    #[tokio::test]
    async fn invalid_config_fails_before_binding() {
        let mut config = AjpConfig::default();
        config.listener.max_connections = 0;
        let err = serve(config, Arc::new(EchoHandler)).await.unwrap_err();
        assert!(matches!(err, StartupError::Config(ref e) if e.len() == 1));
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = AjpConfig::default();
        config.listener.bind_address = occupied.local_addr().unwrap().to_string();
        let err = serve(config, Arc::new(EchoHandler)).await.unwrap_err();
        assert!(matches!(err, StartupError::Listener(ListenerError::Bind(_))));
    }
}
