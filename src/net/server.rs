//! AJP connection server.
//!
//! # Responsibilities
//! - Start a fixed pool of acceptor tasks behind a shared start gate
//! - Spawn one request-cycle task per accepted connection
//! - Stop accepting on shutdown and drain live connections
//!
//! # Design Decisions
//! - Acceptors share one `Listener`; its semaphore is the worker-pool bound
//! - A connection failure ends only its own task
//! - Drain is bounded by the configured grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Barrier;
use tracing::Instrument;

use crate::config::AjpConfig;
use crate::cycle::{CycleContext, Handler, RequestCycle};
use crate::lifecycle::ShutdownSignal;
use crate::session::{LongRunningRegistry, SessionValidator};

use super::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Serves AJP13 connections with one application handler.
pub struct AjpServer {
    ctx: CycleContext,
    tracker: ConnectionTracker,
    shutdown_grace: Duration,
}

impl AjpServer {
    pub fn new(config: &AjpConfig, handler: Arc<dyn Handler>) -> Self {
        Self {
            ctx: CycleContext::new(config, handler),
            tracker: ConnectionTracker::new(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        }
    }

    pub fn with_session_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.ctx = self.ctx.with_session_validator(validator);
        self
    }

    pub fn with_registry(mut self, registry: LongRunningRegistry) -> Self {
        self.ctx = self.ctx.with_registry(registry);
        self
    }

    /// Shared handle to the long-running registry, for external watchers.
    pub fn registry(&self) -> LongRunningRegistry {
        self.ctx.registry.clone()
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, shutdown: ShutdownSignal) {
        let ctx = Arc::new(self.ctx);
        let listener = Arc::new(listener);
        let acceptors = listener.acceptors();
        let gate = Arc::new(Barrier::new(acceptors + 1));

        let handles: Vec<_> = (0..acceptors)
            .map(|index| {
                tokio::spawn(accept_loop(
                    index,
                    Arc::clone(&listener),
                    Arc::clone(&gate),
                    Arc::clone(&ctx),
                    self.tracker.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        gate.wait().await;
        tracing::info!(
            acceptors,
            max_connections = listener.max_connections(),
            "AJP server accepting connections"
        );

        let mut stop = shutdown;
        stop.wait().await;
        tracing::info!("Shutdown signalled; no longer accepting connections");
        listener.close();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Acceptor task failed");
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, grace = ?self.shutdown_grace, "Draining connections");
        }
        match tokio::time::timeout(self.shutdown_grace, self.tracker.wait_for_drain()).await {
            Ok(()) => tracing::info!("AJP server stopped"),
            Err(_) => tracing::warn!(
                remaining = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            ),
        }
    }
}

async fn accept_loop(
    index: usize,
    listener: Arc<Listener>,
    gate: Arc<Barrier>,
    ctx: Arc<CycleContext>,
    tracker: ConnectionTracker,
    mut shutdown: ShutdownSignal,
) {
    gate.wait().await;
    tracing::debug!(acceptor = index, "Acceptor started");

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.wait() => None,
            accepted = listener.accept() => Some(accepted),
        };

        match accepted {
            None | Some(Err(ListenerError::Closed)) => break,
            Some(Ok((stream, peer, permit))) => {
                spawn_connection(stream, peer, permit, &ctx, &tracker, shutdown.clone());
            }
            Some(Err(e)) => {
                tracing::warn!(acceptor = index, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }

    tracing::debug!(acceptor = index, "Acceptor stopped");
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    ctx: &Arc<CycleContext>,
    tracker: &ConnectionTracker,
    shutdown: ShutdownSignal,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let guard = tracker.track();
    let id = guard.id();
    let (reader, writer) = stream.into_split();
    let cycle = RequestCycle::new(id, Arc::clone(ctx), Box::new(reader), Box::new(writer));
    let span = tracing::info_span!("ajp_connection", connection_id = %id, peer_addr = %peer);

    tokio::spawn(
        async move {
            let _permit = permit;
            let _guard = guard;
            tracing::debug!("Connection opened");
            // Failures are logged by the cycle itself.
            let _ = cycle.run(shutdown).await;
        }
        .instrument(span),
    );
}
