//! # Connection Acceptor
//!
//! Wires a context, listener and handshake engine for every accepted switch
//! connection, then speaks first.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use super::engine::{HandshakeDependencies, HandshakeEngine, HandshakeHandle};
use super::listener::HandshakeListenerImpl;
use crate::adapters::{
    ConnectionContextImpl, DeviceConnectionRateLimiter, LoggingErrorHandler, NoOpRateLimiter,
    SessionStatistics,
};
use crate::config::{ConfigError, HandshakeConfig};
use crate::domain::{CapabilitySet, HandshakeOutcome};
use crate::ports::{
    ConnectionAdapter, ConnectionRateLimiter, DeviceConnectedHandler, ErrorHandler,
    HandshakeManager,
};

/// A connection whose handshake is running.
pub struct AcceptedConnection {
    /// Connection context shared with upper layers
    pub context: Arc<ConnectionContextImpl>,
    /// Feed received HELLOs and connection loss here
    pub handshake: HandshakeHandle,
    /// Resolves with the handshake outcome
    pub outcome: JoinHandle<HandshakeOutcome>,
}

/// Entry point for freshly accepted switch connections.
pub struct ConnectionAcceptor {
    capabilities: Arc<CapabilitySet>,
    use_version_bitmap: bool,
    rate_limiter: Arc<dyn ConnectionRateLimiter>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    device_handler: Arc<dyn DeviceConnectedHandler>,
    statistics: Arc<SessionStatistics>,
}

impl ConnectionAcceptor {
    /// Acceptor configured from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the configured version order is invalid.
    pub fn new(
        config: &HandshakeConfig,
        device_handler: Arc<dyn DeviceConnectedHandler>,
        statistics: Arc<SessionStatistics>,
    ) -> Result<Self, ConfigError> {
        let rate_limiter: Arc<dyn ConnectionRateLimiter> =
            match config.device_connection_rate_limit_per_min {
                0 => Arc::new(NoOpRateLimiter::new()),
                limit => Arc::new(DeviceConnectionRateLimiter::new(limit)),
            };

        Ok(Self {
            capabilities: Arc::new(config.capability_set()?),
            use_version_bitmap: config.use_version_bitmap,
            rate_limiter,
            error_handler: None,
            device_handler,
            statistics,
        })
    }

    /// Share `rate_limiter` across all connections instead of the configured one.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn ConnectionRateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Report errors to `error_handler` instead of a per-connection log handler.
    #[must_use]
    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    /// Controller capability set.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Start the handshake on a new connection and send the first HELLO.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_switch_connected(&self, adapter: Arc<dyn ConnectionAdapter>) -> AcceptedConnection {
        let remote = adapter.remote_address();
        debug!(%remote, "Switch connected, starting handshake");

        let context = Arc::new(ConnectionContextImpl::new(adapter.clone()));
        let error_handler: Arc<dyn ErrorHandler> = match &self.error_handler {
            Some(handler) => handler.clone(),
            None => Arc::new(LoggingErrorHandler::for_remote(remote)),
        };
        let listener = Arc::new(HandshakeListenerImpl::new(
            context.clone(),
            self.device_handler.clone(),
            error_handler.clone(),
            self.statistics.clone(),
        ));

        let (handshake, outcome) = HandshakeEngine::spawn(
            self.capabilities.clone(),
            self.use_version_bitmap,
            HandshakeDependencies {
                adapter,
                listener,
                error_handler,
                rate_limiter: self.rate_limiter.clone(),
            },
        );
        handshake.shake(None);

        AcceptedConnection {
            context,
            handshake,
            outcome,
        }
    }
}
