//! Error handler writing every handshake error to the log.

use tracing::warn;

use crate::domain::HandshakeError;
use crate::ports::ErrorHandler;

/// Reports errors through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingErrorHandler {
    remote: Option<String>,
}

impl LoggingErrorHandler {
    /// Handler without connection context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler tagging every record with the connection's remote address.
    pub fn for_remote(remote: impl Into<String>) -> Self {
        Self {
            remote: Some(remote.into()),
        }
    }
}

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, error: &HandshakeError) {
        match &self.remote {
            Some(remote) => warn!(%remote, %error, "Handshake error"),
            None => warn!(%error, "Handshake error"),
        }
    }
}
