//! # Inbound Ports
//!
//! API the transport layer drives for each accepted connection.

use crate::domain::HelloMessage;

/// Per-connection handshake entry point - inbound port.
///
/// Calls never block; each one is queued to the connection's engine and
/// processed in order.
pub trait HandshakeManager: Send + Sync {
    /// Feed one HELLO from the device, or `None` to let the controller
    /// speak first.
    fn shake(&self, received: Option<HelloMessage>);

    /// The transport connection went away.
    fn connection_lost(&self);
}
