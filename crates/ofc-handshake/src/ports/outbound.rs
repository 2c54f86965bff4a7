//! # Outbound Ports
//!
//! Collaborators the handshake depends on: the transport, diagnostics sink,
//! completion listener, admission control, connection context and the
//! device-connected handler.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::domain::{
    BarrierInput, ConnectionState, ConnectionStatus, DeviceConnectError, FeatureSet,
    GetFeaturesInput, HandshakeError, HelloInput, NodeId, ProtocolVersion, TransportError,
};

/// Reply to a request issued on the transport. Completes exactly once.
pub type PendingReply<T> = BoxFuture<'static, Result<T, TransportError>>;

/// Transport connection to one device - outbound port.
///
/// Requests are enqueued when the method is called; the returned future only
/// waits for the outcome.
pub trait ConnectionAdapter: Send + Sync {
    /// Send a HELLO.
    fn hello(&self, input: HelloInput) -> PendingReply<()>;

    /// Send a FEATURES_REQUEST and wait for the reply.
    fn get_features(&self, input: GetFeaturesInput) -> PendingReply<FeatureSet>;

    /// Send a BARRIER_REQUEST and wait for the reply.
    fn barrier(&self, input: BarrierInput) -> PendingReply<()>;

    /// Close the transport.
    fn disconnect(&self);

    /// Remote address, for diagnostics.
    fn remote_address(&self) -> String;
}

/// Diagnostics sink - outbound port.
pub trait ErrorHandler: Send + Sync {
    /// Record a handshake error.
    fn handle(&self, error: &HandshakeError);
}

/// Receives the single outcome of a handshake - outbound port.
#[async_trait]
pub trait HandshakeListener: Send + Sync {
    /// Version settled and features obtained.
    async fn on_handshake_successful(&self, features: FeatureSet, version: ProtocolVersion);

    /// Handshake aborted.
    async fn on_handshake_failure(&self);
}

/// Process-wide admission control - outbound port.
pub trait ConnectionRateLimiter: Send + Sync {
    /// Take one admission if available. Never blocks.
    fn try_acquire(&self) -> bool;
}

/// Connection state owned by the device session layer - outbound port.
pub trait ConnectionContext: Send + Sync {
    /// Transport of this connection.
    fn connection_adapter(&self) -> Arc<dyn ConnectionAdapter>;

    /// Current lifecycle state.
    fn connection_state(&self) -> ConnectionState;

    /// Mark the handshake as done.
    fn change_state_to_working(&self);

    /// Store the device features.
    fn set_features(&self, features: FeatureSet);

    /// Stored device features.
    fn features(&self) -> Option<FeatureSet>;

    /// Store the device identifier.
    fn set_node_id(&self, node_id: NodeId);

    /// Stored device identifier.
    fn node_id(&self) -> Option<NodeId>;

    /// Close the connection. `propagate` also tears down device state held
    /// by upper layers.
    fn close_connection(&self, propagate: bool);
}

/// Upper-layer hook invoked once the device is barrier-synchronized.
#[async_trait]
pub trait DeviceConnectedHandler: Send + Sync {
    /// Decide whether the connection may continue.
    async fn device_connected(
        &self,
        context: Arc<dyn ConnectionContext>,
    ) -> Result<ConnectionStatus, DeviceConnectError>;
}
