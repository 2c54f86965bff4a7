//! # Handshake Listener
//!
//! Takes over a connection once its handshake finished: stores the device
//! identity, flushes the device with a barrier and hands it to the upper
//! layer, or closes the connection after a failure.

use std::sync::Arc;

use async_trait::async_trait;
use ofc_telemetry::log_device_event;
use tracing::{debug, warn};

use crate::adapters::SessionStatistics;
use crate::domain::{
    BarrierInput, ConnectionEvent, ConnectionState, ConnectionStatus, FeatureSet,
    HandshakeError, MessageKind, NodeId, ProtocolVersion, Xid,
};
use crate::ports::{ConnectionContext, DeviceConnectedHandler, ErrorHandler, HandshakeListener};

/// Production [`HandshakeListener`].
pub struct HandshakeListenerImpl {
    context: Arc<dyn ConnectionContext>,
    device_handler: Arc<dyn DeviceConnectedHandler>,
    error_handler: Arc<dyn ErrorHandler>,
    statistics: Arc<SessionStatistics>,
}

impl HandshakeListenerImpl {
    /// Listener for one connection.
    pub fn new(
        context: Arc<dyn ConnectionContext>,
        device_handler: Arc<dyn DeviceConnectedHandler>,
        error_handler: Arc<dyn ErrorHandler>,
        statistics: Arc<SessionStatistics>,
    ) -> Self {
        Self {
            context,
            device_handler,
            error_handler,
            statistics,
        }
    }

    async fn on_barrier_done(&self, device: &NodeId) {
        if self.context.connection_state() != ConnectionState::Working {
            debug!(%device, "Connection closed before barrier completed");
            return;
        }

        match self.device_handler.device_connected(self.context.clone()).await {
            Ok(ConnectionStatus::MayContinue) => {
                self.statistics
                    .record(device.as_str(), ConnectionEvent::ConnectionCreated);
                log_device_event!(info, "Connect", device);
            }
            Ok(status) => self.reject(device, format!("handler returned {status:?}")),
            Err(error) => self.reject(device, error.to_string()),
        }
    }

    fn reject(&self, device: &NodeId, reason: String) {
        let error = HandshakeError::PostHandshakeCallbackFailed {
            device: device.to_string(),
            reason,
        };
        warn!(%error, "Rejecting device after handshake");
        self.error_handler.handle(&error);
        self.context.close_connection(true);
        self.statistics.record(
            device.as_str(),
            ConnectionEvent::ConnectionDisconnectedByController,
        );
    }
}

#[async_trait]
impl HandshakeListener for HandshakeListenerImpl {
    async fn on_handshake_successful(&self, features: FeatureSet, version: ProtocolVersion) {
        let device = NodeId::from_datapath_id(features.datapath_id);
        let remote = self.context.connection_adapter().remote_address();
        log_device_event!(
            debug,
            "Handshake successful",
            device,
            remote = %remote,
            version = %version,
            auxiliary_id = features.auxiliary_id
        );

        self.context.change_state_to_working();
        self.context.set_features(features);
        self.context.set_node_id(device.clone());

        let barrier = BarrierInput {
            version,
            xid: Xid::ZERO,
        };
        match self.context.connection_adapter().barrier(barrier).await {
            Ok(()) => self.on_barrier_done(&device).await,
            Err(cause) => {
                let error = HandshakeError::SendFailed {
                    message: MessageKind::Barrier,
                    xid: Xid::ZERO,
                    cause,
                };
                debug!(%device, %error, "Barrier after handshake failed");
                self.context.close_connection(false);
            }
        }
    }

    async fn on_handshake_failure(&self) {
        let remote = self.context.connection_adapter().remote_address();
        debug!(%remote, "Handshake failed, closing connection");
        self.statistics
            .record(&remote, ConnectionEvent::HandshakeFailed);
        self.context.close_connection(false);
    }
}
