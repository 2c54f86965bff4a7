//! In-memory connection context.

use std::sync::Arc;

use ofc_telemetry::log_device_event;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{ConnectionState, FeatureSet, NodeId};
use crate::ports::{ConnectionAdapter, ConnectionContext};

#[derive(Debug, Default)]
struct ContextState {
    state: ConnectionState,
    features: Option<FeatureSet>,
    node_id: Option<NodeId>,
    closed_with_propagation: Option<bool>,
}

/// Connection context for one accepted transport connection.
pub struct ConnectionContextImpl {
    adapter: Arc<dyn ConnectionAdapter>,
    inner: RwLock<ContextState>,
}

impl ConnectionContextImpl {
    /// Context for a connection still handshaking.
    pub fn new(adapter: Arc<dyn ConnectionAdapter>) -> Self {
        Self {
            adapter,
            inner: RwLock::new(ContextState::default()),
        }
    }

    /// `Some(propagate)` once the connection was closed.
    pub fn closed_with_propagation(&self) -> Option<bool> {
        self.inner.read().closed_with_propagation
    }

    fn device_label(&self) -> String {
        match &self.inner.read().node_id {
            Some(node_id) => node_id.to_string(),
            None => self.adapter.remote_address(),
        }
    }
}

impl ConnectionContext for ConnectionContextImpl {
    fn connection_adapter(&self) -> Arc<dyn ConnectionAdapter> {
        self.adapter.clone()
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.read().state
    }

    fn change_state_to_working(&self) {
        let mut inner = self.inner.write();
        if inner.state == ConnectionState::Handshaking {
            inner.state = ConnectionState::Working;
        }
    }

    fn set_features(&self, features: FeatureSet) {
        self.inner.write().features = Some(features);
    }

    fn features(&self) -> Option<FeatureSet> {
        self.inner.read().features.clone()
    }

    fn set_node_id(&self, node_id: NodeId) {
        self.inner.write().node_id = Some(node_id);
    }

    fn node_id(&self) -> Option<NodeId> {
        self.inner.read().node_id.clone()
    }

    fn close_connection(&self, propagate: bool) {
        {
            let mut inner = self.inner.write();
            if inner.state == ConnectionState::Rip {
                debug!(propagate, "Connection already closed");
                return;
            }
            inner.state = ConnectionState::Rip;
            inner.closed_with_propagation = Some(propagate);
        }

        self.adapter.disconnect();
        log_device_event!(info, "Disconnect", self.device_label(), propagate = propagate);
    }
}
