//! # Post-Handshake Flows
//!
//! Barrier synchronization and the device-connected handler after a
//! successful handshake.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use ofc_handshake::test_utils::{MockConnectionAdapter, Reply, StaticDeviceConnectedHandler};
    use ofc_handshake::{
        BarrierInput, ConnectionAcceptor, ConnectionContext, ConnectionEvent, ConnectionState,
        ConnectionStatus, DeviceConnectError, DeviceConnectedHandler, FeatureSet, HandshakeConfig,
        HandshakeError, HandshakeManager, HelloMessage, NodeId, ProtocolVersion, SessionStatistics,
        TransportError, Xid,
    };

    use crate::integration::{outcome_of, Controller, REMOTE};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Records what the upper layer sees when the device is handed over.
    #[derive(Default)]
    struct InspectingHandler {
        seen: Mutex<Vec<(ConnectionState, Option<NodeId>, Option<FeatureSet>)>>,
    }

    #[async_trait]
    impl DeviceConnectedHandler for InspectingHandler {
        async fn device_connected(
            &self,
            context: Arc<dyn ConnectionContext>,
        ) -> Result<ConnectionStatus, DeviceConnectError> {
            self.seen.lock().push((
                context.connection_state(),
                context.node_id(),
                context.features(),
            ));
            Ok(ConnectionStatus::MayContinue)
        }
    }

    fn hello(version: u8) -> Option<HelloMessage> {
        Some(HelloMessage::new(ProtocolVersion(version), Xid(1)))
    }

    // =============================================================================
    // BARRIER SYNCHRONIZATION
    // =============================================================================

    #[tokio::test]
    async fn test_barrier_uses_settled_version_and_zero_xid() {
        let controller = Controller::new(HandshakeConfig::default());
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(42)),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(hello(4));
        assert!(outcome_of(accepted.outcome).await.is_success());

        assert_eq!(
            adapter.barriers(),
            vec![BarrierInput {
                version: ProtocolVersion(4),
                xid: Xid::ZERO,
            }]
        );
        assert_eq!(controller.device_handler.calls(), 1);
        assert_eq!(
            controller
                .statistics
                .count("openflow:42", ConnectionEvent::ConnectionCreated),
            1
        );
        assert!(!adapter.is_disconnected());
    }

    #[tokio::test]
    async fn test_handler_runs_only_after_barrier_reply() {
        let controller = Controller::new(HandshakeConfig::default());
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_barrier_reply(Reply::Deferred),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(hello(4));
        adapter.wait_for_barriers(1).await;
        tokio::task::yield_now().await;

        assert_eq!(controller.device_handler.calls(), 0);
        assert_eq!(accepted.context.connection_state(), ConnectionState::Working);

        assert!(adapter.complete_barrier(Ok(())));
        assert!(outcome_of(accepted.outcome).await.is_success());
        assert_eq!(controller.device_handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_handler_sees_working_device_state() {
        let handler = Arc::new(InspectingHandler::default());
        let acceptor = ConnectionAcceptor::new(
            &HandshakeConfig::default(),
            handler.clone(),
            Arc::new(SessionStatistics::new()),
        )
        .unwrap();
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(9)),
        );

        let accepted = acceptor.on_switch_connected(adapter.clone());
        accepted.handshake.shake(hello(4));
        assert!(outcome_of(accepted.outcome).await.is_success());

        let seen = handler.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        let (state, node_id, features) = &seen[0];
        assert_eq!(*state, ConnectionState::Working);
        assert_eq!(node_id.as_ref().map(NodeId::as_str), Some("openflow:9"));
        assert_eq!(features.as_ref(), Some(&FeatureSet::for_datapath(9)));
    }

    #[tokio::test]
    async fn test_barrier_failure_closes_without_handler() {
        let controller = Controller::new(HandshakeConfig::default());
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE)
                .with_barrier_reply(Reply::Immediate(Err(TransportError::Io("reset".into())))),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(hello(4));
        assert!(outcome_of(accepted.outcome).await.is_success());

        assert_eq!(controller.device_handler.calls(), 0);
        assert!(adapter.is_disconnected());
        assert_eq!(accepted.context.closed_with_propagation(), Some(false));
        assert_eq!(
            controller
                .statistics
                .total(ConnectionEvent::ConnectionCreated),
            0
        );
    }

    #[tokio::test]
    async fn test_disconnect_during_barrier_skips_handler() {
        let controller = Controller::new(HandshakeConfig::default());
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_barrier_reply(Reply::Deferred),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(hello(4));
        adapter.wait_for_barriers(1).await;
        accepted.context.close_connection(true);
        assert!(outcome_of(accepted.outcome).await.is_success());

        assert_eq!(controller.device_handler.calls(), 0);
        assert_eq!(accepted.context.closed_with_propagation(), Some(true));
        assert_eq!(adapter.disconnect_count(), 1);
    }

    // =============================================================================
    // DEVICE HANDLER REJECTION
    // =============================================================================

    #[tokio::test]
    async fn test_handler_refusal_force_closes_device() {
        let controller = Controller::with_handler(
            HandshakeConfig::default(),
            StaticDeviceConnectedHandler::returning(ConnectionStatus::AlreadyConnected),
        );
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(5)),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(hello(4));
        assert!(outcome_of(accepted.outcome).await.is_success());

        assert!(adapter.is_disconnected());
        assert_eq!(accepted.context.closed_with_propagation(), Some(true));
        assert_eq!(
            controller.statistics.count(
                "openflow:5",
                ConnectionEvent::ConnectionDisconnectedByController
            ),
            1
        );
        assert_eq!(
            controller
                .statistics
                .count("openflow:5", ConnectionEvent::ConnectionCreated),
            0
        );
        assert!(matches!(
            controller.errors.errors().as_slice(),
            [HandshakeError::PostHandshakeCallbackFailed { device, .. }] if device == "openflow:5"
        ));
    }

    #[tokio::test]
    async fn test_handler_error_force_closes_device() {
        let controller = Controller::with_handler(
            HandshakeConfig::default(),
            StaticDeviceConnectedHandler::failing("ownership lookup failed"),
        );
        let adapter = Arc::new(MockConnectionAdapter::new(REMOTE));

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(hello(4));
        assert!(outcome_of(accepted.outcome).await.is_success());

        assert_eq!(accepted.context.connection_state(), ConnectionState::Rip);
        assert_eq!(accepted.context.closed_with_propagation(), Some(true));
        assert_eq!(
            controller
                .statistics
                .total(ConnectionEvent::ConnectionDisconnectedByController),
            1
        );
    }
}
