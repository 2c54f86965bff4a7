//! # Handshake Flows
//!
//! Version negotiation, feature acquisition and admission control for whole
//! connections accepted through `ConnectionAcceptor`.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ofc_handshake::test_utils::{
        FixedRateLimiter, MockConnectionAdapter, RecordingErrorHandler, RecordingListener, Reply,
    };
    use ofc_handshake::{
        ConnectionContext, ConnectionEvent, ConnectionState, DatapathId, FeatureSet,
        HandshakeConfig, HandshakeDependencies, HandshakeEngine, HandshakeError, HandshakeManager,
        HandshakeOutcome, HelloMessage, ProtocolVersion, TransportError, VersionBitmap, Xid,
    };

    use crate::integration::{outcome_of, Controller, REMOTE};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn bitmap_hello(version: u8, xid: u32, versions: &[u8]) -> HelloMessage {
        let versions: Vec<ProtocolVersion> = versions.iter().copied().map(ProtocolVersion).collect();
        HelloMessage::with_bitmap(
            ProtocolVersion(version),
            Xid(xid),
            VersionBitmap::from_versions(&versions),
        )
    }

    fn plain_hello(version: u8, xid: u32) -> HelloMessage {
        HelloMessage::new(ProtocolVersion(version), Xid(xid))
    }

    fn config(order: &[u8], bitmap: bool) -> HandshakeConfig {
        HandshakeConfig {
            version_order: order.to_vec(),
            use_version_bitmap: bitmap,
            device_connection_rate_limit_per_min: 0,
        }
    }

    fn sent_xids(adapter: &MockConnectionAdapter) -> Vec<Xid> {
        let mut xids: Vec<Xid> = adapter.hellos().iter().map(|h| h.xid).collect();
        xids.extend(adapter.features_requests().iter().map(|f| f.xid));
        xids
    }

    // =============================================================================
    // SCENARIO A: BITMAP NEGOTIATION
    // =============================================================================

    #[tokio::test]
    async fn test_bitmap_symmetric_settles_on_highest() {
        let controller = Controller::new(config(&[4, 1], true));
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(42)),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(bitmap_hello(4, 7, &[4, 1, 0])));
        let outcome = outcome_of(accepted.outcome).await;

        assert_eq!(
            outcome,
            HandshakeOutcome::Success {
                version: ProtocolVersion(4),
                features: FeatureSet::for_datapath(42),
            }
        );
        // Only the opening HELLO; the peer's bitmap settles without another round
        let hellos = adapter.hellos();
        assert_eq!(hellos.len(), 1);
        assert_eq!(hellos[0].version, ProtocolVersion(4));
        assert_eq!(adapter.features_requests()[0].version, ProtocolVersion(4));
        assert_eq!(accepted.handshake.version(), Some(ProtocolVersion(4)));
        assert_eq!(accepted.context.connection_state(), ConnectionState::Working);
    }

    #[tokio::test]
    async fn test_bitmap_peer_speaks_first_echoes_incremented_xid() {
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(42)),
        );
        let listener = Arc::new(RecordingListener::new());
        let caps = match config(&[4, 1], true).capability_set() {
            Ok(caps) => caps,
            Err(error) => panic!("{error}"),
        };

        let (handle, join) = HandshakeEngine::spawn(
            Arc::new(caps),
            true,
            HandshakeDependencies {
                adapter: adapter.clone(),
                listener: listener.clone(),
                error_handler: Arc::new(RecordingErrorHandler::new()),
                rate_limiter: Arc::new(FixedRateLimiter::allow()),
            },
        );
        handle.shake(Some(bitmap_hello(4, 7, &[4, 1, 0])));
        let outcome = outcome_of(join).await;

        assert!(outcome.is_success());
        let hellos = adapter.hellos();
        assert_eq!(hellos.len(), 1);
        assert_eq!(hellos[0].xid, Xid(8));
        assert_eq!(adapter.features_requests()[0].xid, Xid(9));
        assert_eq!(
            listener.successes(),
            vec![(FeatureSet::for_datapath(42), ProtocolVersion(4))]
        );
    }

    // =============================================================================
    // SCENARIO B: STEP-BY-STEP DOWNGRADE
    // =============================================================================

    #[tokio::test]
    async fn test_stepwise_downgrade_to_peer_version() {
        let controller = Controller::new(HandshakeConfig::for_testing());
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(7)),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(1, 3)));
        let outcome = outcome_of(accepted.outcome).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Success { version, .. } if version == ProtocolVersion(1)
        ));
        let versions: Vec<ProtocolVersion> = adapter.hellos().iter().map(|h| h.version).collect();
        assert_eq!(versions, vec![ProtocolVersion(4), ProtocolVersion(1)]);
        assert_eq!(adapter.barriers()[0].version, ProtocolVersion(1));

        // Peer echoes the settled version after the fact
        accepted.handshake.shake(Some(plain_hello(1, 4)));
        assert_eq!(adapter.hellos().len(), 2);
    }

    #[tokio::test]
    async fn test_sent_xids_strictly_increase() {
        let controller = Controller::new(HandshakeConfig::for_testing());
        let adapter = Arc::new(MockConnectionAdapter::new(REMOTE));

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(1, 500)));
        outcome_of(accepted.outcome).await;

        let xids = sent_xids(&adapter);
        assert_eq!(xids, vec![Xid(21), Xid(501), Xid(502)]);
    }

    #[tokio::test]
    async fn test_peer_xid_at_range_end_does_not_wrap() {
        let controller = Controller::new(config(&[4, 1], false));
        let adapter = Arc::new(MockConnectionAdapter::new(REMOTE));

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(4, u32::MAX)));
        assert!(outcome_of(accepted.outcome).await.is_success());

        assert_eq!(sent_xids(&adapter), vec![Xid(21), Xid(22)]);
    }

    // =============================================================================
    // SCENARIO C: NO COMMON VERSION
    // =============================================================================

    #[tokio::test]
    async fn test_no_common_version_fails_and_closes() {
        let controller = Controller::new(config(&[4], true));
        let adapter = Arc::new(MockConnectionAdapter::new(REMOTE));

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(0, 1)));
        let outcome = outcome_of(accepted.outcome).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::NoCommonVersion(_))
        ));
        assert!(adapter.features_requests().is_empty());
        assert!(adapter.is_disconnected());
        assert_eq!(accepted.context.connection_state(), ConnectionState::Rip);
        assert_eq!(
            controller
                .statistics
                .count(REMOTE, ConnectionEvent::HandshakeFailed),
            1
        );
        assert_eq!(controller.errors.errors().len(), 1);
        assert_eq!(controller.device_handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_bitmap_without_common_version_fails() {
        let controller = Controller::new(config(&[4, 1], true));
        let adapter = Arc::new(MockConnectionAdapter::new(REMOTE));

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(bitmap_hello(3, 1, &[2, 3])));
        let outcome = outcome_of(accepted.outcome).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::NoCommonVersion(_))
        ));
        assert!(adapter.is_disconnected());
    }

    // =============================================================================
    // SCENARIO D: ADMISSION DENIED
    // =============================================================================

    #[tokio::test]
    async fn test_admission_denied_after_features() {
        let controller = Controller::new(config(&[4, 1], true));
        let limiter = Arc::new(FixedRateLimiter::deny());
        let acceptor = controller.acceptor.with_rate_limiter(limiter.clone());
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features(FeatureSet::for_datapath(42)),
        );

        let accepted = acceptor.on_switch_connected(adapter.clone());
        accepted.handshake.shake(Some(bitmap_hello(4, 7, &[4, 1])));
        let outcome = outcome_of(accepted.outcome).await;

        assert_eq!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::AdmissionDenied {
                datapath_id: DatapathId(42)
            })
        );
        assert_eq!(limiter.attempts(), 1);
        assert_eq!(adapter.disconnect_count(), 1);
        assert_eq!(accepted.context.closed_with_propagation(), Some(false));
        assert!(adapter.barriers().is_empty());
        assert_eq!(controller.device_handler.calls(), 0);
        assert_eq!(accepted.context.connection_state(), ConnectionState::Rip);
    }

    #[tokio::test]
    async fn test_configured_rate_limit_admits_burst_then_denies() {
        let mut cfg = config(&[4, 1], true);
        cfg.device_connection_rate_limit_per_min = 1;
        let controller = Controller::new(cfg);

        let first = Arc::new(MockConnectionAdapter::new("192.0.2.1:6653"));
        let accepted = controller.accept(&first);
        accepted.handshake.shake(Some(plain_hello(4, 1)));
        assert!(outcome_of(accepted.outcome).await.is_success());

        let second = Arc::new(MockConnectionAdapter::new("192.0.2.2:6653"));
        let accepted = controller.accept(&second);
        accepted.handshake.shake(Some(plain_hello(4, 1)));
        assert!(matches!(
            outcome_of(accepted.outcome).await,
            HandshakeOutcome::Failure(HandshakeError::AdmissionDenied { .. })
        ));
        assert_eq!(second.disconnect_count(), 1);
    }

    // =============================================================================
    // CANCELLATION AND TRANSPORT FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_connection_lost_before_features_reply() {
        let controller = Controller::new(config(&[4, 1], true));
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features_reply(Reply::Deferred),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(4, 2)));
        adapter.wait_for_features_requests(1).await;
        accepted.handshake.connection_lost();
        adapter.complete_features(Ok(FeatureSet::for_datapath(42)));
        let outcome = outcome_of(accepted.outcome).await;

        assert_eq!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::ConnectionClosed)
        );
        assert!(adapter.barriers().is_empty());
        assert_eq!(controller.device_handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_features_request_failure() {
        let controller = Controller::new(config(&[4, 1], true));
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features_reply(Reply::Immediate(Err(
                TransportError::Rejected("bad type".into()),
            ))),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(4, 2)));
        let outcome = outcome_of(accepted.outcome).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::SendFailed { .. })
        ));
        assert!(adapter.is_disconnected());
    }

    #[tokio::test]
    async fn test_hello_failure_fails_handshake() {
        let controller = Controller::new(config(&[4, 1], true));
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_hello_failure(TransportError::ConnectionClosed),
        );

        let accepted = controller.accept(&adapter);
        let outcome = outcome_of(accepted.outcome).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::SendFailed { .. })
        ));
        assert_eq!(controller.errors.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_while_features_pending_fails() {
        let controller = Controller::new(config(&[4, 1], true));
        let adapter = Arc::new(
            MockConnectionAdapter::new(REMOTE).with_features_reply(Reply::Deferred),
        );

        let accepted = controller.accept(&adapter);
        accepted.handshake.shake(Some(plain_hello(4, 2)));
        adapter.wait_for_features_requests(1).await;
        accepted.context.close_connection(false);
        let outcome = outcome_of(accepted.outcome).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failure(HandshakeError::SendFailed {
                cause: TransportError::ConnectionClosed,
                ..
            })
        ));
        assert_eq!(controller.device_handler.calls(), 0);
    }
}
