//! # Handshake State Machine
//!
//! Drives version negotiation, the features request and admission control
//! for one connection. The machine performs no I/O: every input is a
//! [`HandshakeEvent`] and every side effect comes back as an [`Action`] for
//! the engine to execute. Completions of asynchronous sends re-enter as
//! events, so all state changes happen inside [`HandshakeMachine::handle`].

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::version_negotiator::{detect_stall, propose_common_bitmap_version, propose_next_version};
use crate::domain::{
    CapabilitySet, FeatureSet, GetFeaturesInput, HandshakeError, HandshakeOutcome,
    HandshakePhase, HelloElement, HelloInput, HelloMessage, MessageKind, NegotiationState,
    ProtocolVersion, TransportError, Xid,
};
use crate::ports::ConnectionRateLimiter;

/// What to do once a sent HELLO has been delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterHello {
    /// Wait for the peer's next HELLO.
    Wait,
    /// Compare the peer version received earlier against our proposal.
    ContinueStepByStep {
        /// Peer version that triggered the send
        remote: ProtocolVersion,
    },
    /// Settle on this version and request features.
    Settle(ProtocolVersion),
}

/// Input to the state machine.
#[derive(Debug)]
pub enum HandshakeEvent {
    /// HELLO from the peer, or `None` to initiate.
    Hello(Option<HelloMessage>),
    /// A HELLO send completed.
    HelloSent {
        /// Xid of the sent HELLO
        xid: Xid,
        /// Delivery result
        result: Result<(), TransportError>,
        /// Continuation chosen when the HELLO was sent
        then: AfterHello,
    },
    /// The features request completed.
    FeaturesReceived {
        /// Xid of the request
        xid: Xid,
        /// Reply or failure
        result: Result<FeatureSet, TransportError>,
    },
    /// The transport connection was lost.
    ConnectionLost,
}

/// Side effect requested by the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send a HELLO and report back with `then`.
    SendHello {
        /// Message to send
        input: HelloInput,
        /// Continuation after delivery
        then: AfterHello,
    },
    /// Send a FEATURES_REQUEST.
    RequestFeatures(GetFeaturesInput),
    /// Pass an error to the diagnostics sink.
    ReportError(HandshakeError),
    /// Notify the listener of success.
    NotifySuccess {
        /// Device features
        features: FeatureSet,
        /// Settled version
        version: ProtocolVersion,
    },
    /// Notify the listener of failure.
    NotifyFailure,
}

/// Per-connection handshake state machine.
pub struct HandshakeMachine {
    capabilities: Arc<CapabilitySet>,
    rate_limiter: Arc<dyn ConnectionRateLimiter>,
    state: NegotiationState,
    phase: HandshakePhase,
    pending_features_xid: Option<Xid>,
    outcome: Option<HandshakeOutcome>,
    actions: Vec<Action>,
}

impl HandshakeMachine {
    /// New machine for a freshly accepted connection.
    pub fn new(
        capabilities: Arc<CapabilitySet>,
        use_version_bitmap: bool,
        rate_limiter: Arc<dyn ConnectionRateLimiter>,
    ) -> Self {
        Self {
            capabilities,
            rate_limiter,
            state: NegotiationState::new(use_version_bitmap),
            phase: HandshakePhase::default(),
            pending_features_xid: None,
            outcome: None,
            actions: Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Negotiation state.
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Terminal outcome, once reached.
    pub fn outcome(&self) -> Option<&HandshakeOutcome> {
        self.outcome.as_ref()
    }

    /// Apply one event and return the side effects to execute, in order.
    pub fn handle(&mut self, event: HandshakeEvent) -> Vec<Action> {
        if self.phase.is_terminal() {
            trace!(phase = ?self.phase, ?event, "Handshake finished, ignoring event");
            return Vec::new();
        }

        let result = match event {
            HandshakeEvent::Hello(received) => self.on_hello(received),
            HandshakeEvent::HelloSent { xid, result, then } => {
                self.on_hello_sent(xid, result, then)
            }
            HandshakeEvent::FeaturesReceived { xid, result } => self.on_features(xid, result),
            HandshakeEvent::ConnectionLost => Err(HandshakeError::ConnectionClosed),
        };

        if let Err(error) = result {
            self.fail(error);
        }

        std::mem::take(&mut self.actions)
    }

    // =========================================================================
    // HELLO handling
    // =========================================================================

    fn on_hello(&mut self, received: Option<HelloMessage>) -> Result<(), HandshakeError> {
        if let Some(version) = self.state.settled_version {
            trace!(%version, "Version already settled, ignoring hello");
            return Ok(());
        }

        let Some(hello) = received else {
            if self.state.last_proposed_version.is_none() {
                let highest = self.capabilities.highest();
                self.send_hello(highest, AfterHello::Wait)?;
            }
            return Ok(());
        };

        trace!(version = %hello.version, xid = %hello.xid, "Processing peer hello");
        self.state.reseed_xid(hello.xid);
        self.phase = HandshakePhase::Negotiating;

        match hello.version_bitmaps() {
            Some(bitmaps) if self.state.use_bitmap_mode => {
                let version = propose_common_bitmap_version(&bitmaps, &self.capabilities)?;
                if self.state.last_proposed_version.is_none() {
                    self.send_hello(version, AfterHello::Settle(version))
                } else {
                    self.settle(version)
                }
            }
            bitmaps => {
                if bitmaps.is_none() && self.state.use_bitmap_mode {
                    debug!("Peer sent no version bitmap, negotiating step by step");
                    self.state.use_bitmap_mode = false;
                }
                self.step_by_step(hello.version)
            }
        }
    }

    fn step_by_step(&mut self, remote: ProtocolVersion) -> Result<(), HandshakeError> {
        if self.state.last_proposed_version.is_some() {
            return self.compare_with_proposal(remote);
        }

        let proposed = propose_next_version(remote, &self.capabilities)?;
        self.send_hello(proposed, AfterHello::ContinueStepByStep { remote })
    }

    fn compare_with_proposal(&mut self, remote: ProtocolVersion) -> Result<(), HandshakeError> {
        let ceiling = self
            .state
            .last_proposed_version
            .unwrap_or_else(|| self.capabilities.highest());

        if remote >= ceiling {
            return self.settle(ceiling);
        }

        if detect_stall(remote, self.state.last_received_version) {
            return Err(HandshakeError::NegotiationStalled { version: remote });
        }
        self.state.last_received_version = Some(remote);

        // Peer already offered this version; settle as soon as ours is issued.
        let proposed = propose_next_version(remote, &self.capabilities)?;
        self.send_hello(proposed, AfterHello::Wait)?;
        if proposed == remote {
            self.settle(proposed)?;
        }
        Ok(())
    }

    fn on_hello_sent(
        &mut self,
        xid: Xid,
        result: Result<(), TransportError>,
        then: AfterHello,
    ) -> Result<(), HandshakeError> {
        result.map_err(|cause| HandshakeError::SendFailed {
            message: MessageKind::Hello,
            xid,
            cause,
        })?;
        trace!(%xid, ?then, "Hello delivered");

        if self.state.settled_version.is_some() {
            return Ok(());
        }

        match then {
            AfterHello::Wait => Ok(()),
            AfterHello::ContinueStepByStep { remote } => self.compare_with_proposal(remote),
            AfterHello::Settle(version) => self.settle(version),
        }
    }

    fn send_hello(
        &mut self,
        version: ProtocolVersion,
        then: AfterHello,
    ) -> Result<(), HandshakeError> {
        let xid = self.state.next_xid()?;
        self.state.last_proposed_version = Some(version);
        self.actions.push(Action::SendHello {
            input: HelloInput {
                version,
                xid,
                elements: vec![HelloElement::VersionBitmap(self.capabilities.bitmap())],
            },
            then,
        });
        Ok(())
    }

    // =========================================================================
    // Features and admission
    // =========================================================================

    fn settle(&mut self, version: ProtocolVersion) -> Result<(), HandshakeError> {
        self.state.settled_version = Some(version);
        self.phase = HandshakePhase::VersionSettled;
        info!(%version, "Protocol version settled");

        let xid = self.state.next_xid()?;
        self.pending_features_xid = Some(xid);
        self.phase = HandshakePhase::FeaturesRequested;
        self.actions
            .push(Action::RequestFeatures(GetFeaturesInput { version, xid }));
        Ok(())
    }

    fn on_features(
        &mut self,
        xid: Xid,
        result: Result<FeatureSet, TransportError>,
    ) -> Result<(), HandshakeError> {
        if self.pending_features_xid != Some(xid) {
            trace!(%xid, "Ignoring stale features reply");
            return Ok(());
        }
        self.pending_features_xid = None;

        let features = result.map_err(|cause| HandshakeError::SendFailed {
            message: MessageKind::FeaturesRequest,
            xid,
            cause,
        })?;
        let Some(version) = self.state.settled_version else {
            return Ok(());
        };

        if !self.rate_limiter.try_acquire() {
            return Err(HandshakeError::AdmissionDenied {
                datapath_id: features.datapath_id,
            });
        }

        self.phase = HandshakePhase::Success;
        self.outcome = Some(HandshakeOutcome::Success {
            version,
            features: features.clone(),
        });
        self.actions
            .push(Action::NotifySuccess { features, version });
        Ok(())
    }

    fn fail(&mut self, error: HandshakeError) {
        warn!(%error, phase = ?self.phase, "Handshake failed");

        self.actions.clear();
        self.phase = HandshakePhase::Failed;
        self.pending_features_xid = None;
        self.actions.push(Action::ReportError(error.clone()));
        self.actions.push(Action::NotifyFailure);
        self.outcome = Some(HandshakeOutcome::Failure(error));
    }
}
