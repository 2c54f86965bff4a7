//! # Domain Entities
//!
//! Per-connection negotiation state, handshake phases and outcomes, and the
//! connection lifecycle seen by the post-handshake listener.

use super::errors::HandshakeError;
use super::messages::FeatureSet;
use super::value_objects::{ProtocolVersion, Xid};

/// Xid the engine counts from before it has heard from the peer.
pub const INITIAL_XID: Xid = Xid(20);

/// Peer xids closer than this to `u32::MAX` are not adopted, so the counter
/// has room for the rest of the handshake without wrapping.
pub(crate) const XID_HEADROOM: u32 = 1024;

// =============================================================================
// NEGOTIATION STATE
// =============================================================================

/// Mutable negotiation state, owned by exactly one handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationState {
    pub(crate) settled_version: Option<ProtocolVersion>,
    pub(crate) last_proposed_version: Option<ProtocolVersion>,
    pub(crate) last_received_version: Option<ProtocolVersion>,
    pub(crate) active_xid: Xid,
    pub(crate) use_bitmap_mode: bool,
}

impl NegotiationState {
    /// Fresh state for a new connection.
    pub fn new(use_bitmap_mode: bool) -> Self {
        Self {
            settled_version: None,
            last_proposed_version: None,
            last_received_version: None,
            active_xid: INITIAL_XID,
            use_bitmap_mode,
        }
    }

    /// Version both sides agreed on.
    pub fn settled_version(&self) -> Option<ProtocolVersion> {
        self.settled_version
    }

    /// Version carried by the last HELLO we sent.
    pub fn last_proposed_version(&self) -> Option<ProtocolVersion> {
        self.last_proposed_version
    }

    /// Peer version last seen by stall detection.
    pub fn last_received_version(&self) -> Option<ProtocolVersion> {
        self.last_received_version
    }

    /// Xid of the last message we sent (or the seed).
    pub fn active_xid(&self) -> Xid {
        self.active_xid
    }

    /// Whether bitmap negotiation is still allowed on this connection.
    pub fn use_bitmap_mode(&self) -> bool {
        self.use_bitmap_mode
    }

    /// Allocate the xid for the next outbound message.
    ///
    /// # Errors
    ///
    /// Fails with [`HandshakeError::XidExhausted`] instead of wrapping.
    pub(crate) fn next_xid(&mut self) -> Result<Xid, HandshakeError> {
        self.active_xid = self
            .active_xid
            .checked_next()
            .ok_or(HandshakeError::XidExhausted)?;
        Ok(self.active_xid)
    }

    /// Align the counter with the peer's xid.
    ///
    /// Before anything was sent the peer's xid is adopted as is; afterwards the
    /// counter never moves backwards. Peer xids within [`XID_HEADROOM`] of the
    /// top of the range are ignored.
    pub(crate) fn reseed_xid(&mut self, peer_xid: Xid) {
        if peer_xid.0 > u32::MAX - XID_HEADROOM {
            return;
        }
        if self.last_proposed_version.is_none() || peer_xid > self.active_xid {
            self.active_xid = peer_xid;
        }
    }
}

// =============================================================================
// HANDSHAKE PHASE
// =============================================================================

/// Handshake phase.
///
/// State Machine:
/// ```text
/// [AWAITING_FIRST_HELLO] ──peer hello──→ [NEGOTIATING]
///          │                                  │
///          └──────── bitmap / accepted ───────┴──→ [VERSION_SETTLED]
///                                                        │
///                                                 features request
///                                                        ↓
///                                               [FEATURES_REQUESTED]
///                                                        │
///                                     reply + admitted ──┴──→ [SUCCESS]
///
/// any fatal error ───────────────────────────────────────────→ [FAILED]
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Nothing received from the peer yet
    #[default]
    AwaitingFirstHello,
    /// Exchanging HELLOs
    Negotiating,
    /// Version agreed, features not yet requested
    VersionSettled,
    /// Waiting for the features reply
    FeaturesRequested,
    /// Terminal: handshake completed
    Success,
    /// Terminal: handshake aborted
    Failed,
}

impl HandshakePhase {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakePhase::Success | HandshakePhase::Failed)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Final result of one handshake. Produced exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Version settled and features obtained
    Success {
        /// Settled version
        version: ProtocolVersion,
        /// Device features
        features: FeatureSet,
    },
    /// Handshake aborted
    Failure(HandshakeError),
}

impl HandshakeOutcome {
    /// Whether the handshake succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, HandshakeOutcome::Success { .. })
    }
}

// =============================================================================
// CONNECTION LIFECYCLE
// =============================================================================

/// Connection state as tracked by the connection context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    #[default]
    Handshaking,
    /// Handshake done, device usable
    Working,
    /// Connection closed
    Rip,
}

/// Verdict of the device-connected handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Device accepted, keep the connection
    MayContinue,
    /// Another connection already owns this device
    AlreadyConnected,
    /// The controller is closing this device
    Closing,
}

/// Session lifecycle events counted per device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// Device fully connected after the barrier
    ConnectionCreated,
    /// Device rejected after a successful handshake
    ConnectionDisconnectedByController,
    /// Handshake itself failed
    HandshakeFailed,
}
