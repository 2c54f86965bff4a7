//! # OFC Handshake
//!
//! Connection handshake for switch-to-controller sessions.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! For every accepted transport connection:
//! - negotiate a protocol version both sides speak, through HELLO version
//!   bitmaps or step-by-step downgrade
//! - request the device's features and apply admission control
//! - flush the device with a barrier before handing it to upper layers
//!
//! ## Failure Handling
//!
//! | Failure | Result |
//! |---------|--------|
//! | No common version | Handshake failed, connection closed |
//! | Peer repeats a rejected version | Handshake failed, connection closed |
//! | HELLO or features request fails | Handshake failed, connection closed |
//! | Admission denied | Transport disconnected, handshake failed |
//! | Device handler refuses | Connection force-closed after success |
//!
//! ## Module Structure
//!
//! ```text
//! ofc-handshake/
//! ├── domain/          # Versions, messages, negotiation state, errors
//! ├── algorithms/      # Version negotiator, handshake state machine
//! ├── ports/           # HandshakeManager (inbound) + collaborators (outbound)
//! ├── application/     # Engine task, post-handshake listener, acceptor
//! ├── adapters/        # Rate limiter, error handler, context, statistics
//! └── config.rs        # HandshakeConfig, TomlConfigProvider
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = TomlConfigProvider::load("controller.toml")?.config().clone();
//! let acceptor = ConnectionAcceptor::new(&config, device_handler, statistics)?;
//!
//! // For every accepted transport connection
//! let accepted = acceptor.on_switch_connected(adapter);
//! // For every HELLO read from that connection
//! accepted.handshake.shake(Some(hello));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

/// Test doubles for every outbound port.
///
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports
pub use adapters::{
    ConnectionContextImpl, DeviceConnectionRateLimiter, LoggingErrorHandler, NoOpRateLimiter,
    SessionStatistics,
};
pub use algorithms::{
    detect_stall, propose_common_bitmap_version, propose_next_version, Action, AfterHello,
    HandshakeEvent, HandshakeMachine,
};
pub use application::{
    AcceptedConnection, ConnectionAcceptor, HandshakeDependencies, HandshakeEngine,
    HandshakeHandle, HandshakeListenerImpl,
};
pub use config::{ConfigError, HandshakeConfig, TomlConfigProvider};
pub use domain::{
    BarrierInput, CapabilitySet, ConnectionEvent, ConnectionState, ConnectionStatus, DatapathId,
    DeviceConnectError, FeatureSet, GetFeaturesInput, HandshakeError, HandshakeOutcome,
    HandshakePhase, HelloElement, HelloInput, HelloMessage, MessageKind, NegotiationState, NodeId,
    ProtocolVersion, TransportError, VersionBitmap, Xid, INITIAL_XID,
};
pub use ports::{
    ConnectionAdapter, ConnectionContext, ConnectionRateLimiter, DeviceConnectedHandler,
    ErrorHandler, HandshakeListener, HandshakeManager, PendingReply,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
