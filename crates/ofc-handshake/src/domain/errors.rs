//! # Domain Errors
//!
//! Error types for the connection handshake.

use thiserror::Error;

use super::messages::MessageKind;
use super::value_objects::{DatapathId, ProtocolVersion, Xid};

/// Fatal handshake failures. Each one ends the handshake in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Bitmap or stepwise negotiation found no version both sides speak.
    #[error("No common version: {0}")]
    NoCommonVersion(String),

    /// Peer repeated a version that was already rejected.
    #[error("Version negotiation stalled: version = {version}")]
    NegotiationStalled {
        /// The repeated version
        version: ProtocolVersion,
    },

    /// Transport failed to deliver a request or its reply.
    #[error("Sending {message} [xid={xid}] failed: {cause}")]
    SendFailed {
        /// Which request failed
        message: MessageKind,
        /// Its transaction id
        xid: Xid,
        /// Transport error
        #[source]
        cause: TransportError,
    },

    /// Admission control rejected the device after features were obtained.
    #[error("Device connection rate limit hit, denying datapath {datapath_id}")]
    AdmissionDenied {
        /// Rejected device
        datapath_id: DatapathId,
    },

    /// The device-connected handler failed or refused the device.
    #[error("Initial processing failed for device {device}: {reason}")]
    PostHandshakeCallbackFailed {
        /// Device identity
        device: String,
        /// Handler error or returned status
        reason: String,
    },

    /// Transport connection went away before the handshake finished.
    #[error("Connection closed during handshake")]
    ConnectionClosed,

    /// The transaction id counter reached the end of its range.
    #[error("Transaction ids exhausted")]
    XidExhausted,
}

/// Transport-level failure completing a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection was closed while the request was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The device answered with an error.
    #[error("rejected by device: {0}")]
    Rejected(String),

    /// I/O failure on the channel.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Failure raised by a device-connected handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device initialization failed: {0}")]
pub struct DeviceConnectError(pub String);
