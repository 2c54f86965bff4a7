//! # Version Negotiator
//!
//! Pure decisions about which protocol version to propose next.

use crate::domain::{CapabilitySet, HandshakeError, ProtocolVersion, VersionBitmap};

/// Highest supported version that is `<= remote`.
///
/// # Errors
///
/// `NoCommonVersion` when `remote` is below every supported version.
pub fn propose_next_version(
    remote: ProtocolVersion,
    capabilities: &CapabilitySet,
) -> Result<ProtocolVersion, HandshakeError> {
    capabilities
        .versions()
        .iter()
        .copied()
        .find(|offer| *offer <= remote)
        .ok_or_else(|| {
            HandshakeError::NoCommonVersion(format!(
                "no equal or lower version found, unsupported version: {remote}"
            ))
        })
}

/// First supported version, in preference order, advertised by any of the
/// peer's bitmaps.
///
/// # Errors
///
/// `NoCommonVersion` when no bitmap was received or none intersects the
/// capability set.
pub fn propose_common_bitmap_version(
    bitmaps: &[&VersionBitmap],
    capabilities: &CapabilitySet,
) -> Result<ProtocolVersion, HandshakeError> {
    if bitmaps.is_empty() {
        return Err(HandshakeError::NoCommonVersion(
            "no version bitmap received".to_string(),
        ));
    }

    capabilities
        .versions()
        .iter()
        .copied()
        .find(|version| bitmaps.iter().any(|bitmap| bitmap.supports(*version)))
        .ok_or_else(|| {
            HandshakeError::NoCommonVersion("no common version found in version bitmap".to_string())
        })
}

/// Whether the peer repeated the version it sent in the previous round.
pub fn detect_stall(remote: ProtocolVersion, last_received: Option<ProtocolVersion>) -> bool {
    last_received == Some(remote)
}
