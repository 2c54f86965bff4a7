//! # Value Objects
//!
//! Immutable handshake primitives: protocol versions, transaction ids,
//! datapath identity and the controller's capability set.

use std::fmt;

// =============================================================================
// PROTOCOL VERSION
// =============================================================================

/// Wire protocol version as carried in every message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(pub u8);

impl ProtocolVersion {
    /// OpenFlow 1.0
    pub const OF10: ProtocolVersion = ProtocolVersion(0x01);
    /// OpenFlow 1.3
    pub const OF13: ProtocolVersion = ProtocolVersion(0x04);

    /// Raw version number.
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for ProtocolVersion {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TRANSACTION ID
// =============================================================================

/// Transaction id correlating a request with its reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Xid(pub u32);

impl Xid {
    /// Xid used for the post-handshake barrier.
    pub const ZERO: Xid = Xid(0);

    /// The following xid, or `None` once the 32-bit space is used up.
    pub fn checked_next(self) -> Option<Xid> {
        self.0.checked_add(1).map(Xid)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// DEVICE IDENTITY
// =============================================================================

/// 64-bit datapath id reported by the device in its features reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatapathId(pub u64);

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable inventory identifier derived from a datapath id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Prefix shared by every node identifier.
    pub const PREFIX: &'static str = "openflow:";

    /// Derive the node id for a datapath, e.g. `openflow:42`.
    pub fn from_datapath_id(datapath_id: DatapathId) -> Self {
        Self(format!("{}{}", Self::PREFIX, datapath_id.0))
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// VERSION BITMAP
// =============================================================================

/// Set of versions advertised in a HELLO element; bit `n` means version `n`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionBitmap {
    bits: Vec<bool>,
}

impl VersionBitmap {
    /// Bitmap from raw bits, index = version number.
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Bitmap with exactly the given versions set.
    pub fn from_versions(versions: &[ProtocolVersion]) -> Self {
        let len = versions
            .iter()
            .map(|v| usize::from(v.0) + 1)
            .max()
            .unwrap_or(0);
        let mut bits = vec![false; len];
        for version in versions {
            bits[usize::from(version.0)] = true;
        }
        Self { bits }
    }

    /// Whether `version` is advertised.
    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.bits
            .get(usize::from(version.0))
            .copied()
            .unwrap_or(false)
    }

    /// Advertised versions, ascending.
    pub fn versions(&self) -> Vec<ProtocolVersion> {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .filter_map(|(pos, _)| u8::try_from(pos).ok().map(ProtocolVersion))
            .collect()
    }

    /// Raw bits.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

// =============================================================================
// CAPABILITY SET
// =============================================================================

/// Versions this controller speaks, in descending preference.
///
/// Built once from configuration and shared read-only by every handshake.
/// Construction goes through [`crate::config::HandshakeConfig::capability_set`],
/// which guarantees a non-empty, strictly descending list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilitySet {
    highest: ProtocolVersion,
    versions: Vec<ProtocolVersion>,
}

impl CapabilitySet {
    /// Set from versions already in descending order; `None` when empty.
    pub(crate) fn from_descending(versions: Vec<ProtocolVersion>) -> Option<Self> {
        let highest = *versions.first()?;
        Some(Self { highest, versions })
    }

    /// Versions in descending preference order.
    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    /// The highest supported version (first in preference order).
    pub fn highest(&self) -> ProtocolVersion {
        self.highest
    }

    /// Bitmap advertising every supported version.
    pub fn bitmap(&self) -> VersionBitmap {
        VersionBitmap::from_versions(&self.versions)
    }
}
