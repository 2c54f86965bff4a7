//! # Handshake Messages
//!
//! Typed protocol messages exchanged during connection setup. Byte-level
//! encoding belongs to the transport; these carry only header fields and
//! the payload the handshake reads.

use super::value_objects::{DatapathId, ProtocolVersion, VersionBitmap, Xid};

/// Element carried in a HELLO body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HelloElement {
    /// Version bitmap element.
    VersionBitmap(VersionBitmap),
    /// Element type the handshake does not interpret.
    Unknown(u16),
}

/// HELLO received from the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelloMessage {
    /// Header version, the highest version the peer speaks.
    pub version: ProtocolVersion,
    /// Header xid.
    pub xid: Xid,
    /// Optional elements.
    pub elements: Vec<HelloElement>,
}

impl HelloMessage {
    /// HELLO without elements.
    pub fn new(version: ProtocolVersion, xid: Xid) -> Self {
        Self {
            version,
            xid,
            elements: Vec::new(),
        }
    }

    /// HELLO advertising a version bitmap.
    pub fn with_bitmap(version: ProtocolVersion, xid: Xid, bitmap: VersionBitmap) -> Self {
        Self {
            version,
            xid,
            elements: vec![HelloElement::VersionBitmap(bitmap)],
        }
    }

    /// Version bitmaps advertised by the peer, `None` if it sent none.
    pub fn version_bitmaps(&self) -> Option<Vec<&VersionBitmap>> {
        let bitmaps: Vec<&VersionBitmap> = self
            .elements
            .iter()
            .filter_map(|element| match element {
                HelloElement::VersionBitmap(bitmap) => Some(bitmap),
                HelloElement::Unknown(_) => None,
            })
            .collect();

        if bitmaps.is_empty() {
            None
        } else {
            Some(bitmaps)
        }
    }
}

/// HELLO sent by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelloInput {
    /// Proposed version.
    pub version: ProtocolVersion,
    /// Transaction id.
    pub xid: Xid,
    /// Controller's own version bitmap.
    pub elements: Vec<HelloElement>,
}

/// FEATURES_REQUEST.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetFeaturesInput {
    /// Settled version.
    pub version: ProtocolVersion,
    /// Transaction id.
    pub xid: Xid,
}

/// FEATURES_REPLY payload: the device's identity and capabilities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSet {
    /// Datapath id.
    pub datapath_id: DatapathId,
    /// Auxiliary connection id (0 for the main connection).
    pub auxiliary_id: u8,
    /// Packets the device can buffer.
    pub buffers: u32,
    /// Number of flow tables.
    pub tables: u8,
    /// Capability flags.
    pub capabilities: u32,
}

impl FeatureSet {
    /// Features of a main connection with the given datapath id.
    pub fn for_datapath(datapath_id: u64) -> Self {
        Self {
            datapath_id: DatapathId(datapath_id),
            auxiliary_id: 0,
            buffers: 256,
            tables: 254,
            capabilities: 0,
        }
    }
}

/// BARRIER_REQUEST.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierInput {
    /// Settled version.
    pub version: ProtocolVersion,
    /// Transaction id.
    pub xid: Xid,
}

/// Outbound message kinds, for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// HELLO
    Hello,
    /// FEATURES_REQUEST
    FeaturesRequest,
    /// BARRIER_REQUEST
    Barrier,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Hello => write!(f, "hello"),
            MessageKind::FeaturesRequest => write!(f, "features request"),
            MessageKind::Barrier => write!(f, "barrier"),
        }
    }
}
