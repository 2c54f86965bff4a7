//! # Ports Module
//!
//! Hexagonal architecture ports (inbound handshake API, outbound
//! collaborators).

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
