//! # Algorithms Module
//!
//! Version negotiation decisions and the per-connection handshake state
//! machine that drives them.

pub mod state_machine;
pub mod version_negotiator;

pub use state_machine::{Action, AfterHello, HandshakeEvent, HandshakeMachine};
pub use version_negotiator::{detect_stall, propose_common_bitmap_version, propose_next_version};
