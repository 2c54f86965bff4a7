//! # Application Layer
//!
//! Per-connection handshake engine, post-handshake listener and the
//! acceptor wiring them together.

pub mod acceptor;
pub mod engine;
pub mod listener;

pub use acceptor::{AcceptedConnection, ConnectionAcceptor};
pub use engine::{HandshakeDependencies, HandshakeEngine, HandshakeHandle};
pub use listener::HandshakeListenerImpl;
