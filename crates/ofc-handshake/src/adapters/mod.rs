//! # Adapters
//!
//! Production implementations of the outbound ports.

pub mod connection_context;
pub mod error_handler;
pub mod rate_limit;
pub mod session_statistics;

pub use connection_context::ConnectionContextImpl;
pub use error_handler::LoggingErrorHandler;
pub use rate_limit::{DeviceConnectionRateLimiter, NoOpRateLimiter};
pub use session_statistics::SessionStatistics;
