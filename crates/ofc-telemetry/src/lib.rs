//! # OFC Telemetry
//!
//! Logging bootstrap for the OFC controller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ofc_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//!     // Handshake traces and device events are now emitted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `ofc-controller` | Service name in log records |
//! | `OFC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `OFC_JSON_LOGS` | `false` | Emit JSON formatted logs |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

#[doc(hidden)]
pub use tracing;

use thiserror::Error;

/// Target of the device event log (connect / disconnect records).
pub const OF_EVENT_LOG: &str = "of_event_log";

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Failed to install subscriber: {0}")]
    SubscriberInit(String),
}

/// Log a device lifecycle event on the [`OF_EVENT_LOG`] target.
///
/// # Example
///
/// ```rust
/// use ofc_telemetry::log_device_event;
///
/// log_device_event!(debug, "Connect", "openflow:42", version = 4);
/// ```
#[macro_export]
macro_rules! log_device_event {
    ($level:ident, $msg:expr, $device:expr $(, $($field:tt)*)?) => {
        $crate::tracing::$level!(
            target: $crate::OF_EVENT_LOG,
            device = %$device,
            $($($field)*,)?
            $msg
        )
    };
}
