//! Observability for Hermes services.
//!
//! - **Logging**: [`init_logging`] installs a `tracing` subscriber with an
//!   env filter and JSON or pretty output.
//! - **Metrics**: request counters, latency histogram and in-flight gauge
//!   through the `metrics` facade. See [`metrics`] for the full list.
//!
//! Exporters are left to the application.

#![doc(html_root_url = "https://docs.rs/hermes-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};
pub use metrics::{describe_metrics, record_request, InFlightGuard};

/// Result type for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
