//! Logging and metrics setup for Shellpilot.
//!
//! - `tracing_layer`: tracing-subscriber registry with env filter
//! - `metrics`: Prometheus recorder plus recording helpers used by every layer

pub mod metrics;
pub mod tracing_layer;

pub use self::metrics::*;
pub use tracing_layer::configure_tracing;
