//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Metrics collection for NAT table activity

mod logging;
mod metrics;

pub use logging::{LogConfig, init_logging};
pub use metrics::{Counter, NatMetrics};
