//! Tunnat - NAT table for a VPN tunneling engine
//!
//! Maps outbound client flows onto per-bucket 16-bit translation ids and
//! reverse-maps inbound responses back onto the original flow. The caller
//! parses packets and owns the tunnel transport; this crate owns only the
//! identity and index bookkeeping.

pub mod config;
pub mod error;
pub mod nat;
pub mod telemetry;

pub use error::{Error, Result};
