//! Configuration types

use crate::nat::{IdentityMode, NatTimeouts};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::time::Duration;

/// User-defined configuration (nat.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nat: NatSection,
    #[serde(default)]
    pub log: LogConfig,
}

/// `[nat]` section: identity mode and idle timeouts, fixed at table
/// construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatSection {
    /// Include the destination pair in flow identity. Off by default: one
    /// mapping per local endpoint.
    pub destination_sensitive: bool,
    /// TCP idle timeout in seconds.
    pub tcp_timeout_secs: u64,
    /// UDP (and other non-ICMP protocol) idle timeout in seconds.
    pub udp_timeout_secs: u64,
    /// ICMP idle timeout in seconds; also the cleanup sweep interval.
    pub icmp_timeout_secs: u64,
}

impl Default for NatSection {
    fn default() -> Self {
        let timeouts = NatTimeouts::default();
        Self {
            destination_sensitive: false,
            tcp_timeout_secs: timeouts.tcp.as_secs(),
            udp_timeout_secs: timeouts.udp.as_secs(),
            icmp_timeout_secs: timeouts.icmp.as_secs(),
        }
    }
}

impl NatSection {
    pub fn identity_mode(&self) -> IdentityMode {
        if self.destination_sensitive {
            IdentityMode::SourceAndDestination
        } else {
            IdentityMode::SourceOnly
        }
    }

    pub fn timeouts(&self) -> NatTimeouts {
        NatTimeouts {
            tcp: Duration::from_secs(self.tcp_timeout_secs),
            udp: Duration::from_secs(self.udp_timeout_secs),
            icmp: Duration::from_secs(self.icmp_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let section = NatSection::default();
        assert!(!section.destination_sensitive);
        assert_eq!(section.identity_mode(), IdentityMode::SourceOnly);
        assert_eq!(section.timeouts().tcp, Duration::from_secs(900));
        assert_eq!(section.timeouts().udp, Duration::from_secs(300));
        assert_eq!(section.timeouts().icmp, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [nat]
            destination_sensitive = true
            udp_timeout_secs = 120

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.nat.identity_mode(),
            IdentityMode::SourceAndDestination
        );
        assert_eq!(config.nat.timeouts().udp, Duration::from_secs(120));
        // Unspecified fields keep defaults.
        assert_eq!(config.nat.timeouts().tcp, Duration::from_secs(900));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_parse_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.nat.identity_mode(), IdentityMode::SourceOnly);
    }
}
