//! Configuration validation

use super::Config;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_nat(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_nat(config: &Config, result: &mut ValidationResult) {
    let nat = &config.nat;

    if nat.tcp_timeout_secs == 0 {
        result.error("nat.tcp_timeout_secs must be greater than 0");
    }
    if nat.udp_timeout_secs == 0 {
        result.error("nat.udp_timeout_secs must be greater than 0");
    }
    // The ICMP timeout doubles as the sweep interval; zero would turn every
    // insertion into a full table scan.
    if nat.icmp_timeout_secs == 0 {
        result.error("nat.icmp_timeout_secs must be greater than 0");
    }

    if nat.icmp_timeout_secs > nat.udp_timeout_secs && nat.udp_timeout_secs > 0 {
        result.warn(format!(
            "nat.icmp_timeout_secs ({}) exceeds nat.udp_timeout_secs ({}); \
             expired UDP mappings may linger for a full sweep interval",
            nat.icmp_timeout_secs, nat.udp_timeout_secs
        ));
    }
    if nat.tcp_timeout_secs < nat.udp_timeout_secs {
        result.warn("nat.tcp_timeout_secs is shorter than nat.udp_timeout_secs");
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    let level = config.log.level.to_lowercase();
    if !matches!(
        level.as_str(),
        "error" | "warn" | "info" | "debug" | "trace"
    ) {
        result.warn(format!(
            "log.level: unknown level '{}', falling back to info",
            config.log.level
        ));
    }

    if !matches!(config.log.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "log.format: unknown format '{}', falling back to pretty",
            config.log.format
        ));
    }
}
