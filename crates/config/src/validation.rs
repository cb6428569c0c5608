//! Configuration validation utilities

use crate::schema::Config;
use alloy::primitives::Address;
use types::Result;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate complete configuration
    pub fn validate(config: &Config) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();

        Self::validate_network(config, &mut report);
        Self::validate_relayer(config, &mut report);
        Self::validate_contracts(config, &mut report);
        Self::validate_tokens(config, &mut report);
        Self::validate_checkout(config, &mut report);
        Self::validate_server(config, &mut report);
        Self::validate_database(config, &mut report);
        Self::validate_logging(config, &mut report);

        Ok(report)
    }

    fn validate_network(config: &Config, report: &mut ValidationReport) {
        if config.network.name.is_empty() {
            report.add_error("network.name", "Network name cannot be empty");
        }

        match config.network.name.as_str() {
            "lisk-sepolia" if config.network.chain_id != 4202 => {
                report.add_warning("network.chain_id", "Chain ID 4202 expected for lisk-sepolia");
            }
            "lisk" if config.network.chain_id != 1135 => {
                report.add_warning("network.chain_id", "Chain ID 1135 expected for lisk");
            }
            "lisk" | "lisk-sepolia" => {}
            other => {
                report.add_warning(
                    "network.name",
                    &format!("Unknown network '{}', chain id {} assumed", other, config.network.chain_id),
                );
            }
        }
    }

    fn validate_relayer(config: &Config, report: &mut ValidationReport) {
        let relayer = &config.relayer;

        if !relayer.base_url.starts_with("https://") {
            report.add_warning("relayer.base_url", "Relayer URL should use HTTPS");
        }

        if relayer.access_token.is_empty() {
            report.add_error("relayer.access_token", "Relayer access token is not set");
        }

        if relayer.webhook_signing_key.is_empty() {
            report.add_error(
                "relayer.webhook_signing_key",
                "Webhook signing key is not set, relayer callbacks will be rejected",
            );
        } else if relayer.webhook_signing_key.len() < 16 {
            report.add_warning(
                "relayer.webhook_signing_key",
                "Webhook signing key is short, consider using a longer key",
            );
        }

        // Worst case a submit request waits for the sum of all backoff delays
        let worst_case_ms: u64 = (0..relayer.poll_attempts)
            .map(|attempt| relayer.poll_base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
            .sum();
        if worst_case_ms > config.server.request_timeout_seconds.saturating_mul(1000) {
            report.add_warning(
                "relayer.poll_base_delay_ms",
                &format!(
                    "Hash polling may take {}ms, longer than the request timeout",
                    worst_case_ms
                ),
            );
        }

        // A claim that expires mid-submission lets a retry relay the payload twice
        let in_flight_ms = worst_case_ms
            .saturating_add(relayer.timeout_seconds.saturating_mul(1000).saturating_mul(2));
        if relayer.claim_ttl_seconds.saturating_mul(1000) <= in_flight_ms {
            report.add_warning(
                "relayer.claim_ttl_seconds",
                &format!(
                    "Submission claims expire after {}s, before a submission can finish",
                    relayer.claim_ttl_seconds
                ),
            );
        }

        if relayer.timeout_seconds > 120 {
            report.add_warning("relayer.timeout_seconds", "Relayer timeout is very high");
        }
    }

    fn validate_contracts(config: &Config, report: &mut ValidationReport) {
        if config.contracts.forwarder_address == Address::ZERO {
            report.add_error("contracts.forwarder_address", "Forwarder address cannot be zero");
        }

        if config.contracts.payment_gateway_address == Address::ZERO {
            report.add_error(
                "contracts.payment_gateway_address",
                "Payment gateway address cannot be zero",
            );
        }

        if config.contracts.forwarder_name.is_empty() || config.contracts.forwarder_version.is_empty() {
            report.add_error("contracts", "Forwarder EIP-712 name and version are required");
        }
    }

    fn validate_tokens(config: &Config, report: &mut ValidationReport) {
        if config.tokens.is_empty() {
            report.add_error("tokens", "At least one token must be configured");
            return;
        }

        if let Err(e) = config.to_fee_schedule() {
            report.add_error("fees", &e);
        }

        let mut addresses = std::collections::HashSet::new();
        let mut symbols = std::collections::HashSet::new();
        for token in &config.tokens {
            if !addresses.insert(token.address) {
                report.add_error("tokens", &format!("Duplicate token address: {}", token.address));
            }
            if !symbols.insert(token.symbol.as_str()) {
                report.add_warning("tokens", &format!("Duplicate token symbol: {}", token.symbol));
            }
            if token.percentage_bps > 10_000 {
                report.add_error(
                    "tokens.percentage_bps",
                    &format!("Percentage fee above 100% for token {}", token.symbol),
                );
            } else if token.percentage_bps > 1_000 {
                report.add_warning(
                    "tokens.percentage_bps",
                    &format!("Percentage fee above 10% for token {}", token.symbol),
                );
            }
            if token.decimals > 18 {
                report.add_warning(
                    "tokens.decimals",
                    &format!("Unusual decimals ({}) for token {}", token.decimals, token.symbol),
                );
            }
        }
    }

    fn validate_checkout(config: &Config, report: &mut ValidationReport) {
        let checkout = &config.checkout;

        if !checkout.public_base_url.starts_with("http://")
            && !checkout.public_base_url.starts_with("https://")
        {
            report.add_error("checkout.public_base_url", "Public URL must start with http:// or https://");
        }

        if checkout.public_base_url.ends_with('/') {
            report.add_warning("checkout.public_base_url", "Trailing slash will be stripped from payment URLs");
        }

        if checkout.intent_ttl_seconds < 300 {
            report.add_warning("checkout.intent_ttl_seconds", "Intent lifetime is very short (< 5 minutes)");
        }

        if config.token(&checkout.default_token).is_none() {
            report.add_error("checkout.default_token", "Default token is not in the token list");
        }
    }

    fn validate_server(config: &Config, report: &mut ValidationReport) {
        if config.server.port == 0 {
            report.add_error("server.port", "Server port cannot be 0");
        } else if config.server.port < 1024 {
            report.add_warning("server.port", "Server port is below 1024, may require elevated privileges");
        }

        if config.server.request_timeout_seconds == 0 {
            report.add_error("server.request_timeout_seconds", "Request timeout cannot be 0");
        }

        if config.server.host.is_empty() {
            report.add_error("server.host", "Server host cannot be empty");
        }
    }

    fn validate_database(config: &Config, report: &mut ValidationReport) {
        if config.database.url.is_empty() {
            report.add_error("database.url", "Database URL cannot be empty");
        }

        if !config.database.url.starts_with("sqlite:") {
            report.add_warning("database.url", "Only SQLite is currently supported");
        }

        if config.database.max_connections == 0 {
            report.add_error("database.max_connections", "Max connections cannot be 0");
        }
    }

    fn validate_logging(config: &Config, report: &mut ValidationReport) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            report.add_error(
                "logging.level",
                &format!("Invalid log level: {}. Valid levels: {:?}", config.logging.level, valid_levels),
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            report.add_error(
                "logging.format",
                &format!("Invalid log format: {}. Valid formats: {:?}", config.logging.format, valid_formats),
            );
        }
    }
}

/// Validation report containing errors and warnings
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// A validation issue (error or warning)
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn summary(&self) -> String {
        format!("Validation: {} errors, {} warnings", self.errors.len(), self.warnings.len())
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}
