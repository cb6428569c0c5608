//! Configuration schema definitions

use alloy::primitives::{address, Address, U256};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::{FeeSchedule, TokenFee};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain the gateway settles on
    pub network: NetworkConfig,
    /// Transaction relayer connection
    pub relayer: RelayerConfig,
    /// Forwarder and payment contracts
    pub contracts: ContractsConfig,
    /// Fee schedule version
    pub fees: FeesConfig,
    /// Accepted tokens and their fee terms
    pub tokens: Vec<TokenConfig>,
    /// Checkout behaviour
    #[serde(default)]
    pub checkout: CheckoutConfig,
    /// Outbound merchant notifications
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name (lisk-sepolia, lisk)
    pub name: String,
    /// Chain ID, also the EIP-712 domain chain id
    pub chain_id: u64,
}

/// Relayer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Base URL of the relayer API
    pub base_url: String,
    /// Relayer identifier in the API path
    pub relayer_id: String,
    /// Bearer token for the relayer API
    #[serde(default)]
    pub access_token: String,
    /// Key the relayer signs its webhooks with
    #[serde(default)]
    pub webhook_signing_key: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Speed tier for submitted transactions
    #[serde(default = "default_speed")]
    pub speed: types::Speed,
    /// Gas limit for the forwarder call
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Hash polls after a send
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// First backoff delay, doubled after each poll
    #[serde(default = "default_poll_base_delay_ms")]
    pub poll_base_delay_ms: u64,
    /// Age after which an unfinished submission claim may be taken over
    #[serde(default = "default_claim_ttl_seconds")]
    pub claim_ttl_seconds: u64,
}

/// Contracts configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// MinimalForwarder address, the relayed transaction target
    pub forwarder_address: Address,
    /// EIP-712 domain name of the forwarder
    #[serde(default = "default_forwarder_name")]
    pub forwarder_name: String,
    /// EIP-712 domain version of the forwarder
    #[serde(default = "default_forwarder_version")]
    pub forwarder_version: String,
    /// Payment gateway contract the forwarder calls into
    pub payment_gateway_address: Address,
}

/// Fee schedule version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    /// Schedule version stored with each payment intent
    pub version: u32,
    /// RFC3339 time from which the schedule applies
    pub effective_at: String,
}

/// Accepted token with its fee terms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    /// Flat fee in the token's smallest unit, base-10
    pub flat: String,
    /// Percentage fee in basis points
    pub percentage_bps: u32,
}

/// Checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Public URL the payment links point at
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Intent lifetime in seconds
    #[serde(default = "default_intent_ttl_seconds")]
    pub intent_ttl_seconds: u64,
    /// Token used when a checkout request names none
    #[serde(default = "default_token")]
    pub default_token: Address,
}

/// Merchant notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Path appended to the merchant website
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// Delivery timeout in seconds
    #[serde(default = "default_notifier_timeout")]
    pub timeout_seconds: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    /// Enable WAL mode for SQLite
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Enable request logging
    #[serde(default = "default_true")]
    pub request_logging: bool,
    /// Enable SQL query logging
    #[serde(default = "default_false")]
    pub sql_logging: bool,
}

/// Backoff schedule for hash polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given zero-based attempt: `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            base_delay: Duration::from_millis(default_poll_base_delay_ms()),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_speed() -> types::Speed {
    types::Speed::Fast
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_poll_attempts() -> u32 {
    3
}

fn default_poll_base_delay_ms() -> u64 {
    1_000
}

fn default_claim_ttl_seconds() -> u64 {
    600
}

fn default_forwarder_name() -> String {
    "MinimalForwarder".to_string()
}

fn default_forwarder_version() -> String {
    "0.0.1".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_intent_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_token() -> Address {
    IDRX_ADDRESS
}

fn default_callback_path() -> String {
    "/api/paylis/webhook".to_string()
}

fn default_notifier_timeout() -> u64 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database_url() -> String {
    "sqlite:data/paylis.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// IDRX on Lisk Sepolia
pub const IDRX_ADDRESS: Address = address!("7d454248C467e7b0dA868d370F045Ea462C36179");

/// USDC on Lisk Sepolia
pub const USDC_ADDRESS: Address = address!("8261591aD2C36cE05E36F4c249B635fcB2748a8F");

impl Config {
    /// Build the versioned fee schedule from the token list
    pub fn to_fee_schedule(&self) -> Result<FeeSchedule, String> {
        let effective_at = DateTime::parse_from_rfc3339(&self.fees.effective_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("Invalid fees.effective_at: {}", e))?;

        let mut tokens = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            let flat = self
                .parse_flat(token)
                .map_err(|e| format!("Invalid flat fee for token {}: {}", token.symbol, e))?;

            tokens.push((
                token.address,
                TokenFee {
                    symbol: token.symbol.clone(),
                    decimals: token.decimals,
                    flat,
                    percentage_bps: token.percentage_bps,
                },
            ));
        }

        Ok(FeeSchedule::new(self.fees.version, effective_at, tokens))
    }

    fn parse_flat(&self, token: &TokenConfig) -> Result<U256, String> {
        types::utils::parse_u256(&token.flat)
    }

    /// Hash polling schedule
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.relayer.poll_attempts,
            base_delay: Duration::from_millis(self.relayer.poll_base_delay_ms),
        }
    }

    /// Token config by address
    pub fn token(&self, address: &Address) -> Option<&TokenConfig> {
        self.tokens.iter().find(|t| &t.address == address)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: "lisk-sepolia".to_string(),
                chain_id: 4202,
            },
            relayer: RelayerConfig::default(),
            contracts: ContractsConfig {
                forwarder_address: address!("b9DE485aF056e8a97E47753D54Fd67748bd16A78"),
                forwarder_name: default_forwarder_name(),
                forwarder_version: default_forwarder_version(),
                payment_gateway_address: address!("3a8fFa05dcBc71a4d1C3A0A92324d084393f60C9"),
            },
            fees: FeesConfig {
                version: 1,
                effective_at: Utc
                    .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                    .single()
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
            },
            tokens: vec![
                TokenConfig {
                    address: IDRX_ADDRESS,
                    symbol: "IDRX".to_string(),
                    decimals: 2,
                    flat: "150".to_string(),
                    percentage_bps: 100,
                },
                TokenConfig {
                    address: USDC_ADDRESS,
                    symbol: "USDC".to_string(),
                    decimals: 6,
                    flat: "100000".to_string(),
                    percentage_bps: 100,
                },
            ],
            checkout: CheckoutConfig::default(),
            notifier: NotifierConfig::default(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            relayer_id: "lisk-sepolia".to_string(),
            access_token: String::new(),
            webhook_signing_key: String::new(),
            timeout_seconds: default_timeout_seconds(),
            speed: default_speed(),
            gas_limit: default_gas_limit(),
            poll_attempts: default_poll_attempts(),
            poll_base_delay_ms: default_poll_base_delay_ms(),
            claim_ttl_seconds: default_claim_ttl_seconds(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            intent_ttl_seconds: default_intent_ttl_seconds(),
            default_token: default_token(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            callback_path: default_callback_path(),
            timeout_seconds: default_notifier_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            cors_enabled: default_true(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connection_timeout_seconds: default_connection_timeout(),
            wal_mode: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            request_logging: default_true(),
            sql_logging: default_false(),
        }
    }
}
