//! Error types for the Paylis gateway

use thiserror::Error;

/// Main error type for the payment gateway
#[derive(Error, Debug)]
pub enum PaylisError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request validation errors, surfaced verbatim to the caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fee calculation errors
    #[error("Fee calculation error: {0}")]
    FeeCalculation(String),

    /// Token has no fee schedule
    #[error("Unknown token: {token}")]
    UnknownToken { token: String },

    /// A payment intent already exists for the order
    #[error("Payment intent already exists for order {order_id}")]
    DuplicateOrder { order_id: String },

    /// The signed payload is already being relayed
    #[error("Submission already in flight: {idempotency_key}")]
    DuplicateSubmission { idempotency_key: String },

    /// Unique resource already exists
    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    /// Relayer could not accept the transaction
    #[error("Relayer unavailable: {0}")]
    RelayUnavailable(String),

    /// Relayer communication errors
    #[error("Relayer communication error: {relayer}: {message}")]
    RelayCommunication { relayer: String, message: String },

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(String),

    /// Webhook referenced state that does not exist
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Merchant notification errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Not found errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, PaylisError>;

/// Fee calculation specific errors
#[derive(Error, Debug)]
pub enum FeeError {
    /// Token has no fee schedule
    #[error("No fee schedule for token {token}")]
    UnknownToken { token: String },

    /// Amount must be positive
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// Signed fee does not match the quoted fee
    #[error("Fee mismatch: signed {signed} bps, expected {expected} bps")]
    FeeMismatch { signed: String, expected: String },

    /// Arithmetic overflow
    #[error("Fee calculation overflow")]
    CalculationOverflow,
}

/// Relayer communication specific errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Connection timeout
    #[error("Connection timeout to relayer: {relayer}")]
    ConnectionTimeout { relayer: String },

    /// Transport or HTTP status error
    #[error("HTTP error from relayer {relayer}: {status}")]
    HttpError { relayer: String, status: u16 },

    /// Invalid response format
    #[error("Invalid response from relayer {relayer}: {message}")]
    InvalidResponse { relayer: String, message: String },

    /// Transaction rejected by the relayer
    #[error("Transaction rejected by relayer {relayer}: {reason}")]
    Rejected { relayer: String, reason: String },
}

/// Database specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Constraint violation
    #[error("Database constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored value could not be decoded
    #[error("Corrupt column {column}: {value}")]
    CorruptValue { column: String, value: String },
}

/// Configuration specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Validation error
    #[error("Configuration validation error: {field}: {message}")]
    ValidationError { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl PaylisError {
    /// Whether the error is caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PaylisError::Validation(_)
                | PaylisError::FeeCalculation(_)
                | PaylisError::UnknownToken { .. }
        )
    }
}

// Conversion implementations for common error types

impl From<FeeError> for PaylisError {
    fn from(err: FeeError) -> Self {
        match err {
            FeeError::UnknownToken { token } => PaylisError::UnknownToken { token },
            other => PaylisError::FeeCalculation(other.to_string()),
        }
    }
}

impl From<RelayError> for PaylisError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::ConnectionTimeout { relayer } => PaylisError::RelayCommunication {
                relayer,
                message: "Connection timeout".to_string(),
            },
            RelayError::HttpError { relayer, status } => PaylisError::RelayCommunication {
                relayer,
                message: format!("HTTP error: {}", status),
            },
            RelayError::InvalidResponse { relayer, message } => {
                PaylisError::RelayCommunication { relayer, message }
            }
            RelayError::Rejected { relayer, reason } => PaylisError::RelayCommunication {
                relayer,
                message: format!("Rejected: {}", reason),
            },
        }
    }
}

impl From<DatabaseError> for PaylisError {
    fn from(err: DatabaseError) -> Self {
        PaylisError::Database(err.to_string())
    }
}

impl From<ConfigError> for PaylisError {
    fn from(err: ConfigError) -> Self {
        PaylisError::Config(err.to_string())
    }
}
