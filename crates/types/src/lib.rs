//! Shared types for the Paylis payment gateway
//!
//! This crate contains the domain types, storage contracts and error taxonomy
//! shared by the gateway components.

pub mod error;
pub mod intent;
pub mod merchant;
pub mod payment;
pub mod relay;
pub mod store;
pub mod transaction;
pub mod utils;

// Re-export commonly used types
pub use error::{ConfigError, DatabaseError, FeeError, PaylisError, RelayError, Result};
pub use intent::*;
pub use merchant::*;
pub use payment::*;
pub use relay::*;
pub use store::*;
pub use transaction::*;
