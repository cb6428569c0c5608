//! Configuration management for the Paylis gateway
//!
//! Settlement network, relayer, contracts and the versioned fee schedule are
//! read from a YAML file with `PAYLIS_` environment overrides.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigLoader;
pub use schema::*;
pub use validation::*;
