//! Fee schedule and quote types

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Basis points in 100%
pub const BASIS_POINTS_DENOMINATOR: u64 = 10_000;

/// Per-token fee terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFee {
    /// Token symbol, used as the merchant-facing currency
    pub symbol: String,
    /// Token decimals
    pub decimals: u8,
    /// Fixed fee in the token's smallest unit
    pub flat: U256,
    /// Proportional fee in basis points
    pub percentage_bps: u32,
}

/// A versioned snapshot of fee terms for every accepted token
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    /// Monotonic schedule version stored with each intent
    pub version: u32,
    /// When this schedule started applying
    pub effective_at: DateTime<Utc>,
    tokens: HashMap<Address, TokenFee>,
}

/// Fee computation result for an amount of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    #[serde(with = "crate::utils::u256_dec")]
    pub amount: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub flat_fee: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub percentage_fee: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub total_fee: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub total_amount: U256,
    /// Total fee re-expressed in basis points of `amount`, as encoded on-chain
    pub total_fee_basis_points: u64,
    pub schedule_version: u32,
}

impl FeeSchedule {
    /// Create a schedule from per-token terms
    pub fn new(
        version: u32,
        effective_at: DateTime<Utc>,
        tokens: impl IntoIterator<Item = (Address, TokenFee)>,
    ) -> Self {
        Self {
            version,
            effective_at,
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Fee terms for a token
    pub fn get(&self, token: &Address) -> Option<&TokenFee> {
        self.tokens.get(token)
    }

    /// Tokens accepted by this schedule
    pub fn tokens(&self) -> impl Iterator<Item = (&Address, &TokenFee)> {
        self.tokens.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
