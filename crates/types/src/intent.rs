//! Payment intent types

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An invoice awaiting a matching on-chain settlement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: i64,
    /// External-facing order identifier, unique
    pub order_id: String,
    pub token_address: Address,
    #[serde(with = "crate::utils::u256_dec")]
    pub amount: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub fee: U256,
    /// `amount + fee`, frozen at creation
    #[serde(with = "crate::utils::u256_dec")]
    pub total: U256,
    /// Version of the fee schedule the quote was computed with
    pub fee_schedule_version: u32,
    pub merchant_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Intent to persist on first checkout
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub order_id: String,
    pub token_address: Address,
    pub amount: U256,
    pub fee: U256,
    pub total: U256,
    pub fee_schedule_version: u32,
    pub merchant_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Key used to look an intent up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentLookup {
    /// Surrogate key
    Id(i64),
    /// External order identifier
    OrderId(String),
}

impl IntentLookup {
    /// Interpret a caller-provided identifier.
    ///
    /// Numeric strings are tried as surrogate keys first by the store; the
    /// order id form is always kept as a fallback.
    pub fn parse(raw: &str) -> Vec<IntentLookup> {
        let mut lookups = Vec::with_capacity(2);
        if let Ok(id) = raw.parse::<i64>() {
            lookups.push(IntentLookup::Id(id));
        }
        lookups.push(IntentLookup::OrderId(raw.to_string()));
        lookups
    }
}

impl PaymentIntent {
    /// Check if the intent has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() > at).unwrap_or(false)
    }
}

/// Result of a checkout request
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// A new intent row was written
    Created(PaymentIntent),
    /// An intent already existed for the order
    Existing(PaymentIntent),
}

impl CheckoutOutcome {
    /// The intent regardless of whether it was created now
    pub fn intent(&self) -> &PaymentIntent {
        match self {
            CheckoutOutcome::Created(intent) | CheckoutOutcome::Existing(intent) => intent,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, CheckoutOutcome::Created(_))
    }
}

/// Response body for checkout creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutResponse {
    pub payment_url: String,
    pub payment_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_parse_numeric() {
        assert_eq!(
            IntentLookup::parse("42"),
            vec![IntentLookup::Id(42), IntentLookup::OrderId("42".to_string())]
        );
    }

    #[test]
    fn test_lookup_parse_order_id() {
        assert_eq!(
            IntentLookup::parse("ORD-9"),
            vec![IntentLookup::OrderId("ORD-9".to_string())]
        );
    }
}
