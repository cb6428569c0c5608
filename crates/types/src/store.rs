//! Storage contracts for intents, the transaction ledger and merchants

use crate::{
    intent::{IntentLookup, NewPaymentIntent, PaymentIntent},
    merchant::{Merchant, NewMerchant, User},
    transaction::{NewTransaction, PatchOutcome, Transaction, TransactionPatch},
    utils::parse_timestamp,
    PaylisError, Result,
};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Persistence of payment intents
#[async_trait]
pub trait PaymentIntentStore: Send + Sync {
    /// Persist a new intent.
    ///
    /// Fails with `PaylisError::DuplicateOrder` when an intent for the order
    /// already exists; the unique index on `order_id` decides races.
    async fn insert_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent>;

    /// Get an intent by surrogate key or order id
    async fn get_intent(&self, lookup: &IntentLookup) -> Result<Option<PaymentIntent>>;
}

/// Append/patch-only ledger of relayed transactions
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Append a row after the relayer accepted a request
    async fn insert(&self, transaction: NewTransaction) -> Result<Transaction>;

    /// Patch status fields of the row keyed by the relayer transaction id.
    ///
    /// Fails with `PaylisError::NotFound` when no such row exists. Refused
    /// transitions (terminal rows, backwards moves) return `PatchOutcome::Skipped`.
    async fn update_by_relay_transaction_id(
        &self,
        transaction_id: &str,
        patch: TransactionPatch,
    ) -> Result<PatchOutcome>;

    /// Get a row by relayer transaction id
    async fn get_by_relay_transaction_id(&self, transaction_id: &str)
        -> Result<Option<Transaction>>;

    /// Get the row recorded for a signed payload
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>>;

    /// Reserve a signed payload for relaying; `false` when already reserved.
    ///
    /// A reservation taken before `stale_before` is considered abandoned and
    /// is taken over.
    async fn claim_submission(&self, key: &str, stale_before: DateTime<Utc>) -> Result<bool>;

    /// Drop a reservation whose relay send failed
    async fn release_submission(&self, key: &str) -> Result<()>;

    /// Mark a confirmed row as notified; `true` only for the first caller
    async fn claim_notification(&self, transaction_id: &str) -> Result<bool>;

    /// Whether a settled row exists for an order
    async fn has_settled_transaction(&self, order_id: &str) -> Result<bool>;

    /// Totals over settled rows
    async fn settled_summary(&self) -> Result<LedgerSummary>;

    /// Settled rows ordered by `(created_at, id)` descending, strictly after `before`
    async fn settled_history(
        &self,
        limit: u32,
        before: Option<HistoryCursor>,
    ) -> Result<Vec<Transaction>>;
}

/// Persistence of users and merchants
#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Get the user for a wallet address, creating it on first sight
    async fn get_or_create_user(&self, address: Address) -> Result<User>;

    /// Register a merchant; fails with `AlreadyExists` for a second merchant per user
    async fn insert_merchant(&self, merchant: NewMerchant) -> Result<Merchant>;

    async fn get_merchant(&self, id: i64) -> Result<Option<Merchant>>;

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    /// Merchant owned by the user with this wallet address
    async fn find_by_owner_address(&self, address: Address) -> Result<Option<Merchant>>;
}

/// Aggregate over settled ledger rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    #[serde(with = "crate::utils::u256_dec")]
    pub total_revenue: U256,
    pub total_paid_transactions: u64,
}

/// Position in the settled history, ordered by `(created_at, id)` descending
///
/// Rendered as `<rfc3339 micros>_<id>`. A bare timestamp is accepted and
/// pages from strictly before that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

impl HistoryCursor {
    /// Cursor continuing after `transaction`
    pub fn after(transaction: &Transaction) -> Self {
        Self {
            created_at: transaction.created_at,
            id: transaction.id,
        }
    }
}

impl fmt::Display for HistoryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.id
        )
    }
}

impl FromStr for HistoryCursor {
    type Err = PaylisError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PaylisError::Validation(format!("Invalid cursor: {}", s));

        let (timestamp, id) = match s.rsplit_once('_') {
            Some((timestamp, id)) => (timestamp, id.parse::<i64>().map_err(|_| invalid())?),
            None => (s, i64::MIN),
        };
        let created_at = parse_timestamp(timestamp).ok_or_else(invalid)?;

        Ok(Self { created_at, id })
    }
}
