//! Ledger transaction types and status ordering

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a relayed transaction as reported by the relayer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Accepted by the relayer, not yet broadcast
    Pending,
    /// Signed and sent to the network
    Sent,
    /// Broadcast and waiting in the mempool
    Submitted,
    /// Included in a block, not yet final
    Mined,
    /// Final and successful
    Confirmed,
    /// Reverted or dropped
    Failed,
    /// Validity window elapsed
    Expired,
    /// Cancelled by the relayer
    #[serde(alias = "cancelled")]
    Canceled,
}

impl TransactionStatus {
    /// All statuses, lowest rank first
    pub const ALL: [TransactionStatus; 8] = [
        TransactionStatus::Pending,
        TransactionStatus::Sent,
        TransactionStatus::Submitted,
        TransactionStatus::Mined,
        TransactionStatus::Confirmed,
        TransactionStatus::Failed,
        TransactionStatus::Expired,
        TransactionStatus::Canceled,
    ];

    /// Convert status to its wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Sent => "sent",
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Mined => "mined",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Canceled => "canceled",
        }
    }

    /// No further relayer-driven change is expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed
                | TransactionStatus::Failed
                | TransactionStatus::Expired
                | TransactionStatus::Canceled
        )
    }

    /// Funds reached the recipient
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Mined)
    }

    /// Position in the lifecycle; terminal statuses share the top rank
    pub fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Sent => 1,
            TransactionStatus::Submitted => 2,
            TransactionStatus::Mined => 3,
            _ => 4,
        }
    }

    /// Whether a ledger row in `self` may be patched to `next`.
    ///
    /// Terminal rows are frozen and non-terminal rows never move backwards.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Merchant-facing status string
    pub fn merchant_status(&self) -> &'static str {
        if self.is_settled() {
            "success"
        } else {
            self.as_str()
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "sent" => Ok(TransactionStatus::Sent),
            "submitted" => Ok(TransactionStatus::Submitted),
            "mined" => Ok(TransactionStatus::Mined),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            "expired" => Ok(TransactionStatus::Expired),
            "canceled" | "cancelled" => Ok(TransactionStatus::Canceled),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Pending
    }
}

/// A relay-submitted, chain-observed payment attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    /// Relayer-assigned identifier, the join key for webhook updates
    pub transaction_id: String,
    /// keccak256 of the relayed calldata
    pub idempotency_key: Option<String>,
    pub tx_hash: Option<String>,
    pub payer_address: Address,
    pub recipient_address: Address,
    pub token_address: Address,
    #[serde(with = "crate::utils::u256_dec")]
    pub amount: U256,
    #[serde(with = "crate::utils::u256_dec_opt")]
    pub fee: Option<U256>,
    pub status: TransactionStatus,
    pub block_number: Option<i64>,
    pub chain_id: u64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
}

/// Row to append to the ledger after the relayer accepted a request
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_id: String,
    pub idempotency_key: Option<String>,
    pub tx_hash: Option<String>,
    pub payer_address: Address,
    pub recipient_address: Address,
    pub token_address: Address,
    pub amount: U256,
    pub fee: Option<U256>,
    pub status: TransactionStatus,
    pub chain_id: u64,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
}

/// Partial update applied on relayer callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPatch {
    pub tx_hash: Option<String>,
    pub status: TransactionStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Result of applying a patch to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// Patch applied; carries the row after the update
    Applied(Transaction),
    /// Row exists but the transition was refused
    Skipped {
        current: TransactionStatus,
        requested: TransactionStatus,
    },
}
