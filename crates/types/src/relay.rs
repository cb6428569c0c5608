//! Relayer wire types, webhook events and relay submission bodies

use crate::transaction::TransactionStatus;
use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Relayer speed tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Fastest,
    Fast,
    Average,
    #[serde(rename = "safeLow")]
    SafeLow,
}

/// Body of the relayer "send transaction" call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkTransactionRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: u64,
    pub gas_limit: u64,
    pub speed: Speed,
}

/// Response envelope used by every relayer endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Transaction as reported by the relayer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayerTransaction {
    /// Relayer-assigned identifier
    pub id: String,
    /// Chain hash once assigned
    #[serde(default)]
    pub hash: Option<String>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub status_reason: Option<String>,
    /// RFC3339 creation time
    pub created_at: String,
    #[serde(default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<String>,
}

impl RelayerTransaction {
    /// Whether the relayer already assigned a chain hash
    pub fn has_hash(&self) -> bool {
        self.hash.as_deref().map(|h| !h.is_empty()).unwrap_or(false)
    }
}

/// Event kind that carries ledger updates
pub const TRANSACTION_UPDATE_EVENT: &str = "transaction_update";

/// Payload kind that carries ledger updates
pub const TRANSACTION_PAYLOAD_TYPE: &str = "transaction";

/// Asynchronous notification sent by the relayer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl WebhookEvent {
    /// Whether the event should mutate the ledger
    pub fn is_transaction_update(&self) -> bool {
        self.event == TRANSACTION_UPDATE_EVENT
            && self.payload.get("payload_type").and_then(|v| v.as_str())
                == Some(TRANSACTION_PAYLOAD_TYPE)
    }
}

/// Payload of a `transaction_update` event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionUpdatePayload {
    pub payload_type: String,
    /// Relayer transaction id
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub confirmed_at: Option<String>,
}

/// Acknowledgement returned to the relayer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub success: bool,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Forwarding request as signed by the payer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardRequestBody {
    pub from: Address,
    pub to: Address,
    #[serde(with = "crate::utils::u256_dec")]
    pub value: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub gas: U256,
    #[serde(with = "crate::utils::u256_dec")]
    pub nonce: U256,
    pub data: Bytes,
}

/// Bookkeeping data accompanying a relay submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMeta {
    pub from: Address,
    pub receiver: Address,
    pub token: Address,
    #[serde(with = "crate::utils::u256_dec")]
    pub amount: U256,
    #[serde(default, with = "crate::utils::u256_dec_opt")]
    pub fee: Option<U256>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Body of the relay submission endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub request: ForwardRequestBody,
    pub signature: Bytes,
    pub meta: SubmitMeta,
}
