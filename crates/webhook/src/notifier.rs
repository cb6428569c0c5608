//! Signed merchant callbacks for settled payments

use crate::signature::sign_payload;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use types::{
    FeeSchedule, IntentLookup, MerchantStore, PaylisError, PaymentIntentStore, Result, Transaction,
};

/// Header carrying `sha256=<hex hmac>` of the body
pub const SIGNATURE_HEADER: &str = "X-Paylis-Signature";

/// Header carrying the send time in unix seconds
pub const TIMESTAMP_HEADER: &str = "X-Paylis-Timestamp";

/// Announces settled transactions to whoever cares
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best effort; failures are logged and never returned
    async fn notify(&self, transaction: &Transaction);
}

/// Body POSTed to the merchant callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantNotification {
    pub order_id: String,
    /// `success` for settled transactions, otherwise the relayer status
    pub status: String,
    pub payment_id: String,
    /// Relayer transaction id
    pub transaction_id: String,
    pub tx_hash: Option<String>,
    #[serde(with = "types::utils::u256_dec")]
    pub amount: U256,
    /// Token symbol
    pub currency: String,
}

/// Delivers HMAC-signed callbacks to `{merchant.website}{callback_path}`
pub struct MerchantNotifier {
    intents: Arc<dyn PaymentIntentStore>,
    merchants: Arc<dyn MerchantStore>,
    symbols: HashMap<Address, String>,
    callback_path: String,
    http_client: Client,
}

impl MerchantNotifier {
    pub fn new(
        intents: Arc<dyn PaymentIntentStore>,
        merchants: Arc<dyn MerchantStore>,
        schedule: &FeeSchedule,
        settings: &config::NotifierConfig,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .user_agent(concat!("paylis-notifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PaylisError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let symbols = schedule
            .tokens()
            .map(|(address, fee)| (*address, fee.symbol.clone()))
            .collect();

        Ok(Self {
            intents,
            merchants,
            symbols,
            callback_path: settings.callback_path.clone(),
            http_client,
        })
    }

    fn currency(&self, token: &Address) -> String {
        self.symbols
            .get(token)
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }

    /// Resolve the merchant and send the callback.
    ///
    /// Returns `Ok(false)` when there is nobody to notify.
    async fn deliver(&self, transaction: &Transaction) -> Result<bool> {
        let Some(order_id) = transaction.order_id.as_deref() else {
            debug!(transaction_id = %transaction.transaction_id, "No order reference, skipping notification");
            return Ok(false);
        };

        let Some(intent) = self
            .intents
            .get_intent(&IntentLookup::OrderId(order_id.to_string()))
            .await?
        else {
            debug!(order_id = %order_id, "No payment intent for order, skipping notification");
            return Ok(false);
        };

        let Some(merchant_id) = intent.merchant_id else {
            debug!(order_id = %order_id, "Intent has no merchant, skipping notification");
            return Ok(false);
        };

        let Some(merchant) = self.merchants.get_merchant(merchant_id).await? else {
            debug!(order_id = %order_id, merchant_id, "Merchant not found, skipping notification");
            return Ok(false);
        };

        let Some((website, secret)) = merchant.notification_target() else {
            debug!(
                order_id = %order_id,
                merchant_id,
                "Merchant has no callback configured, skipping notification"
            );
            return Ok(false);
        };

        let notification = MerchantNotification {
            order_id: order_id.to_string(),
            status: transaction.status.merchant_status().to_string(),
            payment_id: order_id.to_string(),
            transaction_id: transaction.transaction_id.clone(),
            tx_hash: transaction.tx_hash.clone(),
            amount: transaction.amount,
            currency: self.currency(&transaction.token_address),
        };

        // The receiver verifies the signature over these exact bytes
        let body = serde_json::to_vec(&notification)
            .map_err(|e| PaylisError::Notification(format!("Failed to encode payload: {}", e)))?;
        let signature = sign_payload(secret.as_bytes(), &body)?;
        let url = format!("{}{}", website.trim_end_matches('/'), self.callback_path);

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={}", signature))
            .header(TIMESTAMP_HEADER, Utc::now().timestamp().to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| PaylisError::Notification(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaylisError::Notification(format!(
                "POST {} returned {}",
                url, status
            )));
        }

        info!(
            order_id = %order_id,
            merchant_id,
            transaction_id = %transaction.transaction_id,
            "Merchant notified"
        );
        Ok(true)
    }
}

#[async_trait]
impl Notifier for MerchantNotifier {
    async fn notify(&self, transaction: &Transaction) {
        if let Err(e) = self.deliver(transaction).await {
            warn!(
                transaction_id = %transaction.transaction_id,
                order_id = ?transaction.order_id,
                error = %e,
                "Merchant notification failed"
            );
        }
    }
}
