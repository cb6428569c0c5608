//! Applies relayer status callbacks to the transaction ledger

use crate::{notifier::Notifier, signature::verify_signature};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{
    utils::parse_timestamp, PatchOutcome, PaylisError, Result, Transaction, TransactionLedger,
    TransactionPatch, TransactionStatus, TransactionUpdatePayload, WebhookAck, WebhookEvent,
};

/// What a single event did to the ledger
#[derive(Debug)]
pub enum Reconciled {
    /// Event kind carries no ledger update
    Ignored,
    /// Row exists but the transition was refused; a confirmed row that was
    /// never announced still gets its merchant callback
    Skipped {
        current: TransactionStatus,
        requested: TransactionStatus,
        notification: Option<JoinHandle<()>>,
    },
    /// Row patched; `notification` is set when a merchant callback was spawned
    Applied {
        transaction: Transaction,
        notification: Option<JoinHandle<()>>,
    },
}

/// Reconciles relayer webhooks into the ledger
pub struct WebhookReconciler {
    ledger: Arc<dyn TransactionLedger>,
    notifier: Arc<dyn Notifier>,
    signing_key: String,
}

impl WebhookReconciler {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        notifier: Arc<dyn Notifier>,
        signing_key: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            notifier,
            signing_key: signing_key.into(),
        }
    }

    /// Authenticate a raw webhook body, then handle it
    pub async fn handle_signed(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookAck> {
        let signature = signature.ok_or_else(|| {
            PaylisError::Authentication("Missing webhook signature".to_string())
        })?;
        if !verify_signature(self.signing_key.as_bytes(), body, signature) {
            warn!("Rejected relayer webhook with invalid signature");
            return Err(PaylisError::Authentication(
                "Invalid webhook signature".to_string(),
            ));
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| PaylisError::Validation(format!("Invalid webhook body: {}", e)))?;
        self.handle_event(event).await
    }

    /// Apply an event; anything that is not a transaction update is acked untouched
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookAck> {
        self.reconcile(event).await?;
        Ok(WebhookAck::ok())
    }

    pub async fn reconcile(&self, event: WebhookEvent) -> Result<Reconciled> {
        if !event.is_transaction_update() {
            debug!(event = %event.event, "Ignoring relayer event");
            return Ok(Reconciled::Ignored);
        }

        let payload: TransactionUpdatePayload = serde_json::from_value(event.payload)
            .map_err(|e| PaylisError::Validation(format!("Invalid transaction payload: {}", e)))?;

        let patch = TransactionPatch {
            tx_hash: payload.hash.clone().filter(|h| !h.is_empty()),
            status: payload.status,
            confirmed_at: payload.confirmed_at.as_deref().and_then(parse_timestamp),
        };

        let outcome = match self
            .ledger
            .update_by_relay_transaction_id(&payload.id, patch)
            .await
        {
            Ok(outcome) => outcome,
            Err(PaylisError::NotFound { .. }) => {
                error!(
                    transaction_id = %payload.id,
                    status = %payload.status,
                    "Webhook references unknown transaction"
                );
                return Err(PaylisError::Reconciliation(format!(
                    "Unknown relay transaction {}",
                    payload.id
                )));
            }
            Err(e) => return Err(e),
        };

        match outcome {
            PatchOutcome::Skipped { current, requested } => {
                info!(
                    transaction_id = %payload.id,
                    current = %current,
                    requested = %requested,
                    "Status update skipped"
                );
                let notification = if current == TransactionStatus::Confirmed {
                    match self.ledger.get_by_relay_transaction_id(&payload.id).await? {
                        Some(transaction) => self.notify_once(&transaction).await?,
                        None => None,
                    }
                } else {
                    None
                };
                Ok(Reconciled::Skipped {
                    current,
                    requested,
                    notification,
                })
            }
            PatchOutcome::Applied(transaction) => {
                info!(
                    transaction_id = %transaction.transaction_id,
                    status = %transaction.status,
                    tx_hash = ?transaction.tx_hash,
                    "Ledger updated"
                );

                let notification = self.notify_once(&transaction).await?;
                Ok(Reconciled::Applied {
                    transaction,
                    notification,
                })
            }
        }
    }

    /// Spawn the merchant callback for a confirmed row unless it already went out
    async fn notify_once(&self, transaction: &Transaction) -> Result<Option<JoinHandle<()>>> {
        if transaction.status != TransactionStatus::Confirmed {
            return Ok(None);
        }
        if !self
            .ledger
            .claim_notification(&transaction.transaction_id)
            .await?
        {
            debug!(
                transaction_id = %transaction.transaction_id,
                "Merchant already notified"
            );
            return Ok(None);
        }

        let notifier = self.notifier.clone();
        let settled = transaction.clone();
        Ok(Some(tokio::spawn(async move {
            notifier.notify(&settled).await
        })))
    }
}
