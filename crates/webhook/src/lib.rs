//! Relayer webhook reconciliation and merchant notification
//!
//! Inbound relayer events patch the transaction ledger; confirmed payments
//! are announced to the merchant with an HMAC-signed callback.

pub mod notifier;
pub mod reconciler;
pub mod signature;

pub use notifier::{MerchantNotification, MerchantNotifier, Notifier};
pub use reconciler::WebhookReconciler;
pub use signature::{sign_payload, verify_signature};
