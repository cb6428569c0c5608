//! Checkout: payment intent creation and lookup

use crate::{
    calculator::FeeCalculator,
    forwarder::{verify_fee, IPaymentGateway},
};
use alloy::primitives::{Address, U256};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{
    CheckoutOutcome, CheckoutResponse, IntentLookup, MerchantStore, NewPaymentIntent, PaylisError,
    PaymentIntent, PaymentIntentStore, Result,
};

/// Ten years
const MAX_INTENT_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Creates payment intents and resolves them for checkout pages
#[derive(Clone)]
pub struct CheckoutService {
    intents: Arc<dyn PaymentIntentStore>,
    merchants: Arc<dyn MerchantStore>,
    calculator: Arc<FeeCalculator>,
    public_base_url: String,
    intent_ttl: Duration,
}

impl CheckoutService {
    pub fn new(
        intents: Arc<dyn PaymentIntentStore>,
        merchants: Arc<dyn MerchantStore>,
        calculator: Arc<FeeCalculator>,
        public_base_url: impl Into<String>,
        intent_ttl_seconds: u64,
    ) -> Self {
        let public_base_url: String = public_base_url.into();
        Self {
            intents,
            merchants,
            calculator,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            intent_ttl: Duration::seconds(intent_ttl_seconds.min(MAX_INTENT_TTL_SECONDS) as i64),
        }
    }

    /// Create the intent for `order_id`, or return the one that already exists.
    ///
    /// The fee is computed once here and frozen into the intent together with
    /// the schedule version it came from.
    pub async fn create_intent(
        &self,
        order_id: &str,
        amount: U256,
        token: Address,
        merchant_owner: Address,
    ) -> Result<CheckoutOutcome> {
        if order_id.trim().is_empty() {
            return Err(PaylisError::Validation("orderId is required".to_string()));
        }

        let by_order = IntentLookup::OrderId(order_id.to_string());
        if let Some(existing) = self.intents.get_intent(&by_order).await? {
            debug!(order_id = %order_id, intent_id = existing.id, "Intent already exists");
            return Ok(CheckoutOutcome::Existing(existing));
        }

        let merchant = self
            .merchants
            .find_by_owner_address(merchant_owner)
            .await?
            .ok_or_else(|| PaylisError::NotFound {
                resource: format!("merchant for {}", merchant_owner),
            })?;

        let quote = self.calculator.compute_fee(amount, &token)?;

        let new_intent = NewPaymentIntent {
            order_id: order_id.to_string(),
            token_address: token,
            amount,
            fee: quote.total_fee,
            total: quote.total_amount,
            fee_schedule_version: quote.schedule_version,
            merchant_id: Some(merchant.id),
            expires_at: Some(Utc::now() + self.intent_ttl),
        };

        match self.intents.insert_intent(new_intent).await {
            Ok(intent) => {
                info!(
                    order_id = %intent.order_id,
                    intent_id = intent.id,
                    merchant_id = merchant.id,
                    total = %intent.total,
                    fee_schedule_version = intent.fee_schedule_version,
                    "Payment intent created"
                );
                Ok(CheckoutOutcome::Created(intent))
            }
            // Lost the race on the order_id unique index
            Err(PaylisError::DuplicateOrder { .. }) => {
                debug!(order_id = %order_id, "Concurrent checkout won, reading its intent");
                self.intents
                    .get_intent(&by_order)
                    .await?
                    .map(CheckoutOutcome::Existing)
                    .ok_or_else(|| {
                        PaylisError::Internal(format!(
                            "Intent for order {} vanished after duplicate insert",
                            order_id
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Look an intent up by numeric id or order id
    pub async fn get_intent(&self, raw: &str) -> Result<Option<PaymentIntent>> {
        for lookup in IntentLookup::parse(raw) {
            if let Some(intent) = self.intents.get_intent(&lookup).await? {
                return Ok(Some(intent));
            }
        }
        Ok(None)
    }

    /// Resolve the intent a signed payment settles and check it pays that
    /// intent exactly.
    ///
    /// The token and amount must be the intent's, the receiver must be the
    /// wallet owning the intent's merchant, and the signed basis points must
    /// match the fee frozen into the intent rather than the live schedule.
    pub async fn intent_for_payment(
        &self,
        order_id: &str,
        payment: &IPaymentGateway::payCall,
        submitted_fee: Option<U256>,
    ) -> Result<PaymentIntent> {
        let intent = self
            .intents
            .get_intent(&IntentLookup::OrderId(order_id.to_string()))
            .await?
            .filter(|intent| !intent.is_expired())
            .ok_or_else(|| PaylisError::NotFound {
                resource: format!("payment intent {}", order_id),
            })?;

        if payment.token != intent.token_address || payment.amount != intent.amount {
            warn!(
                order_id = %order_id,
                signed_token = %payment.token,
                signed_amount = %payment.amount,
                amount = %intent.amount,
                "Signed payment does not match intent"
            );
            return Err(PaylisError::Validation(format!(
                "Payment of {} {} does not match order {}",
                payment.amount, payment.token, order_id
            )));
        }

        let owner = self.merchant_owner(&intent).await?;
        if payment.receiver != owner {
            warn!(
                order_id = %order_id,
                receiver = %payment.receiver,
                "Signed receiver is not the merchant"
            );
            return Err(PaylisError::Validation(format!(
                "Receiver {} is not the merchant of order {}",
                payment.receiver, order_id
            )));
        }

        verify_fee(payment, intent.fee, submitted_fee)?;

        Ok(intent)
    }

    /// Wallet of the user owning the intent's merchant
    async fn merchant_owner(&self, intent: &PaymentIntent) -> Result<Address> {
        let no_merchant = || {
            PaylisError::Validation(format!("Order {} has no merchant", intent.order_id))
        };

        let merchant_id = intent.merchant_id.ok_or_else(no_merchant)?;
        let merchant = self
            .merchants
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(no_merchant)?;
        let owner = self
            .merchants
            .get_user(merchant.user_id)
            .await?
            .ok_or_else(no_merchant)?;

        Ok(owner.address)
    }

    /// Public checkout page of an order
    pub fn payment_url(&self, order_id: &str) -> String {
        format!("{}/checkout/{}", self.public_base_url, order_id)
    }

    /// Response body shared by new and repeated checkout requests
    pub fn checkout_response(&self, outcome: &CheckoutOutcome) -> CheckoutResponse {
        let order_id = &outcome.intent().order_id;
        CheckoutResponse {
            payment_url: self.payment_url(order_id),
            payment_id: order_id.clone(),
            status: "created".to_string(),
        }
    }

    pub fn calculator(&self) -> &FeeCalculator {
        &self.calculator
    }
}
