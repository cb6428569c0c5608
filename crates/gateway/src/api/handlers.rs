//! HTTP API request handlers

use crate::app::AppState;
use alloy::primitives::{Address, U256};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use relay_client::RelaySubmission;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc};
use types::{
    utils::{format_fixed_2, parse_u256},
    HistoryCursor, MerchantStore, NewMerchant, PaylisError, PaymentIntent, SubmitRequest,
    TransactionLedger,
};
use uuid::Uuid;

type ApiResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

/// Header carrying the relayer's HMAC of the webhook body
const RELAYER_SIGNATURE_HEADER: &str = "x-signature";

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

/// Map a domain error to a response; server-side failures get `public_message`
fn error_response(err: PaylisError, public_message: &str) -> (StatusCode, Json<Value>) {
    match err {
        PaylisError::Validation(message) => bad_request(message),
        err if err.is_client_error() => bad_request(err.to_string()),
        PaylisError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": err.to_string() })),
        ),
        PaylisError::Authentication(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        ),
        PaylisError::DuplicateSubmission { .. } | PaylisError::AlreadyExists { .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": err.to_string() })),
        ),
        err => {
            tracing::error!(error = %err, "{}", public_message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": public_message })),
            )
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, (StatusCode, Json<Value>)> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

/// Health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult {
    let db_healthy = state.database.health_check().await.is_ok();

    let status = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((
        status,
        Json(json!({
            "status": if db_healthy { "healthy" } else { "unhealthy" },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
            "components": {
                "database": if db_healthy { "healthy" } else { "unhealthy" },
            },
            "feeScheduleVersion": state.calculator.schedule().version,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct FeeQuery {
    pub token: Option<String>,
    pub amount: Option<String>,
}

/// Fee quote for an amount of a token
pub async fn fee_quote(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeeQuery>,
) -> ApiResult {
    let missing = || bad_request("amount and token address cannot be empty");

    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(missing)?;
    let amount = query
        .amount
        .as_deref()
        .map(parse_u256)
        .transpose()
        .map_err(|e| bad_request(format!("Invalid amount: {}", e)))?
        .filter(|a| !a.is_zero())
        .ok_or_else(missing)?;
    let token = Address::from_str(token.trim())
        .map_err(|_| bad_request(format!("Invalid token address: {}", token)))?;

    let quote = state
        .calculator
        .compute_fee(amount, &token)
        .map_err(|e| error_response(e, "Internal server error"))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "total": format_fixed_2(quote.total_amount),
            "fee": format_fixed_2(quote.total_fee),
            "totalFeeBasisPoints": quote.total_fee_basis_points,
            "feeScheduleVersion": quote.schedule_version,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

impl OrderQuery {
    fn order_id(self) -> Option<String> {
        self.order_id.filter(|o| !o.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(with = "types::utils::u256_dec")]
    pub amount: U256,
    /// Wallet address of the merchant owner
    pub address: Address,
    /// Token to pay with; the configured default when absent
    #[serde(default)]
    pub token: Option<Address>,
}

/// Create the payment intent for an order, or return the existing one
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult {
    let order_id = query
        .order_id()
        .ok_or_else(|| bad_request("orderId is required"))?;
    let request = json_body(payload)?;
    let token = request
        .token
        .unwrap_or(state.config.checkout.default_token);

    let outcome = state
        .checkout
        .create_intent(&order_id, request.amount, token, request.address)
        .await
        .map_err(|e| error_response(e, "Internal server error"))?;

    let response = state.checkout.checkout_response(&outcome);
    Ok((StatusCode::OK, Json(json!(response))))
}

#[derive(Debug, Serialize)]
struct IntentView {
    #[serde(flatten)]
    intent: PaymentIntent,
    paid: bool,
    expired: bool,
    #[serde(rename = "paymentUrl")]
    payment_url: String,
}

/// Look up the intent for an order
pub async fn get_checkout(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> ApiResult {
    let order_id = query
        .order_id()
        .ok_or_else(|| bad_request("Payment ID required"))?;

    let intent = state
        .checkout
        .get_intent(&order_id)
        .await
        .map_err(|e| error_response(e, "Internal server error"))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Payment not found" })),
            )
        })?;

    let paid = state
        .store
        .has_settled_transaction(&intent.order_id)
        .await
        .map_err(|e| error_response(e, "Internal server error"))?;

    let view = IntentView {
        paid,
        expired: intent.is_expired(),
        payment_url: state.checkout.payment_url(&intent.order_id),
        intent,
    };
    Ok((StatusCode::OK, Json(json!(view))))
}

/// Verify a signed forwarding request and relay it
pub async fn submit_transaction(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult {
    const FAILED: &str = "Failed to submit transaction";

    let request = json_body(payload)?;

    if let Some(order_id) = request.meta.order_id.as_deref() {
        let paid = state
            .store
            .has_settled_transaction(order_id)
            .await
            .map_err(|e| error_response(e, FAILED))?;
        if paid {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({ "error": "This order has already been paid" })),
            ));
        }
    }

    // An order is settled on the terms frozen into its intent, anything else
    // on the live schedule
    let (prepared, fee) = match request.meta.order_id.as_deref() {
        Some(order_id) => {
            let prepared = state
                .verifier
                .verify_request(&request)
                .map_err(|e| error_response(e, FAILED))?;
            let intent = state
                .checkout
                .intent_for_payment(order_id, &prepared.payment, request.meta.fee)
                .await
                .map_err(|e| error_response(e, FAILED))?;
            (prepared, intent.fee)
        }
        None => {
            let prepared = state
                .verifier
                .prepare(&request, &state.calculator)
                .map_err(|e| error_response(e, FAILED))?;
            let quote = state
                .calculator
                .compute_fee(prepared.payment.amount, &prepared.payment.token)
                .map_err(|e| error_response(e, FAILED))?;
            (prepared, quote.total_fee)
        }
    };

    let submission = RelaySubmission {
        calldata: prepared.calldata,
        idempotency_key: prepared.idempotency_key,
        payer: request.meta.from,
        recipient: prepared.payment.receiver,
        token: prepared.payment.token,
        amount: prepared.payment.amount,
        fee: Some(fee),
        order_id: request.meta.order_id.clone(),
    };

    let outcome = state
        .submitter
        .submit(submission)
        .await
        .map_err(|e| error_response(e, FAILED))?;

    let transaction = outcome.transaction;
    Ok((
        StatusCode::OK,
        Json(json!({
            "id": transaction.transaction_id,
            "txHash": transaction.tx_hash,
            "status": transaction.status,
            "deduplicated": outcome.deduplicated,
        })),
    ))
}

/// Relayer status callbacks
pub async fn relayer_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let signature = headers
        .get(RELAYER_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state
        .reconciler
        .handle_signed(&body, signature)
        .await
        .map_err(|e| error_response(e, "Internal server error"))?;

    Ok((StatusCode::OK, Json(json!(ack))))
}

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub address: Address,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub website: Option<String>,
}

/// Register the merchant owned by a wallet
pub async fn register_merchant(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> ApiResult {
    const FAILED: &str = "Failed to register merchant";

    let request = json_body(payload)?;
    if request.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    if !request.email.contains('@') {
        return Err(bad_request("A valid email is required"));
    }
    let website = request
        .website
        .map(|w| w.trim().trim_end_matches('/').to_string())
        .filter(|w| !w.is_empty());
    if let Some(website) = &website {
        if !website.starts_with("http://") && !website.starts_with("https://") {
            return Err(bad_request("website must be an http(s) URL"));
        }
    }

    let user = state
        .store
        .get_or_create_user(request.address)
        .await
        .map_err(|e| error_response(e, FAILED))?;

    let merchant = state
        .store
        .insert_merchant(NewMerchant {
            user_id: user.id,
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            website,
            api_key: Uuid::new_v4().to_string(),
            webhook_secret: Uuid::new_v4().simple().to_string(),
        })
        .await
        .map_err(|e| error_response(e, FAILED))?;

    tracing::info!(merchant_id = merchant.id, user_id = user.id, "Merchant registered");

    Ok((
        StatusCode::OK,
        Json(json!({
            "key": merchant.api_key,
            "webhook_secret": merchant.webhook_secret,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// Settled revenue summary and paginated history
pub async fn merchant_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let cursor = query
        .cursor
        .filter(|c| !c.is_empty())
        .map(|c| c.parse::<HistoryCursor>())
        .transpose()
        .map_err(|e| error_response(e, "Internal server error"))?;

    let summary = state
        .store
        .settled_summary()
        .await
        .map_err(|e| error_response(e, "Internal server error"))?;

    // One extra row tells whether another page exists
    let mut history = state
        .store
        .settled_history(limit + 1, cursor)
        .await
        .map_err(|e| error_response(e, "Internal server error"))?;

    let next_cursor = if history.len() > limit as usize {
        history.truncate(limit as usize);
        history.last().map(|t| HistoryCursor::after(t).to_string())
    } else {
        None
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "summary": summary,
            "history": history,
            "nextCursor": next_cursor,
        })),
    ))
}
