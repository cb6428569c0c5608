//! API route definitions

use crate::api::handlers;
use crate::app::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create the main API router
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Payment endpoints
        .route("/api/transaction/fee", get(handlers::fee_quote))
        .route(
            "/api/transaction/checkout",
            get(handlers::get_checkout).post(handlers::create_checkout),
        )
        .route("/api/transaction/submit", post(handlers::submit_transaction))
        // Relayer callbacks
        .route("/api/webhook/relayer", post(handlers::relayer_webhook))
        // Merchant endpoints
        .route(
            "/api/merchant/registration",
            post(handlers::register_merchant),
        )
        .route("/api/merchant/dashboard", get(handlers::merchant_dashboard))
        // Health
        .route("/healthz", get(handlers::health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use alloy::primitives::{Address, Bytes, U256};
    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use alloy::sol_types::{SolCall, SolStruct};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use config::{Config, IDRX_ADDRESS};
    use payment::{ForwardRequest, IPaymentGateway};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;
    use types::{
        ForwardRequestBody, MerchantStore, NewMerchant, NewTransaction, PaymentIntentStore,
        TransactionLedger, TransactionStatus,
    };
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const WEBHOOK_KEY: &str = "relayer-webhook-key";
    const HASH: &str = "0x8f2a55949038a9610f50fb23b5883af3b4ecb3c3bb792cbcefbd1542c692be63";

    fn test_config(relayer_url: &str) -> Config {
        let mut config = Config::default();
        config.relayer.base_url = relayer_url.to_string();
        config.relayer.access_token = "relayer-token".to_string();
        config.relayer.webhook_signing_key = WEBHOOK_KEY.to_string();
        config.relayer.poll_base_delay_ms = 1;
        config.checkout.public_base_url = "https://pay.paylis.xyz".to_string();
        config
    }

    async fn create_test_state(relayer_url: &str) -> Arc<AppState> {
        let database = Database::new_in_memory().await.unwrap();
        Arc::new(AppState::new(test_config(relayer_url), database).unwrap())
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_routes()
            .with_state(state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn register(state: &Arc<AppState>, owner: Address) -> i64 {
        let user = state.store.get_or_create_user(owner).await.unwrap();
        state
            .store
            .insert_merchant(NewMerchant {
                user_id: user.id,
                name: "Warung Kopi".to_string(),
                email: "owner@warung.example".to_string(),
                website: None,
                api_key: "key".to_string(),
                webhook_secret: "secret".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    fn pending_transaction(transaction_id: &str, order_id: &str) -> NewTransaction {
        NewTransaction {
            transaction_id: transaction_id.to_string(),
            idempotency_key: None,
            tx_hash: None,
            payer_address: Address::repeat_byte(0x11),
            recipient_address: Address::repeat_byte(0x33),
            token_address: IDRX_ADDRESS,
            amount: U256::from(100_000u64),
            fee: Some(U256::from(1_150u64)),
            status: TransactionStatus::Pending,
            chain_id: 4202,
            created_at: Utc::now(),
            confirmed_at: None,
            order_id: Some(order_id.to_string()),
        }
    }

    /// Merchant owned by the payment receiver, with order ORD-1 open for 100000 IDRX
    async fn open_order(state: &Arc<AppState>) {
        let owner = Address::repeat_byte(0x33);
        register(state, owner).await;
        let (status, _) = send(
            state,
            post_json(
                "/api/transaction/checkout?orderId=ORD-1",
                &json!({ "amount": "100000", "address": owner }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    /// A signed submission for ORD-1 paying `amount` IDRX with the given fee basis points
    fn signed_submission(config: &Config, amount: u64, fee_bps: u64) -> Value {
        let signer = PrivateKeySigner::random();
        let receiver = Address::repeat_byte(0x33);
        let data: Bytes = IPaymentGateway::payCall {
            token: IDRX_ADDRESS,
            receiver,
            amount: U256::from(amount),
            feeBps: U256::from(fee_bps),
        }
        .abi_encode()
        .into();

        let body = ForwardRequestBody {
            from: signer.address(),
            to: config.contracts.payment_gateway_address,
            value: U256::ZERO,
            gas: U256::from(100_000u64),
            nonce: U256::ZERO,
            data,
        };
        let domain = payment::forwarder_domain(
            &config.contracts.forwarder_name,
            &config.contracts.forwarder_version,
            config.network.chain_id,
            config.contracts.forwarder_address,
        );
        let hash = ForwardRequest::from(&body).eip712_signing_hash(&domain);
        let signature = signer.sign_hash_sync(&hash).unwrap();

        json!({
            "request": body,
            "signature": Bytes::from(signature.as_bytes().to_vec()),
            "meta": {
                "from": signer.address(),
                "receiver": receiver,
                "token": IDRX_ADDRESS,
                "amount": amount.to_string(),
                "fee": "1150",
                "orderId": "ORD-1"
            }
        })
    }

    fn signed_webhook(body: &Value, key: &str) -> Request<Body> {
        let raw = body.to_string();
        let signature = webhook::sign_payload(key.as_bytes(), raw.as_bytes()).unwrap();
        Request::builder()
            .method("POST")
            .uri("/api/webhook/relayer")
            .header("content-type", "application/json")
            .header("x-signature", format!("sha256={}", signature))
            .body(Body::from(raw))
            .unwrap()
    }

    fn transaction_update(id: &str, status: &str) -> Value {
        json!({
            "id": "evt-1",
            "event": "transaction_update",
            "payload": {
                "payload_type": "transaction",
                "id": id,
                "hash": HASH,
                "status": status,
                "confirmed_at": "2025-01-10T10:00:30Z"
            }
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state("http://127.0.0.1:9").await;
        let (status, body) = send(&state, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_fee_quote() {
        let state = create_test_state("http://127.0.0.1:9").await;
        let uri = format!(
            "/api/transaction/fee?token={}&amount=100000",
            IDRX_ADDRESS
        );

        let (status, body) = send(&state, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], "101150.00");
        assert_eq!(body["fee"], "1150.00");
        assert_eq!(body["totalFeeBasisPoints"], 115);
    }

    #[tokio::test]
    async fn test_fee_quote_rejects_bad_input() {
        let state = create_test_state("http://127.0.0.1:9").await;

        for uri in [
            format!("/api/transaction/fee?token={}", IDRX_ADDRESS),
            format!("/api/transaction/fee?token={}&amount=0", IDRX_ADDRESS),
            "/api/transaction/fee?amount=100".to_string(),
            format!("/api/transaction/fee?token={}&amount=100", Address::repeat_byte(0x99)),
        ] {
            let (status, body) = send(&state, get_request(&uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_checkout_is_idempotent() {
        let state = create_test_state("http://127.0.0.1:9").await;
        let owner = Address::repeat_byte(0xaa);
        let merchant_id = register(&state, owner).await;
        let body = json!({ "amount": "100000", "address": owner });

        let (first_status, first) = send(
            &state,
            post_json("/api/transaction/checkout?orderId=ORD-1", &body),
        )
        .await;
        let (second_status, second) = send(
            &state,
            post_json("/api/transaction/checkout?orderId=ORD-1", &body),
        )
        .await;

        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(first["payment_id"], "ORD-1");
        assert_eq!(
            first["payment_url"],
            "https://pay.paylis.xyz/checkout/ORD-1"
        );
        assert_eq!(first["status"], "created");

        let intent = state
            .store
            .get_intent(&types::IntentLookup::OrderId("ORD-1".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.merchant_id, Some(merchant_id));
        assert_eq!(intent.total, U256::from(101_150u64));

        let (status, view) = send(
            &state,
            get_request("/api/transaction/checkout?orderId=ORD-1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["orderId"], "ORD-1");
        assert_eq!(view["total"], "101150");
        assert_eq!(view["paid"], false);
    }

    #[tokio::test]
    async fn test_checkout_errors() {
        let state = create_test_state("http://127.0.0.1:9").await;

        let (status, _) = send(
            &state,
            post_json(
                "/api/transaction/checkout?orderId=ORD-9",
                &json!({ "amount": "100000", "address": Address::repeat_byte(0xcc) }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &state,
            post_json("/api/transaction/checkout?orderId=ORD-9", &json!({ "amount": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&state, get_request("/api/transaction/checkout")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Payment ID required");

        let (status, _) = send(
            &state,
            get_request("/api/transaction/checkout?orderId=ORD-404"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_relays_once() {
        let relayer = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/relayers/lisk-sepolia/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "id": "relay-tx-1",
                    "hash": HASH,
                    "status": "submitted",
                    "created_at": "2025-01-10T10:00:00Z"
                }
            })))
            .expect(1)
            .mount(&relayer)
            .await;

        let state = create_test_state(&relayer.uri()).await;
        open_order(&state).await;
        let submission = signed_submission(&state.config, 100_000, 115);

        let (status, first) = send(
            &state,
            post_json("/api/transaction/submit", &submission),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["id"], "relay-tx-1");
        assert_eq!(first["txHash"], HASH);
        assert_eq!(first["deduplicated"], false);

        // Same signed payload again: no second relay call
        let (status, second) = send(
            &state,
            post_json("/api/transaction/submit", &submission),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["id"], "relay-tx-1");
        assert_eq!(second["deduplicated"], true);

        let row = state
            .store
            .get_by_relay_transaction_id("relay-tx-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.fee, Some(U256::from(1_150u64)));
        assert_eq!(row.order_id.as_deref(), Some("ORD-1"));

        let (_, view) = send(
            &state,
            get_request("/api/transaction/checkout?orderId=ORD-1"),
        )
        .await;
        assert_eq!(view["paid"], false);
    }

    #[tokio::test]
    async fn test_submit_rejects_wrong_fee() {
        let relayer = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&relayer)
            .await;

        let state = create_test_state(&relayer.uri()).await;
        open_order(&state).await;
        let (status, _) = send(
            &state,
            post_json(
                "/api/transaction/submit",
                &signed_submission(&state.config, 100_000, 100),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_rejects_underpayment() {
        let relayer = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&relayer)
            .await;

        let state = create_test_state(&relayer.uri()).await;
        open_order(&state).await;

        // Signed for one unit less than the intent, at the live fee rate
        let (status, body) = send(
            &state,
            post_json(
                "/api/transaction/submit",
                &signed_submission(&state.config, 99_999, 115),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("ORD-1"));

        let (_, view) = send(
            &state,
            get_request("/api/transaction/checkout?orderId=ORD-1"),
        )
        .await;
        assert_eq!(view["paid"], false);
        assert!(!state.store.has_settled_transaction("ORD-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_submit_requires_open_intent() {
        let relayer = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&relayer)
            .await;

        let state = create_test_state(&relayer.uri()).await;
        let (status, _) = send(
            &state,
            post_json(
                "/api/transaction/submit",
                &signed_submission(&state.config, 100_000, 115),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_relayer_down() {
        let relayer = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&relayer)
            .await;

        let state = create_test_state(&relayer.uri()).await;
        open_order(&state).await;
        let (status, body) = send(
            &state,
            post_json(
                "/api/transaction/submit",
                &signed_submission(&state.config, 100_000, 115),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to submit transaction");
    }

    #[tokio::test]
    async fn test_webhook_requires_signature() {
        let state = create_test_state("http://127.0.0.1:9").await;
        state
            .store
            .insert(pending_transaction("tx-1", "ORD-1"))
            .await
            .unwrap();

        let (status, _) = send(
            &state,
            post_json("/api/webhook/relayer", &transaction_update("tx-1", "confirmed")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &state,
            signed_webhook(&transaction_update("tx-1", "confirmed"), "not-the-key"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let row = state
            .store
            .get_by_relay_transaction_id("tx-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_webhook_updates_ledger() {
        let state = create_test_state("http://127.0.0.1:9").await;
        state
            .store
            .insert(pending_transaction("tx-1", "ORD-1"))
            .await
            .unwrap();

        let (status, body) = send(
            &state,
            signed_webhook(&transaction_update("tx-1", "confirmed"), WEBHOOK_KEY),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        // Redelivery and late stale events are acknowledged without effect
        for stale in ["confirmed", "pending"] {
            let (status, _) = send(
                &state,
                signed_webhook(&transaction_update("tx-1", stale), WEBHOOK_KEY),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let row = state
            .store
            .get_by_relay_transaction_id("tx-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, TransactionStatus::Confirmed);
        assert_eq!(row.tx_hash.as_deref(), Some(HASH));
        assert!(state.store.has_settled_transaction("ORD-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_webhook_other_events_and_unknown_transactions() {
        let state = create_test_state("http://127.0.0.1:9").await;

        let (status, body) = send(
            &state,
            signed_webhook(&json!({ "event": "relayer_paused", "payload": {} }), WEBHOOK_KEY),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = send(
            &state,
            signed_webhook(&transaction_update("tx-404", "confirmed"), WEBHOOK_KEY),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_merchant_registration() {
        let state = create_test_state("http://127.0.0.1:9").await;
        let body = json!({
            "address": Address::repeat_byte(0xaa),
            "name": "Warung Kopi",
            "email": "owner@warung.example",
            "website": "https://warung.example/"
        });

        let (status, first) = send(&state, post_json("/api/merchant/registration", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(first["key"].is_string());
        assert!(first["webhook_secret"].is_string());
        assert_ne!(first["key"], first["webhook_secret"]);

        let merchant = state
            .store
            .find_by_owner_address(Address::repeat_byte(0xaa))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merchant.website.as_deref(), Some("https://warung.example"));

        let (status, _) = send(&state, post_json("/api/merchant/registration", &body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &state,
            post_json(
                "/api/merchant/registration",
                &json!({ "address": Address::repeat_byte(0xbb), "name": "X", "email": "nope" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dashboard_pagination() {
        let state = create_test_state("http://127.0.0.1:9").await;
        let base = Utc::now() - chrono::Duration::hours(1);
        for i in 0..3 {
            let mut tx = pending_transaction(&format!("tx-{}", i), "ORD-1");
            tx.status = TransactionStatus::Confirmed;
            tx.created_at = base + chrono::Duration::minutes(i);
            state.store.insert(tx).await.unwrap();
        }
        state
            .store
            .insert(pending_transaction("tx-pending", "ORD-2"))
            .await
            .unwrap();

        let (status, page) = send(&state, get_request("/api/merchant/dashboard?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["summary"]["totalPaidTransactions"], 3);
        assert_eq!(page["summary"]["totalRevenue"], "300000");
        assert_eq!(page["history"].as_array().unwrap().len(), 2);
        assert_eq!(page["history"][0]["transactionId"], "tx-2");

        let cursor = page["nextCursor"].as_str().unwrap().to_string();
        let (status, next) = send(
            &state,
            get_request(&format!("/api/merchant/dashboard?limit=2&cursor={}", cursor)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let history = next["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["transactionId"], "tx-0");
        assert!(next["nextCursor"].is_null());

        let (status, _) = send(
            &state,
            get_request("/api/merchant/dashboard?cursor=yesterday"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dashboard_pages_through_equal_timestamps() {
        let state = create_test_state("http://127.0.0.1:9").await;
        let created_at = Utc::now() - chrono::Duration::hours(1);
        for i in 0..3 {
            let mut tx = pending_transaction(&format!("tx-{}", i), "ORD-1");
            tx.status = TransactionStatus::Confirmed;
            tx.created_at = created_at;
            state.store.insert(tx).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut uri = "/api/merchant/dashboard?limit=2".to_string();
        loop {
            let (status, page) = send(&state, get_request(&uri)).await;
            assert_eq!(status, StatusCode::OK);
            for row in page["history"].as_array().unwrap() {
                seen.push(row["transactionId"].as_str().unwrap().to_string());
            }
            match page["nextCursor"].as_str() {
                Some(cursor) => uri = format!("/api/merchant/dashboard?limit=2&cursor={}", cursor),
                None => break,
            }
        }

        assert_eq!(seen, vec!["tx-2", "tx-1", "tx-0"]);
    }
}
