//! SQLite implementations of the intent, ledger and merchant stores

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use std::str::FromStr;
use types::{
    error::DatabaseError, utils::parse_u256, HistoryCursor, IntentLookup, LedgerSummary, Merchant,
    MerchantStore, NewMerchant, NewPaymentIntent, NewTransaction, PatchOutcome, PaylisError,
    PaymentIntent, PaymentIntentStore, Result, Transaction, TransactionLedger, TransactionPatch,
    TransactionStatus, User,
};

const SETTLED: [TransactionStatus; 2] = [TransactionStatus::Confirmed, TransactionStatus::Mined];

/// All stores over one SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

/// Fixed-width RFC3339 so that text order is time order
fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_failed(e: sqlx::Error) -> PaylisError {
    let constraint = e
        .as_database_error()
        .map(|db| db.is_foreign_key_violation() || db.is_check_violation())
        .unwrap_or(false);
    if constraint {
        DatabaseError::ConstraintViolation(e.to_string()).into()
    } else {
        DatabaseError::QueryFailed(e.to_string()).into()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn corrupt(column: &str, value: impl Into<String>) -> PaylisError {
    DatabaseError::CorruptValue {
        column: column.to_string(),
        value: value.into(),
    }
    .into()
}

fn text(row: &SqliteRow, column: &str) -> Result<String> {
    row.try_get(column).map_err(query_failed)
}

fn opt_text(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    row.try_get(column).map_err(query_failed)
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw = text(row, column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| corrupt(column, raw))
}

fn opt_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    match opt_text(row, column)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| corrupt(column, raw)),
        None => Ok(None),
    }
}

fn amount(row: &SqliteRow, column: &str) -> Result<U256> {
    let raw = text(row, column)?;
    parse_u256(&raw).map_err(|_| corrupt(column, raw))
}

fn address(row: &SqliteRow, column: &str) -> Result<Address> {
    let raw = text(row, column)?;
    Address::from_str(&raw).map_err(|_| corrupt(column, raw))
}

fn status(row: &SqliteRow) -> Result<TransactionStatus> {
    let raw = text(row, "status")?;
    TransactionStatus::from_str(&raw).map_err(|_| corrupt("status", raw))
}

fn intent_from_row(row: &SqliteRow) -> Result<PaymentIntent> {
    Ok(PaymentIntent {
        id: row.try_get("id").map_err(query_failed)?,
        order_id: text(row, "order_id")?,
        token_address: address(row, "token_address")?,
        amount: amount(row, "amount")?,
        fee: amount(row, "fee")?,
        total: amount(row, "total")?,
        fee_schedule_version: row.try_get::<i64, _>("fee_schedule_version").map_err(query_failed)?
            as u32,
        merchant_id: row.try_get("merchant_id").map_err(query_failed)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        expires_at: opt_timestamp(row, "expires_at")?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let fee = match opt_text(row, "fee")? {
        Some(raw) => Some(parse_u256(&raw).map_err(|_| corrupt("fee", raw))?),
        None => None,
    };

    Ok(Transaction {
        id: row.try_get("id").map_err(query_failed)?,
        transaction_id: text(row, "transaction_id")?,
        idempotency_key: opt_text(row, "idempotency_key")?,
        tx_hash: opt_text(row, "tx_hash")?,
        payer_address: address(row, "payer_address")?,
        recipient_address: address(row, "recipient_address")?,
        token_address: address(row, "token_address")?,
        amount: amount(row, "amount")?,
        fee,
        status: status(row)?,
        block_number: row.try_get("block_number").map_err(query_failed)?,
        chain_id: row.try_get::<i64, _>("chain_id").map_err(query_failed)? as u64,
        note: opt_text(row, "note")?,
        created_at: timestamp(row, "created_at")?,
        confirmed_at: opt_timestamp(row, "confirmed_at")?,
        order_id: opt_text(row, "order_id")?,
    })
}

fn merchant_from_row(row: &SqliteRow) -> Result<Merchant> {
    Ok(Merchant {
        id: row.try_get("id").map_err(query_failed)?,
        user_id: row.try_get("user_id").map_err(query_failed)?,
        name: text(row, "name")?,
        email: text(row, "email")?,
        website: opt_text(row, "website")?,
        api_key: text(row, "api_key")?,
        webhook_secret: opt_text(row, "webhook_secret")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(query_failed)?,
        address: address(row, "address")?,
        created_at: timestamp(row, "created_at")?,
    })
}

/// `?, ?, ...` with `n` placeholders
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl SqliteStore {
    async fn fetch_transaction(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        sqlx::query("SELECT * FROM transactions WHERE transaction_id = ?")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?
            .as_ref()
            .map(transaction_from_row)
            .transpose()
    }
}

#[async_trait]
impl PaymentIntentStore for SqliteStore {
    async fn insert_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent> {
        let now = ts(&Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO payment_intents
                (order_id, token_address, amount, fee, total, fee_schedule_version,
                 merchant_id, created_at, updated_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&intent.order_id)
        .bind(intent.token_address.to_string())
        .bind(intent.amount.to_string())
        .bind(intent.fee.to_string())
        .bind(intent.total.to_string())
        .bind(intent.fee_schedule_version as i64)
        .bind(intent.merchant_id)
        .bind(&now)
        .bind(&now)
        .bind(intent.expires_at.as_ref().map(ts))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => intent_from_row(&row),
            Err(e) if is_unique_violation(&e) => Err(PaylisError::DuplicateOrder {
                order_id: intent.order_id,
            }),
            Err(e) => Err(query_failed(e)),
        }
    }

    async fn get_intent(&self, lookup: &IntentLookup) -> Result<Option<PaymentIntent>> {
        let row = match lookup {
            IntentLookup::Id(id) => {
                sqlx::query("SELECT * FROM payment_intents WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
            IntentLookup::OrderId(order_id) => {
                sqlx::query("SELECT * FROM payment_intents WHERE order_id = ?")
                    .bind(order_id)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(query_failed)?;

        row.as_ref().map(intent_from_row).transpose()
    }
}

#[async_trait]
impl TransactionLedger for SqliteStore {
    async fn insert(&self, tx: NewTransaction) -> Result<Transaction> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (transaction_id, idempotency_key, tx_hash, payer_address, recipient_address,
                 token_address, amount, fee, status, chain_id, created_at, confirmed_at, order_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&tx.transaction_id)
        .bind(&tx.idempotency_key)
        .bind(&tx.tx_hash)
        .bind(tx.payer_address.to_string())
        .bind(tx.recipient_address.to_string())
        .bind(tx.token_address.to_string())
        .bind(tx.amount.to_string())
        .bind(tx.fee.map(|f| f.to_string()))
        .bind(tx.status.as_str())
        .bind(tx.chain_id as i64)
        .bind(ts(&tx.created_at))
        .bind(tx.confirmed_at.as_ref().map(ts))
        .bind(&tx.order_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => transaction_from_row(&row),
            Err(e) if is_unique_violation(&e) => Err(PaylisError::AlreadyExists {
                resource: format!("transaction {}", tx.transaction_id),
            }),
            Err(e) => Err(query_failed(e)),
        }
    }

    async fn update_by_relay_transaction_id(
        &self,
        transaction_id: &str,
        patch: TransactionPatch,
    ) -> Result<PatchOutcome> {
        // Statuses a row may currently hold for this patch to apply
        let from: Vec<&str> = TransactionStatus::ALL
            .iter()
            .filter(|current| current.can_transition_to(patch.status))
            .map(|current| current.as_str())
            .collect();

        let updated = if from.is_empty() {
            0
        } else {
            let sql = format!(
                r#"
                UPDATE transactions
                SET status = ?,
                    tx_hash = COALESCE(?, tx_hash),
                    confirmed_at = COALESCE(?, confirmed_at)
                WHERE transaction_id = ? AND status IN ({})
                "#,
                placeholders(from.len())
            );
            let mut query = sqlx::query(&sql)
                .bind(patch.status.as_str())
                .bind(&patch.tx_hash)
                .bind(patch.confirmed_at.as_ref().map(ts))
                .bind(transaction_id);
            for status in &from {
                query = query.bind(*status);
            }
            query
                .execute(&self.pool)
                .await
                .map_err(query_failed)?
                .rows_affected()
        };

        let row = self
            .fetch_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaylisError::NotFound {
                resource: format!("transaction {}", transaction_id),
            })?;

        if updated == 0 {
            Ok(PatchOutcome::Skipped {
                current: row.status,
                requested: patch.status,
            })
        } else {
            Ok(PatchOutcome::Applied(row))
        }
    }

    async fn get_by_relay_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>> {
        self.fetch_transaction(transaction_id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
        sqlx::query("SELECT * FROM transactions WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?
            .as_ref()
            .map(transaction_from_row)
            .transpose()
    }

    async fn claim_submission(&self, key: &str, stale_before: DateTime<Utc>) -> Result<bool> {
        // Fresh claims win the insert; abandoned ones are taken over in place
        let result = sqlx::query(
            r#"
            INSERT INTO relay_submissions (idempotency_key, claimed_at) VALUES (?, ?)
            ON CONFLICT (idempotency_key) DO UPDATE SET claimed_at = excluded.claimed_at
            WHERE relay_submissions.claimed_at < ?
            "#,
        )
        .bind(key)
        .bind(ts(&Utc::now()))
        .bind(ts(&stale_before))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_submission(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM relay_submissions WHERE idempotency_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn claim_notification(&self, transaction_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET notified_at = ?
            WHERE transaction_id = ? AND status = ? AND notified_at IS NULL
            "#,
        )
        .bind(ts(&Utc::now()))
        .bind(transaction_id)
        .bind(TransactionStatus::Confirmed.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected() == 1)
    }

    async fn has_settled_transaction(&self, order_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE order_id = ? AND status IN (?, ?)) AS settled",
        )
        .bind(order_id)
        .bind(SETTLED[0].as_str())
        .bind(SETTLED[1].as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(row.try_get::<i64, _>("settled").map_err(query_failed)? != 0)
    }

    async fn settled_summary(&self) -> Result<LedgerSummary> {
        // Amounts are 256-bit; summed here rather than in SQL
        let rows = sqlx::query("SELECT amount FROM transactions WHERE status IN (?, ?)")
            .bind(SETTLED[0].as_str())
            .bind(SETTLED[1].as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        let mut summary = LedgerSummary::default();
        for row in &rows {
            summary.total_revenue = summary.total_revenue.saturating_add(amount(row, "amount")?);
            summary.total_paid_transactions += 1;
        }
        Ok(summary)
    }

    async fn settled_history(
        &self,
        limit: u32,
        before: Option<HistoryCursor>,
    ) -> Result<Vec<Transaction>> {
        let cursor_at = before.map(|c| ts(&c.created_at));
        let cursor_id = before.map(|c| c.id);

        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE status IN (?, ?)
              AND (? IS NULL OR created_at < ? OR (created_at = ? AND id < ?))
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(SETTLED[0].as_str())
        .bind(SETTLED[1].as_str())
        .bind(&cursor_at)
        .bind(&cursor_at)
        .bind(&cursor_at)
        .bind(cursor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl MerchantStore for SqliteStore {
    async fn get_or_create_user(&self, address: Address) -> Result<User> {
        sqlx::query("INSERT OR IGNORE INTO users (address, created_at) VALUES (?, ?)")
            .bind(address.to_string())
            .bind(ts(&Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;

        let row = sqlx::query("SELECT * FROM users WHERE address = ?")
            .bind(address.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        user_from_row(&row)
    }

    async fn insert_merchant(&self, merchant: NewMerchant) -> Result<Merchant> {
        let now = ts(&Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO merchants
                (user_id, name, email, website, api_key, webhook_secret, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(merchant.user_id)
        .bind(&merchant.name)
        .bind(&merchant.email)
        .bind(&merchant.website)
        .bind(&merchant.api_key)
        .bind(&merchant.webhook_secret)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => merchant_from_row(&row),
            Err(e) if is_unique_violation(&e) => Err(PaylisError::AlreadyExists {
                resource: format!("merchant for user {}", merchant.user_id),
            }),
            Err(e) => Err(query_failed(e)),
        }
    }

    async fn get_merchant(&self, id: i64) -> Result<Option<Merchant>> {
        sqlx::query("SELECT * FROM merchants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?
            .as_ref()
            .map(merchant_from_row)
            .transpose()
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn find_by_owner_address(&self, address: Address) -> Result<Option<Merchant>> {
        sqlx::query(
            r#"
            SELECT m.* FROM merchants m
            JOIN users u ON u.id = m.user_id
            WHERE u.address = ?
            LIMIT 1
            "#,
        )
        .bind(address.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?
        .as_ref()
        .map(merchant_from_row)
        .transpose()
    }
}
