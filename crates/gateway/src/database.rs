//! Database operations and connection management

use anyhow::{Context, Result};
use config::DatabaseConfig;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{str::FromStr, time::Duration};

/// Schema, applied in order. Every statement is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "merchants",
        r#"
        CREATE TABLE IF NOT EXISTS merchants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            website TEXT,
            api_key TEXT NOT NULL UNIQUE,
            webhook_secret TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "payment_intents",
        r#"
        CREATE TABLE IF NOT EXISTS payment_intents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id TEXT NOT NULL UNIQUE,
            token_address TEXT NOT NULL,
            amount TEXT NOT NULL,
            fee TEXT NOT NULL,
            total TEXT NOT NULL,
            fee_schedule_version INTEGER NOT NULL,
            merchant_id INTEGER REFERENCES merchants(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT
        )
        "#,
    ),
    (
        "transactions",
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL UNIQUE,
            idempotency_key TEXT UNIQUE,
            tx_hash TEXT UNIQUE,
            payer_address TEXT NOT NULL,
            recipient_address TEXT NOT NULL,
            token_address TEXT NOT NULL,
            amount TEXT NOT NULL,
            fee TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            block_number INTEGER,
            chain_id INTEGER NOT NULL,
            note TEXT,
            created_at TEXT NOT NULL,
            confirmed_at TEXT,
            order_id TEXT,
            notified_at TEXT
        )
        "#,
    ),
    (
        "transactions_order_id index",
        "CREATE INDEX IF NOT EXISTS idx_transactions_order_id ON transactions(order_id)",
    ),
    (
        "transactions_status_created index",
        "CREATE INDEX IF NOT EXISTS idx_transactions_status_created ON transactions(status, created_at)",
    ),
    (
        "relay_submissions",
        r#"
        CREATE TABLE IF NOT EXISTS relay_submissions (
            idempotency_key TEXT PRIMARY KEY,
            claimed_at TEXT NOT NULL
        )
        "#,
    ),
];

/// Database connection manager
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid database url: {}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(if config.wal_mode {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            });

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Create a migrated in-memory database for testing
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await
            .context("Failed to create in-memory database")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        for (name, statement) in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {}", name))?;
        }
        tracing::debug!(steps = MIGRATIONS.len(), "Database schema up to date");
        Ok(())
    }

    /// Perform a health check on the database
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Get the database pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
