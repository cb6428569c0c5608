//! HTTP client for the transaction relayer

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use types::{
    error::RelayError, ApiResponse, NetworkTransactionRequest, PaylisError, RelayerTransaction,
    Result,
};

/// Operations the gateway needs from a relayer
#[async_trait]
pub trait RelayerApi: Send + Sync {
    /// Hand a transaction to the relayer; returns the relayer's record of it
    async fn send_transaction(&self, request: &NetworkTransactionRequest)
        -> Result<RelayerTransaction>;

    /// Current relayer view of a transaction
    async fn get_transaction(&self, transaction_id: &str) -> Result<RelayerTransaction>;

    /// Relayer name used in logs and errors
    fn name(&self) -> &str;
}

/// HTTP client for one relayer
#[derive(Debug, Clone)]
pub struct RelayerClient {
    relayer_id: String,
    base_url: String,
    access_token: String,
    timeout: Duration,
    http_client: Client,
}

impl RelayerClient {
    /// Create a new relayer client
    pub fn new(settings: &config::RelayerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_seconds);
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("paylis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PaylisError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            relayer_id: settings.relayer_id.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
            timeout,
            http_client,
        })
    }

    fn transactions_url(&self) -> String {
        format!(
            "{}/api/v1/relayers/{}/transactions",
            self.base_url, self.relayer_id
        )
    }

    fn transaction_url(&self, transaction_id: &str) -> String {
        format!("{}/{}", self.transactions_url(), transaction_id)
    }

    /// Send a request and unwrap the `{success, data, error}` envelope
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = timeout(self.timeout, request.bearer_auth(&self.access_token).send())
            .await
            .map_err(|_| RelayError::ConnectionTimeout {
                relayer: self.relayer_id.clone(),
            })?
            .map_err(|e| RelayError::HttpError {
                relayer: self.relayer_id.clone(),
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            })?;

        let status = response.status();
        let raw_text = response.text().await.map_err(|e| RelayError::InvalidResponse {
            relayer: self.relayer_id.clone(),
            message: format!("error reading response body: {}", e),
        })?;

        if !status.is_success() {
            tracing::warn!(
                relayer = %self.relayer_id,
                status = status.as_u16(),
                body = %raw_text,
                "Relayer returned an error status"
            );
            return Err(RelayError::HttpError {
                relayer: self.relayer_id.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        parse_envelope(&self.relayer_id, &raw_text).map_err(Into::into)
    }
}

#[async_trait]
impl RelayerApi for RelayerClient {
    async fn send_transaction(
        &self,
        request: &NetworkTransactionRequest,
    ) -> Result<RelayerTransaction> {
        tracing::info!(
            relayer = %self.relayer_id,
            to = %request.to,
            gas_limit = request.gas_limit,
            "Sending transaction to relayer"
        );

        let transaction: RelayerTransaction = self
            .execute(self.http_client.post(self.transactions_url()).json(request))
            .await?;

        tracing::info!(
            relayer = %self.relayer_id,
            transaction_id = %transaction.id,
            status = %transaction.status,
            "Relayer accepted transaction"
        );
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<RelayerTransaction> {
        self.execute(self.http_client.get(self.transaction_url(transaction_id)))
            .await
    }

    fn name(&self) -> &str {
        &self.relayer_id
    }
}

/// Parse a relayer response envelope into its payload
fn parse_envelope<T: DeserializeOwned>(
    relayer: &str,
    raw_text: &str,
) -> std::result::Result<T, RelayError> {
    let envelope: ApiResponse<T> =
        serde_json::from_str(raw_text).map_err(|e| RelayError::InvalidResponse {
            relayer: relayer.to_string(),
            message: format!("invalid JSON response: {} | raw: {}", e, raw_text),
        })?;

    if !envelope.success {
        return Err(RelayError::Rejected {
            relayer: relayer.to_string(),
            reason: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    envelope.data.ok_or_else(|| RelayError::InvalidResponse {
        relayer: relayer.to_string(),
        message: format!("response without data | raw: {}", raw_text),
    })
}
