//! Relay submission with bounded hash polling

use crate::client::RelayerApi;
use alloy::primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use config::RetryPolicy;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};
use types::{
    utils::{parse_timestamp, sanitize_for_logging},
    NewTransaction, NetworkTransactionRequest, PaylisError, RelayerTransaction, Result, Speed,
    Transaction, TransactionLedger, TransactionStatus,
};

/// A verified forwarder call ready to hand to the relayer
#[derive(Debug, Clone)]
pub struct RelaySubmission {
    /// `execute(req, signature)` calldata for the forwarder
    pub calldata: Bytes,
    pub idempotency_key: String,
    pub payer: Address,
    pub recipient: Address,
    pub token: Address,
    pub amount: U256,
    pub fee: Option<U256>,
    pub order_id: Option<String>,
}

/// Result of a submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Ledger row for the submission
    pub transaction: Transaction,
    /// The payload had already been relayed; nothing was sent this time
    pub deduplicated: bool,
}

/// Transaction parameters fixed per deployment
#[derive(Debug, Clone)]
pub struct SubmitterSettings {
    /// Forwarder contract the relayer calls
    pub forwarder: Address,
    pub gas_limit: u64,
    pub speed: Speed,
    pub chain_id: u64,
    pub retry: RetryPolicy,
    /// Claims older than this belong to an abandoned submission
    pub claim_ttl: Duration,
}

impl SubmitterSettings {
    pub fn from_config(config: &config::Config) -> Self {
        Self {
            forwarder: config.contracts.forwarder_address,
            gas_limit: config.relayer.gas_limit,
            speed: config.relayer.speed,
            chain_id: config.network.chain_id,
            retry: config.retry_policy(),
            claim_ttl: Duration::from_secs(config.relayer.claim_ttl_seconds),
        }
    }

    /// Claims taken before this instant may be taken over
    fn claim_cutoff(&self) -> DateTime<Utc> {
        let now = Utc::now();
        chrono::Duration::from_std(self.claim_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Sends forwarder calls to the relayer and records them in the ledger
///
/// After the relayer accepts a transaction the submitter polls for its chain
/// hash up to `retry.max_attempts` times, waiting `base * 2^attempt` before
/// each poll. If no hash shows up it fetches the record once more for its
/// metadata. Exactly one ledger row is written per accepted send, with a null
/// hash when none was assigned yet. If that write fails a bare pending row is
/// written instead so the relayer's webhooks can still find it.
pub struct RelaySubmitter {
    relayer: Arc<dyn RelayerApi>,
    ledger: Arc<dyn TransactionLedger>,
    settings: SubmitterSettings,
}

impl RelaySubmitter {
    pub fn new(
        relayer: Arc<dyn RelayerApi>,
        ledger: Arc<dyn TransactionLedger>,
        settings: SubmitterSettings,
    ) -> Self {
        Self {
            relayer,
            ledger,
            settings,
        }
    }

    /// Relay a submission at most once per idempotency key
    pub async fn submit(&self, submission: RelaySubmission) -> Result<SubmitOutcome> {
        let key = submission.idempotency_key.clone();

        if let Some(existing) = self.ledger.find_by_idempotency_key(&key).await? {
            info!(
                idempotency_key = %sanitize_for_logging(&key),
                transaction_id = %existing.transaction_id,
                "Payload already relayed, returning existing transaction"
            );
            return Ok(SubmitOutcome {
                transaction: existing,
                deduplicated: true,
            });
        }

        if !self
            .ledger
            .claim_submission(&key, self.settings.claim_cutoff())
            .await?
        {
            // The other holder may have finished between the two reads
            if let Some(existing) = self.ledger.find_by_idempotency_key(&key).await? {
                return Ok(SubmitOutcome {
                    transaction: existing,
                    deduplicated: true,
                });
            }
            warn!(idempotency_key = %sanitize_for_logging(&key), "Submission already in flight");
            return Err(PaylisError::DuplicateSubmission {
                idempotency_key: key,
            });
        }

        let request = NetworkTransactionRequest {
            to: self.settings.forwarder,
            data: submission.calldata.clone(),
            value: 0,
            gas_limit: self.settings.gas_limit,
            speed: self.settings.speed,
        };

        let sent = match self.relayer.send_transaction(&request).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(relayer = %self.relayer.name(), error = %e, "Relayer send failed");
                if let Err(release_err) = self.ledger.release_submission(&key).await {
                    error!(
                        idempotency_key = %sanitize_for_logging(&key),
                        error = %release_err,
                        "Failed to release submission claim"
                    );
                }
                return Err(PaylisError::RelayUnavailable(e.to_string()));
            }
        };

        let observed = self.await_hash(&sent).await;

        let new_transaction = NewTransaction {
            transaction_id: sent.id.clone(),
            idempotency_key: Some(key),
            tx_hash: observed.hash.clone().filter(|h| !h.is_empty()),
            payer_address: submission.payer,
            recipient_address: submission.recipient,
            token_address: submission.token,
            amount: submission.amount,
            fee: submission.fee,
            status: observed.status,
            chain_id: self.settings.chain_id,
            created_at: parse_timestamp(&observed.created_at).unwrap_or_else(Utc::now),
            confirmed_at: observed.confirmed_at.as_deref().and_then(parse_timestamp),
            order_id: submission.order_id,
        };

        let transaction = match self.ledger.insert(new_transaction.clone()).await {
            Ok(transaction) => transaction,
            Err(e) => {
                error!(
                    transaction_id = %new_transaction.transaction_id,
                    tx_hash = ?new_transaction.tx_hash,
                    error = %e,
                    "Failed to record relayed transaction, recording it as pending"
                );
                self.record_pending(new_transaction).await?
            }
        };

        info!(
            transaction_id = %transaction.transaction_id,
            tx_hash = ?transaction.tx_hash,
            status = %transaction.status,
            order_id = ?transaction.order_id,
            "Transaction recorded"
        );

        Ok(SubmitOutcome {
            transaction,
            deduplicated: false,
        })
    }

    /// Write the bare row for a relayed transaction; on failure the claim is
    /// left to expire
    async fn record_pending(&self, transaction: NewTransaction) -> Result<Transaction> {
        let transaction_id = transaction.transaction_id.clone();
        let pending = NewTransaction {
            tx_hash: None,
            status: TransactionStatus::Pending,
            confirmed_at: None,
            ..transaction
        };

        self.ledger.insert(pending).await.map_err(|e| {
            error!(
                transaction_id = %transaction_id,
                error = %e,
                "Relayed transaction is not recorded, reconcile it by relay id"
            );
            e
        })
    }

    /// Poll for a chain hash, falling back to the best record available
    async fn await_hash(&self, sent: &RelayerTransaction) -> RelayerTransaction {
        if sent.has_hash() {
            return sent.clone();
        }

        let retry = self.settings.retry;
        for attempt in 0..retry.max_attempts {
            tokio::time::sleep(retry.delay_for(attempt)).await;
            match self.relayer.get_transaction(&sent.id).await {
                Ok(polled) if polled.has_hash() => {
                    debug!(transaction_id = %sent.id, attempt, "Hash assigned");
                    return polled;
                }
                Ok(polled) => {
                    debug!(transaction_id = %sent.id, attempt, status = %polled.status, "No hash yet");
                }
                Err(e) => {
                    warn!(transaction_id = %sent.id, attempt, error = %e, "Hash poll failed");
                }
            }
        }

        // Budget spent: one last fetch for metadata only
        match self.relayer.get_transaction(&sent.id).await {
            Ok(last) => last,
            Err(e) => {
                warn!(
                    transaction_id = %sent.id,
                    error = %e,
                    "Final fetch failed, recording send response"
                );
                sent.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use types::{HistoryCursor, LedgerSummary, PatchOutcome, TransactionPatch};

    const HASH: &str = "0x8f2a55949038a9610f50fb23b5883af3b4ecb3c3bb792cbcefbd1542c692be63";

    fn record(hash: Option<&str>, status: TransactionStatus) -> RelayerTransaction {
        RelayerTransaction {
            id: "tx-1".to_string(),
            hash: hash.map(str::to_string),
            status,
            status_reason: None,
            created_at: "2025-01-10T10:00:00Z".to_string(),
            sent_at: None,
            confirmed_at: None,
        }
    }

    /// Relayer that replays scripted poll responses
    struct ScriptedRelayer {
        send: Mutex<Option<Result<RelayerTransaction>>>,
        polls: Mutex<VecDeque<Result<RelayerTransaction>>>,
        sends: Mutex<u32>,
        gets: Mutex<u32>,
    }

    impl ScriptedRelayer {
        fn new(polls: Vec<Result<RelayerTransaction>>) -> Self {
            Self {
                send: Mutex::new(Some(Ok(record(None, TransactionStatus::Pending)))),
                polls: Mutex::new(polls.into()),
                sends: Mutex::new(0),
                gets: Mutex::new(0),
            }
        }

        fn failing_send() -> Self {
            let relayer = Self::new(Vec::new());
            *relayer.send.lock().unwrap() = Some(Err(PaylisError::RelayCommunication {
                relayer: "test".to_string(),
                message: "HTTP error: 502".to_string(),
            }));
            relayer
        }
    }

    #[async_trait]
    impl RelayerApi for ScriptedRelayer {
        async fn send_transaction(
            &self,
            _request: &NetworkTransactionRequest,
        ) -> Result<RelayerTransaction> {
            *self.sends.lock().unwrap() += 1;
            self.send
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(record(None, TransactionStatus::Pending)))
        }

        async fn get_transaction(&self, _transaction_id: &str) -> Result<RelayerTransaction> {
            *self.gets.lock().unwrap() += 1;
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(record(None, TransactionStatus::Pending)))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct MemoryLedger {
        rows: Mutex<Vec<Transaction>>,
        claims: Mutex<HashMap<String, DateTime<Utc>>>,
        /// Inserts to reject before accepting again
        failing_inserts: Mutex<u32>,
    }

    impl MemoryLedger {
        fn failing(inserts: u32) -> Self {
            let ledger = Self::default();
            *ledger.failing_inserts.lock().unwrap() = inserts;
            ledger
        }
    }

    #[async_trait]
    impl TransactionLedger for MemoryLedger {
        async fn insert(&self, tx: NewTransaction) -> Result<Transaction> {
            {
                let mut failing = self.failing_inserts.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    return Err(PaylisError::Database("disk I/O error".to_string()));
                }
            }
            let mut rows = self.rows.lock().unwrap();
            let row = Transaction {
                id: rows.len() as i64 + 1,
                transaction_id: tx.transaction_id,
                idempotency_key: tx.idempotency_key,
                tx_hash: tx.tx_hash,
                payer_address: tx.payer_address,
                recipient_address: tx.recipient_address,
                token_address: tx.token_address,
                amount: tx.amount,
                fee: tx.fee,
                status: tx.status,
                block_number: None,
                chain_id: tx.chain_id,
                note: None,
                created_at: tx.created_at,
                confirmed_at: tx.confirmed_at,
                order_id: tx.order_id,
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn update_by_relay_transaction_id(
            &self,
            _transaction_id: &str,
            _patch: TransactionPatch,
        ) -> Result<PatchOutcome> {
            unimplemented!("not used by the submitter")
        }

        async fn get_by_relay_transaction_id(&self, id: &str) -> Result<Option<Transaction>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|r| r.transaction_id == id).cloned())
        }

        async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .find(|r| r.idempotency_key.as_deref() == Some(key))
                .cloned())
        }

        async fn claim_submission(&self, key: &str, stale_before: DateTime<Utc>) -> Result<bool> {
            let mut claims = self.claims.lock().unwrap();
            match claims.get(key) {
                Some(claimed_at) if *claimed_at >= stale_before => Ok(false),
                _ => {
                    claims.insert(key.to_string(), Utc::now());
                    Ok(true)
                }
            }
        }

        async fn release_submission(&self, key: &str) -> Result<()> {
            self.claims.lock().unwrap().remove(key);
            Ok(())
        }

        async fn claim_notification(&self, _transaction_id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn has_settled_transaction(&self, _order_id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn settled_summary(&self) -> Result<LedgerSummary> {
            Ok(LedgerSummary::default())
        }

        async fn settled_history(
            &self,
            _limit: u32,
            _before: Option<HistoryCursor>,
        ) -> Result<Vec<Transaction>> {
            Ok(Vec::new())
        }
    }

    fn submission(key: &str) -> RelaySubmission {
        RelaySubmission {
            calldata: Bytes::from(vec![0x01, 0x02]),
            idempotency_key: key.to_string(),
            payer: Address::repeat_byte(0x11),
            recipient: Address::repeat_byte(0x33),
            token: Address::repeat_byte(0x44),
            amount: U256::from(100_000u64),
            fee: Some(U256::from(1_150u64)),
            order_id: Some("ORD-1".to_string()),
        }
    }

    fn submitter(relayer: Arc<ScriptedRelayer>, ledger: Arc<MemoryLedger>) -> RelaySubmitter {
        RelaySubmitter::new(
            relayer,
            ledger,
            SubmitterSettings {
                forwarder: Address::repeat_byte(0xf0),
                gas_limit: 300_000,
                speed: Speed::Fast,
                chain_id: 4202,
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_secs(1),
                },
                claim_ttl: Duration::from_secs(600),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_on_second_poll() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![
            Ok(record(None, TransactionStatus::Pending)),
            Ok(record(Some(HASH), TransactionStatus::Submitted)),
        ]));
        let ledger = Arc::new(MemoryLedger::default());

        let started = Instant::now();
        let outcome = submitter(relayer.clone(), ledger.clone())
            .submit(submission("0xkey1"))
            .await
            .unwrap();

        // 1s before the first poll, 2s before the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(*relayer.gets.lock().unwrap(), 2);
        assert!(!outcome.deduplicated);
        assert_eq!(outcome.transaction.tx_hash.as_deref(), Some(HASH));
        assert_eq!(outcome.transaction.status, TransactionStatus::Submitted);
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_on_third_poll() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![
            Ok(record(None, TransactionStatus::Pending)),
            Ok(record(None, TransactionStatus::Sent)),
            Ok(record(Some(HASH), TransactionStatus::Submitted)),
        ]));
        let ledger = Arc::new(MemoryLedger::default());

        let started = Instant::now();
        let outcome = submitter(relayer.clone(), ledger.clone())
            .submit(submission("0xkey2"))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(*relayer.gets.lock().unwrap(), 3);
        assert_eq!(outcome.transaction.tx_hash.as_deref(), Some(HASH));
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_records_null_hash() {
        let mut last = record(None, TransactionStatus::Sent);
        last.created_at = "2025-01-10T10:00:05Z".to_string();
        let relayer = Arc::new(ScriptedRelayer::new(vec![
            Ok(record(None, TransactionStatus::Pending)),
            Ok(record(None, TransactionStatus::Pending)),
            Ok(record(None, TransactionStatus::Pending)),
            Ok(last),
        ]));
        let ledger = Arc::new(MemoryLedger::default());

        let started = Instant::now();
        let outcome = submitter(relayer.clone(), ledger.clone())
            .submit(submission("0xkey3"))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(7));
        // Three polls plus the final metadata fetch
        assert_eq!(*relayer.gets.lock().unwrap(), 4);
        assert!(outcome.transaction.tx_hash.is_none());
        assert_eq!(outcome.transaction.status, TransactionStatus::Sent);
        assert_eq!(
            outcome.transaction.created_at,
            parse_timestamp("2025-01-10T10:00:05Z").unwrap()
        );
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_still_record_row() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![
            Err(PaylisError::RelayUnavailable("reset".to_string())),
            Err(PaylisError::RelayUnavailable("reset".to_string())),
            Err(PaylisError::RelayUnavailable("reset".to_string())),
            Err(PaylisError::RelayUnavailable("reset".to_string())),
        ]));
        let ledger = Arc::new(MemoryLedger::default());

        let outcome = submitter(relayer, ledger.clone())
            .submit(submission("0xkey4"))
            .await
            .unwrap();

        assert_eq!(outcome.transaction.transaction_id, "tx-1");
        assert!(outcome.transaction.tx_hash.is_none());
        assert_eq!(outcome.transaction.status, TransactionStatus::Pending);
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_persists_nothing() {
        let relayer = Arc::new(ScriptedRelayer::failing_send());
        let ledger = Arc::new(MemoryLedger::default());

        let err = submitter(relayer.clone(), ledger.clone())
            .submit(submission("0xkey5"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaylisError::RelayUnavailable(_)));
        assert_eq!(*relayer.gets.lock().unwrap(), 0);
        assert!(ledger.rows.lock().unwrap().is_empty());
        // Claim released so the payer can retry
        assert!(ledger.claims.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmission_is_deduplicated() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![Ok(record(
            Some(HASH),
            TransactionStatus::Submitted,
        ))]));
        let ledger = Arc::new(MemoryLedger::default());
        let submitter = submitter(relayer.clone(), ledger.clone());

        let first = submitter.submit(submission("0xkey6")).await.unwrap();
        let second = submitter.submit(submission("0xkey6")).await.unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.transaction.transaction_id, second.transaction.transaction_id);
        assert_eq!(*relayer.sends.lock().unwrap(), 1);
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_claim_conflicts() {
        let relayer = Arc::new(ScriptedRelayer::new(Vec::new()));
        let ledger = Arc::new(MemoryLedger::default());
        ledger
            .claims
            .lock()
            .unwrap()
            .insert("0xkey7".to_string(), Utc::now());

        let err = submitter(relayer.clone(), ledger)
            .submit(submission("0xkey7"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaylisError::DuplicateSubmission { .. }));
        assert_eq!(*relayer.sends.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_claim_is_taken_over() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![Ok(record(
            Some(HASH),
            TransactionStatus::Submitted,
        ))]));
        let ledger = Arc::new(MemoryLedger::default());
        ledger.claims.lock().unwrap().insert(
            "0xkey8".to_string(),
            Utc::now() - chrono::Duration::hours(1),
        );

        let outcome = submitter(relayer.clone(), ledger.clone())
            .submit(submission("0xkey8"))
            .await
            .unwrap();

        assert!(!outcome.deduplicated);
        assert_eq!(*relayer.sends.lock().unwrap(), 1);
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_insert_records_pending_row() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![Ok(record(
            Some(HASH),
            TransactionStatus::Submitted,
        ))]));
        let ledger = Arc::new(MemoryLedger::failing(1));

        let outcome = submitter(relayer, ledger.clone())
            .submit(submission("0xkey9"))
            .await
            .unwrap();

        let row = &outcome.transaction;
        assert_eq!(row.transaction_id, "tx-1");
        assert_eq!(row.idempotency_key.as_deref(), Some("0xkey9"));
        assert_eq!(row.status, TransactionStatus::Pending);
        assert!(row.tx_hash.is_none());
        assert_eq!(row.fee, Some(U256::from(1_150u64)));
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecorded_send_keeps_claim() {
        let relayer = Arc::new(ScriptedRelayer::new(vec![Ok(record(
            Some(HASH),
            TransactionStatus::Submitted,
        ))]));
        let ledger = Arc::new(MemoryLedger::failing(2));
        let submitter = submitter(relayer.clone(), ledger.clone());

        let err = submitter.submit(submission("0xkey10")).await.unwrap_err();
        assert!(matches!(err, PaylisError::Database(_)));
        assert!(ledger.rows.lock().unwrap().is_empty());
        assert!(ledger.claims.lock().unwrap().contains_key("0xkey10"));

        // The live claim blocks a second relay of the same payload
        let retry = submitter.submit(submission("0xkey10")).await.unwrap_err();
        assert!(matches!(retry, PaylisError::DuplicateSubmission { .. }));
        assert_eq!(*relayer.sends.lock().unwrap(), 1);
    }
}
