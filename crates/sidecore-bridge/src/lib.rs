//! The bridge worker (C12): drains `withdrawals` then `deposits` against the
//! source chain, one job at a time, behind a reentrancy-guarded heartbeat
//! loop, trimmed to a single worker instead of a
//! per-market `JoinSet` since this worker drains one FIFO queue, not N
//! independent markets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use sidecore_engine::event::EventSink;
use sidecore_engine::ledger;
pub use sidecore_store::BridgeJob;
use sidecore_store::{BridgeJobStatus, Store};
use sidecore_types::{deterministic_id, Amount, CoreError};

/// Broadcasts the two kinds of source-chain operation the worker issues.
/// A live implementation wraps a Steem RPC client and signing key; tests use
/// an in-memory fake.
#[async_trait]
pub trait SourceChainClient: Send + Sync {
    /// Broadcasts a withdrawal payout and returns the source-chain tx id.
    async fn broadcast_withdrawal(&self, job: &BridgeJob) -> anyhow::Result<String>;
    /// Broadcasts the mint-side custom op backing a deposit credit.
    async fn broadcast_deposit_mint(&self, job: &BridgeJob) -> anyhow::Result<String>;
}

#[derive(Clone, Debug)]
pub struct BridgeWorkerConfig {
    /// Delay between ticks when the previous tick found no work (§4.12: ~800ms).
    pub idle_delay_ms: u64,
    /// Delay between ticks when the previous tick processed a job (§4.12: ~200ms).
    pub busy_delay_ms: u64,
    /// A `processing` job older than this is recovered back to `pending`
    /// (§4.12: 60s), tolerating a worker crash mid-broadcast.
    pub staleness_ms: i64,
}

impl Default for BridgeWorkerConfig {
    fn default() -> Self {
        Self { idle_delay_ms: 800, busy_delay_ms: 200, staleness_ms: 60_000 }
    }
}

pub struct BridgeWorker {
    store: Arc<Store>,
    sink: Arc<dyn EventSink>,
    client: Arc<dyn SourceChainClient>,
    config: BridgeWorkerConfig,
    running: AtomicBool,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl BridgeWorker {
    pub fn new(store: Arc<Store>, sink: Arc<dyn EventSink>, client: Arc<dyn SourceChainClient>, config: BridgeWorkerConfig) -> Self {
        Self { store, sink, client, config, running: AtomicBool::new(false) }
    }

    /// `enqueueWithdrawal` (§10.6): debits the user's balance up front (the
    /// ledger is the sole writer of balances, and a queued-but-never-sent job
    /// must not leave funds double-spendable) before inserting the pending job.
    pub async fn enqueue_withdrawal(&self, user: &str, to: &str, symbol: &str, amount: &Amount, memo: Option<String>) -> Result<BridgeJob, CoreError> {
        if !amount.is_positive() {
            return Err(CoreError::ZeroAmount);
        }
        ledger::adjust_balance(&self.store, user, symbol, &amount.neg()).await?;

        let ts = now_ms();
        let job_id = deterministic_id(&["withdrawal", user, to, symbol, &amount.to_string(), &ts.to_string()]);
        let job = BridgeJob {
            job_id: job_id.clone(),
            to: to.to_owned(),
            amount: amount.clone(),
            symbol: symbol.to_owned(),
            memo,
            status: BridgeJobStatus::Pending,
            attempts: 0,
            tx_id: None,
            last_error: None,
            created_at: ts.to_string(),
            updated_at: ts.to_string(),
            processing_since_ms: None,
        };

        if let Err(e) = self.store.withdrawals.insert_one(job.clone()).await {
            ledger::adjust_balance(&self.store, user, symbol, amount).await.ok();
            return Err(CoreError::Other(e.to_string()));
        }

        self.sink.log_event("bridge", "withdrawal_enqueued", user, json!({"jobId": job_id, "to": to, "symbol": symbol, "amount": amount.to_string()}), None).await;
        Ok(job)
    }

    /// `enqueueDeposit` (§4.12): called from the serial per-block executor
    /// when it processes a confirmed source-chain deposit, which is also
    /// where the credit happens — per §5 the bridge worker's own heartbeat
    /// loop "only mutates withdrawals/deposits documents, never account
    /// balances". The worker later drains this job purely to broadcast the
    /// `token_mint` notarization op back to the source chain.
    pub async fn enqueue_deposit(&self, to: &str, symbol: &str, amount: &Amount, memo: Option<String>) -> Result<BridgeJob, CoreError> {
        if !amount.is_positive() {
            return Err(CoreError::ZeroAmount);
        }
        ledger::adjust_balance(&self.store, to, symbol, amount).await?;

        let ts = now_ms();
        let job_id = deterministic_id(&["deposit", to, symbol, &amount.to_string(), &ts.to_string()]);
        let job = BridgeJob {
            job_id: job_id.clone(),
            to: to.to_owned(),
            amount: amount.clone(),
            symbol: symbol.to_owned(),
            memo,
            status: BridgeJobStatus::Pending,
            attempts: 0,
            tx_id: None,
            last_error: None,
            created_at: ts.to_string(),
            updated_at: ts.to_string(),
            processing_since_ms: None,
        };
        // Credit already applied; a failure to record the job is only a
        // bookkeeping loss for the notarization broadcast, not a double-spend,
        // so it is logged rather than rolled back.
        if let Err(e) = self.store.deposits.insert_one(job.clone()).await {
            tracing::error!(job_id = %job_id, error = %e, "failed to enqueue deposit notarization job after crediting balance");
            return Err(CoreError::Other(e.to_string()));
        }
        self.sink.log_event("bridge", "deposit_enqueued", &job.to, json!({"jobId": job_id, "symbol": symbol, "amount": amount.to_string()}), None).await;
        Ok(job)
    }

    /// Recovers any `processing` job older than the staleness window back to
    /// `pending`, in both queues (§4.12 step 1).
    async fn recover_stale(&self, now: i64) {
        for queue in [&self.store.withdrawals, &self.store.deposits] {
            queue
                .update_many(
                    |j| matches!(j.status, BridgeJobStatus::Processing) && j.processing_since_ms.map(|since| now - since > self.config.staleness_ms).unwrap_or(true),
                    |j| {
                        j.status = BridgeJobStatus::Pending;
                        j.processing_since_ms = None;
                        j.updated_at = now.to_string();
                    },
                )
                .await;
        }
    }

    /// Picks the oldest pending withdrawal (if any), atomically flips it to
    /// `processing`, and runs it to completion.
    async fn drain_withdrawal(&self, now: i64) -> bool {
        let Some(job) = self
            .store
            .withdrawals
            .find_one_and_update_sorted(
                |j| matches!(j.status, BridgeJobStatus::Pending),
                |j| j.created_at.clone(),
                |j| {
                    j.status = BridgeJobStatus::Processing;
                    j.processing_since_ms = Some(now);
                    j.updated_at = now.to_string();
                },
            )
            .await
        else {
            return false;
        };

        match self.client.broadcast_withdrawal(&job).await {
            Ok(tx_id) => {
                self.store
                    .withdrawals
                    .update_one(
                        |j| j.job_id == job.job_id,
                        |j| {
                            j.status = BridgeJobStatus::Done;
                            j.tx_id = Some(tx_id.clone());
                            j.processing_since_ms = None;
                            j.updated_at = now_ms().to_string();
                        },
                    )
                    .await;
                self.sink.log_event("bridge", "withdrawal_broadcast", &job.to, json!({"jobId": job.job_id, "txId": tx_id}), Some(&tx_id)).await;
            }
            Err(err) => {
                self.store
                    .withdrawals
                    .update_one(
                        |j| j.job_id == job.job_id,
                        |j| {
                            j.status = BridgeJobStatus::Failed;
                            j.last_error = Some(err.to_string());
                            j.attempts += 1;
                            j.processing_since_ms = None;
                            j.updated_at = now_ms().to_string();
                        },
                    )
                    .await;
                self.sink.log_event("bridge", "withdrawal_failed", &job.to, json!({"jobId": job.job_id, "error": err.to_string()}), None).await;
            }
        }
        true
    }

    async fn drain_deposit(&self, now: i64) -> bool {
        let Some(job) = self
            .store
            .deposits
            .find_one_and_update_sorted(
                |j| matches!(j.status, BridgeJobStatus::Pending),
                |j| j.created_at.clone(),
                |j| {
                    j.status = BridgeJobStatus::Processing;
                    j.processing_since_ms = Some(now);
                    j.updated_at = now.to_string();
                },
            )
            .await
        else {
            return false;
        };

        match self.client.broadcast_deposit_mint(&job).await {
            Ok(tx_id) => {
                self.store
                    .deposits
                    .update_one(
                        |j| j.job_id == job.job_id,
                        |j| {
                            j.status = BridgeJobStatus::Done;
                            j.tx_id = Some(tx_id.clone());
                            j.processing_since_ms = None;
                            j.updated_at = now_ms().to_string();
                        },
                    )
                    .await;
                self.sink.log_event("bridge", "deposit_notarized", &job.to, json!({"jobId": job.job_id, "txId": tx_id, "amount": job.amount.to_string()}), Some(&tx_id)).await;
            }
            Err(err) => {
                self.store
                    .deposits
                    .update_one(
                        |j| j.job_id == job.job_id,
                        |j| {
                            j.status = BridgeJobStatus::Failed;
                            j.last_error = Some(err.to_string());
                            j.attempts += 1;
                            j.processing_since_ms = None;
                            j.updated_at = now_ms().to_string();
                        },
                    )
                    .await;
                self.sink.log_event("bridge", "deposit_failed", &job.to, json!({"jobId": job.job_id, "error": err.to_string()}), None).await;
            }
        }
        true
    }

    /// One heartbeat: recover, then withdrawals before deposits (§4.12 step
    /// 2/3's priority order). Returns whether a job was actually drained.
    pub async fn tick(&self) -> bool {
        let now = now_ms();
        self.recover_stale(now).await;
        if self.drain_withdrawal(now).await {
            return true;
        }
        self.drain_deposit(now).await
    }

    /// Runs the heartbeat loop forever. Reentrancy-guarded so a caller that
    /// accidentally spawns two loops over the same worker doesn't double-drain.
    pub async fn run_forever(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("bridge worker heartbeat already running, refusing to start a second loop");
            return;
        }
        loop {
            let did_work = self.tick().await;
            let delay = if did_work { self.config.busy_delay_ms } else { self.config.idle_delay_ms };
            tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_engine::event::NoopEventSink;
    use sidecore_store::Account;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeClient {
        fail_withdrawals: bool,
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SourceChainClient for FakeClient {
        async fn broadcast_withdrawal(&self, job: &BridgeJob) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(job.job_id.clone());
            if self.fail_withdrawals {
                anyhow::bail!("rpc unreachable");
            }
            Ok(format!("txw-{}", job.job_id))
        }
        async fn broadcast_deposit_mint(&self, job: &BridgeJob) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(job.job_id.clone());
            Ok(format!("txd-{}", job.job_id))
        }
    }

    #[tokio::test]
    async fn withdrawal_debits_then_drains_to_done() {
        let store = Arc::new(Store::new());
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "MRY", &Amount::from_i128(1000)).await.unwrap();

        let worker = BridgeWorker::new(store.clone(), Arc::new(NoopEventSink), Arc::new(FakeClient::default()), BridgeWorkerConfig::default());
        let job = worker.enqueue_withdrawal("alice", "steemuser", "MRY", &Amount::from_i128(300), None).await.unwrap();
        assert_eq!(ledger::balance_of(&store, "alice", "MRY").await.to_string(), "700");

        let did_work = worker.tick().await;
        assert!(did_work);
        let stored = store.withdrawals.find_one(|j| j.job_id == job.job_id).await.unwrap();
        assert!(matches!(stored.status, BridgeJobStatus::Done));
        assert!(stored.tx_id.is_some());
    }

    #[tokio::test]
    async fn failed_withdrawal_records_error_and_increments_attempts() {
        let store = Arc::new(Store::new());
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "MRY", &Amount::from_i128(1000)).await.unwrap();

        let worker = BridgeWorker::new(store.clone(), Arc::new(NoopEventSink), Arc::new(FakeClient { fail_withdrawals: true, ..Default::default() }), BridgeWorkerConfig::default());
        let job = worker.enqueue_withdrawal("alice", "steemuser", "MRY", &Amount::from_i128(300), None).await.unwrap();

        worker.tick().await;
        let stored = store.withdrawals.find_one(|j| j.job_id == job.job_id).await.unwrap();
        assert!(matches!(stored.status, BridgeJobStatus::Failed));
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn stale_processing_job_is_recovered_to_pending() {
        let store = Arc::new(Store::new());
        store
            .withdrawals
            .insert_one(BridgeJob {
                job_id: "w1".into(),
                to: "steemuser".into(),
                amount: Amount::from_i128(10),
                symbol: "MRY".into(),
                memo: None,
                status: BridgeJobStatus::Processing,
                attempts: 0,
                tx_id: None,
                last_error: None,
                created_at: "0".into(),
                updated_at: "0".into(),
                processing_since_ms: Some(0),
            })
            .await
            .unwrap();

        let worker = BridgeWorker::new(store.clone(), Arc::new(NoopEventSink), Arc::new(FakeClient::default()), BridgeWorkerConfig { staleness_ms: 1, ..Default::default() });
        worker.recover_stale(now_ms()).await;
        let stored = store.withdrawals.find_one(|j| j.job_id == "w1").await.unwrap();
        assert!(matches!(stored.status, BridgeJobStatus::Pending));
    }

    #[tokio::test]
    async fn withdrawals_drain_before_deposits() {
        let store = Arc::new(Store::new());
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "MRY", &Amount::from_i128(1000)).await.unwrap();

        let client = Arc::new(FakeClient::default());
        let worker = BridgeWorker::new(store.clone(), Arc::new(NoopEventSink), client.clone(), BridgeWorkerConfig::default());
        worker.enqueue_deposit("bob", "MRY", &Amount::from_i128(50), None).await.unwrap();
        worker.enqueue_withdrawal("alice", "steemuser", "MRY", &Amount::from_i128(50), None).await.unwrap();

        worker.tick().await;
        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(store.withdrawals.find_one(|j| matches!(j.status, BridgeJobStatus::Done)).await.is_some());
        assert!(store.deposits.find_one(|j| matches!(j.status, BridgeJobStatus::Pending)).await.is_some());
    }
}
