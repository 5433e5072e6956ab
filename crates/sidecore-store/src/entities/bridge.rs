use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

use crate::collection::Document;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeJobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// `BridgeJob` (§3). Lives in either the `withdrawals` or `deposits`
/// collection; `kind` just records which for logging/debugging, the
/// collection membership itself is what the worker dispatches on.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeJob {
    pub job_id: String,
    pub to: String,
    pub amount: Amount,
    pub symbol: String,
    pub memo: Option<String>,
    pub status: BridgeJobStatus,
    pub attempts: u32,
    pub tx_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Wall-clock ms at which this job most recently entered `Processing`,
    /// used by the staleness sweep (§4.12); `None` outside that state.
    pub processing_since_ms: Option<i64>,
}

impl Document for BridgeJob {
    fn key(&self) -> String {
        self.job_id.clone()
    }
}
