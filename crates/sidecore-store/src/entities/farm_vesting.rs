use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

use crate::collection::Document;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FarmStatus {
    Active,
    Paused,
    Ended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingTokenRef {
    pub symbol: String,
}

/// `Farm` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    pub farm_id: String,
    pub staking_token: StakingTokenRef,
    pub reward_token_symbol: String,
    pub reward_rate_per_sec: Amount,
    pub start_time: i64,
    pub end_time: i64,
    pub status: FarmStatus,
    pub total_staked: Amount,
    pub min_stake_amount: Amount,
}

impl Document for Farm {
    fn key(&self) -> String {
        self.farm_id.clone()
    }
}

/// `UserFarmPosition` (§3), keyed `user_farmId`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFarmPosition {
    pub user: String,
    pub farm_id: String,
    pub staked_amount: Amount,
    pub pending_rewards: Amount,
    pub last_harvest_time: i64,
}

impl UserFarmPosition {
    pub fn composite_key(user: &str, farm_id: &str) -> String {
        format!("{user}_{farm_id}")
    }
}

impl Document for UserFarmPosition {
    fn key(&self) -> String {
        Self::composite_key(&self.user, &self.farm_id)
    }
}

/// Allocation schedule for a `VestingState`, drawn from a launchpad's
/// tokenomics snapshot (§4.10): a cliff followed by linear vesting.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingSchedule {
    pub cliff_seconds: i64,
    pub duration_seconds: i64,
}

/// `VestingState` (§3), keyed `user_launchpadId_allocationType`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingState {
    pub user: String,
    pub launchpad_id: String,
    pub allocation_type: String,
    pub token_symbol: String,
    pub total_allocated: Amount,
    pub total_claimed: Amount,
    pub vesting_start_timestamp: i64,
    pub schedule: VestingSchedule,
    pub is_fully_claimed: bool,
}

impl VestingState {
    pub fn composite_key(user: &str, launchpad_id: &str, allocation_type: &str) -> String {
        format!("{user}_{launchpad_id}_{allocation_type}")
    }
}

impl Document for VestingState {
    fn key(&self) -> String {
        Self::composite_key(&self.user, &self.launchpad_id, &self.allocation_type)
    }
}
