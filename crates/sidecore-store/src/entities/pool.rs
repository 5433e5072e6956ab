use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

use crate::collection::Document;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PoolStatus {
    Active,
    Paused,
}

/// `LiquidityPool` (§3): constant-product AMM pool with fee-growth
/// accounting for fair LP fee distribution (C6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityPool {
    pub pool_id: String,
    pub token_a_symbol: String,
    pub token_a_reserve: Amount,
    pub token_b_symbol: String,
    pub token_b_reserve: Amount,
    pub total_lp_tokens: Amount,
    pub fee_growth_global_a: Amount,
    pub fee_growth_global_b: Amount,
    pub status: PoolStatus,
}

impl Document for LiquidityPool {
    fn key(&self) -> String {
        self.pool_id.clone()
    }
}

impl LiquidityPool {
    pub fn reserves_for(&self, token_symbol: &str) -> Option<(Amount, Amount, bool)> {
        if token_symbol == self.token_a_symbol {
            Some((self.token_a_reserve.clone(), self.token_b_reserve.clone(), true))
        } else if token_symbol == self.token_b_symbol {
            Some((self.token_b_reserve.clone(), self.token_a_reserve.clone(), false))
        } else {
            None
        }
    }
}

/// `UserLiquidityPosition` (§3), keyed `user_poolId`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLiquidityPosition {
    pub user: String,
    pub pool_id: String,
    pub lp_token_balance: Amount,
    pub fee_growth_entry_a: Amount,
    pub fee_growth_entry_b: Amount,
}

impl UserLiquidityPosition {
    pub fn composite_key(user: &str, pool_id: &str) -> String {
        format!("{user}_{pool_id}")
    }
}

impl Document for UserLiquidityPosition {
    fn key(&self) -> String {
        Self::composite_key(&self.user, &self.pool_id)
    }
}
