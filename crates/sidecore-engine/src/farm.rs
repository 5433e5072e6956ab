//! Farm staking (C9): stake/unstake against a pool's LP token or a plain
//! account balance, with pro-rata reward accrual since the position's last
//! harvest.

use serde_json::json;

use sidecore_store::{Farm, FarmStatus, Store, UserFarmPosition, UserLiquidityPosition};
use sidecore_types::{Amount, CoreError};

use crate::event::EventSink;
use crate::ledger;

pub struct StakeResult {
    pub total_staked: Amount,
}

pub struct UnstakeResult {
    pub refunded: Amount,
    pub total_staked: Amount,
}

pub struct HarvestResult {
    pub rewards_paid: Amount,
}

fn pool_id_for_lp_symbol(symbol: &str) -> &str {
    symbol.strip_prefix("LP_").unwrap_or(symbol)
}

/// Pro-rata reward owed since `position.last_harvest_time`:
/// `rewardRatePerSec · elapsedSeconds · staked / totalStaked`, time-clamped
/// to the farm's `endTime` (§10.6).
fn accrue_since_last_harvest(farm: &Farm, position: &UserFarmPosition, now_ms: i64) -> Amount {
    if position.staked_amount.is_zero() || farm.total_staked.is_zero() {
        return Amount::zero();
    }
    let clamped_now = now_ms.min(farm.end_time);
    let elapsed_ms = (clamped_now - position.last_harvest_time).max(0);
    let elapsed_secs = Amount::from_i128((elapsed_ms / 1000) as i128);
    farm.reward_rate_per_sec
        .checked_mul(&elapsed_secs)
        .checked_mul(&position.staked_amount)
        .checked_div(&farm.total_staked)
        .unwrap_or_else(Amount::zero)
}

async fn debit_staking_token(store: &Store, user: &str, farm: &Farm, amount: &Amount) -> Result<(), CoreError> {
    if farm.staking_token.symbol.starts_with("LP_") {
        let pool_id = pool_id_for_lp_symbol(&farm.staking_token.symbol);
        let position_key = UserLiquidityPosition::composite_key(user, pool_id);
        let position = store
            .positions
            .find_one(|p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key)
            .await
            .ok_or_else(|| CoreError::InsufficientStake { have: "0".into(), need: amount.to_string() })?;
        if position.lp_token_balance < *amount {
            return Err(CoreError::InsufficientStake { have: position.lp_token_balance.to_string(), need: amount.to_string() });
        }
        store
            .positions
            .update_one(
                |p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key,
                |p| p.lp_token_balance = p.lp_token_balance.checked_sub(amount),
            )
            .await;
        Ok(())
    } else {
        ledger::adjust_balance(store, user, &farm.staking_token.symbol, &amount.neg()).await.map(|_| ())
    }
}

async fn credit_staking_token(store: &Store, user: &str, farm: &Farm, amount: &Amount) -> Result<(), CoreError> {
    if farm.staking_token.symbol.starts_with("LP_") {
        let pool_id = pool_id_for_lp_symbol(&farm.staking_token.symbol);
        let position_key = UserLiquidityPosition::composite_key(user, pool_id);
        let updated = store
            .positions
            .update_one(
                |p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key,
                |p| p.lp_token_balance = p.lp_token_balance.checked_add(amount),
            )
            .await;
        if !updated {
            store
                .positions
                .insert_one(UserLiquidityPosition {
                    user: user.to_owned(),
                    pool_id: pool_id.to_owned(),
                    lp_token_balance: amount.clone(),
                    fee_growth_entry_a: Amount::zero(),
                    fee_growth_entry_b: Amount::zero(),
                })
                .await
                .ok();
        }
        Ok(())
    } else {
        ledger::adjust_balance(store, user, &farm.staking_token.symbol, amount).await.map(|_| ())
    }
}

/// `stake(farmId, lpTokenAmount)` (§4.9).
pub async fn stake(store: &Store, sink: &dyn EventSink, user: &str, farm_id: &str, amount: &Amount, now_ms: i64) -> Result<StakeResult, CoreError> {
    if !amount.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    let farm = store.farms.find_one(|f| f.farm_id == farm_id).await.ok_or_else(|| CoreError::FarmNotFound { farm_id: farm_id.to_owned() })?;
    if !matches!(farm.status, FarmStatus::Active) || now_ms < farm.start_time || now_ms > farm.end_time {
        return Err(CoreError::FarmInactive { farm_id: farm_id.to_owned() });
    }
    if farm.min_stake_amount.is_positive() && *amount < farm.min_stake_amount {
        return Err(CoreError::BelowMinStake { min_stake: farm.min_stake_amount.to_string() });
    }

    debit_staking_token(store, user, &farm, amount).await?;

    let position_key = UserFarmPosition::composite_key(user, farm_id);
    let existing = store.farm_positions.find_one(|p| UserFarmPosition::composite_key(&p.user, &p.farm_id) == position_key).await;
    let accrued = existing.as_ref().map(|p| accrue_since_last_harvest(&farm, p, now_ms)).unwrap_or_else(Amount::zero);

    let updated = store
        .farm_positions
        .update_one(
            |p| UserFarmPosition::composite_key(&p.user, &p.farm_id) == position_key,
            |p| {
                p.pending_rewards = p.pending_rewards.checked_add(&accrued);
                p.staked_amount = p.staked_amount.checked_add(amount);
                p.last_harvest_time = now_ms;
            },
        )
        .await;
    if !updated {
        store
            .farm_positions
            .insert_one(UserFarmPosition { user: user.to_owned(), farm_id: farm_id.to_owned(), staked_amount: amount.clone(), pending_rewards: Amount::zero(), last_harvest_time: now_ms })
            .await
            .ok();
    }

    let total_staked = farm.total_staked.checked_add(amount);
    store.farms.update_one(|f| f.farm_id == farm_id, |f| f.total_staked = total_staked.clone()).await;

    sink.log_event("farm", "farm_stake", user, json!({"farmId": farm_id, "totalStaked": total_staked.to_string()}), None).await;

    Ok(StakeResult { total_staked })
}

/// `unstake(farmId, amount)` (§10.6).
pub async fn unstake(store: &Store, sink: &dyn EventSink, user: &str, farm_id: &str, amount: &Amount, now_ms: i64) -> Result<UnstakeResult, CoreError> {
    if !amount.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    let farm = store.farms.find_one(|f| f.farm_id == farm_id).await.ok_or_else(|| CoreError::FarmNotFound { farm_id: farm_id.to_owned() })?;
    let position_key = UserFarmPosition::composite_key(user, farm_id);
    let position = store
        .farm_positions
        .find_one(|p| UserFarmPosition::composite_key(&p.user, &p.farm_id) == position_key)
        .await
        .ok_or_else(|| CoreError::FarmPositionNotFound { key: position_key.clone() })?;
    if position.staked_amount < *amount {
        return Err(CoreError::InsufficientStake { have: position.staked_amount.to_string(), need: amount.to_string() });
    }

    let accrued = accrue_since_last_harvest(&farm, &position, now_ms);

    store
        .farm_positions
        .update_one(
            |p| UserFarmPosition::composite_key(&p.user, &p.farm_id) == position_key,
            |p| {
                p.pending_rewards = p.pending_rewards.checked_add(&accrued);
                p.staked_amount = p.staked_amount.checked_sub(amount);
                p.last_harvest_time = now_ms;
            },
        )
        .await;

    let total_staked = farm.total_staked.checked_sub(amount);
    store.farms.update_one(|f| f.farm_id == farm_id, |f| f.total_staked = total_staked.clone()).await;

    credit_staking_token(store, user, &farm, amount).await?;

    sink.log_event("farm", "farm_unstake", user, json!({"farmId": farm_id, "amount": amount.to_string(), "totalStaked": total_staked.to_string()}), None).await;

    Ok(UnstakeResult { refunded: amount.clone(), total_staked })
}

/// `harvest(farmId)` (§10.6): pays out `pendingRewards` plus whatever has
/// accrued since the last harvest, then resets the checkpoint.
pub async fn harvest(store: &Store, sink: &dyn EventSink, user: &str, farm_id: &str, now_ms: i64) -> Result<HarvestResult, CoreError> {
    let farm = store.farms.find_one(|f| f.farm_id == farm_id).await.ok_or_else(|| CoreError::FarmNotFound { farm_id: farm_id.to_owned() })?;
    let position_key = UserFarmPosition::composite_key(user, farm_id);
    let position = store
        .farm_positions
        .find_one(|p| UserFarmPosition::composite_key(&p.user, &p.farm_id) == position_key)
        .await
        .ok_or_else(|| CoreError::FarmPositionNotFound { key: position_key.clone() })?;

    let accrued = accrue_since_last_harvest(&farm, &position, now_ms);
    let total_reward = position.pending_rewards.checked_add(&accrued);
    if !total_reward.is_positive() {
        return Err(CoreError::NothingToClaim { key: position_key });
    }

    store
        .farm_positions
        .update_one(
            |p| UserFarmPosition::composite_key(&p.user, &p.farm_id) == position_key,
            |p| {
                p.pending_rewards = Amount::zero();
                p.last_harvest_time = now_ms;
            },
        )
        .await;

    ledger::adjust_balance(store, user, &farm.reward_token_symbol, &total_reward).await?;

    sink.log_event("farm", "farm_harvest", user, json!({"farmId": farm_id, "rewardsPaid": total_reward.to_string()}), None).await;

    Ok(HarvestResult { rewards_paid: total_reward })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_store::{Account, StakingTokenRef, Token};
    use crate::event::NoopEventSink;

    async fn seed_farm(store: &Store) {
        store.tokens.insert_one(Token { symbol: "STAKE".into(), precision: 0, max_supply: Amount::from_i128(i128::MAX), current_supply: Amount::zero(), mintable: true, burnable: true, issuer: None }).await.ok();
        store.tokens.insert_one(Token { symbol: "REWARD".into(), precision: 0, max_supply: Amount::from_i128(i128::MAX), current_supply: Amount::zero(), mintable: true, burnable: true, issuer: None }).await.ok();
        store
            .farms
            .insert_one(Farm {
                farm_id: "farm1".into(),
                staking_token: StakingTokenRef { symbol: "STAKE".into() },
                reward_token_symbol: "REWARD".into(),
                reward_rate_per_sec: Amount::from_i128(10),
                start_time: 0,
                end_time: 1_000_000,
                status: FarmStatus::Active,
                total_staked: Amount::zero(),
                min_stake_amount: Amount::zero(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stake_then_harvest_accrues_pro_rata() {
        let store = Store::new();
        seed_farm(&store).await;
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "STAKE", &Amount::from_i128(100)).await.unwrap();

        let sink = NoopEventSink;
        stake(&store, &sink, "alice", "farm1", &Amount::from_i128(100), 0).await.unwrap();

        let result = harvest(&store, &sink, "alice", "farm1", 10_000).await.unwrap();
        // sole staker: reward = 10/sec * 10s = 100
        assert_eq!(result.rewards_paid.to_string(), "100");
    }

    #[tokio::test]
    async fn unstake_below_balance_fails() {
        let store = Store::new();
        seed_farm(&store).await;
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "STAKE", &Amount::from_i128(50)).await.unwrap();
        let sink = NoopEventSink;
        stake(&store, &sink, "alice", "farm1", &Amount::from_i128(50), 0).await.unwrap();

        let err = unstake(&store, &sink, "alice", "farm1", &Amount::from_i128(100), 1000).await;
        assert!(matches!(err, Err(CoreError::InsufficientStake { .. })));
    }
}
