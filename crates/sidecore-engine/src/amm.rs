//! AMM pool engine (C6): constant-product swaps with a 0.3% fee and
//! fee-growth-accumulator LP accounting.

use serde_json::json;

use sidecore_store::{LiquidityPool, PoolStatus, Store, Trade, TradeSource, TradingPair, UserLiquidityPosition};
use sidecore_types::math::decimal_aware_price;
use sidecore_types::{deterministic_id, fee_growth_delta, fee_growth_payout, Amount, CoreError, Symbol};

use crate::event::EventSink;
use crate::ledger;

/// 0.3% fee: `amountInWithFee = amountIn * FEE_NUM / FEE_DEN` (§4.6; the
/// source's 9700/10000 branch is a 3% fee and contradicts the documented
/// 0.3%, so it is treated as the defect flagged in the design notes).
const FEE_NUM: i128 = 9970;
const FEE_DEN: i128 = 10000;

pub struct AddLiquidityResult {
    pub lp_minted: Amount,
    pub pool: LiquidityPool,
}

pub struct RemoveLiquidityResult {
    pub amount_a: Amount,
    pub amount_b: Amount,
    pub fees_claimed_a: Amount,
    pub fees_claimed_b: Amount,
}

pub struct SwapResult {
    pub amount_out: Amount,
    pub fee_amount: Amount,
    pub trade_id: String,
}

pub struct ClaimFeesResult {
    pub fees_claimed_a: Amount,
    pub fees_claimed_b: Amount,
}

fn lp_symbol_for(pool: &LiquidityPool) -> Symbol {
    Symbol::lp_symbol(&Symbol::bare(&pool.token_a_symbol), &Symbol::bare(&pool.token_b_symbol))
}

/// Pure constant-product quote: `(amountOut, feeAmount)` for swapping
/// `amount_in` of the input side against `(reserve_in, reserve_out)`, after
/// the 0.3% fee. Shared by [`swap`] and the liquidity aggregator (C7) so both
/// price a pool identically without duplicating the fee math.
pub fn quote_constant_product(reserve_in: &Amount, reserve_out: &Amount, amount_in: &Amount) -> (Amount, Amount) {
    let amount_in_with_fee = amount_in.checked_mul(&Amount::from_i128(FEE_NUM)).checked_div(&Amount::from_i128(FEE_DEN)).unwrap_or_else(Amount::zero);
    let fee_amount = amount_in.checked_sub(&amount_in_with_fee);
    let denom = reserve_in.checked_add(&amount_in_with_fee);
    let amount_out = amount_in_with_fee.checked_mul(reserve_out).checked_div(&denom).unwrap_or_else(Amount::zero);
    (amount_out, fee_amount)
}

/// `max(1, min((sqrtLp + 1000) / 1000, 1000))` (§8 scenario 1).
fn minimum_liquidity_burn(sqrt_lp: &Amount) -> Amount {
    let thousand = Amount::from_i128(1000);
    let candidate = sqrt_lp.checked_add(&thousand).checked_div(&thousand).unwrap_or_else(Amount::zero);
    candidate.min(thousand).max(Amount::from_i128(1))
}

/// Add-liquidity (§4.6). `ratio_tolerance_bps` bounds how far `amountB` may
/// deviate from the reserve-implied ratio for non-initial deposits.
pub async fn add_liquidity(
    store: &Store,
    sink: &dyn EventSink,
    user: &str,
    pool_id: &str,
    amount_a: &Amount,
    amount_b: &Amount,
    ratio_tolerance_bps: u32,
    now_ms: i64,
) -> Result<AddLiquidityResult, CoreError> {
    if !amount_a.is_positive() || !amount_b.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    let pool = store.pools.find_one(|p| p.pool_id == pool_id).await.ok_or_else(|| CoreError::PoolNotFound { pool_id: pool_id.to_owned() })?;
    if !matches!(pool.status, PoolStatus::Active) {
        return Err(CoreError::PoolPaused { pool_id: pool_id.to_owned() });
    }

    let is_initial = pool.total_lp_tokens.is_zero();

    if !is_initial {
        let expected_b = amount_a.checked_mul(&pool.token_b_reserve).checked_div(&pool.token_a_reserve).unwrap_or_else(Amount::zero);
        let diff = amount_b.checked_sub(&expected_b).abs();
        let tolerance = expected_b.checked_mul(&Amount::from_i128(ratio_tolerance_bps as i128)).checked_div(&Amount::from_i128(10_000)).unwrap_or_else(Amount::zero);
        if diff > tolerance {
            return Err(CoreError::PoolRatioMismatch { pool_id: pool_id.to_owned() });
        }
    }

    ledger::adjust_balance(store, user, &pool.token_a_symbol, &amount_a.neg()).await?;
    ledger::adjust_balance(store, user, &pool.token_b_symbol, &amount_b.neg()).await?;

    let (lp_to_user, lp_total_delta) = if is_initial {
        let sqrt_lp = amount_a.checked_mul(amount_b).isqrt();
        let min_burn = minimum_liquidity_burn(&sqrt_lp);
        (sqrt_lp.checked_sub(&min_burn), sqrt_lp)
    } else {
        let via_a = amount_a.checked_mul(&pool.total_lp_tokens).checked_div(&pool.token_a_reserve).unwrap_or_else(Amount::zero);
        let via_b = amount_b.checked_mul(&pool.total_lp_tokens).checked_div(&pool.token_b_reserve).unwrap_or_else(Amount::zero);
        let minted = via_a.min(via_b);
        (minted.clone(), minted)
    };

    let new_reserve_a = pool.token_a_reserve.checked_add(amount_a);
    let new_reserve_b = pool.token_b_reserve.checked_add(amount_b);
    let new_total_lp = pool.total_lp_tokens.checked_add(&lp_total_delta);
    let fee_growth_a = pool.fee_growth_global_a.clone();
    let fee_growth_b = pool.fee_growth_global_b.clone();

    store
        .pools
        .update_one(
            |p| p.pool_id == pool_id,
            |p| {
                p.token_a_reserve = new_reserve_a.clone();
                p.token_b_reserve = new_reserve_b.clone();
                p.total_lp_tokens = new_total_lp.clone();
            },
        )
        .await;

    let position_key = UserLiquidityPosition::composite_key(user, pool_id);
    let updated = store
        .positions
        .update_one(
            |pos| UserLiquidityPosition::composite_key(&pos.user, &pos.pool_id) == position_key,
            |pos| {
                pos.lp_token_balance = pos.lp_token_balance.checked_add(&lp_to_user);
                pos.fee_growth_entry_a = fee_growth_a.clone();
                pos.fee_growth_entry_b = fee_growth_b.clone();
            },
        )
        .await;
    if !updated {
        store
            .positions
            .insert_one(UserLiquidityPosition {
                user: user.to_owned(),
                pool_id: pool_id.to_owned(),
                lp_token_balance: lp_to_user.clone(),
                fee_growth_entry_a: fee_growth_a,
                fee_growth_entry_b: fee_growth_b,
            })
            .await
            .ok();
    }

    ledger::adjust_balance(store, user, lp_symbol_for(&pool).as_str(), &lp_to_user).await?;

    let pool = store.pools.find_one(|p| p.pool_id == pool_id).await.expect("pool exists");

    sink.log_event(
        "pool",
        "liquidity_added",
        user,
        json!({"poolId": pool_id, "lpTokensMinted": lp_to_user.to_string()}),
        None,
    )
    .await;

    Ok(AddLiquidityResult { lp_minted: lp_to_user, pool })
}

/// Remove-liquidity (§4.6): claims accrued fees for the burned portion before
/// returning reserves pro-rata.
pub async fn remove_liquidity(
    store: &Store,
    sink: &dyn EventSink,
    user: &str,
    pool_id: &str,
    lp_amount: &Amount,
    now_ms: i64,
) -> Result<RemoveLiquidityResult, CoreError> {
    let _ = now_ms;
    if !lp_amount.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    let pool = store.pools.find_one(|p| p.pool_id == pool_id).await.ok_or_else(|| CoreError::PoolNotFound { pool_id: pool_id.to_owned() })?;
    let position_key = UserLiquidityPosition::composite_key(user, pool_id);
    let position = store
        .positions
        .find_one(|p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key)
        .await
        .ok_or_else(|| CoreError::InsufficientStake { have: "0".into(), need: lp_amount.to_string() })?;
    if position.lp_token_balance < *lp_amount {
        return Err(CoreError::InsufficientStake { have: position.lp_token_balance.to_string(), need: lp_amount.to_string() });
    }

    let amount_a = lp_amount.checked_mul(&pool.token_a_reserve).checked_div(&pool.total_lp_tokens).unwrap_or_else(Amount::zero);
    let amount_b = lp_amount.checked_mul(&pool.token_b_reserve).checked_div(&pool.total_lp_tokens).unwrap_or_else(Amount::zero);

    let fees_a = fee_growth_payout(&pool.fee_growth_global_a.checked_sub(&position.fee_growth_entry_a), lp_amount);
    let fees_b = fee_growth_payout(&pool.fee_growth_global_b.checked_sub(&position.fee_growth_entry_b), lp_amount);

    let total_out_a = amount_a.checked_add(&fees_a);
    let total_out_b = amount_b.checked_add(&fees_b);

    let new_reserve_a = pool.token_a_reserve.checked_sub(&amount_a);
    let new_reserve_b = pool.token_b_reserve.checked_sub(&amount_b);
    let new_total_lp = pool.total_lp_tokens.checked_sub(lp_amount);

    store
        .pools
        .update_one(
            |p| p.pool_id == pool_id,
            |p| {
                p.token_a_reserve = new_reserve_a.clone();
                p.token_b_reserve = new_reserve_b.clone();
                p.total_lp_tokens = new_total_lp.clone();
            },
        )
        .await;

    let remaining_lp = position.lp_token_balance.checked_sub(lp_amount);
    let (snap_a, snap_b) = (pool.fee_growth_global_a.clone(), pool.fee_growth_global_b.clone());
    store
        .positions
        .update_one(
            |p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key,
            |p| {
                p.lp_token_balance = remaining_lp.clone();
                p.fee_growth_entry_a = snap_a;
                p.fee_growth_entry_b = snap_b;
            },
        )
        .await;

    ledger::adjust_balance(store, user, lp_symbol_for(&pool).as_str(), &lp_amount.neg()).await?;
    ledger::adjust_balance(store, user, &pool.token_a_symbol, &total_out_a).await?;
    ledger::adjust_balance(store, user, &pool.token_b_symbol, &total_out_b).await?;

    sink.log_event(
        "pool",
        "liquidity_removed",
        user,
        json!({
            "poolId": pool_id,
            "tokenAAmount": amount_a.to_string(),
            "tokenBAmount": amount_b.to_string(),
            "feesClaimedA": fees_a.to_string(),
            "feesClaimedB": fees_b.to_string(),
        }),
        None,
    )
    .await;

    Ok(RemoveLiquidityResult { amount_a: total_out_a, amount_b: total_out_b, fees_claimed_a: fees_a, fees_claimed_b: fees_b })
}

/// Claim-fees (§4.6): same payout formula over the full LP balance, then
/// resets the checkpoint.
pub async fn claim_fees(store: &Store, sink: &dyn EventSink, user: &str, pool_id: &str) -> Result<ClaimFeesResult, CoreError> {
    let pool = store.pools.find_one(|p| p.pool_id == pool_id).await.ok_or_else(|| CoreError::PoolNotFound { pool_id: pool_id.to_owned() })?;
    let position_key = UserLiquidityPosition::composite_key(user, pool_id);
    let position = store
        .positions
        .find_one(|p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key)
        .await
        .ok_or_else(|| CoreError::InsufficientStake { have: "0".into(), need: "0".into() })?;

    let fees_a = fee_growth_payout(&pool.fee_growth_global_a.checked_sub(&position.fee_growth_entry_a), &position.lp_token_balance);
    let fees_b = fee_growth_payout(&pool.fee_growth_global_b.checked_sub(&position.fee_growth_entry_b), &position.lp_token_balance);

    let (snap_a, snap_b) = (pool.fee_growth_global_a.clone(), pool.fee_growth_global_b.clone());
    store
        .positions
        .update_one(
            |p| UserLiquidityPosition::composite_key(&p.user, &p.pool_id) == position_key,
            |p| {
                p.fee_growth_entry_a = snap_a;
                p.fee_growth_entry_b = snap_b;
            },
        )
        .await;

    if fees_a.is_positive() {
        ledger::adjust_balance(store, user, &pool.token_a_symbol, &fees_a).await?;
    }
    if fees_b.is_positive() {
        ledger::adjust_balance(store, user, &pool.token_b_symbol, &fees_b).await?;
    }

    sink.log_event("pool", "fees_claimed", user, json!({"poolId": pool_id, "feesA": fees_a.to_string(), "feesB": fees_b.to_string()}), None).await;

    Ok(ClaimFeesResult { fees_claimed_a: fees_a, fees_claimed_b: fees_b })
}

/// Swap (§4.6): constant-product with a 0.3% fee, direction inferred from
/// `token_in_symbol` against the pool's `tokenA`/`tokenB`.
pub async fn swap(
    store: &Store,
    sink: &dyn EventSink,
    user: &str,
    pool_id: &str,
    token_in_symbol: &str,
    amount_in: &Amount,
    tx_id: &str,
    now_ms: i64,
) -> Result<SwapResult, CoreError> {
    if !amount_in.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    let pool = store.pools.find_one(|p| p.pool_id == pool_id).await.ok_or_else(|| CoreError::PoolNotFound { pool_id: pool_id.to_owned() })?;
    if !matches!(pool.status, PoolStatus::Active) {
        return Err(CoreError::PoolPaused { pool_id: pool_id.to_owned() });
    }
    let (reserve_in, reserve_out, in_is_a) = pool
        .reserves_for(token_in_symbol)
        .ok_or_else(|| CoreError::TokenNotFound { symbol: token_in_symbol.to_owned() })?;
    let token_out_symbol = if in_is_a { pool.token_b_symbol.clone() } else { pool.token_a_symbol.clone() };

    let (amount_out, fee_amount) = quote_constant_product(&reserve_in, &reserve_out, amount_in);
    if !amount_out.is_positive() {
        return Err(CoreError::InsufficientDepth { depth: reserve_out.to_string(), amount: amount_in.to_string() });
    }

    ledger::adjust_balance(store, user, token_in_symbol, &amount_in.neg()).await?;
    ledger::adjust_balance(store, user, &token_out_symbol, &amount_out).await?;

    let (new_reserve_a, new_reserve_b) = if in_is_a {
        (reserve_in.checked_add(amount_in), reserve_out.checked_sub(&amount_out))
    } else {
        (reserve_out.checked_sub(&amount_out), reserve_in.checked_add(amount_in))
    };

    let fee_token_decimals_symbol = token_in_symbol.to_owned();
    let growth_delta = {
        let token = store.tokens.find_one(|t| t.symbol == fee_token_decimals_symbol).await;
        let decimals = token.map(|t| t.precision).unwrap_or(0);
        fee_growth_delta(&fee_amount, decimals, &pool.total_lp_tokens)
    };

    store
        .pools
        .update_one(
            |p| p.pool_id == pool_id,
            |p| {
                p.token_a_reserve = new_reserve_a.clone();
                p.token_b_reserve = new_reserve_b.clone();
                if in_is_a {
                    p.fee_growth_global_a = p.fee_growth_global_a.checked_add(&growth_delta);
                } else {
                    p.fee_growth_global_b = p.fee_growth_global_b.checked_add(&growth_delta);
                }
            },
        )
        .await;

    let trade_id = deterministic_id(&[pool_id, token_in_symbol, &token_out_symbol, user, tx_id, &amount_out.to_string()]);

    let maybe_pair = store
        .pairs
        .find_one(|p| {
            (p.base_asset_symbol == pool.token_a_symbol && p.quote_asset_symbol == pool.token_b_symbol)
                || (p.base_asset_symbol == pool.token_b_symbol && p.quote_asset_symbol == pool.token_a_symbol)
        })
        .await;

    let (pair_id, base_symbol, quote_symbol, user_is_buyer) = match &maybe_pair {
        Some(pair) => {
            let user_is_buyer = token_out_symbol == pair.base_asset_symbol;
            (pair.pair_id.clone(), pair.base_asset_symbol.clone(), pair.quote_asset_symbol.clone(), user_is_buyer)
        }
        None => (pool_id.to_owned(), pool.token_a_symbol.clone(), pool.token_b_symbol.clone(), !in_is_a),
    };
    let pool_counterparty = format!("pool:{pool_id}");
    let (buyer_user_id, seller_user_id) = if user_is_buyer {
        (user.to_owned(), pool_counterparty)
    } else {
        (pool_counterparty, user.to_owned())
    };

    let base_decimals = token_precision(store, &base_symbol).await;
    let quote_decimals = token_precision(store, &quote_symbol).await;
    let (trade_price, trade_quantity) = if user_is_buyer {
        (decimal_aware_price(amount_in, &amount_out, quote_decimals, base_decimals), amount_out.clone())
    } else {
        (decimal_aware_price(&amount_out, amount_in, quote_decimals, base_decimals), amount_in.clone())
    };

    store
        .trades
        .insert_one(Trade {
            trade_id: trade_id.clone(),
            pair_id,
            base_symbol,
            quote_symbol,
            maker_order_id: None,
            taker_order_id: None,
            buyer_user_id,
            seller_user_id,
            total: trade_price.checked_mul(&trade_quantity),
            price: trade_price,
            quantity: trade_quantity,
            timestamp: now_ms,
            is_maker_buyer: false,
            source: TradeSource::Pool,
            had_settlement_errors: false,
        })
        .await
        .ok();

    sink.log_event(
        "pool",
        "swap_executed",
        user,
        json!({"poolId": pool_id, "tokenIn": token_in_symbol, "tokenOut": token_out_symbol, "amountIn": amount_in.to_string(), "amountOut": amount_out.to_string()}),
        None,
    )
    .await;

    Ok(SwapResult { amount_out, fee_amount, trade_id })
}

pub(crate) async fn token_precision(store: &Store, symbol: &str) -> u32 {
    store.tokens.find_one(|t| t.symbol == symbol).await.map(|t| t.precision).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_store::{Account, Token};
    use crate::event::NoopEventSink;

    async fn seed_pool(store: &Store, reserve_a: i128, reserve_b: i128) {
        store
            .tokens
            .insert_one(Token { symbol: "MRY".into(), precision: 8, max_supply: Amount::from_i128(i128::MAX), current_supply: Amount::zero(), mintable: true, burnable: true, issuer: None })
            .await
            .ok();
        store
            .tokens
            .insert_one(Token { symbol: "TESTS".into(), precision: 3, max_supply: Amount::from_i128(i128::MAX), current_supply: Amount::zero(), mintable: true, burnable: true, issuer: None })
            .await
            .ok();
        store
            .pools
            .insert_one(LiquidityPool {
                pool_id: "MRY_TESTS".into(),
                token_a_symbol: "MRY".into(),
                token_a_reserve: Amount::from_i128(reserve_a),
                token_b_symbol: "TESTS".into(),
                token_b_reserve: Amount::from_i128(reserve_b),
                total_lp_tokens: Amount::zero(),
                fee_growth_global_a: Amount::zero(),
                fee_growth_global_b: Amount::zero(),
                status: PoolStatus::Active,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scenario_first_liquidity_provision_spec_section_8_1() {
        let store = Store::new();
        seed_pool(&store, 0, 0).await;
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "MRY", &Amount::from_i128(1_000_000_000)).await.unwrap();
        ledger::adjust_balance(&store, "alice", "TESTS", &Amount::from_i128(1_000_000)).await.unwrap();

        let sink = NoopEventSink;
        let result = add_liquidity(&store, &sink, "alice", "MRY_TESTS", &Amount::from_i128(1_000_000_000), &Amount::from_i128(1_000_000), 100, 1)
            .await
            .unwrap();

        assert_eq!(result.lp_minted.to_string(), "31621776");
        assert_eq!(result.pool.total_lp_tokens.to_string(), "31622776");
    }

    #[tokio::test]
    async fn scenario_amm_swap_spec_section_8_3() {
        let store = Store::new();
        seed_pool(&store, 1_000_000, 2_000_000).await;
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "MRY", &Amount::from_i128(10_000)).await.unwrap();
        store.pools.update_one(|_| true, |p| p.total_lp_tokens = Amount::from_i128(1)).await;

        let sink = NoopEventSink;
        let result = swap(&store, &sink, "alice", "MRY_TESTS", "MRY", &Amount::from_i128(10_000), "tx1", 1).await.unwrap();

        assert_eq!(result.amount_out.to_string(), "19742");
        assert_eq!(result.fee_amount.to_string(), "30");
    }
}
