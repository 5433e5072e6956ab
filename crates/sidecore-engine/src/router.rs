//! Hybrid trade router (C8): validates a `hybrid_trade`, obtains a quote
//! from the aggregator (C7) or honors caller-specified routes, and executes
//! across AMM pools (C6) and the order book (C5).

use sidecore_store::{OrderType, PairStatus, Side, Store, TimeInForce};
use sidecore_types::{Amount, CoreError};

use crate::aggregator::{self, RouteKind};
use crate::amm::{self, token_precision};
use crate::event::EventSink;
use crate::ledger;
use crate::matching::{self, MatchingEngine, PlaceOrderRequest};

/// Exactly one of these must be present on a `hybrid_trade` request, mirroring
/// the wire contract's `price? | minAmountOut? | maxSlippagePercent?`.
pub enum TradeConstraint {
    Price(Amount),
    MinAmountOut(Amount),
    /// Whole percent, `0..=100`.
    MaxSlippagePercent(Amount),
}

pub struct RequestedRoute {
    pub kind: RouteKind,
    /// Pool id (AMM) or pair id (order book).
    pub id: String,
    pub allocation_bps: u32,
}

pub struct HybridTradeRequest {
    pub user_id: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Amount,
    pub constraint: Option<TradeConstraint>,
    pub routes: Option<Vec<RequestedRoute>>,
}

pub struct RouteExecution {
    pub kind: RouteKind,
    pub id: String,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub order_id: Option<String>,
}

pub struct HybridTradeResult {
    pub total_amount_out: Amount,
    pub routes: Vec<RouteExecution>,
    /// Set when the slippage check against `minAmountOut` was deferred to
    /// fill-time because the trade ended as a resting LIMIT order with no
    /// immediate fills (§4.8, scenario 5).
    pub slippage_deferred: bool,
}

const BPS_DENOM: i128 = 10_000;
const BPS_TOLERANCE: i128 = 1; // ±0.01%

/// `validate` (§4.8).
pub async fn validate(store: &Store, engine: &MatchingEngine, req: &HybridTradeRequest) -> Result<(), CoreError> {
    if req.token_in == req.token_out {
        return Err(CoreError::SameToken);
    }
    if !req.amount_in.is_positive() {
        return Err(CoreError::ZeroAmount);
    }
    store.tokens.find_one(|t| t.symbol == req.token_in).await.ok_or_else(|| CoreError::TokenNotFound { symbol: req.token_in.clone() })?;
    store.tokens.find_one(|t| t.symbol == req.token_out).await.ok_or_else(|| CoreError::TokenNotFound { symbol: req.token_out.clone() })?;

    match &req.constraint {
        Some(TradeConstraint::MaxSlippagePercent(pct)) => {
            let v = pct.to_i128().unwrap_or(-1);
            if !(0..=100).contains(&v) {
                return Err(CoreError::SlippagePercentOutOfRange { value: pct.to_string() });
            }
        }
        Some(_) => {}
        None => return Err(CoreError::AmbiguousRouteConstraint),
    }

    let balance = ledger::balance_of(store, &req.user_id, &req.token_in).await;
    if balance < req.amount_in {
        return Err(CoreError::InsufficientBalance { symbol: req.token_in.clone(), have: balance.to_string(), need: req.amount_in.to_string() });
    }

    match &req.routes {
        Some(routes) if !routes.is_empty() => {
            let mut total_bps: i128 = 0;
            for route in routes {
                if route.allocation_bps == 0 || route.allocation_bps as i128 > BPS_DENOM {
                    return Err(CoreError::RouteAllocationOutOfRange { value: format!("{}bps", route.allocation_bps) });
                }
                total_bps += route.allocation_bps as i128;
                if route.kind == RouteKind::Amm {
                    let slice = req.amount_in.checked_mul(&Amount::from_i128(route.allocation_bps as i128)).checked_div(&Amount::from_i128(BPS_DENOM)).unwrap_or_else(Amount::zero);
                    let pool = store.pools.find_one(|p| p.pool_id == route.id).await.ok_or_else(|| CoreError::PoolNotFound { pool_id: route.id.clone() })?;
                    let (reserve_in, reserve_out, _) = pool.reserves_for(&req.token_in).ok_or_else(|| CoreError::TokenNotFound { symbol: req.token_in.clone() })?;
                    let (expected_out, _) = amm::quote_constant_product(&reserve_in, &reserve_out, &slice);
                    if !expected_out.is_positive() {
                        return Err(CoreError::InsufficientDepth { depth: reserve_out.to_string(), amount: slice.to_string() });
                    }
                }
            }
            if (total_bps - BPS_DENOM).abs() > BPS_TOLERANCE {
                return Err(CoreError::RouteAllocationMismatch { total: format!("{total_bps}bps") });
            }
        }
        _ => {
            let sources = aggregator::get_liquidity_sources(store, engine, &req.token_in, &req.token_out).await;
            let any_liquid = sources.iter().any(|s| match s {
                aggregator::LiquiditySource::Amm { has_liquidity, .. } => *has_liquidity,
                aggregator::LiquiditySource::OrderBook { best_bid, best_ask, .. } => best_bid.is_some() || best_ask.is_some(),
            });
            if !any_liquid {
                return Err(CoreError::NoLiquiditySource { base: req.token_in.clone(), quote: req.token_out.clone() });
            }
        }
    }

    Ok(())
}

/// `process` (§4.8).
pub async fn process(
    store: &Store,
    sink: &dyn EventSink,
    engine: &MatchingEngine,
    req: HybridTradeRequest,
    tx_id: &str,
    now_ms: i64,
) -> Result<HybridTradeResult, CoreError> {
    let min_amount_out = resolve_min_amount_out(store, engine, &req).await?;

    let mut executed = Vec::new();
    let mut slippage_deferred = false;

    match req.routes {
        Some(routes) if !routes.is_empty() => {
            let mut allocated = Amount::zero();
            for (i, route) in routes.iter().enumerate() {
                let slice = if i + 1 == routes.len() {
                    req.amount_in.checked_sub(&allocated)
                } else {
                    let s = req.amount_in.checked_mul(&Amount::from_i128(route.allocation_bps as i128)).checked_div(&Amount::from_i128(BPS_DENOM)).unwrap_or_else(Amount::zero);
                    allocated = allocated.checked_add(&s);
                    s
                };
                if let Ok(result) = execute_route(store, sink, engine, &req.user_id, &req.token_in, &req.token_out, route.kind, &route.id, &slice, tx_id, now_ms).await {
                    executed.push(result);
                }
            }
            if executed.is_empty() {
                return Err(CoreError::AllRoutesFailed);
            }
        }
        _ => {
            let quote = aggregator::get_best_quote(store, engine, &req.token_in, &req.token_out, &req.amount_in).await?;
            let winner = &quote.routes[0];

            let below_min = min_amount_out.as_ref().is_some_and(|m| winner.amount_out < *m);
            if winner.kind == RouteKind::Amm && below_min {
                let (order, deferred) = reroute_into_limit_order(store, sink, engine, &req, min_amount_out.as_ref().unwrap(), now_ms).await?;
                slippage_deferred = deferred;
                let amount_out = match order.side {
                    Side::Buy => order.filled_quantity.clone(),
                    Side::Sell => order.cumulative_quote_value.clone().unwrap_or_else(Amount::zero),
                };
                executed.push(RouteExecution { kind: RouteKind::OrderBook, id: order.pair_id.clone(), amount_in: req.amount_in.clone(), amount_out, order_id: Some(order.order_id.clone()) });
            } else {
                let result = execute_route(store, sink, engine, &req.user_id, &req.token_in, &req.token_out, winner.kind, &winner.id, &req.amount_in, tx_id, now_ms).await?;
                executed.push(result);
            }
        }
    }

    let total_amount_out = executed.iter().fold(Amount::zero(), |acc, r| acc.checked_add(&r.amount_out));

    if let Some(min) = &min_amount_out {
        if !slippage_deferred && total_amount_out < *min {
            return Err(CoreError::SlippageExceeded { min_amount_out: min.to_string(), actual: total_amount_out.to_string() });
        }
    }

    sink.log_event(
        "router",
        "hybrid_trade_executed",
        &req.user_id,
        serde_json::json!({"tokenIn": req.token_in, "tokenOut": req.token_out, "amountIn": req.amount_in.to_string(), "amountOut": total_amount_out.to_string()}),
        Some(tx_id),
    )
    .await;

    Ok(HybridTradeResult { total_amount_out, routes: executed, slippage_deferred })
}

/// Resolves the three wire-level constraint shapes into a single optional
/// quote-smallest-unit floor. `Price` is converted into the same
/// amountIn/price -> minAmountOut floor used to size a rerouted limit order
/// (mirrors `reroute_into_limit_order`'s formulas run in reverse); `MaxSlippagePercent`
/// is converted against the aggregator's current best quote.
async fn resolve_min_amount_out(store: &Store, engine: &MatchingEngine, req: &HybridTradeRequest) -> Result<Option<Amount>, CoreError> {
    match &req.constraint {
        Some(TradeConstraint::MinAmountOut(m)) => Ok(Some(m.clone())),
        Some(TradeConstraint::Price(price)) => {
            let sources = aggregator::get_liquidity_sources(store, engine, &req.token_in, &req.token_out).await;
            let pair_id = sources.iter().find_map(|s| match s {
                aggregator::LiquiditySource::OrderBook { pair_id, .. } => Some(pair_id.clone()),
                _ => None,
            });
            let pair = match pair_id {
                Some(id) => store.pairs.find_one(|p| p.pair_id == id).await,
                None => {
                    store
                        .pairs
                        .find_one(|p| (p.base_asset_symbol == req.token_in && p.quote_asset_symbol == req.token_out) || (p.base_asset_symbol == req.token_out && p.quote_asset_symbol == req.token_in))
                        .await
                }
            }
            .ok_or_else(|| CoreError::NoLiquiditySource { base: req.token_in.clone(), quote: req.token_out.clone() })?;

            let buying_base = req.token_out == pair.base_asset_symbol;
            let base_decimals = token_precision(store, &pair.base_asset_symbol).await;
            let base_scale = Amount::pow10(base_decimals);

            let min = if buying_base {
                req.amount_in.checked_mul(&base_scale).checked_div(price).unwrap_or_else(Amount::zero)
            } else {
                price.checked_mul(&req.amount_in).checked_div(&base_scale).unwrap_or_else(Amount::zero)
            };
            Ok(Some(min))
        }
        None => Ok(None),
        Some(TradeConstraint::MaxSlippagePercent(pct)) => {
            let quote = aggregator::get_best_quote(store, engine, &req.token_in, &req.token_out, &req.amount_in).await?;
            let keep_bps = Amount::from_i128(100) - pct.clone();
            let min = quote.amount_out.checked_mul(&keep_bps).checked_div(&Amount::from_i128(100)).unwrap_or_else(Amount::zero);
            Ok(Some(min))
        }
    }
}

async fn execute_route(
    store: &Store,
    sink: &dyn EventSink,
    engine: &MatchingEngine,
    user_id: &str,
    token_in: &str,
    token_out: &str,
    kind: RouteKind,
    id: &str,
    amount_in: &Amount,
    tx_id: &str,
    now_ms: i64,
) -> Result<RouteExecution, CoreError> {
    match kind {
        RouteKind::Amm => {
            let result = amm::swap(store, sink, user_id, id, token_in, amount_in, tx_id, now_ms).await?;
            Ok(RouteExecution { kind, id: id.to_owned(), amount_in: amount_in.clone(), amount_out: result.amount_out, order_id: None })
        }
        RouteKind::OrderBook => {
            let pair = store.pairs.find_one(|p| p.pair_id == id && matches!(p.status, PairStatus::Trading)).await.ok_or_else(|| CoreError::PairNotFound { pair_id: id.to_owned() })?;
            let buying_base = token_out == pair.base_asset_symbol;
            let req = PlaceOrderRequest {
                order_id: deterministic_route_order_id(tx_id, id),
                user_id: user_id.to_owned(),
                pair_id: id.to_owned(),
                side: if buying_base { Side::Buy } else { Side::Sell },
                kind: OrderType::Market,
                price: None,
                quantity: if buying_base { None } else { Some(amount_in.clone()) },
                quote_order_qty: if buying_base { Some(amount_in.clone()) } else { None },
                time_in_force: TimeInForce::Ioc,
                expires_at_ms: None,
            };
            let order = engine.add_order(store, sink, req, now_ms).await?;
            let amount_out = if buying_base { order.filled_quantity.clone() } else { order.cumulative_quote_value.clone().unwrap_or_else(Amount::zero) };
            Ok(RouteExecution { kind, id: id.to_owned(), amount_in: amount_in.clone(), amount_out, order_id: Some(order.order_id) })
        }
    }
}

/// Reroutes an AMM-losing auto-quote into a resting LIMIT order priced to
/// exactly satisfy `minAmountOut` (§4.8, scenario 5).
async fn reroute_into_limit_order(
    store: &Store,
    sink: &dyn EventSink,
    engine: &MatchingEngine,
    req: &HybridTradeRequest,
    min_amount_out: &Amount,
    now_ms: i64,
) -> Result<(sidecore_store::Order, bool), CoreError> {
    let pair = store
        .pairs
        .find_one(|p| {
            matches!(p.status, PairStatus::Trading)
                && ((p.base_asset_symbol == req.token_in && p.quote_asset_symbol == req.token_out) || (p.base_asset_symbol == req.token_out && p.quote_asset_symbol == req.token_in))
        })
        .await
        .ok_or_else(|| CoreError::NoLiquiditySource { base: req.token_in.clone(), quote: req.token_out.clone() })?;

    let buying_base = req.token_out == pair.base_asset_symbol;
    let base_decimals = token_precision(store, &pair.base_asset_symbol).await;
    let base_scale = Amount::pow10(base_decimals);

    let (side, price, quantity) = if buying_base {
        let price = req.amount_in.checked_mul(&base_scale).checked_div(min_amount_out).unwrap_or_else(Amount::zero);
        (Side::Buy, price, min_amount_out.clone())
    } else {
        let price = min_amount_out.checked_mul(&base_scale).checked_div(&req.amount_in).unwrap_or_else(Amount::zero);
        (Side::Sell, price, req.amount_in.clone())
    };

    matching::validate_tick_and_lot(&pair, &price, &quantity)?;

    let place_req = PlaceOrderRequest {
        order_id: deterministic_route_order_id(&format!("reroute-{now_ms}"), &pair.pair_id),
        user_id: req.user_id.clone(),
        pair_id: pair.pair_id.clone(),
        side,
        kind: OrderType::Limit,
        price: Some(price),
        quantity: Some(quantity),
        quote_order_qty: None,
        time_in_force: TimeInForce::Gtc,
        expires_at_ms: None,
    };
    let order = engine.add_order(store, sink, place_req, now_ms).await?;
    let deferred = !order.filled_quantity.is_positive();
    Ok((order, deferred))
}

fn deterministic_route_order_id(tx_id: &str, route_id: &str) -> String {
    sidecore_types::deterministic_id(&[tx_id, route_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_store::{Account, LiquidityPool, PoolStatus, Token};
    use crate::event::NoopEventSink;

    async fn seed_market(store: &Store) {
        for (symbol, precision) in [("USDT", 0), ("MRY", 0)] {
            store
                .tokens
                .insert_one(Token { symbol: symbol.into(), precision, max_supply: Amount::from_i128(i128::MAX), current_supply: Amount::zero(), mintable: true, burnable: true, issuer: None })
                .await
                .ok();
        }
        store
            .pools
            .insert_one(LiquidityPool {
                pool_id: "MRY_USDT".into(),
                token_a_symbol: "MRY".into(),
                token_a_reserve: Amount::from_i128(900_000),
                token_b_symbol: "USDT".into(),
                token_b_reserve: Amount::from_i128(1_000_000),
                total_lp_tokens: Amount::from_i128(1),
                fee_growth_global_a: Amount::zero(),
                fee_growth_global_b: Amount::zero(),
                status: PoolStatus::Active,
            })
            .await
            .unwrap();
        store
            .pairs
            .insert_one(sidecore_store::TradingPair {
                pair_id: "MRY_USDT".into(),
                base_asset_symbol: "MRY".into(),
                quote_asset_symbol: "USDT".into(),
                tick_size: Amount::zero(),
                lot_size: Amount::zero(),
                min_notional: Amount::zero(),
                min_trade_amount: Amount::zero(),
                max_trade_amount: Amount::from_i128(i128::MAX),
                status: PairStatus::Trading,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn auto_route_reroutes_to_resting_limit_order_when_amm_quote_is_short() {
        let store = Store::new();
        seed_market(&store).await;
        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "USDT", &Amount::from_i128(1000)).await.unwrap();
        let engine = MatchingEngine::new();
        let sink = NoopEventSink;

        let req = HybridTradeRequest {
            user_id: "alice".into(),
            token_in: "USDT".into(),
            token_out: "MRY".into(),
            amount_in: Amount::from_i128(1000),
            constraint: Some(TradeConstraint::MinAmountOut(Amount::from_i128(1000))),
            routes: None,
        };
        validate(&store, &engine, &req).await.unwrap();

        let result = process(&store, &sink, &engine, req, "tx1", 1).await.unwrap();
        assert!(result.slippage_deferred);
        assert_eq!(result.routes.len(), 1);
        assert_eq!(result.routes[0].kind, RouteKind::OrderBook);
        assert!(result.routes[0].order_id.is_some());

        let resting = store.orders.find_one(|o| o.order_id == result.routes[0].order_id.clone().unwrap()).await.unwrap();
        assert_eq!(resting.price.unwrap().to_string(), "1");
        assert_eq!(resting.quantity.to_string(), "1000");
        assert_eq!(resting.filled_quantity.to_string(), "0");
    }
}
