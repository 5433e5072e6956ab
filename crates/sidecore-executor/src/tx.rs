//! Transaction dispatch: a `Transaction` carries a tagged `TxPayload`, and
//! `validate`/`process` route it to the right engine or bridge call — the
//! serial per-block entry point, matching a tagged payload and handing off
//! to a per-kind handler function.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sidecore_bridge::BridgeWorker;
use sidecore_engine::aggregator::RouteKind;
use sidecore_engine::event::EventSink;
use sidecore_engine::ledger;
use sidecore_engine::matching::{MatchingEngine, PlaceOrderRequest};
use sidecore_engine::router::{HybridTradeRequest, RequestedRoute, TradeConstraint};
use sidecore_engine::{amm, farm, nft, router, vesting};
use sidecore_store::{OfferTargetType, OrderType, Side, Store, TimeInForce};
use sidecore_types::{Amount, CoreError};

use crate::Config;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireRouteKind {
    Amm,
    OrderBook,
}

impl From<WireRouteKind> for RouteKind {
    fn from(value: WireRouteKind) -> Self {
        match value {
            WireRouteKind::Amm => RouteKind::Amm,
            WireRouteKind::OrderBook => RouteKind::OrderBook,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoute {
    pub kind: WireRouteKind,
    pub id: String,
    pub allocation_bps: u32,
}

/// Every wire-level transaction kind (§6), plus the supplemental lifecycle
/// operations the full engine exposes beyond the distilled wire contracts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "payload")]
pub enum TxPayload {
    FarmStake { farm_id: String, amount: Amount },
    FarmUnstake { farm_id: String, amount: Amount },
    FarmHarvest { farm_id: String },

    PoolAddLiquidity { pool_id: String, amount_a: Amount, amount_b: Amount, ratio_tolerance_bps: u32 },
    PoolRemoveLiquidity { pool_id: String, lp_amount: Amount },
    PoolClaimFees { pool_id: String },
    PoolSwap { pool_id: String, token_in_symbol: String, amount_in: Amount },

    HybridTrade {
        token_in: String,
        token_out: String,
        amount_in: Amount,
        price: Option<Amount>,
        min_amount_out: Option<Amount>,
        max_slippage_percent: Option<Amount>,
        routes: Option<Vec<WireRoute>>,
    },

    MarketPlaceOrder {
        pair_id: String,
        #[serde(rename = "type")]
        kind: OrderType,
        side: Side,
        price: Option<Amount>,
        quantity: Option<Amount>,
        quote_order_qty: Option<Amount>,
        time_in_force: Option<TimeInForce>,
        expires_at_ms: Option<i64>,
    },
    MarketCancelOrder { order_id: String, pair_id: String },

    VestingClaim { launchpad_id: String, allocation_type: String },

    NftCreateCollection { symbol: String, max_supply: u64, mintable: bool, burnable: bool, transferable: bool, royalty_bps: u32 },
    NftMintInstance { collection_symbol: String, owner: String, #[serde(default)] traits: BTreeMap<String, String> },
    NftTransferInstance { collection_symbol: String, index: u64, to: String },
    NftBurnInstance { collection_symbol: String, index: u64 },
    NftMakeOffer {
        target_type: OfferTargetType,
        target_id: String,
        offer_amount: Amount,
        payment_token_symbol: String,
        payment_token_issuer: Option<String>,
        expires_at: Option<i64>,
        traits: Option<BTreeMap<String, String>>,
    },
    NftCancelOffer { offer_id: String },
    NftAcceptOffer { offer_id: String, collection_symbol: String, index: u64 },

    BridgeWithdraw { to: String, symbol: String, amount: Amount, memo: Option<String> },
    BridgeDeposit { to: String, symbol: String, amount: Amount, memo: Option<String> },
}

/// A transaction as seen by the serial per-block executor. `ts` is the only
/// clock `process` is allowed to read — wall time belongs to the bridge
/// worker's own staleness sweep, not to in-block state transitions.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub tx_id: String,
    pub sender: String,
    pub ts: i64,
    pub payload: TxPayload,
}

fn hybrid_constraint(price: &Option<Amount>, min_amount_out: &Option<Amount>, max_slippage_percent: &Option<Amount>) -> Result<Option<TradeConstraint>, CoreError> {
    match (price, min_amount_out, max_slippage_percent) {
        (Some(p), None, None) => Ok(Some(TradeConstraint::Price(p.clone()))),
        (None, Some(m), None) => Ok(Some(TradeConstraint::MinAmountOut(m.clone()))),
        (None, None, Some(s)) => Ok(Some(TradeConstraint::MaxSlippagePercent(s.clone()))),
        (None, None, None) => Ok(None),
        _ => Err(CoreError::AmbiguousRouteConstraint),
    }
}

fn to_hybrid_request(sender: &str, payload: &TxPayload) -> Result<HybridTradeRequest, CoreError> {
    let TxPayload::HybridTrade { token_in, token_out, amount_in, price, min_amount_out, max_slippage_percent, routes } = payload else {
        unreachable!("to_hybrid_request called on non-HybridTrade payload")
    };
    Ok(HybridTradeRequest {
        user_id: sender.to_owned(),
        token_in: token_in.clone(),
        token_out: token_out.clone(),
        amount_in: amount_in.clone(),
        constraint: hybrid_constraint(price, min_amount_out, max_slippage_percent)?,
        routes: routes.as_ref().map(|rs| {
            rs.iter()
                .map(|r| RequestedRoute { kind: r.kind.into(), id: r.id.clone(), allocation_bps: r.allocation_bps })
                .collect()
        }),
    })
}

fn place_order_request(sender: &str, tx_id: &str, payload: &TxPayload) -> PlaceOrderRequest {
    let TxPayload::MarketPlaceOrder { pair_id, kind, side, price, quantity, quote_order_qty, time_in_force, expires_at_ms } = payload else {
        unreachable!("place_order_request called on non-MarketPlaceOrder payload")
    };
    PlaceOrderRequest {
        order_id: tx_id.to_owned(),
        user_id: sender.to_owned(),
        pair_id: pair_id.clone(),
        side: *side,
        kind: *kind,
        price: price.clone(),
        quantity: quantity.clone(),
        quote_order_qty: quote_order_qty.clone(),
        time_in_force: time_in_force.unwrap_or(TimeInForce::Gtc),
        expires_at_ms: *expires_at_ms,
    }
}

fn require_symbol_allowed(config: &Config, symbol: &str) -> Result<(), CoreError> {
    if !config.is_symbol_allowed(symbol) {
        return Err(CoreError::InvalidConfig { detail: format!("symbol '{symbol}' contains characters outside tokenSymbolAllowedChars") });
    }
    Ok(())
}

fn require_within_max_value(config: &Config, amount: &Amount) -> Result<(), CoreError> {
    if !config.is_within_max_value(amount) {
        return Err(CoreError::InvalidConfig { detail: "amount exceeds maxValue".into() });
    }
    Ok(())
}

/// `validate(tx)` (§7 tier 1): structural and precondition checks only,
/// never mutates the store.
pub async fn validate(store: &Store, engine: &MatchingEngine, config: &Config, tx: &Transaction) -> Result<(), CoreError> {
    match &tx.payload {
        TxPayload::FarmStake { amount, .. } | TxPayload::FarmUnstake { amount, .. } => {
            require_within_max_value(config, amount)
        }
        TxPayload::FarmHarvest { .. } => Ok(()),

        TxPayload::PoolAddLiquidity { amount_a, amount_b, .. } => {
            require_within_max_value(config, amount_a)?;
            require_within_max_value(config, amount_b)
        }
        TxPayload::PoolRemoveLiquidity { lp_amount, .. } => require_within_max_value(config, lp_amount),
        TxPayload::PoolClaimFees { .. } => Ok(()),
        TxPayload::PoolSwap { amount_in, .. } => require_within_max_value(config, amount_in),

        TxPayload::HybridTrade { amount_in, .. } => {
            require_within_max_value(config, amount_in)?;
            let req = to_hybrid_request(&tx.sender, &tx.payload)?;
            router::validate(store, engine, &req).await
        }

        TxPayload::MarketPlaceOrder { quantity, .. } => {
            if let Some(q) = quantity {
                require_within_max_value(config, q)?;
            }
            Ok(())
        }
        TxPayload::MarketCancelOrder { .. } => Ok(()),

        TxPayload::VestingClaim { .. } => Ok(()),

        TxPayload::NftCreateCollection { symbol, royalty_bps, .. } => {
            require_symbol_allowed(config, symbol)?;
            if *royalty_bps > 10_000 {
                return Err(CoreError::InvalidConfig { detail: "royaltyBps exceeds 10000".into() });
            }
            let have = ledger::balance_of(store, &tx.sender, &config.native_token_symbol).await;
            if have < config.nft_collection_creation_fee {
                return Err(CoreError::InsufficientBalance {
                    symbol: config.native_token_symbol.clone(),
                    have: have.to_string(),
                    need: config.nft_collection_creation_fee.to_string(),
                });
            }
            Ok(())
        }
        TxPayload::NftMintInstance { .. }
        | TxPayload::NftTransferInstance { .. }
        | TxPayload::NftBurnInstance { .. }
        | TxPayload::NftCancelOffer { .. }
        | TxPayload::NftAcceptOffer { .. } => Ok(()),
        TxPayload::NftMakeOffer { offer_amount, .. } => require_within_max_value(config, offer_amount),

        TxPayload::BridgeWithdraw { amount, .. } | TxPayload::BridgeDeposit { amount, .. } => {
            if !config.steem_bridge_enabled {
                return Err(CoreError::InvalidConfig { detail: "steemBridgeEnabled is false".into() });
            }
            require_within_max_value(config, amount)
        }
    }
}

/// `process(tx)` (§7 tiers 2-3): mutates the store and returns a JSON
/// summary of the effect, using `tx.ts` as "now" throughout.
#[allow(clippy::too_many_arguments)]
pub async fn process(
    store: &Store,
    sink: &dyn EventSink,
    engine: &MatchingEngine,
    bridge: &Arc<BridgeWorker>,
    config: &Config,
    tx: &Transaction,
) -> Result<Value, CoreError> {
    let now_ms = tx.ts;
    let sender = tx.sender.as_str();

    match &tx.payload {
        TxPayload::FarmStake { farm_id, amount } => {
            let r = farm::stake(store, sink, sender, farm_id, amount, now_ms).await?;
            Ok(json!({"totalStaked": r.total_staked.to_string()}))
        }
        TxPayload::FarmUnstake { farm_id, amount } => {
            let r = farm::unstake(store, sink, sender, farm_id, amount, now_ms).await?;
            Ok(json!({"refunded": r.refunded.to_string(), "totalStaked": r.total_staked.to_string()}))
        }
        TxPayload::FarmHarvest { farm_id } => {
            let r = farm::harvest(store, sink, sender, farm_id, now_ms).await?;
            Ok(json!({"rewardsPaid": r.rewards_paid.to_string()}))
        }

        TxPayload::PoolAddLiquidity { pool_id, amount_a, amount_b, ratio_tolerance_bps } => {
            let r = amm::add_liquidity(store, sink, sender, pool_id, amount_a, amount_b, *ratio_tolerance_bps, now_ms).await?;
            Ok(json!({"lpMinted": r.lp_minted.to_string()}))
        }
        TxPayload::PoolRemoveLiquidity { pool_id, lp_amount } => {
            let r = amm::remove_liquidity(store, sink, sender, pool_id, lp_amount, now_ms).await?;
            Ok(json!({"amountA": r.amount_a.to_string(), "amountB": r.amount_b.to_string()}))
        }
        TxPayload::PoolClaimFees { pool_id } => {
            let r = amm::claim_fees(store, sink, sender, pool_id).await?;
            Ok(json!({"feesClaimedA": r.fees_claimed_a.to_string(), "feesClaimedB": r.fees_claimed_b.to_string()}))
        }
        TxPayload::PoolSwap { pool_id, token_in_symbol, amount_in } => {
            let r = amm::swap(store, sink, sender, pool_id, token_in_symbol, amount_in, &tx.tx_id, now_ms).await?;
            Ok(json!({"amountOut": r.amount_out.to_string()}))
        }

        TxPayload::HybridTrade { .. } => {
            let req = to_hybrid_request(sender, &tx.payload)?;
            let r = router::process(store, sink, engine, req, &tx.tx_id, now_ms).await?;
            Ok(json!({
                "totalAmountOut": r.total_amount_out.to_string(),
                "slippageDeferred": r.slippage_deferred,
                "routes": r.routes.iter().map(|e| json!({
                    "kind": format!("{:?}", e.kind),
                    "id": e.id,
                    "amountIn": e.amount_in.to_string(),
                    "amountOut": e.amount_out.to_string(),
                    "orderId": e.order_id,
                })).collect::<Vec<_>>(),
            }))
        }

        TxPayload::MarketPlaceOrder { .. } => {
            let req = place_order_request(sender, &tx.tx_id, &tx.payload);
            let order = engine.add_order(store, sink, req, now_ms).await?;
            Ok(json!({"orderId": order.order_id, "status": format!("{:?}", order.status)}))
        }
        TxPayload::MarketCancelOrder { order_id, pair_id } => {
            engine.cancel_order(store, sink, order_id, pair_id, sender, now_ms).await?;
            Ok(json!({"orderId": order_id}))
        }

        TxPayload::VestingClaim { launchpad_id, allocation_type } => {
            let r = vesting::claim_vesting(store, sink, sender, launchpad_id, allocation_type, now_ms).await?;
            Ok(json!({"claimed": r.claimed.to_string()}))
        }

        TxPayload::NftCreateCollection { symbol, max_supply, mintable, burnable, transferable, royalty_bps } => {
            ledger::adjust_balance(store, sender, &config.native_token_symbol, &config.nft_collection_creation_fee.neg()).await?;
            if let Err(err) = nft::create_collection(store, sender, symbol, *max_supply, *mintable, *burnable, *transferable, *royalty_bps).await {
                ledger::adjust_balance(store, sender, &config.native_token_symbol, &config.nft_collection_creation_fee).await.ok();
                return Err(err);
            }
            Ok(json!({"symbol": symbol}))
        }
        TxPayload::NftMintInstance { collection_symbol, owner, traits } => {
            let instance = nft::mint_instance(store, sink, sender, collection_symbol, owner, traits.clone()).await?;
            Ok(json!({"index": instance.index}))
        }
        TxPayload::NftTransferInstance { collection_symbol, index, to } => {
            nft::transfer_instance(store, sink, sender, collection_symbol, *index, to).await?;
            Ok(json!({"collectionSymbol": collection_symbol, "index": index}))
        }
        TxPayload::NftBurnInstance { collection_symbol, index } => {
            nft::burn_instance(store, sink, sender, collection_symbol, *index).await?;
            Ok(json!({"collectionSymbol": collection_symbol, "index": index}))
        }
        TxPayload::NftMakeOffer { target_type, target_id, offer_amount, payment_token_symbol, payment_token_issuer, expires_at, traits } => {
            let payment_token_key = ledger::token_key(payment_token_symbol, payment_token_issuer.as_deref());
            let offer = nft::make_offer(store, sink, sender, *target_type, target_id, offer_amount, &payment_token_key, *expires_at, traits.clone(), now_ms).await?;
            Ok(json!({"offerId": offer.offer_id}))
        }
        TxPayload::NftCancelOffer { offer_id } => {
            nft::cancel_offer(store, sink, sender, offer_id).await?;
            Ok(json!({"offerId": offer_id}))
        }
        TxPayload::NftAcceptOffer { offer_id, collection_symbol, index } => {
            nft::accept_offer(store, sink, sender, offer_id, collection_symbol, *index, now_ms).await?;
            Ok(json!({"offerId": offer_id}))
        }

        TxPayload::BridgeWithdraw { to, symbol, amount, memo } => {
            let job = bridge.enqueue_withdrawal(sender, to, symbol, amount, memo.clone()).await?;
            Ok(json!({"jobId": job.job_id}))
        }
        TxPayload::BridgeDeposit { to, symbol, amount, memo } => {
            let job = bridge.enqueue_deposit(to, symbol, amount, memo.clone()).await?;
            Ok(json!({"jobId": job.job_id}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sidecore_bridge::{BridgeJob, BridgeWorkerConfig, SourceChainClient};
    use sidecore_engine::event::NoopEventSink;
    use sidecore_store::Account;

    fn sample_config() -> Config {
        Config {
            native_token_symbol: "MRY".into(),
            nft_collection_creation_fee: Amount::from_i128(1000),
            token_symbol_allowed_chars: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".into(),
            max_value: Amount::from_i128(9_223_372_036_854_775_807),
            steem_bridge_account: "bridge".into(),
            steem_bridge_active_key: "key".into(),
            steem_bridge_enabled: true,
            chain_id: "sidecore-1".into(),
        }
    }

    struct DummyClient;
    #[async_trait]
    impl SourceChainClient for DummyClient {
        async fn broadcast_withdrawal(&self, job: &BridgeJob) -> anyhow::Result<String> {
            Ok(format!("txw-{}", job.job_id))
        }
        async fn broadcast_deposit_mint(&self, job: &BridgeJob) -> anyhow::Result<String> {
            Ok(format!("txd-{}", job.job_id))
        }
    }

    fn sample_bridge(store: Arc<Store>) -> Arc<sidecore_bridge::BridgeWorker> {
        Arc::new(sidecore_bridge::BridgeWorker::new(store, Arc::new(NoopEventSink), Arc::new(DummyClient), BridgeWorkerConfig::default()))
    }

    #[tokio::test]
    async fn create_collection_debits_fee_and_rolls_back_on_duplicate_symbol() {
        let store = Arc::new(Store::new());
        let engine = MatchingEngine::new();
        let sink = NoopEventSink;
        let config = sample_config();
        let bridge = sample_bridge(store.clone());

        store.accounts.insert_one(Account::new("alice")).await.ok();
        ledger::adjust_balance(&store, "alice", "MRY", &Amount::from_i128(5000)).await.unwrap();

        let tx = Transaction {
            tx_id: "tx1".into(),
            sender: "alice".into(),
            ts: 1,
            payload: TxPayload::NftCreateCollection { symbol: "WEAPONS".into(), max_supply: 100, mintable: true, burnable: true, transferable: true, royalty_bps: 500 },
        };
        validate(&store, &engine, &config, &tx).await.unwrap();
        process(&store, &sink, &engine, &bridge, &config, &tx).await.unwrap();
        assert_eq!(ledger::balance_of(&store, "alice", "MRY").await.to_string(), "4000");

        let dup = Transaction {
            tx_id: "tx2".into(),
            sender: "alice".into(),
            ts: 2,
            payload: TxPayload::NftCreateCollection { symbol: "WEAPONS".into(), max_supply: 100, mintable: true, burnable: true, transferable: true, royalty_bps: 500 },
        };
        let err = process(&store, &sink, &engine, &bridge, &config, &dup).await.unwrap_err();
        assert!(matches!(err, CoreError::Other(_)));
        assert_eq!(ledger::balance_of(&store, "alice", "MRY").await.to_string(), "4000");
    }

    #[tokio::test]
    async fn validate_rejects_disallowed_symbol_and_insufficient_fee_balance() {
        let store = Arc::new(Store::new());
        let engine = MatchingEngine::new();
        let config = sample_config();

        let bad_symbol = Transaction {
            tx_id: "tx1".into(),
            sender: "bob".into(),
            ts: 1,
            payload: TxPayload::NftCreateCollection { symbol: "weapons".into(), max_supply: 10, mintable: true, burnable: true, transferable: true, royalty_bps: 0 },
        };
        assert!(matches!(validate(&store, &engine, &config, &bad_symbol).await, Err(CoreError::InvalidConfig { .. })));

        let no_funds = Transaction {
            tx_id: "tx2".into(),
            sender: "bob".into(),
            ts: 1,
            payload: TxPayload::NftCreateCollection { symbol: "WEAPONS".into(), max_supply: 10, mintable: true, burnable: true, transferable: true, royalty_bps: 0 },
        };
        assert!(matches!(validate(&store, &engine, &config, &no_funds).await, Err(CoreError::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn bridge_withdraw_dispatch_debits_and_enqueues() {
        let store = Arc::new(Store::new());
        let engine = MatchingEngine::new();
        let sink = NoopEventSink;
        let config = sample_config();
        let bridge = sample_bridge(store.clone());

        store.accounts.insert_one(Account::new("carol")).await.ok();
        ledger::adjust_balance(&store, "carol", "MRY", &Amount::from_i128(500)).await.unwrap();

        let tx = Transaction {
            tx_id: "tx1".into(),
            sender: "carol".into(),
            ts: 1,
            payload: TxPayload::BridgeWithdraw { to: "steemcarol".into(), symbol: "MRY".into(), amount: Amount::from_i128(200), memo: None },
        };
        validate(&store, &engine, &config, &tx).await.unwrap();
        let result = process(&store, &sink, &engine, &bridge, &config, &tx).await.unwrap();
        assert!(result.get("jobId").is_some());
        assert_eq!(ledger::balance_of(&store, "carol", "MRY").await.to_string(), "300");
    }
}
