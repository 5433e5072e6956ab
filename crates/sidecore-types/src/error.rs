//! The core error taxonomy.
//!
//! A small enum of short, stable, serializable codes returned by
//! `validate()` as `{valid:false, reason}`. Execution-time failures in this
//! workspace use `anyhow::Result` directly with `.context(..)`
//! annotations, converting a `CoreError` into the ambient error type via `From`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CoreError {
    #[error("insufficient balance: have {have}, need {need}, token {symbol}")]
    InsufficientBalance {
        symbol: String,
        have: String,
        need: String,
    },

    #[error("token not found: {symbol}")]
    TokenNotFound { symbol: String },

    #[error("max supply exceeded for {symbol}")]
    SupplyExceeded { symbol: String },

    #[error("pool not found: {pool_id}")]
    PoolNotFound { pool_id: String },

    #[error("pool ratio tolerance exceeded for {pool_id}")]
    PoolRatioMismatch { pool_id: String },

    #[error("pair not found: {pair_id}")]
    PairNotFound { pair_id: String },

    #[error("pair {pair_id} is halted")]
    PairHalted { pair_id: String },

    #[error("pool {pool_id} is paused")]
    PoolPaused { pool_id: String },

    #[error("price {price} is not a multiple of tick size {tick_size} for {pair_id}")]
    TickMismatch {
        pair_id: String,
        price: String,
        tick_size: String,
    },

    #[error("quantity {quantity} is not a multiple of lot size {lot_size} for {pair_id}")]
    LotMismatch {
        pair_id: String,
        quantity: String,
        lot_size: String,
    },

    #[error("notional {notional} outside [{min},{max}] for {pair_id}")]
    NotionalOutOfRange {
        pair_id: String,
        notional: String,
        min: String,
        max: String,
    },

    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("order {order_id} is not owned by {user}")]
    NotOrderOwner { order_id: String, user: String },

    #[error("order {order_id} is not in a cancellable state")]
    OrderNotCancellable { order_id: String },

    #[error("limit order requires a positive price")]
    LimitRequiresPrice,

    #[error("amount must be strictly positive")]
    ZeroAmount,

    #[error("tokenIn and tokenOut must differ")]
    SameToken,

    #[error("no liquidity source available for {base}/{quote}")]
    NoLiquiditySource { base: String, quote: String },

    #[error("order book depth at best level ({depth}) is less than requested amount ({amount})")]
    InsufficientDepth { depth: String, amount: String },

    #[error("exactly one of price, minAmountOut, maxSlippagePercent must be set")]
    AmbiguousRouteConstraint,

    #[error("maxSlippagePercent must be in [0,100], got {value}")]
    SlippagePercentOutOfRange { value: String },

    #[error("route allocations must sum to 100% (±0.01), got {total}")]
    RouteAllocationMismatch { total: String },

    #[error("route allocation must be in (0,100], got {value}")]
    RouteAllocationOutOfRange { value: String },

    #[error("slippage exceeded: wanted at least {min_amount_out}, got {actual}")]
    SlippageExceeded {
        min_amount_out: String,
        actual: String,
    },

    #[error("all routes failed for hybrid trade")]
    AllRoutesFailed,

    #[error("farm not found: {farm_id}")]
    FarmNotFound { farm_id: String },

    #[error("farm {farm_id} is not active or out of its staking window")]
    FarmInactive { farm_id: String },

    #[error("stake amount below farm minimum of {min_stake}")]
    BelowMinStake { min_stake: String },

    #[error("user farm position not found: {key}")]
    FarmPositionNotFound { key: String },

    #[error("staked amount {have} is less than requested unstake {need}")]
    InsufficientStake { have: String, need: String },

    #[error("vesting state not found: {key}")]
    VestingNotFound { key: String },

    #[error("vesting state {key} is already fully claimed")]
    AlreadyFullyClaimed { key: String },

    #[error("nothing available to claim for {key}")]
    NothingToClaim { key: String },

    #[error("invalid offer target: {target_type}/{target_id}")]
    InvalidTarget {
        target_type: String,
        target_id: String,
    },

    #[error("cannot make an offer on your own asset")]
    SelfOffer,

    #[error("asset is not transferable")]
    NotTransferable,

    #[error("offer expiration must be in the future")]
    ExpirationInPast,

    #[error("offer {offer_id} is not owned by {user}")]
    NotOfferOwner { offer_id: String, user: String },

    #[error("offer not found: {offer_id}")]
    OfferNotFound { offer_id: String },

    #[error("offer {offer_id} is not active")]
    OfferNotActive { offer_id: String },

    #[error("offer {offer_id} is expired")]
    OfferExpired { offer_id: String },

    #[error("collection not found: {symbol}")]
    CollectionNotFound { symbol: String },

    #[error("collection {symbol} has reached its max supply")]
    CollectionSupplyExceeded { symbol: String },

    #[error("collection {symbol} is not mintable")]
    CollectionNotMintable { symbol: String },

    #[error("collection {symbol} is not burnable")]
    CollectionNotBurnable { symbol: String },

    #[error("nft instance not found: {instance_id}")]
    NftInstanceNotFound { instance_id: String },

    #[error("{actor} does not own nft {instance_id}")]
    NotNftOwner { instance_id: String, actor: String },

    #[error("bridge job not found: {job_id}")]
    BridgeJobNotFound { job_id: String },

    #[error("bridge job {job_id} is not pending")]
    BridgeJobNotPending { job_id: String },

    #[error("arithmetic overflow or invalid math: {detail}")]
    MathOverflow { detail: String },

    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("unknown transaction kind: {kind}")]
    UnknownTxKind { kind: String },

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// The short, stable reason code surfaced to callers as `{valid:false, reason}`,
    /// the short-code validation error contract (§7).
    pub fn reason_code(&self) -> &'static str {
        match self {
            CoreError::InsufficientBalance { .. } => "insufficient_balance",
            CoreError::TokenNotFound { .. } => "token_not_found",
            CoreError::SupplyExceeded { .. } => "supply_exceeded",
            CoreError::PoolNotFound { .. } => "pool_not_found",
            CoreError::PoolRatioMismatch { .. } => "pool_ratio_mismatch",
            CoreError::PairNotFound { .. } => "pair_not_found",
            CoreError::PairHalted { .. } => "pair_halted",
            CoreError::PoolPaused { .. } => "pool_paused",
            CoreError::TickMismatch { .. } => "tick_mismatch",
            CoreError::LotMismatch { .. } => "lot_mismatch",
            CoreError::NotionalOutOfRange { .. } => "notional_out_of_range",
            CoreError::OrderNotFound { .. } => "order_not_found",
            CoreError::NotOrderOwner { .. } => "not_order_owner",
            CoreError::OrderNotCancellable { .. } => "order_not_cancellable",
            CoreError::LimitRequiresPrice => "limit_requires_price",
            CoreError::ZeroAmount => "zero_amount",
            CoreError::SameToken => "same_token",
            CoreError::NoLiquiditySource { .. } => "no_liquidity_source",
            CoreError::InsufficientDepth { .. } => "insufficient_depth",
            CoreError::AmbiguousRouteConstraint => "ambiguous_route_constraint",
            CoreError::SlippagePercentOutOfRange { .. } => "slippage_percent_out_of_range",
            CoreError::RouteAllocationMismatch { .. } => "route_allocation_mismatch",
            CoreError::RouteAllocationOutOfRange { .. } => "route_allocation_out_of_range",
            CoreError::SlippageExceeded { .. } => "slippage_exceeded",
            CoreError::AllRoutesFailed => "all_routes_failed",
            CoreError::FarmNotFound { .. } => "farm_not_found",
            CoreError::FarmInactive { .. } => "farm_inactive",
            CoreError::BelowMinStake { .. } => "below_min_stake",
            CoreError::FarmPositionNotFound { .. } => "farm_position_not_found",
            CoreError::InsufficientStake { .. } => "insufficient_stake",
            CoreError::VestingNotFound { .. } => "vesting_not_found",
            CoreError::AlreadyFullyClaimed { .. } => "already_fully_claimed",
            CoreError::NothingToClaim { .. } => "nothing_to_claim",
            CoreError::InvalidTarget { .. } => "invalid_target",
            CoreError::SelfOffer => "self_offer",
            CoreError::NotTransferable => "not_transferable",
            CoreError::ExpirationInPast => "expiration_in_past",
            CoreError::NotOfferOwner { .. } => "not_offer_owner",
            CoreError::OfferNotFound { .. } => "offer_not_found",
            CoreError::OfferNotActive { .. } => "offer_not_active",
            CoreError::OfferExpired { .. } => "offer_expired",
            CoreError::CollectionNotFound { .. } => "collection_not_found",
            CoreError::CollectionSupplyExceeded { .. } => "collection_supply_exceeded",
            CoreError::CollectionNotMintable { .. } => "collection_not_mintable",
            CoreError::CollectionNotBurnable { .. } => "collection_not_burnable",
            CoreError::NftInstanceNotFound { .. } => "nft_instance_not_found",
            CoreError::NotNftOwner { .. } => "not_nft_owner",
            CoreError::BridgeJobNotFound { .. } => "bridge_job_not_found",
            CoreError::BridgeJobNotPending { .. } => "bridge_job_not_pending",
            CoreError::MathOverflow { .. } => "math_overflow",
            CoreError::InvalidConfig { .. } => "invalid_config",
            CoreError::UnknownTxKind { .. } => "unknown_tx_kind",
            CoreError::Other(_) => "other",
        }
    }
}

/// Ensure a condition is true, otherwise return early with the given error,
/// for terse validation-guard code.
#[macro_export]
macro_rules! core_ensure {
    ($val:expr, $err:expr) => {
        if !$val {
            return Err($err);
        }
    };
}
