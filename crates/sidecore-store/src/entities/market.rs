use serde::{Deserialize, Serialize};
use sidecore_types::Amount;

use crate::collection::Document;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PairStatus {
    Trading,
    Halted,
}

/// `TradingPair` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingPair {
    pub pair_id: String,
    pub base_asset_symbol: String,
    pub quote_asset_symbol: String,
    pub tick_size: Amount,
    pub lot_size: Amount,
    pub min_notional: Amount,
    pub min_trade_amount: Amount,
    pub max_trade_amount: Amount,
    pub status: PairStatus,
}

impl Document for TradingPair {
    fn key(&self) -> String {
        self.pair_id.clone()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_restable(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good 'til cancelled.
    Gtc,
    /// Immediate or cancel: any unfilled remainder is rejected rather than resting.
    Ioc,
    /// Good 'til time: `expires_at_ms` must be set.
    Gtt,
}

/// `Order` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub pair_id: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub kind: OrderType,
    pub price: Option<Amount>,
    pub quantity: Amount,
    pub filled_quantity: Amount,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub expires_at_ms: Option<i64>,
    pub quote_order_qty: Option<Amount>,
    pub average_fill_price: Option<Amount>,
    pub cumulative_quote_value: Option<Amount>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document for Order {
    fn key(&self) -> String {
        self.order_id.clone()
    }
}

impl Order {
    pub fn remaining(&self) -> Amount {
        self.quantity.checked_sub(&self.filled_quantity)
    }
}

/// `Trade` (§3). Immutable once written.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSource {
    Book,
    Pool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub trade_id: String,
    pub pair_id: String,
    pub base_symbol: String,
    pub quote_symbol: String,
    pub maker_order_id: Option<String>,
    pub taker_order_id: Option<String>,
    pub buyer_user_id: String,
    pub seller_user_id: String,
    pub price: Amount,
    pub quantity: Amount,
    pub total: Amount,
    pub timestamp: i64,
    pub is_maker_buyer: bool,
    pub source: TradeSource,
    pub had_settlement_errors: bool,
}

impl Document for Trade {
    fn key(&self) -> String {
        self.trade_id.clone()
    }
}
