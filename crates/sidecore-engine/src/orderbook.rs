//! In-memory order book per trading pair (C4): price/time priority matching
//! with lazy reconstruction from the store (done by `matching.rs`, C5).

use sidecore_types::{deterministic_id, Amount};
use sidecore_store::{OrderStatus, OrderType, Side};

/// A resting (LIMIT, `OPEN`/`PARTIALLY_FILLED`) order on one side of the book.
#[derive(Clone, Debug)]
pub struct RestingOrder {
    pub order_id: String,
    pub user_id: String,
    pub price: Amount,
    pub remaining: Amount,
    pub created_at_ms: i64,
}

/// A taker order being matched against the book. `kind`/`price`/`intent`
/// mirror the `Order` entity's fields for the incoming order.
#[derive(Clone, Debug)]
pub struct TakerOrder {
    pub order_id: String,
    pub user_id: String,
    pub side: Side,
    pub kind: OrderType,
    /// `Some` only for LIMIT orders; a crossing check stops the match loop
    /// once the opposite side's best price no longer crosses this price.
    pub price: Option<Amount>,
    pub intent: TakerIntent,
}

/// What the taker is trying to fill: an exact base quantity, or (MARKET BUY
/// only) a quote-currency budget to spend (`quoteOrderQty`, §3/§4.5).
#[derive(Clone, Debug)]
pub enum TakerIntent {
    BaseQuantity(Amount),
    QuoteBudget(Amount),
}

/// One match between the taker and a single resting maker order.
#[derive(Clone, Debug)]
pub struct BookFill {
    pub trade_id: String,
    pub maker_order_id: String,
    pub maker_user_id: String,
    pub price: Amount,
    pub quantity: Amount,
    /// The maker's remaining quantity has reached zero and is removed from the book.
    pub maker_fully_consumed: bool,
}

/// Terminal disposition computed for the taker once matching stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TakerOutcome {
    /// LIMIT order with a remainder: return it to the caller to be rested.
    RestRemainder,
    /// MARKET order, fully filled or partially filled with at least one fill.
    PartiallyOrFullyFilled,
    /// MARKET order with zero fills at all: reject.
    RejectedNoFills,
    /// Taker fully consumed by the match loop.
    Filled,
}

pub struct MatchOutcome {
    pub fills: Vec<BookFill>,
    pub filled_base: Amount,
    pub filled_quote: Amount,
    pub remaining_base: Amount,
    pub outcome: TakerOutcome,
}

#[derive(Default)]
pub struct OrderBook {
    pair_id: String,
    /// Sorted descending by price, then ascending by creation time.
    bids: Vec<RestingOrder>,
    /// Sorted ascending by price, then ascending by creation time.
    asks: Vec<RestingOrder>,
}

impl OrderBook {
    pub fn new(pair_id: impl Into<String>) -> Self {
        Self { pair_id: pair_id.into(), bids: Vec::new(), asks: Vec::new() }
    }

    pub fn pair_id(&self) -> &str {
        &self.pair_id
    }

    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// `addOrder(LIMIT order)`: insert preserving the side's sort order.
    pub fn add_order(&mut self, side: Side, order: RestingOrder) {
        let side_vec = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let pos = match side {
            Side::Buy => side_vec.partition_point(|o| {
                o.price > order.price || (o.price == order.price && o.created_at_ms <= order.created_at_ms)
            }),
            Side::Sell => side_vec.partition_point(|o| {
                o.price < order.price || (o.price == order.price && o.created_at_ms <= order.created_at_ms)
            }),
        };
        side_vec.insert(pos, order);
    }

    /// `removeOrder(orderId)`: remove by scan across both sides.
    pub fn remove_order(&mut self, order_id: &str) -> bool {
        let before_bids = self.bids.len();
        self.bids.retain(|o| o.order_id != order_id);
        if self.bids.len() != before_bids {
            return true;
        }
        let before_asks = self.asks.len();
        self.asks.retain(|o| o.order_id != order_id);
        self.asks.len() != before_asks
    }

    /// Best bid/ask, for quoting (used by the liquidity aggregator, C7).
    pub fn best_bid(&self) -> Option<&RestingOrder> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&RestingOrder> {
        self.asks.first()
    }

    pub fn depth_at_best(&self, side: Side) -> Amount {
        match side {
            Side::Buy => self.bids.first().map(|o| o.remaining.clone()).unwrap_or_else(Amount::zero),
            Side::Sell => self.asks.first().map(|o| o.remaining.clone()).unwrap_or_else(Amount::zero),
        }
    }

    /// `matchOrder(taker)` (§4.4): iterate the opposite side top-down,
    /// stopping when the taker's limit price no longer crosses (LIMIT only —
    /// MARKET orders always cross until liquidity or intent is exhausted).
    pub fn match_order(&mut self, taker: &TakerOrder) -> MatchOutcome {
        let opposite = match taker.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        let mut fills = Vec::new();
        let mut filled_base = Amount::zero();
        let mut filled_quote = Amount::zero();
        let mut remaining_base = match &taker.intent {
            TakerIntent::BaseQuantity(q) => q.clone(),
            TakerIntent::QuoteBudget(_) => Amount::zero(),
        };
        let mut remaining_quote = match &taker.intent {
            TakerIntent::QuoteBudget(q) => q.clone(),
            TakerIntent::BaseQuantity(_) => Amount::zero(),
        };
        let by_quote = matches!(taker.intent, TakerIntent::QuoteBudget(_));

        let mut fully_consumed_ids = Vec::new();

        for maker in opposite.iter_mut() {
            if by_quote {
                if remaining_quote.is_zero() || remaining_quote.is_negative() {
                    break;
                }
            } else if remaining_base.is_zero() || remaining_base.is_negative() {
                break;
            }

            if let Some(limit_price) = &taker.price {
                let crosses = match taker.side {
                    Side::Buy => limit_price >= &maker.price,
                    Side::Sell => limit_price <= &maker.price,
                };
                if !crosses {
                    break;
                }
            }

            let q = if by_quote {
                // q = min(maker.remaining, remaining_quote / maker.price)
                let affordable = remaining_quote.checked_div(&maker.price).unwrap_or_else(Amount::zero);
                maker.remaining.clone().min(affordable)
            } else {
                maker.remaining.clone().min(remaining_base.clone())
            };

            if q.is_zero() {
                // remaining quote budget can't afford even the smallest unit at this price
                break;
            }

            let trade_total = maker.price.checked_mul(&q);

            let trade_id = deterministic_id(&[
                &self.pair_id,
                &maker.order_id,
                &taker.order_id,
                &q.to_string(),
                &maker.price.to_string(),
            ]);

            maker.remaining = maker.remaining.checked_sub(&q);
            let maker_fully_consumed = maker.remaining.is_zero();
            if maker_fully_consumed {
                fully_consumed_ids.push(maker.order_id.clone());
            }

            fills.push(BookFill {
                trade_id,
                maker_order_id: maker.order_id.clone(),
                maker_user_id: maker.user_id.clone(),
                price: maker.price.clone(),
                quantity: q.clone(),
                maker_fully_consumed,
            });

            filled_base = filled_base.checked_add(&q);
            filled_quote = filled_quote.checked_add(&trade_total);
            if by_quote {
                remaining_quote = remaining_quote.checked_sub(&trade_total);
            } else {
                remaining_base = remaining_base.checked_sub(&q);
            }
        }

        for id in &fully_consumed_ids {
            opposite.retain(|o| &o.order_id != id);
        }

        let remaining_base_out = if by_quote { Amount::zero() } else { remaining_base.clone() };

        let outcome = match (taker.kind, by_quote) {
            (OrderType::Limit, _) => {
                if remaining_base_out.is_zero() {
                    TakerOutcome::Filled
                } else {
                    TakerOutcome::RestRemainder
                }
            }
            (OrderType::Market, true) => {
                if fills.is_empty() {
                    TakerOutcome::RejectedNoFills
                } else {
                    TakerOutcome::PartiallyOrFullyFilled
                }
            }
            (OrderType::Market, false) => {
                if fills.is_empty() {
                    TakerOutcome::RejectedNoFills
                } else if remaining_base.is_zero() {
                    TakerOutcome::Filled
                } else {
                    TakerOutcome::PartiallyOrFullyFilled
                }
            }
        };

        MatchOutcome { fills, filled_base, filled_quote, remaining_base: remaining_base_out, outcome }
    }

    /// `snapshot(depth)`: aggregate remaining quantity per price level.
    pub fn snapshot(&self, depth: usize) -> (Vec<(Amount, Amount)>, Vec<(Amount, Amount)>) {
        (aggregate_levels(&self.bids, depth), aggregate_levels(&self.asks, depth))
    }

    /// P5: no crossed book at rest.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.first(), self.asks.first()) {
            (Some(b), Some(a)) => b.price >= a.price,
            _ => false,
        }
    }

    pub fn status_of(&self, _order_id: &str) -> Option<OrderStatus> {
        None // presence/absence in the book doesn't carry status; the store is authoritative.
    }
}

fn aggregate_levels(orders: &[RestingOrder], depth: usize) -> Vec<(Amount, Amount)> {
    let mut levels: Vec<(Amount, Amount)> = Vec::new();
    for o in orders {
        match levels.last_mut() {
            Some((price, qty)) if *price == o.price => {
                *qty = qty.checked_add(&o.remaining);
            }
            _ => levels.push((o.price.clone(), o.remaining.clone())),
        }
        if levels.len() > depth {
            levels.truncate(depth);
        }
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resting(id: &str, user: &str, price: i128, qty: i128, t: i64) -> RestingOrder {
        RestingOrder {
            order_id: id.into(),
            user_id: user.into(),
            price: Amount::from_i128(price),
            remaining: Amount::from_i128(qty),
            created_at_ms: t,
        }
    }

    #[test]
    fn book_ordering_bids_desc_asks_asc() {
        let mut book = OrderBook::new("MRY_TESTS");
        book.add_order(Side::Buy, resting("b1", "u1", 10, 5, 1));
        book.add_order(Side::Buy, resting("b2", "u1", 12, 5, 2));
        book.add_order(Side::Buy, resting("b3", "u1", 12, 5, 1));
        assert_eq!(book.bids[0].order_id, "b3"); // price 12, earlier time
        assert_eq!(book.bids[1].order_id, "b2");
        assert_eq!(book.bids[2].order_id, "b1");
    }

    #[test]
    fn market_buy_matches_single_ask_partial() {
        // Scenario 4 (spec §8): ask 100 @ 10, market buy 40.
        let mut book = OrderBook::new("MRY_TESTS");
        book.add_order(Side::Sell, resting("ask1", "maker", 10, 100, 1));

        let taker = TakerOrder {
            order_id: "taker1".into(),
            user_id: "taker".into(),
            side: Side::Buy,
            kind: OrderType::Market,
            price: None,
            intent: TakerIntent::BaseQuantity(Amount::from_i128(40)),
        };
        let outcome = book.match_order(&taker);
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].quantity.to_string(), "40");
        assert_eq!(outcome.fills[0].price.to_string(), "10");
        assert_eq!(outcome.outcome, TakerOutcome::Filled);
        assert_eq!(book.asks[0].remaining.to_string(), "60");
    }

    #[test]
    fn limit_order_rests_remainder() {
        let mut book = OrderBook::new("MRY_TESTS");
        book.add_order(Side::Sell, resting("ask1", "maker", 10, 10, 1));
        let taker = TakerOrder {
            order_id: "taker1".into(),
            user_id: "taker".into(),
            side: Side::Buy,
            kind: OrderType::Limit,
            price: Some(Amount::from_i128(10)),
            intent: TakerIntent::BaseQuantity(Amount::from_i128(30)),
        };
        let outcome = book.match_order(&taker);
        assert_eq!(outcome.filled_base.to_string(), "10");
        assert_eq!(outcome.remaining_base.to_string(), "20");
        assert_eq!(outcome.outcome, TakerOutcome::RestRemainder);
    }

    #[test]
    fn market_order_never_crosses_past_liquidity_zero_fills_rejected() {
        let mut book = OrderBook::new("MRY_TESTS");
        let taker = TakerOrder {
            order_id: "taker1".into(),
            user_id: "taker".into(),
            side: Side::Buy,
            kind: OrderType::Market,
            price: None,
            intent: TakerIntent::BaseQuantity(Amount::from_i128(30)),
        };
        let outcome = book.match_order(&taker);
        assert_eq!(outcome.outcome, TakerOutcome::RejectedNoFills);
    }

    #[test]
    fn deterministic_trade_id_matches_spec_formula() {
        let mut book = OrderBook::new("P");
        book.add_order(Side::Sell, resting("mk", "maker", 10, 10, 1));
        let taker = TakerOrder {
            order_id: "tk".into(),
            user_id: "taker".into(),
            side: Side::Buy,
            kind: OrderType::Market,
            price: None,
            intent: TakerIntent::BaseQuantity(Amount::from_i128(10)),
        };
        let outcome = book.match_order(&taker);
        let expected = deterministic_id(&["P", "mk", "tk", "10", "10"]);
        assert_eq!(outcome.fills[0].trade_id, expected);
    }
}
