//! Matching engine (C5): owns one [`OrderBook`] per trading pair, lazily
//! reconstructed from resting orders in the store, and drives the order
//! lifecycle state machine (§4.5).

use std::collections::HashMap;

use serde_json::json;
use tokio::sync::Mutex;

use sidecore_store::{Order, OrderStatus, OrderType, PairStatus, Side, Store, TimeInForce, Trade, TradeSource, TradingPair};
use sidecore_types::{deterministic_id, Amount, CoreError};

use crate::event::EventSink;
use crate::ledger;
use crate::orderbook::{OrderBook, RestingOrder, TakerIntent, TakerOrder, TakerOutcome};

/// Request to place an order, independent of persistence shape.
pub struct PlaceOrderRequest {
    pub order_id: String,
    pub user_id: String,
    pub pair_id: String,
    pub side: Side,
    pub kind: OrderType,
    pub price: Option<Amount>,
    pub quantity: Option<Amount>,
    pub quote_order_qty: Option<Amount>,
    pub time_in_force: TimeInForce,
    pub expires_at_ms: Option<i64>,
}

pub struct MatchingEngine {
    books: Mutex<HashMap<String, OrderBook>>,
}

/// Startup progress summary returned by [`MatchingEngine::warmup`], for the
/// hosting process to log ("rebuilt N books from M resting orders").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarmupSummary {
    pub pairs_loaded: usize,
    pub orders_replayed: usize,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self { books: Mutex::new(HashMap::new()) }
    }

    /// Rebuilds every `TRADING` pair's book from persisted `OPEN`/`PARTIALLY_FILLED`
    /// LIMIT orders. Run once at process startup.
    pub async fn warmup(&self, store: &Store) -> WarmupSummary {
        let pairs = store.pairs.find(|p| matches!(p.status, PairStatus::Trading)).await;
        let mut summary = WarmupSummary::default();
        for pair in pairs {
            summary.orders_replayed += self.rebuild_book(store, &pair.pair_id).await;
            summary.pairs_loaded += 1;
        }
        summary
    }

    async fn rebuild_book(&self, store: &Store, pair_id: &str) -> usize {
        let mut books = self.books.lock().await;
        let mut book = OrderBook::new(pair_id);
        let resting = store
            .orders
            .find(|o| {
                o.pair_id == pair_id
                    && o.kind == OrderType::Limit
                    && matches!(o.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
            })
            .await;
        let mut replayed = 0;
        for o in resting {
            if let Some(price) = &o.price {
                book.add_order(
                    o.side,
                    RestingOrder {
                        order_id: o.order_id.clone(),
                        user_id: o.user_id.clone(),
                        price: price.clone(),
                        remaining: o.remaining(),
                        created_at_ms: parse_created_at_ms(&o.created_at),
                    },
                );
                replayed += 1;
            }
        }
        books.insert(pair_id.to_owned(), book);
        replayed
    }

    async fn ensure_book(&self, store: &Store, pair_id: &str) -> bool {
        {
            let books = self.books.lock().await;
            if books.contains_key(pair_id) {
                return true;
            }
        }
        let exists = store.pairs.find_one(|p| p.pair_id == pair_id && matches!(p.status, PairStatus::Trading)).await.is_some();
        if exists {
            self.rebuild_book(store, pair_id).await;
        }
        exists
    }

    /// `addOrder(taker)` (§4.5).
    pub async fn add_order(
        &self,
        store: &Store,
        sink: &dyn EventSink,
        req: PlaceOrderRequest,
        now_ms: i64,
    ) -> Result<Order, CoreError> {
        let pair = store.pairs.find_one(|p| p.pair_id == req.pair_id).await;
        let Some(pair) = pair else {
            return Err(CoreError::PairNotFound { pair_id: req.pair_id.clone() });
        };
        if !matches!(pair.status, PairStatus::Trading) {
            let rejected = self.persist_rejected(store, &req, now_ms).await;
            return Ok(rejected);
        }

        if req.kind == OrderType::Limit {
            let price = req.price.clone().ok_or(CoreError::LimitRequiresPrice)?;
            if !price.is_positive() {
                return Err(CoreError::LimitRequiresPrice);
            }
            let quantity = req.quantity.clone().ok_or(CoreError::ZeroAmount)?;
            validate_tick_and_lot(&pair, &price, &quantity)?;
        }

        self.ensure_book(store, &req.pair_id).await;

        let quantity_known = req.quantity.clone();
        let price = req.price.clone();

        // Escrow whatever is known up front (§4.5's "refund escrow" cancel
        // logic only balances if the full exposure left the account when
        // the order was accepted, not spread across each later fill).
        let escrow = match (req.side, req.kind, &quantity_known, &req.quote_order_qty) {
            (Side::Buy, OrderType::Limit, Some(q), _) => Some((pair.quote_asset_symbol.clone(), price.clone().unwrap().checked_mul(q))),
            (Side::Sell, OrderType::Limit, Some(q), _) => Some((pair.base_asset_symbol.clone(), q.clone())),
            (Side::Buy, OrderType::Market, _, Some(qoq)) => Some((pair.quote_asset_symbol.clone(), qoq.clone())),
            (Side::Sell, OrderType::Market, Some(q), _) => Some((pair.base_asset_symbol.clone(), q.clone())),
            _ => None,
        };
        if let Some((symbol, amount)) = &escrow {
            ledger::adjust_balance(store, &req.user_id, symbol, &amount.neg()).await?;
        }

        let order = Order {
            order_id: req.order_id.clone(),
            user_id: req.user_id.clone(),
            pair_id: req.pair_id.clone(),
            side: req.side,
            kind: req.kind,
            price: price.clone(),
            quantity: quantity_known.clone().unwrap_or_else(Amount::zero),
            filled_quantity: Amount::zero(),
            status: OrderStatus::Open,
            time_in_force: req.time_in_force,
            expires_at_ms: req.expires_at_ms,
            quote_order_qty: req.quote_order_qty.clone(),
            average_fill_price: None,
            cumulative_quote_value: None,
            created_at: ms_to_iso(now_ms),
            updated_at: ms_to_iso(now_ms),
        };
        store.orders.insert_one(order.clone()).await.map_err(|e| CoreError::Other(e.to_string()))?;

        let intent = match (req.side, &quantity_known, &req.quote_order_qty) {
            (Side::Buy, None, Some(qoq)) => TakerIntent::QuoteBudget(qoq.clone()),
            (_, Some(q), _) => TakerIntent::BaseQuantity(q.clone()),
            _ => TakerIntent::BaseQuantity(Amount::zero()),
        };

        let taker = TakerOrder {
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            side: order.side,
            kind: order.kind,
            price: price.clone(),
            intent,
        };

        let outcome = {
            let mut books = self.books.lock().await;
            let book = books.get_mut(&req.pair_id).expect("book exists after ensure_book");
            book.match_order(&taker)
        };

        let mut filled_quantity = Amount::zero();
        let mut cumulative_quote_value = Amount::zero();
        let mut had_settlement_errors = false;

        for fill in &outcome.fills {
            let (buyer_user, seller_user) = match order.side {
                Side::Buy => (order.user_id.clone(), fill.maker_user_id.clone()),
                Side::Sell => (fill.maker_user_id.clone(), order.user_id.clone()),
            };
            let quote_amount = fill.price.checked_mul(&fill.quantity);

            // Credits: proceeds nobody pre-paid themselves.
            if ledger::adjust_balance(store, &buyer_user, &pair.base_asset_symbol, &fill.quantity).await.is_err() {
                had_settlement_errors = true;
            }
            if ledger::adjust_balance(store, &seller_user, &pair.quote_asset_symbol, &quote_amount).await.is_err() {
                had_settlement_errors = true;
            }

            // Debit: only the taker can owe a leg it hasn't already escrowed,
            // and only when that leg's amount wasn't knowable at placement
            // time (a MARKET order paying in the quantity dimension it did
            // not specify).
            let taker_owes_base_now = order.side == Side::Sell && order.kind == OrderType::Market && quantity_known.is_none();
            let taker_owes_quote_now = order.side == Side::Buy && order.kind == OrderType::Market && quantity_known.is_some() && req.quote_order_qty.is_none();
            if taker_owes_base_now
                && ledger::adjust_balance(store, &order.user_id, &pair.base_asset_symbol, &fill.quantity.neg()).await.is_err()
            {
                had_settlement_errors = true;
            }
            if taker_owes_quote_now
                && ledger::adjust_balance(store, &order.user_id, &pair.quote_asset_symbol, &quote_amount.neg()).await.is_err()
            {
                had_settlement_errors = true;
            }

            let trade = Trade {
                trade_id: fill.trade_id.clone(),
                pair_id: req.pair_id.clone(),
                base_symbol: pair.base_asset_symbol.clone(),
                quote_symbol: pair.quote_asset_symbol.clone(),
                maker_order_id: Some(fill.maker_order_id.clone()),
                taker_order_id: Some(order.order_id.clone()),
                buyer_user_id: buyer_user,
                seller_user_id: seller_user,
                price: fill.price.clone(),
                quantity: fill.quantity.clone(),
                total: quote_amount.clone(),
                timestamp: now_ms,
                is_maker_buyer: order.side == Side::Sell,
                source: TradeSource::Book,
                had_settlement_errors,
            };
            store.trades.insert_one(trade).await.ok();

            let maker_status = if fill.maker_fully_consumed { OrderStatus::Filled } else { OrderStatus::PartiallyFilled };
            store
                .orders
                .update_one(
                    |o| o.order_id == fill.maker_order_id,
                    |o| {
                        o.filled_quantity = o.filled_quantity.checked_add(&fill.quantity);
                        o.status = maker_status;
                        o.updated_at = ms_to_iso(now_ms);
                    },
                )
                .await;

            filled_quantity = filled_quantity.checked_add(&fill.quantity);
            cumulative_quote_value = cumulative_quote_value.checked_add(&quote_amount);

            sink.log_event(
                "market",
                "trade_executed",
                &order.user_id,
                json!({"tradeId": fill.trade_id, "pairId": req.pair_id, "price": fill.price.to_string(), "quantity": fill.quantity.to_string()}),
                None,
            )
            .await;
        }

        // Refund any unspent market pre-escrow: the amount known up front
        // minus whatever was actually consumed by fills.
        if order.kind == OrderType::Market {
            if let Some((symbol, escrowed)) = &escrow {
                let consumed = if order.side == Side::Buy { cumulative_quote_value.clone() } else { filled_quantity.clone() };
                let leftover = escrowed.checked_sub(&consumed);
                if leftover.is_positive() {
                    ledger::adjust_balance(store, &order.user_id, symbol, &leftover).await.ok();
                }
            }
        }

        let average_fill_price = if filled_quantity.is_positive() {
            Some(cumulative_quote_value.checked_div(&filled_quantity).unwrap_or_else(Amount::zero))
        } else {
            None
        };

        let new_status = match outcome.outcome {
            TakerOutcome::Filled => OrderStatus::Filled,
            TakerOutcome::RestRemainder => {
                if filled_quantity.is_positive() { OrderStatus::PartiallyFilled } else { OrderStatus::Open }
            }
            TakerOutcome::PartiallyOrFullyFilled => OrderStatus::PartiallyFilled,
            TakerOutcome::RejectedNoFills => OrderStatus::Rejected,
        };

        if new_status.is_restable() {
            if let Some(p) = &price {
                let mut books = self.books.lock().await;
                let book = books.get_mut(&req.pair_id).expect("book exists");
                book.add_order(
                    order.side,
                    RestingOrder {
                        order_id: order.order_id.clone(),
                        user_id: order.user_id.clone(),
                        price: p.clone(),
                        remaining: outcome.remaining_base.clone(),
                        created_at_ms: now_ms,
                    },
                );
            }
        }

        store
            .orders
            .update_one(
                |o| o.order_id == order.order_id,
                |o| {
                    o.filled_quantity = filled_quantity.clone();
                    o.status = new_status;
                    o.average_fill_price = average_fill_price.clone();
                    o.cumulative_quote_value = if filled_quantity.is_positive() { Some(cumulative_quote_value.clone()) } else { None };
                    o.updated_at = ms_to_iso(now_ms);
                },
            )
            .await;

        // MARKET order rejected with zero fills: nothing was pre-escrowed in
        // the base-quantity-buy case, but the quote/base cases above already
        // refund their full pre-escrow since `consumed` is zero.

        let mut final_order = order;
        final_order.filled_quantity = filled_quantity;
        final_order.status = new_status;
        final_order.average_fill_price = average_fill_price;
        final_order.cumulative_quote_value = if final_order.filled_quantity.is_positive() { Some(cumulative_quote_value) } else { None };
        Ok(final_order)
    }

    async fn persist_rejected(&self, store: &Store, req: &PlaceOrderRequest, now_ms: i64) -> Order {
        let order = Order {
            order_id: req.order_id.clone(),
            user_id: req.user_id.clone(),
            pair_id: req.pair_id.clone(),
            side: req.side,
            kind: req.kind,
            price: req.price.clone(),
            quantity: req.quantity.clone().unwrap_or_else(Amount::zero),
            filled_quantity: Amount::zero(),
            status: OrderStatus::Rejected,
            time_in_force: req.time_in_force,
            expires_at_ms: req.expires_at_ms,
            quote_order_qty: req.quote_order_qty.clone(),
            average_fill_price: None,
            cumulative_quote_value: None,
            created_at: ms_to_iso(now_ms),
            updated_at: ms_to_iso(now_ms),
        };
        store.orders.insert_one(order.clone()).await.ok();
        order
    }

    /// `cancelOrder(orderId, pairId, userId)` (§4.5). Idempotent on an
    /// already-terminal order.
    pub async fn cancel_order(
        &self,
        store: &Store,
        sink: &dyn EventSink,
        order_id: &str,
        pair_id: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<(), CoreError> {
        let order = store.orders.find_one(|o| o.order_id == order_id && o.pair_id == pair_id).await.ok_or_else(|| CoreError::OrderNotFound { order_id: order_id.to_owned() })?;
        if order.user_id != user_id {
            return Err(CoreError::NotOrderOwner { order_id: order_id.to_owned(), user: user_id.to_owned() });
        }
        if order.status.is_terminal() {
            return Ok(());
        }
        if !order.status.is_cancellable() {
            return Err(CoreError::OrderNotCancellable { order_id: order_id.to_owned() });
        }

        {
            let mut books = self.books.lock().await;
            if let Some(book) = books.get_mut(pair_id) {
                book.remove_order(order_id);
            }
        }

        let pair = store.pairs.find_one(|p| p.pair_id == pair_id).await.ok_or_else(|| CoreError::PairNotFound { pair_id: pair_id.to_owned() })?;
        let remaining = order.remaining();

        // Only LIMIT orders ever rest in OPEN/PARTIALLY_FILLED state, so `price`
        // is always set here; MARKET orders settle or reject within `add_order`
        // and never reach a cancellable status.
        let refund = match order.side {
            Side::Buy => {
                let price = order.price.clone().unwrap_or_else(Amount::zero);
                remaining.checked_mul(&price)
            }
            Side::Sell => remaining.clone(),
        };
        let refund_symbol = match order.side {
            Side::Buy => pair.quote_asset_symbol.clone(),
            Side::Sell => pair.base_asset_symbol.clone(),
        };
        if refund.is_positive() {
            ledger::adjust_balance(store, &order.user_id, &refund_symbol, &refund).await?;
        }

        store
            .orders
            .update_one(
                |o| o.order_id == order_id,
                |o| {
                    o.status = OrderStatus::Cancelled;
                    o.updated_at = ms_to_iso(now_ms);
                },
            )
            .await;

        sink.log_event("market", "order_cancelled", user_id, json!({"orderId": order_id, "pairId": pair_id}), None).await;
        Ok(())
    }

    /// Supplemental: sweep `OPEN`/`PARTIALLY_FILLED` `GTT` orders whose
    /// `expiresAtMs` has passed, removing them from the book and refunding
    /// escrow exactly as `cancelOrder` would. Not specified by name in the
    /// core design but implied by the `EXPIRED` state in the order lifecycle.
    pub async fn expire_due_orders(&self, store: &Store, sink: &dyn EventSink, now_ms: i64) -> usize {
        let due = store
            .orders
            .find(|o| {
                o.time_in_force == TimeInForce::Gtt
                    && o.status.is_cancellable()
                    && o.expires_at_ms.map(|e| e <= now_ms).unwrap_or(false)
            })
            .await;

        let mut expired = 0;
        for order in due {
            {
                let mut books = self.books.lock().await;
                if let Some(book) = books.get_mut(&order.pair_id) {
                    book.remove_order(&order.order_id);
                }
            }
            let Some(pair) = store.pairs.find_one(|p| p.pair_id == order.pair_id).await else { continue };
            let remaining = order.remaining();
            let (symbol, refund) = match order.side {
                Side::Buy => (pair.quote_asset_symbol.clone(), remaining.checked_mul(&order.price.clone().unwrap_or_else(Amount::zero))),
                Side::Sell => (pair.base_asset_symbol.clone(), remaining),
            };
            if refund.is_positive() {
                ledger::adjust_balance(store, &order.user_id, &symbol, &refund).await.ok();
            }
            store
                .orders
                .update_one(
                    |o| o.order_id == order.order_id,
                    |o| {
                        o.status = OrderStatus::Expired;
                        o.updated_at = ms_to_iso(now_ms);
                    },
                )
                .await;
            sink.log_event("market", "order_expired", &order.user_id, json!({"orderId": order.order_id}), None).await;
            expired += 1;
        }
        expired
    }

    /// Supplemental trading-pair registry ops (create/halt/resume), needed
    /// for any system that lets operators open new markets.
    pub async fn create_pair(&self, store: &Store, pair: TradingPair) -> Result<(), CoreError> {
        store.pairs.insert_one(pair).await.map_err(|e| CoreError::Other(e.to_string()))
    }

    pub async fn halt_pair(&self, store: &Store, pair_id: &str) -> Result<(), CoreError> {
        let updated = store.pairs.update_one(|p| p.pair_id == pair_id, |p| p.status = PairStatus::Halted).await;
        if updated {
            Ok(())
        } else {
            Err(CoreError::PairNotFound { pair_id: pair_id.to_owned() })
        }
    }

    pub async fn resume_pair(&self, store: &Store, pair_id: &str) -> Result<(), CoreError> {
        let updated = store.pairs.update_one(|p| p.pair_id == pair_id, |p| p.status = PairStatus::Trading).await;
        if updated {
            Ok(())
        } else {
            Err(CoreError::PairNotFound { pair_id: pair_id.to_owned() })
        }
    }

    pub async fn book_depth(&self, pair_id: &str) -> Option<(usize, usize)> {
        self.books.lock().await.get(pair_id).map(|b| b.depth())
    }

    /// Top-of-book snapshot used by the liquidity aggregator (C7):
    /// `(bestBid, bestAsk, bidDepth, askDepth)`.
    pub async fn top_of_book(&self, store: &Store, pair_id: &str) -> (Option<Amount>, Option<Amount>, Amount, Amount) {
        self.ensure_book(store, pair_id).await;
        let books = self.books.lock().await;
        match books.get(pair_id) {
            Some(book) => (
                book.best_bid().map(|o| o.price.clone()),
                book.best_ask().map(|o| o.price.clone()),
                book.depth_at_best(Side::Buy),
                book.depth_at_best(Side::Sell),
            ),
            None => (None, None, Amount::zero(), Amount::zero()),
        }
    }
}

pub(crate) fn validate_tick_and_lot(pair: &TradingPair, price: &Amount, quantity: &Amount) -> Result<(), CoreError> {
    if !pair.tick_size.is_zero() && !price.checked_rem(&pair.tick_size).map(|r| r.is_zero()).unwrap_or(false) {
        return Err(CoreError::TickMismatch { pair_id: pair.pair_id.clone(), price: price.to_string(), tick_size: pair.tick_size.to_string() });
    }
    if !pair.lot_size.is_zero() && !quantity.checked_rem(&pair.lot_size).map(|r| r.is_zero()).unwrap_or(false) {
        return Err(CoreError::LotMismatch { pair_id: pair.pair_id.clone(), quantity: quantity.to_string(), lot_size: pair.lot_size.to_string() });
    }
    let notional = price.checked_mul(quantity);
    if notional < pair.min_notional || *quantity < pair.min_trade_amount || *quantity > pair.max_trade_amount {
        return Err(CoreError::NotionalOutOfRange {
            pair_id: pair.pair_id.clone(),
            notional: notional.to_string(),
            min: pair.min_notional.to_string(),
            max: pair.max_trade_amount.to_string(),
        });
    }
    Ok(())
}

fn ms_to_iso(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

fn parse_created_at_ms(created_at: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(created_at).map(|dt| dt.timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecore_store::{Account, PairStatus, Store};
    use crate::event::NoopEventSink;

    async fn setup_pair(store: &Store) {
        store
            .accounts
            .insert_one(Account { name: "maker".into(), balances: Default::default() })
            .await
            .unwrap();
        store
            .accounts
            .insert_one(Account { name: "taker".into(), balances: Default::default() })
            .await
            .unwrap();
        ledger::adjust_balance(store, "maker", "MRY", &Amount::from_i128(1000)).await.unwrap();
        ledger::adjust_balance(store, "taker", "TESTS", &Amount::from_i128(10_000)).await.unwrap();
        store
            .pairs
            .insert_one(TradingPair {
                pair_id: "MRY_TESTS".into(),
                base_asset_symbol: "MRY".into(),
                quote_asset_symbol: "TESTS".into(),
                tick_size: Amount::from_i128(1),
                lot_size: Amount::from_i128(1),
                min_notional: Amount::from_i128(1),
                min_trade_amount: Amount::from_i128(1),
                max_trade_amount: Amount::from_i128(1_000_000),
                status: PairStatus::Trading,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scenario_order_book_match_spec_section_8_4() {
        let store = Store::new();
        setup_pair(&store).await;
        let engine = MatchingEngine::new();
        let sink = NoopEventSink;

        engine
            .add_order(
                &store,
                &sink,
                PlaceOrderRequest {
                    order_id: "ask1".into(),
                    user_id: "maker".into(),
                    pair_id: "MRY_TESTS".into(),
                    side: Side::Sell,
                    kind: OrderType::Limit,
                    price: Some(Amount::from_i128(10)),
                    quantity: Some(Amount::from_i128(100)),
                    quote_order_qty: None,
                    time_in_force: TimeInForce::Gtc,
                    expires_at_ms: None,
                },
                1,
            )
            .await
            .unwrap();

        let taker = engine
            .add_order(
                &store,
                &sink,
                PlaceOrderRequest {
                    order_id: "buy1".into(),
                    user_id: "taker".into(),
                    pair_id: "MRY_TESTS".into(),
                    side: Side::Buy,
                    kind: OrderType::Market,
                    price: None,
                    quantity: Some(Amount::from_i128(40)),
                    quote_order_qty: None,
                    time_in_force: TimeInForce::Ioc,
                    expires_at_ms: None,
                },
                2,
            )
            .await
            .unwrap();

        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(taker.filled_quantity.to_string(), "40");

        let maker = store.orders.find_one(|o| o.order_id == "ask1").await.unwrap();
        assert_eq!(maker.status, OrderStatus::PartiallyFilled);
        assert_eq!(maker.filled_quantity.to_string(), "40");

        assert_eq!(ledger::balance_of(&store, "maker", "TESTS").await.to_string(), "400");
        assert_eq!(ledger::balance_of(&store, "taker", "MRY").await.to_string(), "40");
    }

    #[tokio::test]
    async fn scenario_cancel_partially_filled_buy_refunds_remainder_spec_section_8_6() {
        let store = Store::new();
        setup_pair(&store).await;
        let engine = MatchingEngine::new();
        let sink = NoopEventSink;

        ledger::adjust_balance(&store, "buyer", "TESTS", &Amount::from_i128(1_000)).await.unwrap();
        store.accounts.insert_one(Account::new("seller")).await.ok();

        engine
            .add_order(
                &store,
                &sink,
                PlaceOrderRequest {
                    order_id: "buy1".into(),
                    user_id: "buyer".into(),
                    pair_id: "MRY_TESTS".into(),
                    side: Side::Buy,
                    kind: OrderType::Limit,
                    price: Some(Amount::from_i128(10)),
                    quantity: Some(Amount::from_i128(100)),
                    quote_order_qty: None,
                    time_in_force: TimeInForce::Gtc,
                    expires_at_ms: None,
                },
                1,
            )
            .await
            .unwrap();
        // 100*10 = 1000 escrowed; buyer balance now 0
        assert_eq!(ledger::balance_of(&store, "buyer", "TESTS").await.to_string(), "0");

        ledger::adjust_balance(&store, "seller", "MRY", &Amount::from_i128(30)).await.unwrap();
        engine
            .add_order(
                &store,
                &sink,
                PlaceOrderRequest {
                    order_id: "sell1".into(),
                    user_id: "seller".into(),
                    pair_id: "MRY_TESTS".into(),
                    side: Side::Sell,
                    kind: OrderType::Limit,
                    price: Some(Amount::from_i128(10)),
                    quantity: Some(Amount::from_i128(30)),
                    quote_order_qty: None,
                    time_in_force: TimeInForce::Gtc,
                    expires_at_ms: None,
                },
                2,
            )
            .await
            .unwrap();

        let buy_order = store.orders.find_one(|o| o.order_id == "buy1").await.unwrap();
        assert_eq!(buy_order.status, OrderStatus::PartiallyFilled);
        assert_eq!(buy_order.filled_quantity.to_string(), "30");

        engine.cancel_order(&store, &sink, "buy1", "MRY_TESTS", "buyer", 3).await.unwrap();
        // remaining (100-30)*10 = 700 refunded
        assert_eq!(ledger::balance_of(&store, "buyer", "TESTS").await.to_string(), "700");
        let cancelled = store.orders.find_one(|o| o.order_id == "buy1").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn warmup_replays_resting_orders_from_a_fresh_engine() {
        let store = Store::new();
        setup_pair(&store).await;
        let engine = MatchingEngine::new();
        let sink = NoopEventSink;

        for (order_id, side, price) in [("ask1", Side::Sell, 10), ("ask2", Side::Sell, 11)] {
            engine
                .add_order(
                    &store,
                    &sink,
                    PlaceOrderRequest {
                        order_id: order_id.into(),
                        user_id: "maker".into(),
                        pair_id: "MRY_TESTS".into(),
                        side,
                        kind: OrderType::Limit,
                        price: Some(Amount::from_i128(price)),
                        quantity: Some(Amount::from_i128(10)),
                        quote_order_qty: None,
                        time_in_force: TimeInForce::Gtc,
                        expires_at_ms: None,
                    },
                    1,
                )
                .await
                .unwrap();
        }

        // Simulate a process restart: the two resting asks above live only in
        // the store, a brand new engine has no in-memory books yet.
        let restarted = MatchingEngine::new();
        let summary = restarted.warmup(&store).await;
        assert_eq!(summary.pairs_loaded, 1);
        assert_eq!(summary.orders_replayed, 2);

        // The rebuilt book actually serves the replayed resting orders.
        let taker = restarted
            .add_order(
                &store,
                &sink,
                PlaceOrderRequest {
                    order_id: "buy1".into(),
                    user_id: "taker".into(),
                    pair_id: "MRY_TESTS".into(),
                    side: Side::Buy,
                    kind: OrderType::Market,
                    price: None,
                    quantity: Some(Amount::from_i128(10)),
                    quote_order_qty: None,
                    time_in_force: TimeInForce::Ioc,
                    expires_at_ms: None,
                },
                2,
            )
            .await
            .unwrap();
        assert_eq!(taker.status, OrderStatus::Filled);
    }
}
