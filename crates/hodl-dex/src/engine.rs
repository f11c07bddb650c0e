//! Order placement, the match loop, settlement, stop triggers, and swaps.
//!
//! All fund movements go through the DEX module account: placement escrows
//! the taker's funds, each fill pays out of escrow, and terminal states
//! refund the remainder. Handlers rely on the pipeline's cache rollback for
//! atomicity — any error aborts the whole message with no state change.

use hodl_bank::module_account;
use hodl_core::coin::Coin;
use hodl_core::constants::{MODULE_DEX, MODULE_FEE_COLLECTOR};
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::msg::{OrderType, Side, Tif};
use hodl_core::params::DexParams;
use hodl_core::types::{Address, Amount, Height, Timestamp};
use hodl_store::{next_id, set_typed, Store};
use tracing::{debug, info};

use crate::book;
use crate::stats;
use crate::types::{Market, Order, OrderStatus, Trade};
use crate::{expiry_key, order_key, trade_key, Dex, ORDER_ID_COUNTER, TRADE_ID_COUNTER};

/// What a match loop did for the taker.
#[derive(Default, Debug)]
pub struct MatchOutcome {
    pub base_filled: Amount,
    pub quote_spent: Amount,
    pub quote_received: Amount,
    /// Set when matching stopped because the resting best order shares the
    /// taker's owner; the taker's remainder is cancelled.
    pub self_trade_with: Option<u64>,
}

impl Dex {
    // ── Placement ────────────────────────────────────────────────────────────

    /// Validate, escrow, and run an incoming order. Returns the order id.
    #[allow(clippy::too_many_arguments)]
    pub fn place_order<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &DexParams,
        owner: &Address,
        market_symbol: &str,
        side: Side,
        order_type: OrderType,
        tif: Tif,
        qty: Amount,
        price: Option<Amount>,
        stop_price: Option<Amount>,
        expires_at: Option<Height>,
        max_slippage_bps: Option<u64>,
        height: Height,
        ts: Timestamp,
    ) -> Result<u64, Error> {
        let mut market = self
            .market(store, market_symbol)?
            .ok_or_else(|| Error::MarketNotFound(market_symbol.to_string()))?;
        if !market.is_active(height) {
            return Err(Error::MarketHalted(market_symbol.to_string()));
        }

        // ── Size and price validation ────────────────────────────────────────
        if qty % market.lot_size != 0 {
            return Err(Error::InvalidLot { qty, lot: market.lot_size });
        }
        if qty < market.min_order_size {
            return Err(Error::OrderBelowMinSize { qty, min: market.min_order_size });
        }
        if qty > market.max_order_size {
            return Err(Error::OrderAboveMaxSize { qty, max: market.max_order_size });
        }
        for p in [price, stop_price].into_iter().flatten() {
            if p % market.tick_size != 0 {
                return Err(Error::InvalidTick { price: p, tick: market.tick_size });
            }
        }
        let expires_at = match (tif, expires_at) {
            (Tif::Gtd, Some(h)) => {
                if h <= height {
                    return Err(Error::ExpiryInPast { expires_at: h, now: height });
                }
                Some(h)
            }
            (Tif::Gtd, None) => {
                return Err(Error::Decode("GTD orders require expires_at".into()))
            }
            (Tif::Gtc, _) => Some(height + params.gtc_expiry_blocks),
            _ => None,
        };

        // ── Escrow ───────────────────────────────────────────────────────────
        let (locked, price_bound) =
            self.lock_for(store, &market, side, order_type, qty, price, stop_price, max_slippage_bps)?;
        self.bank
            .transfer(store, owner, &module_account(MODULE_DEX), &locked)?;

        let id = next_id(store, ORDER_ID_COUNTER)?;
        let mut order = Order {
            id,
            market: market_symbol.to_string(),
            owner: *owner,
            side,
            order_type,
            tif,
            qty,
            filled: 0,
            price,
            stop_price,
            price_bound,
            expires_at,
            status: OrderStatus::Open,
            locked,
            created_at: height,
        };

        // Stop orders wait in the trigger index, off the book. They still
        // expire through the height index like resting orders.
        if matches!(order_type, OrderType::Stop | OrderType::StopLimit) {
            let trigger = stop_price.expect("validated above");
            set_typed(store, &book::stop_key(market_symbol, side, trigger, id), &())?;
            if let Some(exp) = order.expires_at {
                set_typed(store, &expiry_key(exp, id), &())?;
            }
            self.save_order(store, &order)?;
            events.emit(
                Event::new("dex", "stop_order_placed")
                    .attr("order_id", id)
                    .attr("market", market_symbol)
                    .attr("stop_price", trigger),
            );
            return Ok(id);
        }

        // FOK: verify the whole quantity can cross before touching the book.
        if tif == Tif::Fok && !self.fok_fillable(store, &market, &order) {
            return Err(Error::CannotFillOrKill);
        }

        let outcome = self.run_taker(store, events, params, &mut market, &mut order, height, ts)?;
        self.finish_taker(store, events, &market, order, outcome.self_trade_with.is_some())?;
        self.save_market(store, &market)?;
        Ok(id)
    }

    /// Funds to escrow for an order, plus the match-loop price bound for
    /// orders without a limit. Buys lock quote at the reference price (limit,
    /// stop trigger, or slippage-capped best ask) plus a fee buffer at the
    /// larger of the market's fee rates; sells lock the base quantity.
    #[allow(clippy::too_many_arguments)]
    fn lock_for<S: Store>(
        &self,
        store: &S,
        market: &Market,
        side: Side,
        order_type: OrderType,
        qty: Amount,
        price: Option<Amount>,
        stop_price: Option<Amount>,
        max_slippage_bps: Option<u64>,
    ) -> Result<(Coin, Option<Amount>), Error> {
        match side {
            Side::Sell => Ok((Coin::new(market.base_denom.clone(), qty), None)),
            Side::Buy => {
                let ref_price = match (price, order_type) {
                    (Some(p), _) => p,
                    (None, OrderType::Stop) => stop_price.ok_or(Error::StopPriceRequired)?,
                    (None, _) => {
                        // Market buy: best-ask estimate bounded by the
                        // caller's slippage cap.
                        let slip = max_slippage_bps.ok_or(Error::Slippage { min_out: 0, got: 0 })?;
                        let (best_ask, _) = book::best(store, &market.symbol, Side::Sell)
                            .ok_or_else(|| Error::NoLiquidity(market.symbol.clone()))?;
                        best_ask
                            .checked_add(best_ask * slip as u128 / 10_000)
                            .ok_or(Error::Overflow)?
                    }
                };
                let notional = market.notional(qty, ref_price)?;
                let fee_rate = market.taker_fee.max(market.maker_fee);
                let buffer = fee_rate.mul_amount_ceil(notional)?;
                let bound = if price.is_none() { Some(ref_price) } else { None };
                Ok((
                    Coin::new(
                        market.quote_denom.clone(),
                        notional.checked_add(buffer).ok_or(Error::Overflow)?,
                    ),
                    bound,
                ))
            }
        }
    }

    /// Can the full FOK quantity cross at acceptable prices right now?
    fn fok_fillable<S: Store>(&self, store: &S, market: &Market, taker: &Order) -> bool {
        let mut needed = taker.qty;
        for (price, id) in book::walk(store, &market.symbol, taker.side.opposite(), 10_000) {
            let acceptable = match (taker.side, taker.match_limit()) {
                (Side::Buy, Some(limit)) => price <= limit,
                (Side::Sell, Some(limit)) => price >= limit,
                (_, None) => true,
            };
            if !acceptable {
                break;
            }
            let Ok(Some(maker)) = self.order(store, id) else {
                continue;
            };
            // A resting own order would stop the match loop; the full
            // quantity cannot fill without a self-trade.
            if maker.owner == taker.owner {
                return false;
            }
            needed = needed.saturating_sub(maker.remaining());
            if needed == 0 {
                return true;
            }
        }
        false
    }

    // ── Match loop ───────────────────────────────────────────────────────────

    /// Match the taker against the opposite side under strict price-time
    /// priority. Trades execute at the maker's price (price improvement goes
    /// to the taker). After the loop, any stops triggered by the new last
    /// price convert and run in the same transaction.
    pub(crate) fn run_taker<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &DexParams,
        market: &mut Market,
        taker: &mut Order,
        height: Height,
        ts: Timestamp,
    ) -> Result<MatchOutcome, Error> {
        let mut outcome = MatchOutcome::default();

        while taker.remaining() > 0 {
            let Some((maker_price, maker_id)) = book::best(store, &market.symbol, taker.side.opposite())
            else {
                break;
            };
            let crosses = match (taker.side, taker.match_limit()) {
                (Side::Buy, Some(limit)) => maker_price <= limit,
                (Side::Sell, Some(limit)) => maker_price >= limit,
                (_, None) => true,
            };
            if !crosses {
                break;
            }

            let mut maker = self
                .order(store, maker_id)?
                .ok_or_else(|| Error::Invariant(format!("book references missing order {maker_id}")))?;

            // Self-trade prevention: cancel the newer order (the taker).
            if maker.owner == taker.owner {
                outcome.self_trade_with = Some(maker_id);
                events.emit(
                    Event::new("dex", "self_trade_prevented")
                        .attr("taker_order_id", taker.id)
                        .attr("maker_order_id", maker_id)
                        .attr("code", Error::SelfTradePrevented(maker_id).code()),
                );
                break;
            }

            let fill = taker.remaining().min(maker.remaining());
            let quote = market.notional(fill, maker_price)?;
            let taker_fee = market.taker_fee.mul_amount_floor(quote)?;
            let maker_fee = market.maker_fee.mul_amount_floor(quote)?;

            self.settle(
                store, market, taker, &mut maker, fill, quote, taker_fee, maker_fee,
            )?;

            taker.filled += fill;
            maker.filled += fill;
            outcome.base_filled += fill;
            match taker.side {
                Side::Buy => {
                    outcome.quote_spent += quote + taker_fee;
                }
                Side::Sell => {
                    outcome.quote_received += quote - taker_fee;
                }
            }

            // Maker leaves the book when exhausted; leftover escrow refunds.
            if maker.remaining() == 0 {
                store.delete(&book::book_key(&market.symbol, maker.side, maker_price, maker.id));
                maker.status = OrderStatus::Filled;
                self.refund(store, &mut maker)?;
            } else {
                maker.status = OrderStatus::Partial;
            }
            self.save_order(store, &maker)?;

            let trade_id = next_id(store, TRADE_ID_COUNTER)?;
            let trade = Trade {
                id: trade_id,
                market: market.symbol.clone(),
                taker_order_id: taker.id,
                maker_order_id: maker.id,
                price: maker_price,
                qty: fill,
                taker_fee,
                maker_fee,
                height,
                ts,
            };
            set_typed(store, &trade_key(&market.symbol, trade_id), &trade)?;
            market.last_price = maker_price;
            stats::record_trade(store, market, &trade)?;

            events.emit(
                Event::new("dex", "trade")
                    .attr("market", &market.symbol)
                    .attr("trade_id", trade_id)
                    .attr("price", maker_price)
                    .attr("qty", fill)
                    .attr("taker_order_id", taker.id)
                    .attr("maker_order_id", maker.id),
            );
            debug!(market = %market.symbol, trade_id, price = maker_price, qty = fill, "trade");
        }

        if outcome.base_filled > 0 {
            stats::check_circuit_breaker(store, events, params, market, height)?;
            self.trigger_stops(store, events, params, market, height, ts)?;
        }
        Ok(outcome)
    }

    /// One fill's fund movements out of the DEX escrow.
    #[allow(clippy::too_many_arguments)]
    fn settle<S: Store>(
        &self,
        store: &mut S,
        market: &Market,
        taker: &mut Order,
        maker: &mut Order,
        fill: Amount,
        quote: Amount,
        taker_fee: Amount,
        maker_fee: Amount,
    ) -> Result<(), Error> {
        let dex = module_account(MODULE_DEX);
        let fees = module_account(MODULE_FEE_COLLECTOR);
        let (buyer, seller, buyer_is_taker) = match taker.side {
            Side::Buy => (&mut *taker, &mut *maker, true),
            Side::Sell => (&mut *maker, &mut *taker, false),
        };

        // Base to the buyer, quote to the seller, fees to the collector.
        self.bank
            .transfer(store, &dex, &buyer.owner, &Coin::new(market.base_denom.clone(), fill))?;
        let (buyer_fee, seller_fee) = if buyer_is_taker {
            (taker_fee, maker_fee)
        } else {
            (maker_fee, taker_fee)
        };
        self.bank.transfer(
            store,
            &dex,
            &seller.owner,
            &Coin::new(market.quote_denom.clone(), quote - seller_fee),
        )?;
        if buyer_fee + seller_fee > 0 {
            self.bank.transfer(
                store,
                &dex,
                &fees,
                &Coin::new(market.quote_denom.clone(), buyer_fee + seller_fee),
            )?;
        }

        // Escrow bookkeeping. A shortfall here is a locking bug, not a user
        // error.
        let buyer_consumed = quote.checked_add(buyer_fee).ok_or(Error::Overflow)?;
        buyer.locked.amount = buyer
            .locked
            .amount
            .checked_sub(buyer_consumed)
            .ok_or_else(|| Error::Invariant(format!("order {} escrow underflow", buyer.id)))?;
        seller.locked.amount = seller
            .locked
            .amount
            .checked_sub(fill)
            .ok_or_else(|| Error::Invariant(format!("order {} escrow underflow", seller.id)))?;
        Ok(())
    }

    /// Finish an incoming taker after its match loop: rest, cancel, or fill.
    /// `force_cancel` is set when self-trade prevention stopped the loop.
    pub(crate) fn finish_taker<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        market: &Market,
        mut order: Order,
        force_cancel: bool,
    ) -> Result<(), Error> {
        if order.remaining() == 0 {
            order.status = OrderStatus::Filled;
            self.refund(store, &mut order)?;
            self.save_order(store, &order)?;
            events.emit(
                Event::new("dex", "order_filled")
                    .attr("order_id", order.id)
                    .attr("market", &market.symbol),
            );
            return Ok(());
        }

        let cancel_remainder =
            force_cancel || matches!(order.tif, Tif::Ioc) || order.price.is_none();
        if cancel_remainder {
            order.status = OrderStatus::Cancelled;
            self.refund(store, &mut order)?;
            self.save_order(store, &order)?;
            events.emit(
                Event::new("dex", "order_cancelled")
                    .attr("order_id", order.id)
                    .attr("filled", order.filled),
            );
            return Ok(());
        }

        // GTC / GTD remainder rests at its price level (FIFO tail by id).
        let price = order.price.expect("limit order");
        set_typed(store, &book::book_key(&market.symbol, order.side, price, order.id), &())?;
        if let Some(exp) = order.expires_at {
            set_typed(store, &expiry_key(exp, order.id), &())?;
        }
        if order.filled > 0 {
            order.status = OrderStatus::Partial;
        }
        self.save_order(store, &order)?;
        events.emit(
            Event::new("dex", "order_rested")
                .attr("order_id", order.id)
                .attr("market", &market.symbol)
                .attr("price", price)
                .attr("remaining", order.remaining()),
        );
        info!(order_id = order.id, market = %market.symbol, "order rested");
        Ok(())
    }

    /// Convert and run stops whose trigger the new last price crossed.
    /// Triggered stops execute to completion within the same transaction;
    /// their own trades can cascade further stops, hence the loop.
    fn trigger_stops<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &DexParams,
        market: &mut Market,
        height: Height,
        ts: Timestamp,
    ) -> Result<(), Error> {
        loop {
            let triggered = book::triggered_stops(store, &market.symbol, market.last_price);
            if triggered.is_empty() {
                return Ok(());
            }
            for id in triggered {
                // run_taker re-enters this function after each conversion's
                // own fills; a stop already handled deeper in the cascade
                // shows up here with its trigger cleared.
                let Some(mut order) = self.order(store, id)? else {
                    continue;
                };
                if order.status.is_terminal() {
                    continue;
                }
                let Some(trigger) = order.stop_price.take() else {
                    continue;
                };
                store.delete(&book::stop_key(&market.symbol, order.side, trigger, id));

                order.order_type = match order.order_type {
                    OrderType::StopLimit => OrderType::Limit,
                    _ => {
                        // Escrow was sized at the trigger; bound the match
                        // loop there too.
                        if order.side == Side::Buy {
                            order.price_bound = Some(trigger);
                        }
                        OrderType::Market
                    }
                };
                events.emit(
                    Event::new("dex", "stop_triggered")
                        .attr("order_id", id)
                        .attr("trigger", trigger)
                        .attr("last_price", market.last_price),
                );

                let outcome =
                    self.run_taker(store, events, params, market, &mut order, height, ts)?;
                self.finish_taker(store, events, market, order, outcome.self_trade_with.is_some())?;
            }
        }
    }

    // ── Cancel ───────────────────────────────────────────────────────────────

    /// Cancel a resting or waiting order. Owner only; full refund, no fee.
    pub fn cancel_order<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        owner: &Address,
        order_id: u64,
    ) -> Result<(), Error> {
        let mut order = self
            .order(store, order_id)?
            .ok_or(Error::OrderNotFound(order_id))?;
        if order.owner != *owner {
            return Err(Error::NotOrderOwner);
        }
        if order.status.is_terminal() {
            return Err(Error::OrderNotFound(order_id));
        }

        self.remove_indices(store, &order);
        order.status = OrderStatus::Cancelled;
        self.refund(store, &mut order)?;
        self.save_order(store, &order)?;
        events.emit(
            Event::new("dex", "order_cancelled")
                .attr("order_id", order_id)
                .attr("filled", order.filled),
        );
        Ok(())
    }

    /// Drop an order's book / stop / expiry index entries.
    pub(crate) fn remove_indices<S: Store>(&self, store: &mut S, order: &Order) {
        if let Some(price) = order.price {
            store.delete(&book::book_key(&order.market, order.side, price, order.id));
        }
        if let Some(stop) = order.stop_price {
            store.delete(&book::stop_key(&order.market, order.side, stop, order.id));
        }
        if let Some(exp) = order.expires_at {
            store.delete(&expiry_key(exp, order.id));
        }
    }

    /// Return whatever escrow an order still holds.
    pub(crate) fn refund<S: Store>(&self, store: &mut S, order: &mut Order) -> Result<(), Error> {
        if order.locked.amount > 0 {
            self.bank.transfer(
                store,
                &module_account(MODULE_DEX),
                &order.owner,
                &order.locked,
            )?;
            order.locked.amount = 0;
        }
        Ok(())
    }

    pub(crate) fn save_order<S: Store>(&self, store: &mut S, order: &Order) -> Result<(), Error> {
        set_typed(store, &order_key(order.id), order)
    }

    pub(crate) fn save_market<S: Store>(&self, store: &mut S, market: &Market) -> Result<(), Error> {
        set_typed(store, &crate::market_key(&market.symbol), market)
    }
}
