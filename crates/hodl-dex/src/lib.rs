//! hodl-dex
//!
//! Central limit order book per market with strict price-time priority,
//! atomic settlement against bank balances, an immutable trade log, rolling
//! 24h statistics, and a circuit breaker. See [`engine`] for the match loop
//! and [`book`] for the index layout.
//!
//! Key layout (see also book.rs / stats.rs):
//!   dex/market/<symbol>               → Market
//!   dex/pair/<base>/<quote>           → symbol
//!   dex/order/<be id>                 → Order
//!   dex/trade/<symbol>/<be id>        → Trade
//!   dex/expiry/<be height><be id>     → ()

pub mod book;
pub mod engine;
pub mod stats;
pub mod types;

use hodl_bank::Bank;
use hodl_core::coin::Coin;
use hodl_core::dec::Dec;
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::msg::{OrderType, Side, Tif};
use hodl_core::params::DexParams;
use hodl_core::types::{Address, Amount, Height, Timestamp};
use hodl_store::keys::be_u64;
use hodl_store::{get_typed, set_typed, Store};
use tracing::info;

pub use engine::MatchOutcome;
pub use types::{BlockStats, Market, MarketStats, MarketStatus, Order, OrderStatus, Trade};

pub(crate) const ORDER_ID_COUNTER: &[u8] = b"dex/next_order_id";
pub(crate) const TRADE_ID_COUNTER: &[u8] = b"dex/next_trade_id";
const MARKET_PREFIX: &[u8] = b"dex/market/";
const PAIR_PREFIX: &[u8] = b"dex/pair/";
const ORDER_PREFIX: &[u8] = b"dex/order/";
const TRADE_PREFIX: &[u8] = b"dex/trade/";
const EXPIRY_PREFIX: &[u8] = b"dex/expiry/";

pub(crate) fn market_key(symbol: &str) -> Vec<u8> {
    let mut k = MARKET_PREFIX.to_vec();
    k.extend_from_slice(symbol.as_bytes());
    k
}

fn pair_key(base: &str, quote: &str) -> Vec<u8> {
    let mut k = PAIR_PREFIX.to_vec();
    k.extend_from_slice(base.as_bytes());
    k.push(b'/');
    k.extend_from_slice(quote.as_bytes());
    k
}

pub(crate) fn order_key(id: u64) -> Vec<u8> {
    let mut k = ORDER_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k
}

pub(crate) fn trade_key(market: &str, id: u64) -> Vec<u8> {
    let mut k = TRADE_PREFIX.to_vec();
    k.extend_from_slice(market.as_bytes());
    k.push(b'/');
    k.extend_from_slice(&be_u64(id));
    k
}

pub(crate) fn expiry_key(height: Height, order_id: u64) -> Vec<u8> {
    let mut k = EXPIRY_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(height));
    k.extend_from_slice(&be_u64(order_id));
    k
}

/// The DEX keeper.
#[derive(Clone)]
pub struct Dex {
    pub(crate) bank: Bank,
}

impl Dex {
    pub fn new(bank: Bank) -> Self {
        Self { bank }
    }

    // ── Markets ──────────────────────────────────────────────────────────────

    /// List a new market. Governance and genesis paths.
    #[allow(clippy::too_many_arguments)]
    pub fn create_market<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
        base_denom: &str,
        quote_denom: &str,
        tick_size: Amount,
        lot_size: Amount,
        min_order_size: Amount,
        max_order_size: Amount,
        maker_fee: Dec,
        taker_fee: Dec,
    ) -> Result<(), Error> {
        if self.market(store, symbol)?.is_some() {
            return Err(Error::MarketExists(symbol.to_string()));
        }
        if tick_size == 0 || lot_size == 0 {
            return Err(Error::Decode("tick and lot size must be positive".into()));
        }
        let market = Market {
            symbol: symbol.to_string(),
            base_denom: base_denom.to_string(),
            quote_denom: quote_denom.to_string(),
            tick_size,
            lot_size,
            min_order_size,
            max_order_size,
            maker_fee,
            taker_fee,
            status: MarketStatus::Active,
            last_price: 0,
        };
        set_typed(store, &market_key(symbol), &market)?;
        set_typed(store, &pair_key(base_denom, quote_denom), &symbol.to_string())?;
        events.emit(
            Event::new("dex", "market_created")
                .attr("market", symbol)
                .attr("base", base_denom)
                .attr("quote", quote_denom),
        );
        info!(market = symbol, "market created");
        Ok(())
    }

    pub fn market<S: Store>(&self, store: &S, symbol: &str) -> Result<Option<Market>, Error> {
        get_typed(store, &market_key(symbol))
    }

    pub fn markets<S: Store>(&self, store: &S) -> Result<Vec<Market>, Error> {
        store
            .iter_prefix(MARKET_PREFIX, false)
            .into_iter()
            .map(|(_, v)| hodl_store::codec::from_bytes(&v))
            .collect()
    }

    /// Halt or resume a market (governance emergency path).
    pub fn set_market_halted<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
        halted: bool,
    ) -> Result<(), Error> {
        let mut market = self
            .market(store, symbol)?
            .ok_or_else(|| Error::MarketNotFound(symbol.to_string()))?;
        market.status = if halted {
            MarketStatus::Halted { until: u64::MAX }
        } else {
            MarketStatus::Active
        };
        set_typed(store, &market_key(symbol), &market)?;
        events.emit(
            Event::new("dex", if halted { "market_halted" } else { "market_resumed" })
                .attr("market", symbol),
        );
        Ok(())
    }

    // ── Orders & trades ──────────────────────────────────────────────────────

    pub fn order<S: Store>(&self, store: &S, id: u64) -> Result<Option<Order>, Error> {
        get_typed(store, &order_key(id))
    }

    /// Top-of-book levels: (price, total qty) aggregated per level, best
    /// first. Query path.
    pub fn depth<S: Store>(
        &self,
        store: &S,
        symbol: &str,
        side: Side,
        levels: usize,
    ) -> Result<Vec<(Amount, Amount)>, Error> {
        let mut out: Vec<(Amount, Amount)> = Vec::new();
        for (price, id) in book::walk(store, symbol, side, 10_000) {
            let Some(order) = self.order(store, id)? else {
                continue;
            };
            match out.last_mut() {
                Some((p, qty)) if *p == price => *qty += order.remaining(),
                _ => {
                    if out.len() == levels {
                        break;
                    }
                    out.push((price, order.remaining()));
                }
            }
        }
        Ok(out)
    }

    /// Trade history, newest first, paginated.
    pub fn trades<S: Store>(
        &self,
        store: &S,
        symbol: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Trade>, Error> {
        let mut prefix = TRADE_PREFIX.to_vec();
        prefix.extend_from_slice(symbol.as_bytes());
        prefix.push(b'/');
        store
            .iter_prefix(&prefix, true)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, v)| hodl_store::codec::from_bytes(&v))
            .collect()
    }

    /// Rolling 24h statistics for a market.
    pub fn stats_24h<S: Store>(
        &self,
        store: &S,
        params: &DexParams,
        symbol: &str,
        height: Height,
    ) -> Result<MarketStats, Error> {
        let market = self
            .market(store, symbol)?
            .ok_or_else(|| Error::MarketNotFound(symbol.to_string()))?;
        stats::rolling(store, &market, height, params.stats_window_blocks)
    }

    // ── Swap ─────────────────────────────────────────────────────────────────

    /// Atomic cross-asset swap: a single slippage-bounded IOC taker order
    /// against the implied market. If the output lands below `min_out` the
    /// whole message errors and the surrounding transaction cache rolls back
    /// — no partial state survives.
    #[allow(clippy::too_many_arguments)]
    pub fn swap<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &DexParams,
        owner: &Address,
        from_denom: &str,
        to_denom: &str,
        in_amount: Amount,
        min_out: Amount,
        max_slippage_bps: u64,
        height: Height,
        ts: Timestamp,
    ) -> Result<Amount, Error> {
        // Resolve the market in either direction.
        let (symbol, side) = if let Some(sym) =
            get_typed::<String, S>(store, &pair_key(from_denom, to_denom))?
        {
            (sym, Side::Sell)
        } else if let Some(sym) = get_typed::<String, S>(store, &pair_key(to_denom, from_denom))? {
            (sym, Side::Buy)
        } else {
            return Err(Error::MarketNotFound(format!("{from_denom}/{to_denom}")));
        };
        let mut market = self
            .market(store, &symbol)?
            .ok_or_else(|| Error::MarketNotFound(symbol.clone()))?;
        if !market.is_active(height) {
            return Err(Error::MarketHalted(symbol.clone()));
        }

        let (qty, limit_price, locked) = match side {
            Side::Sell => {
                let (best_bid, _) = book::best(store, &symbol, Side::Buy)
                    .ok_or_else(|| Error::NoLiquidity(symbol.clone()))?;
                // Accept prices down to the slippage bound off the best bid.
                let bound = best_bid.saturating_sub(best_bid * max_slippage_bps as u128 / 10_000);
                let qty = in_amount - in_amount % market.lot_size;
                if qty == 0 {
                    return Err(Error::OrderBelowMinSize { qty: in_amount, min: market.lot_size });
                }
                (qty, bound, Coin::new(market.base_denom.clone(), qty))
            }
            Side::Buy => {
                let (best_ask, _) = book::best(store, &symbol, Side::Sell)
                    .ok_or_else(|| Error::NoLiquidity(symbol.clone()))?;
                let bound = best_ask
                    .checked_add(best_ask * max_slippage_bps as u128 / 10_000)
                    .ok_or(Error::Overflow)?;
                // How much base the budget can buy inside the bound.
                let qty = self.base_affordable(store, &market, in_amount, bound)?;
                if qty == 0 {
                    return Err(Error::Slippage { min_out, got: 0 });
                }
                (qty, bound, Coin::new(market.quote_denom.clone(), in_amount))
            }
        };

        self.bank
            .transfer(store, owner, &hodl_bank::module_account(hodl_core::constants::MODULE_DEX), &locked)?;
        let id = hodl_store::next_id(store, ORDER_ID_COUNTER)?;
        let mut order = Order {
            id,
            market: symbol.clone(),
            owner: *owner,
            side,
            order_type: OrderType::Limit,
            tif: Tif::Ioc,
            qty,
            filled: 0,
            price: Some(limit_price),
            stop_price: None,
            price_bound: None,
            expires_at: None,
            status: OrderStatus::Open,
            locked,
            created_at: height,
        };

        let outcome =
            self.run_taker(store, events, params, &mut market, &mut order, height, ts)?;
        let out = match side {
            Side::Sell => outcome.quote_received,
            Side::Buy => outcome.base_filled,
        };
        if out < min_out {
            return Err(Error::Slippage { min_out, got: out });
        }
        self.finish_taker(store, events, &market, order, outcome.self_trade_with.is_some())?;
        self.save_market(store, &market)?;

        events.emit(
            Event::new("dex", "swap")
                .attr("owner", owner)
                .attr("from", from_denom)
                .attr("to", to_denom)
                .attr("in", in_amount)
                .attr("out", out),
        );
        Ok(out)
    }

    /// Walk the asks inside the price bound and return the lot-aligned base
    /// quantity `quote_budget` can afford, fees included.
    fn base_affordable<S: Store>(
        &self,
        store: &S,
        market: &Market,
        quote_budget: Amount,
        bound: Amount,
    ) -> Result<Amount, Error> {
        let mut budget = quote_budget;
        let mut qty: Amount = 0;
        for (price, id) in book::walk(store, &market.symbol, Side::Sell, 10_000) {
            if price > bound {
                break;
            }
            let Some(maker) = self.order(store, id)? else {
                continue;
            };
            let mut lots = maker.remaining() / market.lot_size;
            while lots > 0 {
                let quote = price;
                let fee = market.taker_fee.mul_amount_ceil(quote)?;
                let cost_per_lot = quote.checked_add(fee).ok_or(Error::Overflow)?;
                let affordable = budget / cost_per_lot;
                if affordable == 0 {
                    return Ok(qty);
                }
                let take = lots.min(affordable);
                qty += take * market.lot_size;
                budget -= take * cost_per_lot;
                lots -= take;
            }
        }
        Ok(qty)
    }

    // ── Block hooks ──────────────────────────────────────────────────────────

    /// Evict stale stats windows and lift expired circuit-breaker halts.
    pub fn begin_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &DexParams,
        height: Height,
    ) -> Result<(), Error> {
        for mut market in self.markets(store)? {
            stats::evict(store, &market.symbol, height, params.stats_window_blocks)?;
            if let MarketStatus::Halted { until } = market.status {
                if until != u64::MAX && height >= until {
                    market.status = MarketStatus::Active;
                    set_typed(store, &market_key(&market.symbol), &market)?;
                    events.emit(
                        Event::new("dex", "market_resumed").attr("market", &market.symbol),
                    );
                }
            }
        }
        Ok(())
    }

    /// Expire orders whose deadline is at or before this height. Bounded per
    /// block; leftover entries carry to the next block.
    pub fn end_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &DexParams,
        height: Height,
    ) -> Result<(), Error> {
        let mut expired = Vec::new();
        for (k, _) in store.iter_prefix(EXPIRY_PREFIX, false) {
            if expired.len() as u64 >= params.max_expirations_per_block {
                break;
            }
            let h_bytes = &k[EXPIRY_PREFIX.len()..EXPIRY_PREFIX.len() + 8];
            let h = u64::from_be_bytes(h_bytes.try_into().expect("8-byte height"));
            if h > height {
                break;
            }
            let id_bytes = &k[EXPIRY_PREFIX.len() + 8..];
            let id = u64::from_be_bytes(id_bytes.try_into().expect("8-byte id"));
            expired.push((k, id));
        }

        for (index_key, id) in expired {
            store.delete(&index_key);
            let Some(mut order) = self.order(store, id)? else {
                continue;
            };
            if order.status.is_terminal() {
                continue;
            }
            order.expires_at = None;
            self.remove_indices(store, &order);
            order.status = OrderStatus::Expired;
            self.refund(store, &mut order)?;
            self.save_order(store, &order)?;
            events.emit(
                Event::new("dex", "order_expired")
                    .attr("order_id", id)
                    .attr("filled", order.filled),
            );
        }
        Ok(())
    }

    // ── Invariant ────────────────────────────────────────────────────────────

    /// Book funds: the DEX module account holds exactly the sum of
    /// non-terminal orders' locked escrow, per denom.
    pub fn assert_book_funds<S: Store>(&self, store: &S) -> Result<(), Error> {
        use std::collections::BTreeMap;
        let mut expected: BTreeMap<String, Amount> = BTreeMap::new();
        for (_, v) in store.iter_prefix(ORDER_PREFIX, false) {
            let order: Order = hodl_store::codec::from_bytes(&v)?;
            if !order.status.is_terminal() {
                *expected.entry(order.locked.denom.clone()).or_default() += order.locked.amount;
            }
        }
        let dex = hodl_bank::module_account(hodl_core::constants::MODULE_DEX);
        for (denom, want) in &expected {
            let have = self.bank.balance(store, &dex, denom)?;
            if have != *want {
                return Err(Error::Invariant(format!(
                    "dex escrow mismatch for {denom}: locked {want}, held {have}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_bank::module_account;
    use hodl_core::coin::DENOM_UHODL;
    use hodl_store::MemStore;

    const LOT: Amount = 1_000_000; // 1 share
    const TICK: Amount = 10_000; // 0.01 HODL

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn price(hodl_cents: u128) -> Amount {
        hodl_cents * TICK
    }

    struct Fixture {
        store: MemStore,
        dex: Dex,
        bank: Bank,
        params: DexParams,
        ev: EventManager,
    }

    fn setup(fees: bool) -> Fixture {
        let mut store = MemStore::new();
        let bank = Bank::new();
        let dex = Dex::new(bank.clone());
        let mut ev = EventManager::new();
        let (maker_fee, taker_fee) = if fees {
            (Dec::from_bps(10), Dec::from_bps(20))
        } else {
            (Dec::ZERO, Dec::ZERO)
        };
        dex.create_market(
            &mut store,
            &mut ev,
            "ACME/HODL",
            "uACME",
            DENOM_UHODL,
            TICK,
            LOT,
            LOT,
            1_000_000 * LOT,
            maker_fee,
            taker_fee,
        )
        .unwrap();
        Fixture { store, dex, bank, params: DexParams::default(), ev }
    }

    fn fund(f: &mut Fixture, who: Address, denom: &str, amount: Amount) {
        f.bank.mint(&mut f.store, &who, &Coin::new(denom, amount)).unwrap();
    }

    #[allow(clippy::too_many_arguments)]
    fn limit(
        f: &mut Fixture,
        who: Address,
        side: Side,
        qty_shares: u128,
        px: Amount,
        tif: Tif,
        height: Height,
    ) -> Result<u64, Error> {
        f.dex.place_order(
            &mut f.store,
            &mut f.ev,
            &f.params.clone(),
            &who,
            "ACME/HODL",
            side,
            OrderType::Limit,
            tif,
            qty_shares * LOT,
            Some(px),
            None,
            None,
            None,
            height,
            0,
        )
    }

    #[test]
    fn price_time_priority_scenario() {
        // Book: bids 10 @ 2.50 (id 1), 10 @ 2.50 (id 2), ask 5 @ 2.50 (id 3)
        // from a third owner. Incoming sell 20 @ 2.50 GTC fills id 1 then
        // id 2 completely; the same-side ask is untouched.
        let mut f = setup(false);
        let (a, b, c, seller) = (addr(1), addr(2), addr(3), addr(4));
        fund(&mut f, a, DENOM_UHODL, 100 * price(250));
        fund(&mut f, b, DENOM_UHODL, 100 * price(250));
        fund(&mut f, c, "uACME", 100 * LOT);
        fund(&mut f, seller, "uACME", 100 * LOT);

        let id1 = limit(&mut f, a, Side::Buy, 10, price(250), Tif::Gtc, 1).unwrap();
        let id2 = limit(&mut f, b, Side::Buy, 10, price(250), Tif::Gtc, 1).unwrap();
        let id3 = limit(&mut f, c, Side::Sell, 5, price(251), Tif::Gtc, 1).unwrap();

        let id4 = limit(&mut f, seller, Side::Sell, 20, price(250), Tif::Gtc, 2).unwrap();

        let o1 = f.dex.order(&f.store, id1).unwrap().unwrap();
        let o2 = f.dex.order(&f.store, id2).unwrap().unwrap();
        let o3 = f.dex.order(&f.store, id3).unwrap().unwrap();
        let o4 = f.dex.order(&f.store, id4).unwrap().unwrap();
        assert_eq!(o1.status, OrderStatus::Filled);
        assert_eq!(o2.status, OrderStatus::Filled);
        assert_eq!(o3.status, OrderStatus::Open, "same-side order untouched");
        assert_eq!(o4.status, OrderStatus::Filled);
        assert_eq!(o4.filled, 20 * LOT);

        // Two trades, maker price 2.50, FIFO: id1 before id2.
        let trades = f.dex.trades(&f.store, "ACME/HODL", 0, 10).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].maker_order_id, id1);
        assert_eq!(trades[0].maker_order_id, id2);
        assert!(trades.iter().all(|t| t.price == price(250)));

        // Settlement: seller got 20 × 2.50, buyers got 10 shares each.
        assert_eq!(
            f.bank.balance(&f.store, &seller, DENOM_UHODL).unwrap(),
            20 * price(250)
        );
        assert_eq!(f.bank.balance(&f.store, &a, "uACME").unwrap(), 10 * LOT);
        assert_eq!(f.bank.balance(&f.store, &b, "uACME").unwrap(), 10 * LOT);
        f.dex.assert_book_funds(&f.store).unwrap();
        f.bank.assert_supply(&f.store).unwrap();
    }

    #[test]
    fn price_improvement_goes_to_taker() {
        let mut f = setup(false);
        let (maker, taker) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 10 * LOT);
        fund(&mut f, taker, DENOM_UHODL, 10 * price(300));

        limit(&mut f, maker, Side::Sell, 10, price(250), Tif::Gtc, 1).unwrap();
        // Buy limit 3.00 crosses the 2.50 ask: executes at 2.50.
        limit(&mut f, taker, Side::Buy, 10, price(300), Tif::Gtc, 2).unwrap();

        assert_eq!(
            f.bank.balance(&f.store, &taker, DENOM_UHODL).unwrap(),
            10 * price(300) - 10 * price(250),
            "unspent lock refunded at the improved price"
        );
        assert_eq!(f.bank.balance(&f.store, &taker, "uACME").unwrap(), 10 * LOT);
        f.dex.assert_book_funds(&f.store).unwrap();
    }

    #[test]
    fn fok_rejected_without_book_mutation() {
        // Ask liquidity 8 @ ≤ 3.00; FOK buy 10 @ 3.00 must reject in full.
        let mut f = setup(false);
        let (maker, taker) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 8 * LOT);
        fund(&mut f, taker, DENOM_UHODL, 100 * price(300));

        limit(&mut f, maker, Side::Sell, 5, price(290), Tif::Gtc, 1).unwrap();
        limit(&mut f, maker, Side::Sell, 3, price(300), Tif::Gtc, 1).unwrap();

        let err = limit(&mut f, taker, Side::Buy, 10, price(300), Tif::Fok, 2).unwrap_err();
        assert!(matches!(err, Error::CannotFillOrKill));

        // Handler errors roll back at the pipeline; at keeper level the book
        // itself must be unchanged.
        assert_eq!(f.dex.depth(&f.store, "ACME/HODL", Side::Sell, 10).unwrap().len(), 2);
        assert!(f.dex.trades(&f.store, "ACME/HODL", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn fok_fills_when_liquidity_suffices() {
        let mut f = setup(false);
        let (maker, taker) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 10 * LOT);
        fund(&mut f, taker, DENOM_UHODL, 100 * price(300));

        limit(&mut f, maker, Side::Sell, 10, price(300), Tif::Gtc, 1).unwrap();
        let id = limit(&mut f, taker, Side::Buy, 10, price(300), Tif::Fok, 2).unwrap();
        assert_eq!(f.dex.order(&f.store, id).unwrap().unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn ioc_cancels_remainder_with_refund() {
        let mut f = setup(false);
        let (maker, taker) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 4 * LOT);
        fund(&mut f, taker, DENOM_UHODL, 10 * price(250));

        limit(&mut f, maker, Side::Sell, 4, price(250), Tif::Gtc, 1).unwrap();
        let id = limit(&mut f, taker, Side::Buy, 10, price(250), Tif::Ioc, 2).unwrap();

        let o = f.dex.order(&f.store, id).unwrap().unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.filled, 4 * LOT);
        // 6 lots' worth of lock refunded.
        assert_eq!(
            f.bank.balance(&f.store, &taker, DENOM_UHODL).unwrap(),
            6 * price(250)
        );
        f.dex.assert_book_funds(&f.store).unwrap();
    }

    #[test]
    fn cancel_before_fill_restores_balances() {
        let mut f = setup(true);
        let taker = addr(2);
        fund(&mut f, taker, DENOM_UHODL, 10 * price(250) + 10_000_000);
        let before = f.bank.balance(&f.store, &taker, DENOM_UHODL).unwrap();

        let id = limit(&mut f, taker, Side::Buy, 10, price(250), Tif::Gtc, 1).unwrap();
        assert_ne!(f.bank.balance(&f.store, &taker, DENOM_UHODL).unwrap(), before);

        f.dex.cancel_order(&mut f.store, &mut f.ev, &taker, id).unwrap();
        assert_eq!(
            f.bank.balance(&f.store, &taker, DENOM_UHODL).unwrap(),
            before,
            "no fee on unmatched cancel"
        );
        f.dex.assert_book_funds(&f.store).unwrap();
    }

    #[test]
    fn cancel_by_non_owner_rejected() {
        let mut f = setup(false);
        let taker = addr(2);
        fund(&mut f, taker, DENOM_UHODL, 10 * price(250));
        let id = limit(&mut f, taker, Side::Buy, 10, price(250), Tif::Gtc, 1).unwrap();
        let err = f.dex.cancel_order(&mut f.store, &mut f.ev, &addr(9), id).unwrap_err();
        assert!(matches!(err, Error::NotOrderOwner));
    }

    #[test]
    fn self_trade_cancels_taker() {
        let mut f = setup(false);
        let me = addr(1);
        fund(&mut f, me, DENOM_UHODL, 10 * price(250));
        fund(&mut f, me, "uACME", 10 * LOT);

        let resting = limit(&mut f, me, Side::Buy, 10, price(250), Tif::Gtc, 1).unwrap();
        let taker = limit(&mut f, me, Side::Sell, 10, price(250), Tif::Gtc, 2).unwrap();

        let r = f.dex.order(&f.store, resting).unwrap().unwrap();
        let t = f.dex.order(&f.store, taker).unwrap().unwrap();
        assert_eq!(r.status, OrderStatus::Open, "resting order survives");
        assert_eq!(t.status, OrderStatus::Cancelled, "newer order cancelled");
        assert_eq!(t.filled, 0);
        assert!(f.ev.events().iter().any(|e| e.ty == "self_trade_prevented"));
        // Seller's base refunded in full.
        assert_eq!(f.bank.balance(&f.store, &me, "uACME").unwrap(), 10 * LOT);
    }

    #[test]
    fn fees_route_to_collector() {
        let mut f = setup(true);
        let (maker, taker) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 10 * LOT);
        fund(&mut f, taker, DENOM_UHODL, 11 * price(250));

        limit(&mut f, maker, Side::Sell, 10, price(250), Tif::Gtc, 1).unwrap();
        limit(&mut f, taker, Side::Buy, 10, price(250), Tif::Gtc, 2).unwrap();

        let notional = 10 * price(250);
        let taker_fee = notional * 20 / 10_000;
        let maker_fee = notional * 10 / 10_000;
        let collector = module_account(hodl_core::constants::MODULE_FEE_COLLECTOR);
        assert_eq!(
            f.bank.balance(&f.store, &collector, DENOM_UHODL).unwrap(),
            taker_fee + maker_fee
        );
        assert_eq!(
            f.bank.balance(&f.store, &maker, DENOM_UHODL).unwrap(),
            notional - maker_fee
        );
        f.dex.assert_book_funds(&f.store).unwrap();
    }

    #[test]
    fn stop_order_triggers_on_trade() {
        let mut f = setup(false);
        let (maker, taker, stopper) = (addr(1), addr(2), addr(3));
        fund(&mut f, maker, "uACME", 30 * LOT);
        fund(&mut f, taker, DENOM_UHODL, 100 * price(300));
        fund(&mut f, stopper, DENOM_UHODL, 100 * price(300));

        // Resting asks at 2.50 and 2.60.
        limit(&mut f, maker, Side::Sell, 10, price(250), Tif::Gtc, 1).unwrap();
        limit(&mut f, maker, Side::Sell, 10, price(260), Tif::Gtc, 1).unwrap();

        // Buy stop at 2.50: triggers once last_price ≥ 2.50.
        let stop_id = f
            .dex
            .place_order(
                &mut f.store,
                &mut f.ev,
                &f.params.clone(),
                &stopper,
                "ACME/HODL",
                Side::Buy,
                OrderType::Stop,
                Tif::Gtc,
                5 * LOT,
                None,
                Some(price(250)),
                None,
                None,
                1,
                0,
            )
            .unwrap();
        assert_eq!(
            f.dex.order(&f.store, stop_id).unwrap().unwrap().status,
            OrderStatus::Open
        );

        // A trade at 2.50 fires the stop in the same transaction.
        limit(&mut f, taker, Side::Buy, 5, price(250), Tif::Gtc, 2).unwrap();

        let stop = f.dex.order(&f.store, stop_id).unwrap().unwrap();
        assert_eq!(stop.status, OrderStatus::Filled, "triggered and executed");
        assert!(f.ev.events().iter().any(|e| e.ty == "stop_triggered"));
        f.dex.assert_book_funds(&f.store).unwrap();
    }

    #[test]
    fn swap_aborts_below_min_out() {
        // Each keeper call runs against its own fixture: an errored handler
        // is rolled back by the pipeline cache, which unit tests don't model.
        let mut f = setup(false);
        let (maker, swapper) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 10 * LOT);
        fund(&mut f, swapper, DENOM_UHODL, 10 * price(250));
        limit(&mut f, maker, Side::Sell, 10, price(250), Tif::Gtc, 1).unwrap();

        // The book can deliver at most 10 shares; demand 11.
        let err = f
            .dex
            .swap(
                &mut f.store,
                &mut f.ev,
                &f.params.clone(),
                &swapper,
                DENOM_UHODL,
                "uACME",
                10 * price(250),
                11 * LOT,
                100,
                2,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Slippage { .. }));
    }

    #[test]
    fn swap_quote_to_base_delivers_exact_output() {
        let mut f = setup(false);
        let (maker, swapper) = (addr(1), addr(2));
        fund(&mut f, maker, "uACME", 10 * LOT);
        fund(&mut f, swapper, DENOM_UHODL, 10 * price(250));
        limit(&mut f, maker, Side::Sell, 10, price(250), Tif::Gtc, 1).unwrap();

        let out = f
            .dex
            .swap(
                &mut f.store,
                &mut f.ev,
                &f.params.clone(),
                &swapper,
                DENOM_UHODL,
                "uACME",
                10 * price(250),
                10 * LOT,
                100,
                2,
                0,
            )
            .unwrap();
        assert_eq!(out, 10 * LOT);
        assert_eq!(f.bank.balance(&f.store, &swapper, "uACME").unwrap(), 10 * LOT);
        f.dex.assert_book_funds(&f.store).unwrap();
    }

    #[test]
    fn swap_base_to_quote() {
        let mut f = setup(false);
        let (maker, swapper) = (addr(1), addr(2));
        fund(&mut f, maker, DENOM_UHODL, 10 * price(250));
        fund(&mut f, swapper, "uACME", 10 * LOT);

        limit(&mut f, maker, Side::Buy, 10, price(250), Tif::Gtc, 1).unwrap();
        let out = f
            .dex
            .swap(
                &mut f.store,
                &mut f.ev,
                &f.params.clone(),
                &swapper,
                "uACME",
                DENOM_UHODL,
                10 * LOT,
                10 * price(250),
                100,
                2,
                0,
            )
            .unwrap();
        assert_eq!(out, 10 * price(250));
    }

    #[test]
    fn min_size_boundary_is_exact() {
        // A second market with a 2-lot minimum: exactly the minimum is
        // accepted, one lot below is rejected.
        let mut f = setup(false);
        f.dex
            .create_market(
                &mut f.store,
                &mut f.ev,
                "BETA/HODL",
                "uBETA",
                DENOM_UHODL,
                TICK,
                LOT,
                2 * LOT,
                1_000_000 * LOT,
                Dec::ZERO,
                Dec::ZERO,
            )
            .unwrap();
        let taker = addr(2);
        fund(&mut f, taker, DENOM_UHODL, 100 * price(250));

        let params = f.params.clone();
        f.dex
            .place_order(
                &mut f.store, &mut f.ev, &params, &taker, "BETA/HODL", Side::Buy,
                OrderType::Limit, Tif::Gtc, 2 * LOT, Some(price(250)), None, None, None, 1, 0,
            )
            .unwrap();
        let err = f
            .dex
            .place_order(
                &mut f.store, &mut f.ev, &params, &taker, "BETA/HODL", Side::Buy,
                OrderType::Limit, Tif::Gtc, LOT, Some(price(250)), None, None, None, 1, 0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::OrderBelowMinSize { .. }));

        // Sub-lot quantities fail the lot check.
        let err = f
            .dex
            .place_order(
                &mut f.store, &mut f.ev, &params, &taker, "BETA/HODL", Side::Buy,
                OrderType::Limit, Tif::Gtc, LOT / 2, Some(price(250)), None, None, None, 1, 0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLot { .. }));
    }

    #[test]
    fn gtd_expires_exactly_at_deadline() {
        let mut f = setup(false);
        let taker = addr(2);
        fund(&mut f, taker, DENOM_UHODL, 10 * price(250));
        let id = f
            .dex
            .place_order(
                &mut f.store,
                &mut f.ev,
                &f.params.clone(),
                &taker,
                "ACME/HODL",
                Side::Buy,
                OrderType::Limit,
                Tif::Gtd,
                10 * LOT,
                Some(price(250)),
                None,
                Some(100),
                None,
                1,
                0,
            )
            .unwrap();

        let params = f.params.clone();
        f.dex.end_block(&mut f.store, &mut f.ev, &params, 99).unwrap();
        assert_eq!(f.dex.order(&f.store, id).unwrap().unwrap().status, OrderStatus::Open);

        f.dex.end_block(&mut f.store, &mut f.ev, &params, 100).unwrap();
        let o = f.dex.order(&f.store, id).unwrap().unwrap();
        assert_eq!(o.status, OrderStatus::Expired);
        assert_eq!(
            f.bank.balance(&f.store, &taker, DENOM_UHODL).unwrap(),
            10 * price(250),
            "escrow refunded on expiry"
        );
    }

    #[test]
    fn halted_market_rejects_new_orders() {
        let mut f = setup(false);
        let taker = addr(2);
        fund(&mut f, taker, DENOM_UHODL, 10 * price(250));
        f.dex
            .set_market_halted(&mut f.store, &mut f.ev, "ACME/HODL", true)
            .unwrap();
        let err = limit(&mut f, taker, Side::Buy, 1, price(250), Tif::Gtc, 1).unwrap_err();
        assert!(matches!(err, Error::MarketHalted(_)));
    }
}
