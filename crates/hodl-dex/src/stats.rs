//! Rolling 24h statistics and the circuit breaker.
//!
//! One [`BlockStats`] record per market per block with trades, keyed by
//! height so the window is a prefix range and eviction is a range delete in
//! BeginBlock. The circuit breaker compares the newest close against the
//! close from `breaker_window_blocks` ago and halts the market on a move
//! beyond `breaker_move_bps`.
//!
//!   dex/stats/<symbol>/<be height> → BlockStats

use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::params::DexParams;
use hodl_core::types::{Amount, Height};
use hodl_store::keys::be_u64;
use hodl_store::{get_typed, set_typed, Store};
use tracing::warn;

use crate::types::{BlockStats, Market, MarketStats, MarketStatus, Trade};

fn stats_prefix(market: &str) -> Vec<u8> {
    let mut k = b"dex/stats/".to_vec();
    k.extend_from_slice(market.as_bytes());
    k.push(b'/');
    k
}

fn stats_key(market: &str, height: Height) -> Vec<u8> {
    let mut k = stats_prefix(market);
    k.extend_from_slice(&be_u64(height));
    k
}

/// Fold a trade into the current block's aggregate.
pub fn record_trade<S: Store>(store: &mut S, market: &Market, trade: &Trade) -> Result<(), Error> {
    let key = stats_key(&market.symbol, trade.height);
    let mut stats: BlockStats = get_typed(store, &key)?.unwrap_or(BlockStats {
        height: trade.height,
        high: trade.price,
        low: trade.price,
        close: trade.price,
        volume: 0,
        quote_volume: 0,
        trade_count: 0,
    });
    stats.high = stats.high.max(trade.price);
    stats.low = stats.low.min(trade.price);
    stats.close = trade.price;
    stats.volume = stats.volume.checked_add(trade.qty).ok_or(Error::Overflow)?;
    stats.quote_volume = stats
        .quote_volume
        .checked_add(market.notional(trade.qty, trade.price)?)
        .ok_or(Error::Overflow)?;
    stats.trade_count += 1;
    set_typed(store, &key, &stats)
}

/// Aggregate the rolling window into a 24h view. Query path.
pub fn rolling<S: Store>(
    store: &S,
    market: &Market,
    height: Height,
    window_blocks: u64,
) -> Result<MarketStats, Error> {
    let floor = height.saturating_sub(window_blocks);
    let mut out = MarketStats { last_price: market.last_price, ..Default::default() };
    for (_, v) in store.iter_prefix(&stats_prefix(&market.symbol), false) {
        let s: BlockStats = hodl_store::codec::from_bytes(&v)?;
        if s.height < floor {
            continue;
        }
        if out.trade_count == 0 {
            out.high = s.high;
            out.low = s.low;
        } else {
            out.high = out.high.max(s.high);
            out.low = out.low.min(s.low);
        }
        out.volume += s.volume;
        out.quote_volume += s.quote_volume;
        out.trade_count += s.trade_count;
    }
    Ok(out)
}

/// Drop stats records that fell out of the window. Called per market from
/// BeginBlock.
pub fn evict<S: Store>(
    store: &mut S,
    market: &str,
    height: Height,
    window_blocks: u64,
) -> Result<(), Error> {
    let floor = height.saturating_sub(window_blocks);
    let prefix = stats_prefix(market);
    for (k, _) in store.iter_prefix(&prefix, false) {
        let h_bytes = &k[prefix.len()..];
        let h = u64::from_be_bytes(
            h_bytes
                .try_into()
                .map_err(|_| Error::Invariant("malformed stats key".into()))?,
        );
        if h >= floor {
            break;
        }
        store.delete(&k);
    }
    Ok(())
}

/// The close from the newest record at or before `height`, or `None` when
/// the market has no trade history in range.
fn reference_close<S: Store>(
    store: &S,
    market: &str,
    height: Height,
) -> Result<Option<Amount>, Error> {
    let prefix = stats_prefix(market);
    for (k, v) in store.iter_prefix(&prefix, true) {
        let h_bytes = &k[prefix.len()..];
        let h = u64::from_be_bytes(
            h_bytes
                .try_into()
                .map_err(|_| Error::Invariant("malformed stats key".into()))?,
        );
        if h > height {
            continue;
        }
        let s: BlockStats = hodl_store::codec::from_bytes(&v)?;
        return Ok(Some(s.close));
    }
    Ok(None)
}

/// Halt the market when the latest price moved more than `breaker_move_bps`
/// from the reference close `breaker_window_blocks` ago. Resting orders stay;
/// only new orders are rejected while halted.
pub fn check_circuit_breaker<S: Store>(
    store: &mut S,
    events: &mut EventManager,
    params: &DexParams,
    market: &mut Market,
    height: Height,
) -> Result<(), Error> {
    let Some(reference) =
        reference_close(store, &market.symbol, height.saturating_sub(params.breaker_window_blocks))?
    else {
        return Ok(());
    };
    if reference == 0 {
        return Ok(());
    }
    let move_abs = market.last_price.abs_diff(reference);
    // |last − ref| / ref > move_bps / 10_000, cross-multiplied.
    if move_abs * 10_000 > reference * params.breaker_move_bps as u128 {
        let until = height + params.breaker_halt_blocks;
        market.status = MarketStatus::Halted { until };
        events.emit(
            Event::new("dex", "circuit_breaker")
                .attr("market", &market.symbol)
                .attr("reference", reference)
                .attr("last_price", market.last_price)
                .attr("halted_until", until),
        );
        warn!(market = %market.symbol, reference, last = market.last_price, "circuit breaker tripped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::dec::Dec;
    use hodl_store::MemStore;

    fn mk_market() -> Market {
        Market {
            symbol: "ACME/HODL".into(),
            base_denom: "uACME".into(),
            quote_denom: "uhodl".into(),
            tick_size: 10_000,
            lot_size: 1_000_000,
            min_order_size: 1_000_000,
            max_order_size: 1_000_000_000_000,
            maker_fee: Dec::ZERO,
            taker_fee: Dec::ZERO,
            status: MarketStatus::Active,
            last_price: 0,
        }
    }

    fn mk_trade(height: Height, price: Amount, qty: Amount) -> Trade {
        Trade {
            id: 1,
            market: "ACME/HODL".into(),
            taker_order_id: 1,
            maker_order_id: 2,
            price,
            qty,
            taker_fee: 0,
            maker_fee: 0,
            height,
            ts: 0,
        }
    }

    #[test]
    fn rolling_window_aggregates_and_evicts() {
        let mut store = MemStore::new();
        let market = mk_market();
        record_trade(&mut store, &market, &mk_trade(10, 2_500_000, 1_000_000)).unwrap();
        record_trade(&mut store, &market, &mk_trade(11, 2_600_000, 2_000_000)).unwrap();
        record_trade(&mut store, &market, &mk_trade(500, 2_400_000, 1_000_000)).unwrap();

        let s = rolling(&store, &market, 510, 100).unwrap();
        // Only the height-500 record is inside the window.
        assert_eq!(s.trade_count, 1);
        assert_eq!(s.volume, 1_000_000);

        evict(&mut store, "ACME/HODL", 510, 100).unwrap();
        let s = rolling(&store, &market, 510, 10_000).unwrap();
        assert_eq!(s.trade_count, 1, "evicted records are gone for good");
    }

    #[test]
    fn breaker_trips_on_large_move() {
        let mut store = MemStore::new();
        let mut market = mk_market();
        let params = DexParams { breaker_window_blocks: 50, breaker_move_bps: 2_000, breaker_halt_blocks: 50, ..Default::default() };

        record_trade(&mut store, &market, &mk_trade(100, 2_000_000, 1_000_000)).unwrap();

        // 25% up at height 150: reference close (height ≤ 100) is 2.00.
        market.last_price = 2_500_000;
        record_trade(&mut store, &market, &mk_trade(150, 2_500_000, 1_000_000)).unwrap();
        let mut ev = EventManager::new();
        check_circuit_breaker(&mut store, &mut ev, &params, &mut market, 150).unwrap();
        assert_eq!(market.status, MarketStatus::Halted { until: 200 });
        assert!(!market.is_active(199));
        assert!(market.is_active(200));
    }

    #[test]
    fn breaker_ignores_small_move() {
        let mut store = MemStore::new();
        let mut market = mk_market();
        let params = DexParams::default();
        record_trade(&mut store, &market, &mk_trade(100, 2_000_000, 1_000_000)).unwrap();
        market.last_price = 2_200_000; // 10% move, below the 20% trigger
        record_trade(&mut store, &market, &mk_trade(150, 2_200_000, 1_000_000)).unwrap();
        let mut ev = EventManager::new();
        check_circuit_breaker(&mut store, &mut ev, &params, &mut market, 150).unwrap();
        assert_eq!(market.status, MarketStatus::Active);
    }
}
