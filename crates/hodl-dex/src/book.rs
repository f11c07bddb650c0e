//! Order-book and stop-order index layout.
//!
//! Bids store the bitwise complement of the price so the best bid is the
//! first key in forward iteration, exactly like asks. FIFO within a price
//! level falls out of the monotonic order-id suffix.
//!
//!   dex/book/<symbol>/a/<be price><be id>       asks, best (lowest) first
//!   dex/book/<symbol>/b/<~be price><be id>      bids, best (highest) first
//!   dex/stop/<symbol>/b/<be stop><be id>        buy stops, lowest trigger first
//!   dex/stop/<symbol>/s/<~be stop><be id>       sell stops, highest trigger first

use hodl_core::msg::Side;
use hodl_core::types::Amount;
use hodl_store::keys::{be_u128, be_u128_desc, be_u64, tail_u64};
use hodl_store::Store;

pub fn book_prefix(market: &str, side: Side) -> Vec<u8> {
    let mut k = b"dex/book/".to_vec();
    k.extend_from_slice(market.as_bytes());
    k.extend_from_slice(match side {
        Side::Buy => b"/b/",
        Side::Sell => b"/a/",
    });
    k
}

pub fn book_key(market: &str, side: Side, price: Amount, order_id: u64) -> Vec<u8> {
    let mut k = book_prefix(market, side);
    match side {
        Side::Buy => k.extend_from_slice(&be_u128_desc(price)),
        Side::Sell => k.extend_from_slice(&be_u128(price)),
    }
    k.extend_from_slice(&be_u64(order_id));
    k
}

pub fn stop_prefix(market: &str, side: Side) -> Vec<u8> {
    let mut k = b"dex/stop/".to_vec();
    k.extend_from_slice(market.as_bytes());
    k.extend_from_slice(match side {
        Side::Buy => b"/b/",
        Side::Sell => b"/s/",
    });
    k
}

pub fn stop_key(market: &str, side: Side, stop_price: Amount, order_id: u64) -> Vec<u8> {
    let mut k = stop_prefix(market, side);
    match side {
        // Buy stops trigger when the price rises to the trigger: scan
        // ascending. Sell stops trigger on falls: scan descending.
        Side::Buy => k.extend_from_slice(&be_u128(stop_price)),
        Side::Sell => k.extend_from_slice(&be_u128_desc(stop_price)),
    }
    k.extend_from_slice(&be_u64(order_id));
    k
}

/// The best resting order on `side`: (price, order_id). Price is recovered
/// from the key so no order load is needed to walk price levels.
pub fn best<S: Store>(store: &S, market: &str, side: Side) -> Option<(Amount, u64)> {
    let prefix = book_prefix(market, side);
    let (key, _) = store.first_in_prefix(&prefix, false)?;
    let price_bytes: [u8; 16] = key[prefix.len()..prefix.len() + 16].try_into().ok()?;
    let raw = u128::from_be_bytes(price_bytes);
    let price = match side {
        Side::Buy => !raw,
        Side::Sell => raw,
    };
    let id = tail_u64(&key)?;
    Some((price, id))
}

/// Walk the book from the best price outward, yielding (price, order_id)
/// up to `limit` entries. Query paths and FOK feasibility checks.
pub fn walk<S: Store>(store: &S, market: &str, side: Side, limit: usize) -> Vec<(Amount, u64)> {
    let prefix = book_prefix(market, side);
    store
        .iter_prefix(&prefix, false)
        .into_iter()
        .take(limit)
        .filter_map(|(key, _)| {
            let price_bytes: [u8; 16] = key[prefix.len()..prefix.len() + 16].try_into().ok()?;
            let raw = u128::from_be_bytes(price_bytes);
            let price = match side {
                Side::Buy => !raw,
                Side::Sell => raw,
            };
            Some((price, tail_u64(&key)?))
        })
        .collect()
}

/// Stop orders whose trigger is crossed by `last_price`.
pub fn triggered_stops<S: Store>(store: &S, market: &str, last_price: Amount) -> Vec<u64> {
    let mut out = Vec::new();
    // Buy stops: trigger ≤ last_price; index ascending by trigger.
    let prefix = stop_prefix(market, Side::Buy);
    for (key, _) in store.iter_prefix(&prefix, false) {
        let Ok(trigger_bytes) = <[u8; 16]>::try_from(&key[prefix.len()..prefix.len() + 16]) else {
            continue;
        };
        if u128::from_be_bytes(trigger_bytes) > last_price {
            break;
        }
        if let Some(id) = tail_u64(&key) {
            out.push(id);
        }
    }
    // Sell stops: trigger ≥ last_price; index descending by trigger.
    let prefix = stop_prefix(market, Side::Sell);
    for (key, _) in store.iter_prefix(&prefix, false) {
        let Ok(trigger_bytes) = <[u8; 16]>::try_from(&key[prefix.len()..prefix.len() + 16]) else {
            continue;
        };
        let trigger = !u128::from_be_bytes(trigger_bytes);
        if trigger < last_price {
            break;
        }
        if let Some(id) = tail_u64(&key) {
            out.push(id);
        }
    }
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_store::MemStore;

    #[test]
    fn bids_order_best_first() {
        let mut s = MemStore::new();
        s.set(&book_key("ACME/HODL", Side::Buy, 2_500_000, 1), vec![]);
        s.set(&book_key("ACME/HODL", Side::Buy, 2_600_000, 2), vec![]);
        s.set(&book_key("ACME/HODL", Side::Buy, 2_400_000, 3), vec![]);
        assert_eq!(best(&s, "ACME/HODL", Side::Buy), Some((2_600_000, 2)));
    }

    #[test]
    fn asks_order_best_first() {
        let mut s = MemStore::new();
        s.set(&book_key("ACME/HODL", Side::Sell, 2_500_000, 1), vec![]);
        s.set(&book_key("ACME/HODL", Side::Sell, 2_400_000, 2), vec![]);
        assert_eq!(best(&s, "ACME/HODL", Side::Sell), Some((2_400_000, 2)));
    }

    #[test]
    fn fifo_within_price_level() {
        let mut s = MemStore::new();
        s.set(&book_key("ACME/HODL", Side::Buy, 2_500_000, 7), vec![]);
        s.set(&book_key("ACME/HODL", Side::Buy, 2_500_000, 3), vec![]);
        // Earliest id first at the same price.
        assert_eq!(best(&s, "ACME/HODL", Side::Buy), Some((2_500_000, 3)));
    }

    #[test]
    fn stop_triggers() {
        let mut s = MemStore::new();
        // Buy stop at 3.00, sell stop at 2.00 (prices in uhodl per lot).
        s.set(&stop_key("ACME/HODL", Side::Buy, 3_000_000, 1), vec![]);
        s.set(&stop_key("ACME/HODL", Side::Sell, 2_000_000, 2), vec![]);

        assert!(triggered_stops(&s, "ACME/HODL", 2_500_000).is_empty());
        assert_eq!(triggered_stops(&s, "ACME/HODL", 3_000_000), vec![1]);
        assert_eq!(triggered_stops(&s, "ACME/HODL", 1_900_000), vec![2]);
    }
}
