use serde::{Deserialize, Serialize};

use hodl_core::coin::Coin;
use hodl_core::dec::Dec;
use hodl_core::msg::{OrderType, Side, Tif};
use hodl_core::types::{Address, Amount, Height, Timestamp};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Active,
    /// Halted by the circuit breaker or governance; re-opens at `until`
    /// (`u64::MAX` for an indefinite governance halt).
    Halted { until: Height },
}

/// A trading pair. Prices are integers: quote base-units per `lot_size`
/// base-units, so `qty / lot_size × price` is always integral for the
/// lot-aligned quantities the market accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// `BASE/QUOTE`, e.g. `ACME/HODL`.
    pub symbol: String,
    pub base_denom: String,
    pub quote_denom: String,
    /// Price increment in quote base-units per lot.
    pub tick_size: Amount,
    /// Quantity increment in base base-units.
    pub lot_size: Amount,
    pub min_order_size: Amount,
    pub max_order_size: Amount,
    pub maker_fee: Dec,
    pub taker_fee: Dec,
    pub status: MarketStatus,
    /// Price of the most recent trade; 0 before the first trade.
    pub last_price: Amount,
}

impl Market {
    pub fn is_active(&self, height: Height) -> bool {
        match self.status {
            MarketStatus::Active => true,
            MarketStatus::Halted { until } => height >= until,
        }
    }

    /// Quote owed for `qty` base units at `price`. `qty` is lot-aligned.
    pub fn notional(&self, qty: Amount, price: Amount) -> Result<Amount, hodl_core::Error> {
        (qty / self.lot_size)
            .checked_mul(price)
            .ok_or(hodl_core::Error::Overflow)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Resting on the book (or awaiting trigger for stops).
    Open,
    Partial,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub market: String,
    pub owner: Address,
    pub side: Side,
    pub order_type: OrderType,
    pub tif: Tif,
    pub qty: Amount,
    pub filled: Amount,
    /// Limit price (limit / stop-limit; also the converted price of a
    /// triggered stop-limit).
    pub price: Option<Amount>,
    /// Trigger price for stop / stop-limit orders still waiting.
    pub stop_price: Option<Amount>,
    /// Hard price bound for market orders (the slippage cap for market
    /// buys, the trigger for converted stops). Never rests on the book.
    pub price_bound: Option<Amount>,
    pub expires_at: Option<Height>,
    pub status: OrderStatus,
    /// Funds still escrowed in the DEX module account for this order.
    pub locked: Coin,
    pub created_at: Height,
}

impl Order {
    pub fn remaining(&self) -> Amount {
        self.qty - self.filled
    }

    /// The price the match loop may cross up (buy) or down (sell) to:
    /// the limit price, or the market order's bound.
    pub fn match_limit(&self) -> Option<Amount> {
        self.price.or(self.price_bound)
    }
}

/// Immutable fill record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub market: String,
    pub taker_order_id: u64,
    pub maker_order_id: u64,
    pub price: Amount,
    pub qty: Amount,
    pub taker_fee: Amount,
    pub maker_fee: Amount,
    pub height: Height,
    pub ts: Timestamp,
}

/// Per-block aggregate used for the rolling 24h statistics and the circuit
/// breaker's reference price. One record per market per block with trades.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockStats {
    pub height: Height,
    pub high: Amount,
    pub low: Amount,
    pub close: Amount,
    pub volume: Amount,
    pub quote_volume: Amount,
    pub trade_count: u64,
}

/// Rolling 24h view assembled from [`BlockStats`] records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub last_price: Amount,
    pub high: Amount,
    pub low: Amount,
    pub volume: Amount,
    pub quote_volume: Amount,
    pub trade_count: u64,
}
