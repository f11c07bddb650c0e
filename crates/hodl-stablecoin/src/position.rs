use serde::{Deserialize, Serialize};

use hodl_core::error::Error;
use hodl_core::types::{Address, Amount, Height, Timestamp};

/// A collateralized debt position. One per owner; created on first mint and
/// deleted once debt, fees, and collateral all reach zero.
///
/// Lifecycle: empty → healthy → (undercollateralized) → healthy | closed.
/// Transitions are recorded as `stablecoin` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollateralPosition {
    pub owner: Address,
    /// Locked `ustake` held by the stablecoin module account.
    pub collateral: Amount,
    /// Outstanding minted `uhodl`.
    pub debt: Amount,
    /// Stability, mint, and burn fees owed on top of the debt.
    pub accrued_fee: Amount,
    pub last_accrual_height: Height,
    pub last_accrual_time: Timestamp,
}

impl CollateralPosition {
    pub fn empty(owner: Address, height: Height, now: Timestamp) -> Self {
        Self {
            owner,
            collateral: 0,
            debt: 0,
            accrued_fee: 0,
            last_accrual_height: height,
            last_accrual_time: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collateral == 0 && self.debt == 0 && self.accrued_fee == 0
    }

    /// Total HODL owed: debt plus accrued fees.
    pub fn liability(&self) -> Result<Amount, Error> {
        self.debt.checked_add(self.accrued_fee).ok_or(Error::Overflow)
    }
}
