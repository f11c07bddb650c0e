//! Fixed-point decimal with 18 fractional digits.
//!
//! All ratios, fee rates, prices, and voting weights are `Dec`. State
//! transitions never touch floating point; every division documents its
//! rounding direction at the call site. The two rules used throughout:
//!
//!   * amounts debited from users round DOWN (the protocol never over-charges
//!     by rounding),
//!   * ratio comparisons are done by cross-multiplication so no intermediate
//!     quotient is ever truncated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::types::Amount;

/// Scaling factor: 10^18.
pub const DEC_SCALE: u128 = 1_000_000_000_000_000_000;

/// Unsigned fixed-point decimal, `raw / 10^18`.
///
/// Arithmetic is checked; overflow surfaces as [`Error::Overflow`] rather than
/// wrapping. `Dec` deliberately has no `Dec × Dec` multiply — every consensus
/// formula is expressed as `Amount × Dec` or a cross-multiplied comparison,
/// which keeps intermediates within u128.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Hash,
)]
pub struct Dec(pub u128);

impl Dec {
    pub const ZERO: Dec = Dec(0);
    pub const ONE: Dec = Dec(DEC_SCALE);

    /// Whole-number decimal.
    pub fn from_int(n: u128) -> Self {
        Dec(n * DEC_SCALE)
    }

    /// Decimal from basis points (1 bps = 0.0001). `from_bps(2000)` = 0.20.
    pub fn from_bps(bps: u64) -> Self {
        Dec(bps as u128 * (DEC_SCALE / 10_000))
    }

    /// `n / d` rounded down. Panics on `d == 0`.
    pub fn from_ratio(n: u128, d: u128) -> Self {
        assert!(d != 0, "Dec::from_ratio divisor must be non-zero");
        Dec(n * DEC_SCALE / d)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Dec) -> Result<Dec, Error> {
        self.0.checked_add(rhs.0).map(Dec).ok_or(Error::Overflow)
    }

    pub fn checked_sub(self, rhs: Dec) -> Result<Dec, Error> {
        self.0.checked_sub(rhs.0).map(Dec).ok_or(Error::Overflow)
    }

    /// Saturating subtraction, used for reputation-style bounded quantities.
    pub fn saturating_sub(self, rhs: Dec) -> Dec {
        Dec(self.0.saturating_sub(rhs.0))
    }

    /// `amount × self`, rounded down.
    pub fn mul_amount_floor(self, amount: Amount) -> Result<Amount, Error> {
        amount
            .checked_mul(self.0)
            .map(|p| p / DEC_SCALE)
            .ok_or(Error::Overflow)
    }

    /// `amount × self`, rounded up. Used when the protocol must not
    /// under-collect (e.g. the minimum HODL a liquidator must supply).
    pub fn mul_amount_ceil(self, amount: Amount) -> Result<Amount, Error> {
        let p = amount.checked_mul(self.0).ok_or(Error::Overflow)?;
        Ok(p.div_ceil(DEC_SCALE))
    }

    /// `amount / self`, rounded down. Panics on division by zero — callers
    /// guard zero prices before reaching here.
    pub fn div_amount_floor(self, amount: Amount) -> Result<Amount, Error> {
        assert!(self.0 != 0, "division by zero Dec");
        amount
            .checked_mul(DEC_SCALE)
            .map(|p| p / self.0)
            .ok_or(Error::Overflow)
    }

    /// `amount / self`, rounded up. Used for collateral seizure, which rounds
    /// toward the liquidator so repaid debt is always fully covered.
    pub fn div_amount_ceil(self, amount: Amount) -> Result<Amount, Error> {
        assert!(self.0 != 0, "division by zero Dec");
        let p = amount.checked_mul(DEC_SCALE).ok_or(Error::Overflow)?;
        Ok(p.div_ceil(self.0))
    }
}

/// Compare `a × x ≥ b × y` without truncating either product.
pub fn cross_ge(a: Amount, x: Dec, b: Amount, y: Dec) -> Result<bool, Error> {
    let lhs = a.checked_mul(x.0).ok_or(Error::Overflow)?;
    let rhs = b.checked_mul(y.0).ok_or(Error::Overflow)?;
    Ok(lhs >= rhs)
}

/// Compare `a × x < b × y` without truncating either product.
pub fn cross_lt(a: Amount, x: Dec, b: Amount, y: Dec) -> Result<bool, Error> {
    Ok(!cross_ge(a, x, b, y)?)
}

impl std::str::FromStr for Dec {
    type Err = Error;

    /// Parse `"1.5"`, `"0.001"`, `"3"` — at most 18 fractional digits.
    fn from_str(s: &str) -> Result<Self, Error> {
        let bad = || Error::Decode(format!("invalid decimal: {s}"));
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() || frac_part.len() > 18 {
            return Err(bad());
        }
        let int: u128 = int_part.parse().map_err(|_| bad())?;
        let frac: u128 = if frac_part.is_empty() {
            0
        } else {
            let parsed: u128 = frac_part.parse().map_err(|_| bad())?;
            parsed * 10u128.pow(18 - frac_part.len() as u32)
        };
        int.checked_mul(DEC_SCALE)
            .and_then(|i| i.checked_add(frac))
            .map(Dec)
            .ok_or(Error::Overflow)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / DEC_SCALE;
        let frac = self.0 % DEC_SCALE;
        if frac == 0 {
            write!(f, "{int}")
        } else {
            let s = format!("{frac:018}");
            write!(f, "{}.{}", int, s.trim_end_matches('0'))
        }
    }
}

impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bps_and_display() {
        assert_eq!(Dec::from_bps(10_000), Dec::ONE);
        assert_eq!(Dec::from_bps(2_000).to_string(), "0.2");
        assert_eq!(Dec::from_int(3).to_string(), "3");
        assert_eq!(Dec::from_ratio(3, 2).to_string(), "1.5");
    }

    #[test]
    fn mul_amount_rounding() {
        let fee = Dec::from_bps(10); // 0.001
        assert_eq!(fee.mul_amount_floor(1_000_000).unwrap(), 1_000);
        // 0.001 × 1 rounds down to 0, up to 1.
        assert_eq!(fee.mul_amount_floor(1).unwrap(), 0);
        assert_eq!(fee.mul_amount_ceil(1).unwrap(), 1);
    }

    #[test]
    fn cross_comparison_exact_boundary() {
        // collateral 2_000_000 × price 1.5 vs debt 1_000_000 × ratio 3.0:
        // both sides equal → ≥ holds, < does not.
        let price = Dec::from_ratio(3, 2);
        let ratio = Dec::from_int(3);
        assert!(cross_ge(2_000_000, price, 1_000_000, ratio).unwrap());
        assert!(!cross_lt(2_000_000, price, 1_000_000, ratio).unwrap());
    }

    #[test]
    fn div_amount() {
        let price = Dec::from_ratio(9, 10); // 0.9
        // 700_000 / 0.9 = 777_777.77… → floor 777_777
        assert_eq!(price.div_amount_floor(700_000).unwrap(), 777_777);
    }
}
