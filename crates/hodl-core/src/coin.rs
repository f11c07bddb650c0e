use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::types::Amount;

/// Base denom of the stablecoin: micro-HODL, 10⁻⁶ HODL.
pub const DENOM_UHODL: &str = "uhodl";

/// The native staking / collateral asset.
pub const DENOM_USTAKE: &str = "ustake";

/// A quantity of a single denom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self { denom: denom.into(), amount }
    }

    pub fn uhodl(amount: Amount) -> Self {
        Self::new(DENOM_UHODL, amount)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

// ── Denom rules ──────────────────────────────────────────────────────────────

/// Validate a share symbol: uppercase alphanumeric, 2–16 chars, starting with
/// a letter.
pub fn validate_symbol(symbol: &str) -> Result<(), Error> {
    let ok = (2..=16).contains(&symbol.len())
        && symbol.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidDenom(symbol.to_string()))
    }
}

/// Share denom for a company symbol: `u<SYMBOL>`.
pub fn share_denom(symbol: &str) -> String {
    format!("u{symbol}")
}

/// Share denom for a non-default class: `u<SYMBOL>.<CLASS>`.
pub fn share_class_denom(symbol: &str, class_id: &str) -> String {
    format!("u{symbol}.{class_id}")
}

/// Validate any denom accepted by the bank: `uhodl`, `ustake`, or a share
/// denom per the rules above.
pub fn validate_denom(denom: &str) -> Result<(), Error> {
    if denom == DENOM_UHODL || denom == DENOM_USTAKE {
        return Ok(());
    }
    let rest = denom
        .strip_prefix('u')
        .ok_or_else(|| Error::InvalidDenom(denom.to_string()))?;
    match rest.split_once('.') {
        Some((symbol, class)) => {
            validate_symbol(symbol)?;
            if class.is_empty() || !class.chars().all(|c| c.is_ascii_lowercase()) {
                return Err(Error::InvalidDenom(denom.to_string()));
            }
            Ok(())
        }
        None => validate_symbol(rest),
    }
}
