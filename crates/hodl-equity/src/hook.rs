//! The bank pre-transfer hook for share denoms.
//!
//! Wired into the bank at app construction; every user-facing send of a
//! share denom passes through here. Module-internal movements (escrow,
//! settlement, dividends) do not run hooks.

use hodl_bank::TransferHook;
use hodl_core::coin::Coin;
use hodl_core::error::Error;
use hodl_core::msg::TransferRestriction;
use hodl_core::types::{Address, Height};
use hodl_store::Store;

use crate::Equity;

/// Extract the company symbol from a share denom (`uACME` → `ACME`,
/// `uACME.employee` → `ACME`). Returns `None` for non-share denoms.
pub fn symbol_of_share_denom(denom: &str) -> Option<String> {
    if denom == hodl_core::coin::DENOM_UHODL || denom == hodl_core::coin::DENOM_USTAKE {
        return None;
    }
    let rest = denom.strip_prefix('u')?;
    let symbol = match rest.split_once('.') {
        Some((s, _)) => s,
        None => rest,
    };
    if symbol.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        Some(symbol.to_string())
    } else {
        None
    }
}

/// Enforces per-class transfer restrictions.
pub struct EquityHook {
    equity: Equity,
}

impl EquityHook {
    pub fn new(equity: Equity) -> Self {
        Self { equity }
    }
}

impl TransferHook for EquityHook {
    fn before_transfer(
        &self,
        store: &dyn Store,
        _from: &Address,
        to: &Address,
        coin: &Coin,
        height: Height,
    ) -> Result<(), Error> {
        let Some(symbol) = symbol_of_share_denom(&coin.denom) else {
            return Ok(());
        };
        let Some(company) = self.equity.company_dyn(store, &symbol)? else {
            return Ok(());
        };
        let Some(class) = company.class_by_denom(&coin.denom) else {
            return Ok(());
        };

        for restriction in &class.restrictions {
            match restriction {
                TransferRestriction::JurisdictionLock { allowed } => {
                    let juris = self.equity.jurisdiction_dyn(store, to)?;
                    match juris {
                        Some(j) if allowed.contains(&j) => {}
                        _ => {
                            return Err(Error::TransferRestricted(format!(
                                "recipient jurisdiction not permitted for {}",
                                coin.denom
                            )))
                        }
                    }
                }
                TransferRestriction::VestingCliff { until_height } => {
                    if height < *until_height {
                        return Err(Error::TransferRestricted(format!(
                            "{} locked until height {until_height}",
                            coin.denom
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
