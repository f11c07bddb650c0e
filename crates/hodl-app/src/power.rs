//! Cross-module voting power and verification views, wired into the
//! governance and equity keepers at app construction. Keeping these here —
//! not in the module crates — is what keeps the crate graph a DAG.

use hodl_bank::{module_account, Bank};
use hodl_core::coin::DENOM_UHODL;
use hodl_core::constants::MODULE_VALIDATOR_BOND;
use hodl_core::error::Error;
use hodl_core::types::{Address, Amount};
use hodl_equity::{Equity, VerificationView};
use hodl_gov::VotingPower;
use hodl_store::Store;
use hodl_validator::Validators;

/// Voting power across the three proposal domains.
pub struct AppPower {
    pub bank: Bank,
    pub equity: Equity,
    pub validators: Validators,
    pub gov_tier_multipliers: [u64; 5],
}

impl VotingPower for AppPower {
    /// Liquid HODL plus bonded validator stake.
    fn stake_power(&self, store: &dyn Store, addr: &Address) -> Result<Amount, Error> {
        let liquid = self.bank.balance(store, addr, DENOM_UHODL)?;
        let bonded = self
            .validators
            .validator(store, addr)?
            .map(|v| v.stake)
            .unwrap_or(0);
        liquid.checked_add(bonded).ok_or(Error::Overflow)
    }

    /// Total eligible stake: the full HODL supply minus protocol-held
    /// balances that can never vote (bond escrow is counted through its
    /// validators; other module accounts are excluded).
    fn total_stake_power(&self, store: &dyn Store) -> Result<Amount, Error> {
        let supply = self.bank.supply(store, DENOM_UHODL)?;
        let mut module_held: Amount = 0;
        for name in hodl_core::constants::MODULE_ACCOUNTS {
            if *name == MODULE_VALIDATOR_BOND {
                continue;
            }
            module_held = module_held
                .checked_add(self.bank.balance(store, &module_account(name), DENOM_UHODL)?)
                .ok_or(Error::Overflow)?;
        }
        Ok(supply.saturating_sub(module_held))
    }

    fn tier_power(&self, store: &dyn Store, addr: &Address) -> Result<Option<Amount>, Error> {
        let Some(v) = self.validators.validator(store, addr)? else {
            return Ok(None);
        };
        if v.banned {
            return Ok(None);
        }
        Ok(Some(self.gov_tier_multipliers[v.tier.index()] as u128))
    }

    fn total_tier_power(&self, store: &dyn Store) -> Result<Amount, Error> {
        let mut total: Amount = 0;
        for v in self.validators.validators(store)? {
            if !v.banned {
                total += self.gov_tier_multipliers[v.tier.index()] as u128;
            }
        }
        Ok(total)
    }

    /// Σ over the company's classes of holdings × class voting weight.
    fn share_power(
        &self,
        store: &dyn Store,
        addr: &Address,
        symbol: &str,
    ) -> Result<Amount, Error> {
        let Some(company) = self.equity.company_dyn(store, symbol)? else {
            return Ok(0);
        };
        let mut power: Amount = 0;
        for class in &company.classes {
            let balance = self.bank.balance(store, addr, &class.denom)?;
            power = power
                .checked_add(class.voting_weight.mul_amount_floor(balance)?)
                .ok_or(Error::Overflow)?;
        }
        Ok(power)
    }

    fn total_share_power(&self, store: &dyn Store, symbol: &str) -> Result<Amount, Error> {
        let Some(company) = self.equity.company_dyn(store, symbol)? else {
            return Ok(0);
        };
        let mut power: Amount = 0;
        for class in &company.classes {
            power = power
                .checked_add(class.voting_weight.mul_amount_floor(class.outstanding)?)
                .ok_or(Error::Overflow)?;
        }
        Ok(power)
    }
}

/// Bridges the equity module's company-creation gate to the validator
/// module's verification registry.
pub struct AppVerifications;

impl VerificationView for AppVerifications {
    fn is_approved(&self, store: &dyn Store, id: u64, symbol: &str) -> Result<bool, Error> {
        hodl_validator::is_approved_for_symbol(store, id, symbol)
    }
}
