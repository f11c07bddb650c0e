//! hodl-bank
//!
//! Fungible token balances, per-denom supply accounting, and module
//! accounts. Balances are keyed `(denom, address)` so every holder of a
//! denom is one prefix scan — the cap-table view and dividend snapshots
//! fall out of byte order.
//!
//! Key layout:
//!   bank/bal/<denom>/<addr20>  → Amount
//!   bank/supply/<denom>        → Amount

use std::sync::Arc;

use hodl_core::coin::Coin;
use hodl_core::error::Error;
use hodl_core::types::{Address, Amount, Height};
use hodl_crypto::module_address;
use hodl_store::{get_typed, set_typed, Store};

const BAL_PREFIX: &[u8] = b"bank/bal/";
const SUPPLY_PREFIX: &[u8] = b"bank/supply/";

fn bal_key(denom: &str, addr: &Address) -> Vec<u8> {
    let mut k = BAL_PREFIX.to_vec();
    k.extend_from_slice(denom.as_bytes());
    k.push(b'/');
    k.extend_from_slice(addr.as_bytes());
    k
}

fn denom_prefix(denom: &str) -> Vec<u8> {
    let mut k = BAL_PREFIX.to_vec();
    k.extend_from_slice(denom.as_bytes());
    k.push(b'/');
    k
}

fn supply_key(denom: &str) -> Vec<u8> {
    let mut k = SUPPLY_PREFIX.to_vec();
    k.extend_from_slice(denom.as_bytes());
    k
}

/// Pre-transfer veto hook. The equity module registers one to enforce share
/// transfer restrictions; user-facing sends run every hook, module-internal
/// movements bypass them.
pub trait TransferHook: Send + Sync {
    fn before_transfer(
        &self,
        store: &dyn Store,
        from: &Address,
        to: &Address,
        coin: &Coin,
        height: Height,
    ) -> Result<(), Error>;
}

/// The bank keeper. Stateless over the store; cheap to clone into every
/// module that moves funds.
#[derive(Clone, Default)]
pub struct Bank {
    hooks: Vec<Arc<dyn TransferHook>>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-transfer hook. Called once at app wiring.
    pub fn add_hook(&mut self, hook: Arc<dyn TransferHook>) {
        self.hooks.push(hook);
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn balance<S: Store + ?Sized>(
        &self,
        store: &S,
        addr: &Address,
        denom: &str,
    ) -> Result<Amount, Error> {
        Ok(get_typed(store, &bal_key(denom, addr))?.unwrap_or(0))
    }

    pub fn supply<S: Store + ?Sized>(&self, store: &S, denom: &str) -> Result<Amount, Error> {
        Ok(get_typed(store, &supply_key(denom))?.unwrap_or(0))
    }

    /// Every holder of `denom` with a non-zero balance, in address byte
    /// order. Deterministic: drives dividend snapshots and share voting.
    pub fn holders<S: Store>(
        &self,
        store: &S,
        denom: &str,
    ) -> Result<Vec<(Address, Amount)>, Error> {
        let prefix = denom_prefix(denom);
        let mut out = Vec::new();
        for (k, v) in store.iter_prefix(&prefix, false) {
            let addr_bytes = &k[prefix.len()..];
            let mut arr = [0u8; 20];
            if addr_bytes.len() != 20 {
                return Err(Error::Invariant(format!(
                    "malformed balance key for denom {denom}"
                )));
            }
            arr.copy_from_slice(addr_bytes);
            let amount: Amount = hodl_store::codec::from_bytes(&v)?;
            if amount > 0 {
                out.push((Address::from_bytes(arr), amount));
            }
        }
        Ok(out)
    }

    /// All balances of one address. Scans the known denoms (supply records),
    /// so cost is bounded by the number of listed denoms. Query-path only.
    pub fn balances_of<S: Store>(
        &self,
        store: &S,
        addr: &Address,
    ) -> Result<Vec<Coin>, Error> {
        let mut out = Vec::new();
        for (k, _) in store.iter_prefix(SUPPLY_PREFIX, false) {
            let denom = String::from_utf8(k[SUPPLY_PREFIX.len()..].to_vec())
                .map_err(|e| Error::Invariant(e.to_string()))?;
            let amount = self.balance(store, addr, &denom)?;
            if amount > 0 {
                out.push(Coin::new(denom, amount));
            }
        }
        Ok(out)
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    fn set_balance<S: Store>(
        &self,
        store: &mut S,
        addr: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), Error> {
        let key = bal_key(denom, addr);
        if amount == 0 {
            store.delete(&key);
            Ok(())
        } else {
            set_typed(store, &key, &amount)
        }
    }

    fn debit<S: Store>(
        &self,
        store: &mut S,
        addr: &Address,
        coin: &Coin,
    ) -> Result<(), Error> {
        let have = self.balance(store, addr, &coin.denom)?;
        if have < coin.amount {
            return Err(Error::InsufficientFunds {
                denom: coin.denom.clone(),
                need: coin.amount,
                have,
            });
        }
        self.set_balance(store, addr, &coin.denom, have - coin.amount)
    }

    fn credit<S: Store>(
        &self,
        store: &mut S,
        addr: &Address,
        coin: &Coin,
    ) -> Result<(), Error> {
        let have = self.balance(store, addr, &coin.denom)?;
        let new = have.checked_add(coin.amount).ok_or(Error::Overflow)?;
        self.set_balance(store, addr, &coin.denom, new)
    }

    /// User-facing send: runs every registered transfer hook first.
    pub fn send<S: Store>(
        &self,
        store: &mut S,
        from: &Address,
        to: &Address,
        coin: &Coin,
        height: Height,
    ) -> Result<(), Error> {
        for hook in &self.hooks {
            hook.before_transfer(store, from, to, coin, height)?;
        }
        self.transfer(store, from, to, coin)
    }

    /// Module-internal movement: escrow locks, refunds, settlements. Bypasses
    /// transfer hooks.
    pub fn transfer<S: Store>(
        &self,
        store: &mut S,
        from: &Address,
        to: &Address,
        coin: &Coin,
    ) -> Result<(), Error> {
        if coin.amount == 0 {
            return Ok(());
        }
        self.debit(store, from, coin)?;
        self.credit(store, to, coin)
    }

    /// Create supply: credit `to` and grow the denom's total.
    pub fn mint<S: Store>(
        &self,
        store: &mut S,
        to: &Address,
        coin: &Coin,
    ) -> Result<(), Error> {
        if coin.amount == 0 {
            return Ok(());
        }
        let supply = self.supply(store, &coin.denom)?;
        let new = supply.checked_add(coin.amount).ok_or(Error::Overflow)?;
        set_typed(store, &supply_key(&coin.denom), &new)?;
        self.credit(store, to, coin)
    }

    /// Destroy supply: debit `from` and shrink the denom's total.
    pub fn burn<S: Store>(
        &self,
        store: &mut S,
        from: &Address,
        coin: &Coin,
    ) -> Result<(), Error> {
        if coin.amount == 0 {
            return Ok(());
        }
        self.debit(store, from, coin)?;
        let supply = self.supply(store, &coin.denom)?;
        let new = supply.checked_sub(coin.amount).ok_or_else(|| {
            Error::Invariant(format!("supply underflow for {}", coin.denom))
        })?;
        if new == 0 {
            store.delete(&supply_key(&coin.denom));
        } else {
            set_typed(store, &supply_key(&coin.denom), &new)?;
        }
        Ok(())
    }

    // ── Invariants ───────────────────────────────────────────────────────────

    /// Supply conservation: for every denom, Σ balances == supply. Checked in
    /// tests and by the pipeline's invariant sweep.
    pub fn assert_supply<S: Store>(&self, store: &S) -> Result<(), Error> {
        for (k, v) in store.iter_prefix(SUPPLY_PREFIX, false) {
            let denom = String::from_utf8(k[SUPPLY_PREFIX.len()..].to_vec())
                .map_err(|e| Error::Invariant(e.to_string()))?;
            let supply: Amount = hodl_store::codec::from_bytes(&v)?;
            let total: Amount = self
                .holders(store, &denom)?
                .into_iter()
                .map(|(_, a)| a)
                .sum();
            if total != supply {
                return Err(Error::Invariant(format!(
                    "supply mismatch for {denom}: balances {total}, supply {supply}"
                )));
            }
        }
        Ok(())
    }
}

/// Address of a named module account.
pub fn module_account(name: &str) -> Address {
    module_address(name)
}

/// EndBlock sweep of the fee collector: split every collected denom between
/// the community treasury, the active validators (pro-rata by stake), and
/// the insurance fund. Rounding dust stays with the treasury.
pub fn apply_fee_split<S: Store>(
    store: &mut S,
    bank: &Bank,
    split: &hodl_core::params::FeeSplit,
    validators: &[(Address, Amount)],
    events: &mut hodl_core::events::EventManager,
) -> Result<(), Error> {
    let collector = module_account(hodl_core::constants::MODULE_FEE_COLLECTOR);
    let treasury = module_account(hodl_core::constants::MODULE_TREASURY);
    let insurance = module_account(hodl_core::constants::MODULE_INSURANCE);
    let total_stake: Amount = validators.iter().map(|(_, s)| s).sum();

    for coin in bank.balances_of(store, &collector)? {
        let insurance_amt = coin.amount * split.insurance_bps as u128 / 10_000;
        let mut validators_amt = coin.amount * split.validators_bps as u128 / 10_000;

        if insurance_amt > 0 {
            bank.transfer(
                store,
                &collector,
                &insurance,
                &Coin::new(coin.denom.clone(), insurance_amt),
            )?;
        }
        if total_stake > 0 && validators_amt > 0 {
            let pool = validators_amt;
            for (operator, stake) in validators {
                let share = pool * stake / total_stake;
                if share > 0 {
                    bank.transfer(
                        store,
                        &collector,
                        operator,
                        &Coin::new(coin.denom.clone(), share),
                    )?;
                    validators_amt -= share;
                }
            }
        }
        // Treasury takes its cut plus any undistributed remainder.
        let remaining = bank.balance(store, &collector, &coin.denom)?;
        if remaining > 0 {
            bank.transfer(
                store,
                &collector,
                &treasury,
                &Coin::new(coin.denom.clone(), remaining),
            )?;
        }
        events.emit(
            hodl_core::events::Event::new("bank", "fees_distributed")
                .attr("denom", &coin.denom)
                .attr("total", coin.amount),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::coin::DENOM_UHODL;
    use hodl_store::MemStore;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn mint_send_burn_conserves_supply() {
        let mut store = MemStore::new();
        let bank = Bank::new();
        let (a, b) = (addr(1), addr(2));

        bank.mint(&mut store, &a, &Coin::uhodl(1_000)).unwrap();
        bank.send(&mut store, &a, &b, &Coin::uhodl(400), 1).unwrap();
        bank.assert_supply(&store).unwrap();
        assert_eq!(bank.balance(&store, &a, DENOM_UHODL).unwrap(), 600);
        assert_eq!(bank.balance(&store, &b, DENOM_UHODL).unwrap(), 400);
        assert_eq!(bank.supply(&store, DENOM_UHODL).unwrap(), 1_000);

        bank.burn(&mut store, &b, &Coin::uhodl(400)).unwrap();
        assert_eq!(bank.supply(&store, DENOM_UHODL).unwrap(), 600);
        bank.assert_supply(&store).unwrap();
    }

    #[test]
    fn overdraft_rejected() {
        let mut store = MemStore::new();
        let bank = Bank::new();
        bank.mint(&mut store, &addr(1), &Coin::uhodl(10)).unwrap();
        let err = bank
            .send(&mut store, &addr(1), &addr(2), &Coin::uhodl(11), 1)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[test]
    fn holders_sorted_by_address() {
        let mut store = MemStore::new();
        let bank = Bank::new();
        bank.mint(&mut store, &addr(5), &Coin::new("uACME", 50)).unwrap();
        bank.mint(&mut store, &addr(3), &Coin::new("uACME", 30)).unwrap();
        bank.mint(&mut store, &addr(9), &Coin::new("uACME", 90)).unwrap();

        let holders = bank.holders(&store, "uACME").unwrap();
        assert_eq!(
            holders,
            vec![(addr(3), 30), (addr(5), 50), (addr(9), 90)]
        );
    }

    #[test]
    fn hook_can_veto_send() {
        struct Deny;
        impl TransferHook for Deny {
            fn before_transfer(
                &self,
                _store: &dyn Store,
                _from: &Address,
                _to: &Address,
                coin: &Coin,
                _height: Height,
            ) -> Result<(), Error> {
                if coin.denom.starts_with("uACME") {
                    return Err(Error::TransferRestricted("test veto".into()));
                }
                Ok(())
            }
        }

        let mut store = MemStore::new();
        let mut bank = Bank::new();
        bank.add_hook(Arc::new(Deny));
        bank.mint(&mut store, &addr(1), &Coin::new("uACME", 10)).unwrap();

        let err = bank
            .send(&mut store, &addr(1), &addr(2), &Coin::new("uACME", 5), 1)
            .unwrap_err();
        assert!(matches!(err, Error::TransferRestricted(_)));
        // Internal transfer bypasses the hook.
        bank.transfer(&mut store, &addr(1), &addr(2), &Coin::new("uACME", 5))
            .unwrap();
    }
}
