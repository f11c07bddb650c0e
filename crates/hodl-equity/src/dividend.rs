//! Dividend declaration, claims, and expiry.
//!
//! Declaration escrows the pool and snapshots every holder of the share
//! denom at the record height by iterating the bank's holder index (address
//! byte order, deterministic). Claims are pure lookups against the snapshot;
//! a second claim by the same address fails. After expiry the unclaimed
//! residue returns to the company treasury.

use hodl_bank::module_account;
use hodl_core::coin::Coin;
use hodl_core::constants::MODULE_DIVIDEND_ESCROW;
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::types::{Address, Amount, Height};
use hodl_store::keys::be_u64;
use hodl_store::{get_typed, next_id, set_typed, Store};
use tracing::info;

use crate::types::{CompanyStatus, Dividend};
use crate::Equity;

const DIV_PREFIX: &[u8] = b"eq/div/";
const SNAP_PREFIX: &[u8] = b"eq/div_snap/";
const CLAIMED_PREFIX: &[u8] = b"eq/div_claimed/";
const EXPIRY_PREFIX: &[u8] = b"eq/div_expiry/";
const DIV_ID_COUNTER: &[u8] = b"eq/next_dividend_id";

fn div_key(id: u64) -> Vec<u8> {
    let mut k = DIV_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k
}

fn snap_key(id: u64, addr: &Address) -> Vec<u8> {
    let mut k = SNAP_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k.extend_from_slice(addr.as_bytes());
    k
}

fn claimed_key(id: u64, addr: &Address) -> Vec<u8> {
    let mut k = CLAIMED_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k.extend_from_slice(addr.as_bytes());
    k
}

fn expiry_key(height: Height, id: u64) -> Vec<u8> {
    let mut k = EXPIRY_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(height));
    k.extend_from_slice(&be_u64(id));
    k
}

pub fn dividend<S: Store>(store: &S, id: u64) -> Result<Option<Dividend>, Error> {
    get_typed(store, &div_key(id))
}

/// Declare a dividend: lock the pool into escrow and snapshot holdings at
/// the current height.
#[allow(clippy::too_many_arguments)]
pub fn declare<S: Store>(
    equity: &Equity,
    store: &mut S,
    events: &mut EventManager,
    owner: &Address,
    symbol: &str,
    class_id: &str,
    total: Coin,
    pay_height: Height,
    expiry_height: Height,
    height: Height,
) -> Result<u64, Error> {
    let company = equity
        .company(store, symbol)?
        .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
    if company.owner != *owner {
        return Err(Error::NotCompanyOwner);
    }
    if company.status == CompanyStatus::Delisted {
        return Err(Error::CompanyNotListed(symbol.to_string()));
    }
    let class = company
        .class(class_id)
        .ok_or_else(|| Error::UnknownShareClass {
            symbol: symbol.to_string(),
            class: class_id.to_string(),
        })?;
    if pay_height <= height {
        return Err(Error::ExpiryInPast { expires_at: pay_height, now: height });
    }

    equity.bank().transfer(
        store,
        owner,
        &module_account(MODULE_DIVIDEND_ESCROW),
        &total,
    )?;

    let id = next_id(store, DIV_ID_COUNTER)?;

    // Snapshot: persist every holder's balance and commit to the set.
    let holders = equity.bank().holders(store, &class.denom)?;
    let mut hasher = blake3::Hasher::new();
    let mut outstanding_at_record: Amount = 0;
    for (addr, amount) in &holders {
        set_typed(store, &snap_key(id, addr), amount)?;
        hasher.update(addr.as_bytes());
        hasher.update(&amount.to_be_bytes());
        outstanding_at_record = outstanding_at_record
            .checked_add(*amount)
            .ok_or(Error::Overflow)?;
    }

    let dividend = Dividend {
        id,
        company_id: company.id,
        symbol: symbol.to_string(),
        class_id: class_id.to_string(),
        total: total.clone(),
        record_height: height,
        pay_height,
        expiry_height,
        outstanding_at_record,
        claimed_total: 0,
        settled: false,
        snapshot_root: *hasher.finalize().as_bytes(),
    };
    set_typed(store, &div_key(id), &dividend)?;
    set_typed(store, &expiry_key(expiry_height, id), &())?;

    events.emit(
        Event::new("equity", "dividend_declared")
            .attr("dividend_id", id)
            .attr("symbol", symbol)
            .attr("class", class_id)
            .attr("total", &total)
            .attr("record_height", height)
            .attr("pay_height", pay_height),
    );
    info!(dividend_id = id, symbol, holders = holders.len(), "dividend declared");
    Ok(id)
}

/// Claim a matured entitlement. Idempotent per address: the claimed marker is
/// written before funds move, and a second claim fails.
pub fn claim<S: Store>(
    equity: &Equity,
    store: &mut S,
    events: &mut EventManager,
    claimer: &Address,
    dividend_id: u64,
    height: Height,
) -> Result<Amount, Error> {
    let mut dividend =
        self::dividend(store, dividend_id)?.ok_or(Error::DividendNotFound(dividend_id))?;
    if height < dividend.pay_height {
        return Err(Error::DividendNotPayable {
            id: dividend_id,
            pay_height: dividend.pay_height,
        });
    }
    if dividend.settled || height >= dividend.expiry_height {
        return Err(Error::DividendExpired(dividend_id));
    }
    if store.has(&claimed_key(dividend_id, claimer)) {
        return Err(Error::AlreadyClaimed);
    }
    let holding: Amount = get_typed(store, &snap_key(dividend_id, claimer))?
        .ok_or(Error::NoDividendEntitlement(dividend_id))?;

    // amount = total × holding_at_record / outstanding_at_record, floor.
    let amount = dividend
        .total
        .amount
        .checked_mul(holding)
        .ok_or(Error::Overflow)?
        / dividend.outstanding_at_record.max(1);

    set_typed(store, &claimed_key(dividend_id, claimer), &())?;
    equity.bank().transfer(
        store,
        &module_account(MODULE_DIVIDEND_ESCROW),
        claimer,
        &Coin::new(dividend.total.denom.clone(), amount),
    )?;
    dividend.claimed_total = dividend
        .claimed_total
        .checked_add(amount)
        .ok_or(Error::Overflow)?;
    set_typed(store, &div_key(dividend_id), &dividend)?;

    events.emit(
        Event::new("equity", "dividend_claimed")
            .attr("dividend_id", dividend_id)
            .attr("claimer", claimer)
            .attr("amount", amount),
    );
    Ok(amount)
}

/// Expiry sweep, called from the equity EndBlock: dividends whose expiry is
/// at or before `height` return their unclaimed residue to the company
/// treasury.
pub fn expire_dividends<S: Store>(
    equity: &Equity,
    store: &mut S,
    events: &mut EventManager,
    height: Height,
) -> Result<(), Error> {
    let mut due = Vec::new();
    for (k, _) in store.iter_prefix(EXPIRY_PREFIX, false) {
        let h_bytes = &k[EXPIRY_PREFIX.len()..EXPIRY_PREFIX.len() + 8];
        let h = u64::from_be_bytes(h_bytes.try_into().expect("8-byte height"));
        if h > height {
            break;
        }
        let id_bytes = &k[EXPIRY_PREFIX.len() + 8..];
        let id = u64::from_be_bytes(id_bytes.try_into().expect("8-byte id"));
        due.push((k, id));
    }

    for (index_key, id) in due {
        let mut dividend =
            self::dividend(store, id)?.ok_or_else(|| Error::Invariant(format!(
                "missing dividend {id} in expiry index"
            )))?;
        let residue = dividend.total.amount.saturating_sub(dividend.claimed_total);
        if residue > 0 {
            let company = equity
                .company_by_id(store, dividend.company_id)?
                .ok_or_else(|| Error::Invariant(format!(
                    "missing company {} for dividend {id}",
                    dividend.company_id
                )))?;
            equity.bank().transfer(
                store,
                &module_account(MODULE_DIVIDEND_ESCROW),
                &company.treasury_address,
                &Coin::new(dividend.total.denom.clone(), residue),
            )?;
        }
        dividend.settled = true;
        set_typed(store, &div_key(id), &dividend)?;
        store.delete(&index_key);

        // Snapshot and claimed markers are dead once settled.
        let mut snap_prefix = SNAP_PREFIX.to_vec();
        snap_prefix.extend_from_slice(&be_u64(id));
        for (k, _) in store.iter_prefix(&snap_prefix, false) {
            store.delete(&k);
        }
        let mut claimed_prefix = CLAIMED_PREFIX.to_vec();
        claimed_prefix.extend_from_slice(&be_u64(id));
        for (k, _) in store.iter_prefix(&claimed_prefix, false) {
            store.delete(&k);
        }

        events.emit(
            Event::new("equity", "dividend_expired")
                .attr("dividend_id", id)
                .attr("residue", residue),
        );
        info!(dividend_id = id, residue, "dividend expired");
    }
    Ok(())
}
