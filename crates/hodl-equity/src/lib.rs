//! hodl-equity
//!
//! Companies, share classes, and the live cap table. Shares are ordinary
//! bank denoms (`u<SYMBOL>`, `u<SYMBOL>.<class>`); the cap table is the
//! bank's holder index, and `outstanding` mirrors the denom supply. The
//! module contributes the bank's pre-transfer hook (share restrictions),
//! treasury withdrawal limits under fraud freeze warnings, dividend
//! distribution with record-height snapshots, and pro-rata delisting
//! compensation.
//!
//! Handlers assume the pipeline's cache semantics: on error every staged
//! write is discarded by the caller.
//!
//! Key layout:
//!   eq/company/<symbol>                → Company
//!   eq/id/<company_id be>              → symbol
//!   eq/juris/<addr20>                  → jurisdiction string
//!   eq/window/<symbol>                 → TreasuryWindow
//!   eq/div/<dividend_id be>            → Dividend
//!   eq/div_snap/<id be><addr20>        → Amount at record height
//!   eq/div_claimed/<id be><addr20>     → ()
//!   eq/div_expiry/<height be><id be>   → ()
//!   eq/delist/<symbol>                 → DelistRound
//!   eq/delist_claim/<symbol>/<addr20>  → Amount registered
//!   eq/delist_end/<height be><symbol>  → ()

pub mod dividend;
pub mod hook;
pub mod types;

use hodl_bank::{module_account, Bank};
use hodl_core::coin::Coin;
use hodl_core::constants::MODULE_DELIST_POOL;
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::msg::{FounderAllocation, ShareClassSpec};
use hodl_core::params::EquityParams;
use hodl_core::types::{Address, Amount, Height};
use hodl_store::keys::be_u64;
use hodl_store::{get_typed, next_id, set_typed, Store};
use tracing::info;

pub use hook::EquityHook;
pub use types::{Company, CompanyStatus, DelistRound, Dividend, ShareClass, TreasuryWindow};

const COMPANY_PREFIX: &[u8] = b"eq/company/";
const ID_PREFIX: &[u8] = b"eq/id/";
const JURIS_PREFIX: &[u8] = b"eq/juris/";
const WINDOW_PREFIX: &[u8] = b"eq/window/";
const DELIST_PREFIX: &[u8] = b"eq/delist/";
const DELIST_CLAIM_PREFIX: &[u8] = b"eq/delist_claim/";
const DELIST_END_PREFIX: &[u8] = b"eq/delist_end/";
const COMPANY_ID_COUNTER: &[u8] = b"eq/next_company_id";

pub(crate) fn company_key(symbol: &str) -> Vec<u8> {
    let mut k = COMPANY_PREFIX.to_vec();
    k.extend_from_slice(symbol.as_bytes());
    k
}

fn juris_key(addr: &Address) -> Vec<u8> {
    let mut k = JURIS_PREFIX.to_vec();
    k.extend_from_slice(addr.as_bytes());
    k
}

fn window_key(symbol: &str) -> Vec<u8> {
    let mut k = WINDOW_PREFIX.to_vec();
    k.extend_from_slice(symbol.as_bytes());
    k
}

fn delist_key(symbol: &str) -> Vec<u8> {
    let mut k = DELIST_PREFIX.to_vec();
    k.extend_from_slice(symbol.as_bytes());
    k
}

fn delist_claim_key(symbol: &str, addr: &Address) -> Vec<u8> {
    let mut k = DELIST_CLAIM_PREFIX.to_vec();
    k.extend_from_slice(symbol.as_bytes());
    k.push(b'/');
    k.extend_from_slice(addr.as_bytes());
    k
}

fn delist_end_key(height: Height, symbol: &str) -> Vec<u8> {
    let mut k = DELIST_END_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(height));
    k.extend_from_slice(symbol.as_bytes());
    k
}

/// View of the validator module's verification registry, injected at app
/// wiring so the dependency graph stays a DAG.
pub trait VerificationView: Send + Sync {
    /// Returns true when verification `id` is `approved` for `symbol`.
    fn is_approved(&self, store: &dyn Store, id: u64, symbol: &str) -> Result<bool, Error>;
}

/// The equity keeper.
#[derive(Clone)]
pub struct Equity {
    bank: Bank,
}

impl Equity {
    pub fn new(bank: Bank) -> Self {
        Self { bank }
    }

    pub(crate) fn bank(&self) -> &Bank {
        &self.bank
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn company<S: Store>(&self, store: &S, symbol: &str) -> Result<Option<Company>, Error> {
        get_typed(store, &company_key(symbol))
    }

    /// Trait-object variant for the transfer hook, which only holds a
    /// `&dyn Store`.
    pub fn company_dyn(&self, store: &dyn Store, symbol: &str) -> Result<Option<Company>, Error> {
        get_typed(store, &company_key(symbol))
    }

    pub fn jurisdiction_dyn(
        &self,
        store: &dyn Store,
        addr: &Address,
    ) -> Result<Option<String>, Error> {
        get_typed(store, &juris_key(addr))
    }

    pub fn company_by_id<S: Store>(&self, store: &S, id: u64) -> Result<Option<Company>, Error> {
        let mut k = ID_PREFIX.to_vec();
        k.extend_from_slice(&be_u64(id));
        let symbol: Option<String> = get_typed(store, &k)?;
        match symbol {
            Some(s) => self.company(store, &s),
            None => Ok(None),
        }
    }

    pub fn companies<S: Store>(&self, store: &S) -> Result<Vec<Company>, Error> {
        store
            .iter_prefix(COMPANY_PREFIX, false)
            .into_iter()
            .map(|(_, v)| hodl_store::codec::from_bytes(&v))
            .collect()
    }

    pub fn jurisdiction_of<S: Store>(
        &self,
        store: &S,
        addr: &Address,
    ) -> Result<Option<String>, Error> {
        get_typed(store, &juris_key(addr))
    }

    /// Register an account's jurisdiction (genesis and admin paths).
    pub fn set_jurisdiction<S: Store>(
        &self,
        store: &mut S,
        addr: &Address,
        jurisdiction: &str,
    ) -> Result<(), Error> {
        set_typed(store, &juris_key(addr), &jurisdiction.to_string())
    }

    // ── Create company ───────────────────────────────────────────────────────

    /// Reserve the symbol, record metadata, and mint founder shares. Requires
    /// an `approved` business verification matching the symbol.
    #[allow(clippy::too_many_arguments)]
    pub fn create_company<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        verifications: &dyn VerificationView,
        owner: &Address,
        verification_id: u64,
        symbol: &str,
        name: &str,
        jurisdiction: &str,
        classes: &[ShareClassSpec],
        founders: &[FounderAllocation],
        height: Height,
    ) -> Result<Company, Error> {
        if self.company(store, symbol)?.is_some() {
            return Err(Error::SymbolTaken(symbol.to_string()));
        }
        if !verifications.is_approved(store, verification_id, symbol)? {
            return Err(Error::VerificationNotApproved(verification_id));
        }

        let mut share_classes = Vec::with_capacity(classes.len());
        for spec in classes {
            if classes.iter().filter(|c| c.class_id == spec.class_id).count() > 1 {
                return Err(Error::Decode(format!(
                    "duplicate share class {}",
                    spec.class_id
                )));
            }
            share_classes.push(ShareClass {
                class_id: spec.class_id.clone(),
                denom: ShareClass::denom_for(symbol, &spec.class_id),
                authorized: spec.authorized,
                outstanding: 0,
                voting_weight: spec.voting_weight,
                restrictions: spec.restrictions.clone(),
            });
        }

        let id = next_id(store, COMPANY_ID_COUNTER)?;
        let mut company = Company {
            id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            jurisdiction: jurisdiction.to_string(),
            status: CompanyStatus::Listed,
            owner: *owner,
            treasury_address: *owner,
            freeze_warning: false,
            verification_id,
            classes: share_classes,
            created_at: height,
        };

        // Founder allocations are the initial outstanding shares.
        for f in founders {
            let class = company
                .class_mut(&f.class_id)
                .ok_or_else(|| Error::UnknownShareClass {
                    symbol: symbol.to_string(),
                    class: f.class_id.clone(),
                })?;
            let new_outstanding = class
                .outstanding
                .checked_add(f.shares)
                .ok_or(Error::Overflow)?;
            if new_outstanding > class.authorized {
                return Err(Error::ExceedsAuthorized {
                    authorized: class.authorized,
                    outstanding: class.outstanding,
                    requested: f.shares,
                });
            }
            class.outstanding = new_outstanding;
            let denom = class.denom.clone();
            self.bank
                .mint(store, &f.address, &Coin::new(denom, f.shares))?;
        }

        self.put(store, &company)?;
        let mut idk = ID_PREFIX.to_vec();
        idk.extend_from_slice(&be_u64(id));
        set_typed(store, &idk, &company.symbol)?;

        events.emit(
            Event::new("equity", "company_created")
                .attr("symbol", symbol)
                .attr("company_id", id)
                .attr("owner", owner)
                .attr("verification_id", verification_id),
        );
        info!(symbol, company_id = id, "company created");
        Ok(company)
    }

    // ── Issue shares ─────────────────────────────────────────────────────────

    /// Mint additional shares of an existing class, capped by `authorized`.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_shares<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        signer: &Address,
        symbol: &str,
        class_id: &str,
        to: &Address,
        shares: Amount,
    ) -> Result<(), Error> {
        let mut company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        if company.owner != *signer {
            return Err(Error::NotCompanyOwner);
        }
        if company.status != CompanyStatus::Listed {
            return Err(Error::CompanyNotListed(symbol.to_string()));
        }
        let class = company
            .class_mut(class_id)
            .ok_or_else(|| Error::UnknownShareClass {
                symbol: symbol.to_string(),
                class: class_id.to_string(),
            })?;
        let new_outstanding = class
            .outstanding
            .checked_add(shares)
            .ok_or(Error::Overflow)?;
        if new_outstanding > class.authorized {
            return Err(Error::ExceedsAuthorized {
                authorized: class.authorized,
                outstanding: class.outstanding,
                requested: shares,
            });
        }
        class.outstanding = new_outstanding;
        let denom = class.denom.clone();
        self.bank.mint(store, to, &Coin::new(denom, shares))?;
        self.put(store, &company)?;

        events.emit(
            Event::new("equity", "shares_issued")
                .attr("symbol", symbol)
                .attr("class", class_id)
                .attr("to", to)
                .attr("shares", shares),
        );
        Ok(())
    }

    /// Mint reward shares to a protocol account (validator vesting), capped
    /// at the class's authorized headroom. Returns the amount actually
    /// granted. No owner check: reachable only from the app's verification
    /// reward path.
    pub fn grant_reward_shares<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
        class_id: &str,
        to: &Address,
        shares: Amount,
    ) -> Result<Amount, Error> {
        let mut company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        let class = company
            .class_mut(class_id)
            .ok_or_else(|| Error::UnknownShareClass {
                symbol: symbol.to_string(),
                class: class_id.to_string(),
            })?;
        let headroom = class.authorized - class.outstanding;
        let granted = shares.min(headroom);
        if granted == 0 {
            return Ok(0);
        }
        class.outstanding += granted;
        let denom = class.denom.clone();
        self.bank.mint(store, to, &Coin::new(denom, granted))?;
        self.put(store, &company)?;
        events.emit(
            Event::new("equity", "reward_shares_granted")
                .attr("symbol", symbol)
                .attr("class", class_id)
                .attr("to", to)
                .attr("shares", granted),
        );
        Ok(granted)
    }

    /// Burn clawed-back shares held by a protocol account and shrink the cap
    /// table accordingly. Fraud-slash path.
    pub fn clawback_shares<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        denom: &str,
        from: &Address,
        shares: Amount,
    ) -> Result<(), Error> {
        let Some(symbol) = hook::symbol_of_share_denom(denom) else {
            return Err(Error::InvalidDenom(denom.to_string()));
        };
        let mut company = self
            .company(store, &symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.clone()))?;
        let class = company
            .classes
            .iter_mut()
            .find(|c| c.denom == denom)
            .ok_or_else(|| Error::UnknownShareClass {
                symbol: symbol.clone(),
                class: denom.to_string(),
            })?;
        self.bank.burn(store, from, &Coin::new(denom, shares))?;
        class.outstanding = class
            .outstanding
            .checked_sub(shares)
            .ok_or_else(|| Error::Invariant(format!("outstanding underflow for {denom}")))?;
        self.put(store, &company)?;
        events.emit(
            Event::new("equity", "shares_clawed_back")
                .attr("denom", denom)
                .attr("shares", shares),
        );
        Ok(())
    }

    /// Raise a class's authorized cap. Only reachable through a passed
    /// `increase_authorized` proposal.
    pub fn increase_authorized<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
        class_id: &str,
        new_authorized: Amount,
    ) -> Result<(), Error> {
        let mut company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        let class = company
            .class_mut(class_id)
            .ok_or_else(|| Error::UnknownShareClass {
                symbol: symbol.to_string(),
                class: class_id.to_string(),
            })?;
        if new_authorized < class.outstanding {
            return Err(Error::ExceedsAuthorized {
                authorized: new_authorized,
                outstanding: class.outstanding,
                requested: 0,
            });
        }
        class.authorized = new_authorized;
        self.put(store, &company)?;
        events.emit(
            Event::new("equity", "authorized_increased")
                .attr("symbol", symbol)
                .attr("class", class_id)
                .attr("authorized", new_authorized),
        );
        Ok(())
    }

    // ── Share transfers & treasury limits ────────────────────────────────────

    /// Transfer shares. Transfers out of a company treasury under an active
    /// freeze warning are bounded: one withdrawal ≤ `withdrawal_single_bps`
    /// of the current treasury balance, and the rolling height-window total ≤
    /// `withdrawal_daily_bps` of the balance at window start.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer_shares<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &EquityParams,
        from: &Address,
        to: &Address,
        denom: &str,
        shares: Amount,
        height: Height,
    ) -> Result<(), Error> {
        if let Some(symbol) = hook::symbol_of_share_denom(denom) {
            if let Some(company) = self.company(store, &symbol)? {
                if company.freeze_warning && company.treasury_address == *from {
                    self.check_treasury_limits(store, params, &company, denom, shares, height)?;
                }
            }
        }
        self.bank
            .send(store, from, to, &Coin::new(denom, shares), height)?;
        events.emit(
            Event::new("equity", "shares_transferred")
                .attr("denom", denom)
                .attr("from", from)
                .attr("to", to)
                .attr("shares", shares),
        );
        Ok(())
    }

    fn check_treasury_limits<S: Store>(
        &self,
        store: &mut S,
        params: &EquityParams,
        company: &Company,
        denom: &str,
        shares: Amount,
        height: Height,
    ) -> Result<(), Error> {
        let balance = self
            .bank
            .balance(store, &company.treasury_address, denom)?;

        let single_cap = balance * params.withdrawal_single_bps as u128 / 10_000;
        if shares > single_cap {
            return Err(Error::TreasuryLimitExceeded(format!(
                "single withdrawal {shares} exceeds cap {single_cap}"
            )));
        }

        let key = window_key(&company.symbol);
        let mut window: TreasuryWindow = get_typed(store, &key)?.unwrap_or(TreasuryWindow {
            window_start: height,
            start_balance: balance,
            withdrawn: 0,
        });
        if height.saturating_sub(window.window_start) >= params.blocks_per_day {
            window = TreasuryWindow {
                window_start: height,
                start_balance: balance,
                withdrawn: 0,
            };
        }
        let daily_cap = window.start_balance * params.withdrawal_daily_bps as u128 / 10_000;
        let after = window.withdrawn.checked_add(shares).ok_or(Error::Overflow)?;
        if after > daily_cap {
            return Err(Error::TreasuryLimitExceeded(format!(
                "rolling window total {after} exceeds cap {daily_cap}"
            )));
        }
        window.withdrawn = after;
        set_typed(store, &key, &window)
    }

    /// Toggle a company's fraud freeze warning (governance / council path).
    pub fn set_freeze_warning<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
        active: bool,
    ) -> Result<(), Error> {
        let mut company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        company.freeze_warning = active;
        self.put(store, &company)?;
        events.emit(
            Event::new("equity", "freeze_warning")
                .attr("symbol", symbol)
                .attr("active", active),
        );
        Ok(())
    }

    /// Company-scoped governance parameter. Currently the freeze warning and
    /// the halted flag route through here.
    pub fn set_company_parameter<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        match key {
            "freeze_warning" => {
                let active: bool = value
                    .parse()
                    .map_err(|_| Error::Decode(format!("invalid bool: {value}")))?;
                self.set_freeze_warning(store, events, symbol, active)
            }
            "halted" => {
                let halted: bool = value
                    .parse()
                    .map_err(|_| Error::Decode(format!("invalid bool: {value}")))?;
                let mut company = self
                    .company(store, symbol)?
                    .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
                company.status = if halted {
                    CompanyStatus::Halted
                } else {
                    CompanyStatus::Listed
                };
                self.put(store, &company)?;
                Ok(())
            }
            _ => Err(Error::Decode(format!("unknown company parameter {key}"))),
        }
    }

    // ── Listing / delisting ──────────────────────────────────────────────────

    /// Re-list a halted company (governance path).
    pub fn list_company<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        symbol: &str,
    ) -> Result<(), Error> {
        let mut company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        company.status = CompanyStatus::Listed;
        self.put(store, &company)?;
        events.emit(Event::new("equity", "company_listed").attr("symbol", symbol));
        Ok(())
    }

    /// Forcibly delist a company and, when funded, open a compensation round.
    /// The pool splits by *registered* claims at window end, not first-come.
    pub fn delist_company<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &EquityParams,
        symbol: &str,
        compensation: Option<Coin>,
        funding_source: &Address,
        height: Height,
    ) -> Result<(), Error> {
        let mut company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        company.status = CompanyStatus::Delisted;
        self.put(store, &company)?;

        if let Some(pool) = compensation {
            self.bank.transfer(
                store,
                funding_source,
                &module_account(MODULE_DELIST_POOL),
                &pool,
            )?;
            let window_end = height + params.delist_claim_window_blocks;
            let round = DelistRound {
                symbol: symbol.to_string(),
                pool,
                window_end,
                total_registered: 0,
            };
            set_typed(store, &delist_key(symbol), &round)?;
            set_typed(store, &delist_end_key(window_end, symbol), &())?;
        }

        events.emit(Event::new("equity", "company_delisted").attr("symbol", symbol));
        info!(symbol, "company delisted");
        Ok(())
    }

    /// Register a holder's shares in an open compensation round.
    pub fn register_delist_claim<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        holder: &Address,
        symbol: &str,
        height: Height,
    ) -> Result<(), Error> {
        let company = self
            .company(store, symbol)?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        let mut round: DelistRound = get_typed(store, &delist_key(symbol))?
            .ok_or_else(|| Error::CompanyNotFound(symbol.to_string()))?;
        if height >= round.window_end {
            return Err(Error::ClaimWindowClosed(company.id));
        }
        let claim_key = delist_claim_key(symbol, holder);
        if store.has(&claim_key) {
            return Err(Error::AlreadyClaimed);
        }

        // Total holdings across every class of the company.
        let mut shares: Amount = 0;
        for class in &company.classes {
            shares = shares
                .checked_add(self.bank.balance(store, holder, &class.denom)?)
                .ok_or(Error::Overflow)?;
        }
        if shares == 0 {
            return Err(Error::NoDividendEntitlement(company.id));
        }

        set_typed(store, &claim_key, &shares)?;
        round.total_registered = round
            .total_registered
            .checked_add(shares)
            .ok_or(Error::Overflow)?;
        set_typed(store, &delist_key(symbol), &round)?;

        events.emit(
            Event::new("equity", "delist_claim_registered")
                .attr("symbol", symbol)
                .attr("holder", holder)
                .attr("shares", shares),
        );
        Ok(())
    }

    // ── EndBlock ─────────────────────────────────────────────────────────────

    /// Settle matured delisting rounds and expire dividends whose windows end
    /// at this height.
    pub fn end_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        height: Height,
    ) -> Result<(), Error> {
        self.settle_delist_rounds(store, events, height)?;
        dividend::expire_dividends(self, store, events, height)
    }

    fn settle_delist_rounds<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        height: Height,
    ) -> Result<(), Error> {
        let mut due = Vec::new();
        for (k, _) in store.iter_prefix(DELIST_END_PREFIX, false) {
            let h_bytes = &k[DELIST_END_PREFIX.len()..DELIST_END_PREFIX.len() + 8];
            let h = u64::from_be_bytes(h_bytes.try_into().expect("8-byte height"));
            if h > height {
                break;
            }
            let symbol =
                String::from_utf8(k[DELIST_END_PREFIX.len() + 8..].to_vec())
                    .map_err(|e| Error::Invariant(e.to_string()))?;
            due.push((k, symbol));
        }

        for (index_key, symbol) in due {
            let round: DelistRound = get_typed(store, &delist_key(&symbol))?
                .ok_or_else(|| Error::Invariant(format!("missing delist round {symbol}")))?;
            let pool_account = module_account(MODULE_DELIST_POOL);

            let claim_prefix = {
                let mut p = DELIST_CLAIM_PREFIX.to_vec();
                p.extend_from_slice(symbol.as_bytes());
                p.push(b'/');
                p
            };
            let mut paid: Amount = 0;
            for (ck, cv) in store.iter_prefix(&claim_prefix, false) {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(&ck[claim_prefix.len()..]);
                let holder = Address::from_bytes(arr);
                let shares: Amount = hodl_store::codec::from_bytes(&cv)?;

                // payout = pool × holder_shares / Σ registered_shares, floor.
                let payout = round
                    .pool
                    .amount
                    .checked_mul(shares)
                    .ok_or(Error::Overflow)?
                    / round.total_registered.max(1);
                if payout > 0 {
                    self.bank.transfer(
                        store,
                        &pool_account,
                        &holder,
                        &Coin::new(round.pool.denom.clone(), payout),
                    )?;
                    paid = paid.checked_add(payout).ok_or(Error::Overflow)?;
                }
                store.delete(&ck);
                events.emit(
                    Event::new("equity", "delist_compensation_paid")
                        .attr("symbol", &symbol)
                        .attr("holder", holder)
                        .attr("amount", payout),
                );
            }

            // Rounding dust returns to the community treasury.
            let dust = round.pool.amount.saturating_sub(paid);
            if dust > 0 {
                self.bank.transfer(
                    store,
                    &pool_account,
                    &module_account(hodl_core::constants::MODULE_TREASURY),
                    &Coin::new(round.pool.denom.clone(), dust),
                )?;
            }

            store.delete(&delist_key(&symbol));
            store.delete(&index_key);
            info!(symbol, paid, "delist compensation settled");
        }
        Ok(())
    }

    // ── Invariant ────────────────────────────────────────────────────────────

    /// Cap table: for every class, outstanding ≤ authorized and outstanding
    /// equals the bank supply of the class denom.
    pub fn assert_cap_table<S: Store>(&self, store: &S) -> Result<(), Error> {
        for company in self.companies(store)? {
            for class in &company.classes {
                if class.outstanding > class.authorized {
                    return Err(Error::Invariant(format!(
                        "{}/{}: outstanding {} exceeds authorized {}",
                        company.symbol, class.class_id, class.outstanding, class.authorized
                    )));
                }
                let supply = self.bank.supply(store, &class.denom)?;
                if supply != class.outstanding {
                    return Err(Error::Invariant(format!(
                        "{}/{}: outstanding {} but supply {}",
                        company.symbol, class.class_id, class.outstanding, supply
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn put<S: Store>(&self, store: &mut S, company: &Company) -> Result<(), Error> {
        set_typed(store, &company_key(&company.symbol), company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::dec::Dec;
    use hodl_core::msg::TransferRestriction;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    struct AlwaysApproved;
    impl VerificationView for AlwaysApproved {
        fn is_approved(&self, _store: &dyn Store, _id: u64, _symbol: &str) -> Result<bool, Error> {
            Ok(true)
        }
    }

    struct NeverApproved;
    impl VerificationView for NeverApproved {
        fn is_approved(&self, _store: &dyn Store, _id: u64, _symbol: &str) -> Result<bool, Error> {
            Ok(false)
        }
    }

    fn common_class(authorized: Amount) -> ShareClassSpec {
        ShareClassSpec {
            class_id: "common".into(),
            authorized,
            voting_weight: Dec::ONE,
            restrictions: vec![],
        }
    }

    fn setup_company(
        store: &mut hodl_store::MemStore,
        equity: &Equity,
        founders: &[(Address, Amount)],
        authorized: Amount,
    ) -> Company {
        let mut ev = EventManager::new();
        let allocations: Vec<FounderAllocation> = founders
            .iter()
            .map(|(a, s)| FounderAllocation {
                address: *a,
                class_id: "common".into(),
                shares: *s,
            })
            .collect();
        equity
            .create_company(
                store,
                &mut ev,
                &AlwaysApproved,
                &addr(1),
                1,
                "ACME",
                "Acme Corp",
                "US",
                &[common_class(authorized)],
                &allocations,
                10,
            )
            .unwrap()
    }

    #[test]
    fn create_company_mints_founder_shares() {
        let mut store = hodl_store::MemStore::new();
        let bank = Bank::new();
        let equity = Equity::new(bank.clone());

        let company = setup_company(&mut store, &equity, &[(addr(2), 600), (addr(3), 400)], 2_000);
        assert_eq!(company.id, 1);
        assert_eq!(company.classes[0].outstanding, 1_000);
        assert_eq!(bank.balance(&store, &addr(2), "uACME").unwrap(), 600);
        equity.assert_cap_table(&store).unwrap();
    }

    #[test]
    fn create_requires_approved_verification() {
        let mut store = hodl_store::MemStore::new();
        let equity = Equity::new(Bank::new());
        let mut ev = EventManager::new();
        let err = equity
            .create_company(
                &mut store,
                &mut ev,
                &NeverApproved,
                &addr(1),
                7,
                "ACME",
                "Acme Corp",
                "US",
                &[common_class(1_000)],
                &[],
                10,
            )
            .unwrap_err();
        assert!(matches!(err, Error::VerificationNotApproved(7)));
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let mut store = hodl_store::MemStore::new();
        let equity = Equity::new(Bank::new());
        setup_company(&mut store, &equity, &[], 1_000);
        let mut ev = EventManager::new();
        let err = equity
            .create_company(
                &mut store,
                &mut ev,
                &AlwaysApproved,
                &addr(9),
                2,
                "ACME",
                "Other Acme",
                "US",
                &[common_class(1_000)],
                &[],
                11,
            )
            .unwrap_err();
        assert!(matches!(err, Error::SymbolTaken(_)));
    }

    #[test]
    fn issuance_bounded_by_authorized() {
        let mut store = hodl_store::MemStore::new();
        let equity = Equity::new(Bank::new());
        setup_company(&mut store, &equity, &[(addr(2), 900)], 1_000);
        let mut ev = EventManager::new();

        equity
            .issue_shares(&mut store, &mut ev, &addr(1), "ACME", "common", &addr(4), 100)
            .unwrap();
        let err = equity
            .issue_shares(&mut store, &mut ev, &addr(1), "ACME", "common", &addr(4), 1)
            .unwrap_err();
        assert!(matches!(err, Error::ExceedsAuthorized { .. }));
        equity.assert_cap_table(&store).unwrap();
    }

    #[test]
    fn only_owner_issues() {
        let mut store = hodl_store::MemStore::new();
        let equity = Equity::new(Bank::new());
        setup_company(&mut store, &equity, &[], 1_000);
        let mut ev = EventManager::new();
        let err = equity
            .issue_shares(&mut store, &mut ev, &addr(5), "ACME", "common", &addr(4), 1)
            .unwrap_err();
        assert!(matches!(err, Error::NotCompanyOwner));
    }

    #[test]
    fn increase_authorized_cannot_undercut_outstanding() {
        let mut store = hodl_store::MemStore::new();
        let equity = Equity::new(Bank::new());
        setup_company(&mut store, &equity, &[(addr(2), 500)], 1_000);
        let mut ev = EventManager::new();
        let err = equity
            .increase_authorized(&mut store, &mut ev, "ACME", "common", 400)
            .unwrap_err();
        assert!(matches!(err, Error::ExceedsAuthorized { .. }));
        equity
            .increase_authorized(&mut store, &mut ev, "ACME", "common", 5_000)
            .unwrap();
    }

    #[test]
    fn treasury_limits_under_freeze_warning() {
        let mut store = hodl_store::MemStore::new();
        let equity = Equity::new(Bank::new());
        // Owner (addr 1) is the treasury; give it 1_000 shares.
        setup_company(&mut store, &equity, &[(addr(1), 1_000)], 2_000);
        let mut ev = EventManager::new();
        equity
            .set_freeze_warning(&mut store, &mut ev, "ACME", true)
            .unwrap();
        let params = EquityParams::default();

        // Single cap: 10% of 1_000 = 100.
        let err = equity
            .transfer_shares(&mut store, &mut ev, &params, &addr(1), &addr(2), "uACME", 101, 100)
            .unwrap_err();
        assert!(matches!(err, Error::TreasuryLimitExceeded(_)));

        // Two withdrawals of 100 fit the 20% daily cap; the third does not.
        equity
            .transfer_shares(&mut store, &mut ev, &params, &addr(1), &addr(2), "uACME", 100, 100)
            .unwrap();
        equity
            .transfer_shares(&mut store, &mut ev, &params, &addr(1), &addr(2), "uACME", 90, 101)
            .unwrap();
        let err = equity
            .transfer_shares(&mut store, &mut ev, &params, &addr(1), &addr(2), "uACME", 50, 102)
            .unwrap_err();
        assert!(matches!(err, Error::TreasuryLimitExceeded(_)));

        // After a day the window resets.
        equity
            .transfer_shares(
                &mut store,
                &mut ev,
                &params,
                &addr(1),
                &addr(2),
                "uACME",
                50,
                100 + params.blocks_per_day,
            )
            .unwrap();
    }

    #[test]
    fn transfer_hook_enforces_vesting_cliff() {
        let mut store = hodl_store::MemStore::new();
        let mut bank = Bank::new();
        let equity = Equity::new(bank.clone());

        let mut ev = EventManager::new();
        equity
            .create_company(
                &mut store,
                &mut ev,
                &AlwaysApproved,
                &addr(1),
                1,
                "ACME",
                "Acme Corp",
                "US",
                &[ShareClassSpec {
                    class_id: "common".into(),
                    authorized: 1_000,
                    voting_weight: Dec::ONE,
                    restrictions: vec![TransferRestriction::VestingCliff { until_height: 500 }],
                }],
                &[FounderAllocation {
                    address: addr(2),
                    class_id: "common".into(),
                    shares: 100,
                }],
                10,
            )
            .unwrap();

        bank.add_hook(std::sync::Arc::new(EquityHook::new(equity.clone())));
        let coin = Coin::new("uACME", 10);
        let err = bank.send(&mut store, &addr(2), &addr(3), &coin, 499).unwrap_err();
        assert!(matches!(err, Error::TransferRestricted(_)));
        bank.send(&mut store, &addr(2), &addr(3), &coin, 500).unwrap();
    }

    #[test]
    fn dividend_pro_rata_and_double_claim() {
        // Scenario: outstanding 1_000 (alice 600, bob 300, carol 100),
        // dividend 10_000 uhodl → 6_000 / 3_000 / 1_000.
        let mut store = hodl_store::MemStore::new();
        let bank = Bank::new();
        let equity = Equity::new(bank.clone());
        let (alice, bob, carol) = (addr(2), addr(3), addr(4));
        setup_company(
            &mut store,
            &equity,
            &[(alice, 600), (bob, 300), (carol, 100)],
            2_000,
        );
        bank.mint(&mut store, &addr(1), &Coin::uhodl(10_000)).unwrap();

        let mut ev = EventManager::new();
        let id = dividend::declare(
            &equity,
            &mut store,
            &mut ev,
            &addr(1),
            "ACME",
            "common",
            Coin::uhodl(10_000),
            20,
            1_000,
            10,
        )
        .unwrap();

        // Not payable before pay_height.
        let err = dividend::claim(&equity, &mut store, &mut ev, &alice, id, 19).unwrap_err();
        assert!(matches!(err, Error::DividendNotPayable { .. }));

        assert_eq!(dividend::claim(&equity, &mut store, &mut ev, &alice, id, 20).unwrap(), 6_000);
        assert_eq!(dividend::claim(&equity, &mut store, &mut ev, &bob, id, 21).unwrap(), 3_000);
        assert_eq!(dividend::claim(&equity, &mut store, &mut ev, &carol, id, 21).unwrap(), 1_000);

        let err = dividend::claim(&equity, &mut store, &mut ev, &alice, id, 22).unwrap_err();
        assert!(matches!(err, Error::AlreadyClaimed));
        bank.assert_supply(&store).unwrap();
    }

    #[test]
    fn dividend_residue_returns_to_treasury() {
        let mut store = hodl_store::MemStore::new();
        let bank = Bank::new();
        let equity = Equity::new(bank.clone());
        let alice = addr(2);
        setup_company(&mut store, &equity, &[(alice, 600), (addr(3), 400)], 2_000);
        bank.mint(&mut store, &addr(1), &Coin::uhodl(10_000)).unwrap();

        let mut ev = EventManager::new();
        let id = dividend::declare(
            &equity,
            &mut store,
            &mut ev,
            &addr(1),
            "ACME",
            "common",
            Coin::uhodl(10_000),
            20,
            100,
            10,
        )
        .unwrap();
        assert_eq!(dividend::claim(&equity, &mut store, &mut ev, &alice, id, 20).unwrap(), 6_000);

        // Expiry at exactly height 100 settles in that EndBlock.
        equity.end_block(&mut store, &mut ev, 99).unwrap();
        assert!(!dividend::dividend(&store, id).unwrap().unwrap().settled);
        equity.end_block(&mut store, &mut ev, 100).unwrap();
        let d = dividend::dividend(&store, id).unwrap().unwrap();
        assert!(d.settled);
        // 4_000 unclaimed back to the treasury (owner).
        assert_eq!(
            bank.balance(&store, &addr(1), hodl_core::coin::DENOM_UHODL).unwrap(),
            4_000
        );
        let err = dividend::claim(&equity, &mut store, &mut ev, &addr(3), id, 101).unwrap_err();
        assert!(matches!(err, Error::DividendExpired(_)));
    }

    #[test]
    fn delist_round_splits_by_registration() {
        let mut store = hodl_store::MemStore::new();
        let bank = Bank::new();
        let equity = Equity::new(bank.clone());
        let (alice, bob) = (addr(2), addr(3));
        setup_company(&mut store, &equity, &[(alice, 750), (bob, 250)], 2_000);

        // Fund the compensation pool from the community treasury.
        let treasury = module_account(hodl_core::constants::MODULE_TREASURY);
        bank.mint(&mut store, &treasury, &Coin::uhodl(100_000)).unwrap();

        let params = EquityParams { delist_claim_window_blocks: 100, ..Default::default() };
        let mut ev = EventManager::new();
        equity
            .delist_company(
                &mut store,
                &mut ev,
                &params,
                "ACME",
                Some(Coin::uhodl(100_000)),
                &treasury,
                10,
            )
            .unwrap();

        equity
            .register_delist_claim(&mut store, &mut ev, &alice, "ACME", 50)
            .unwrap();
        equity
            .register_delist_claim(&mut store, &mut ev, &bob, "ACME", 60)
            .unwrap();
        let err = equity
            .register_delist_claim(&mut store, &mut ev, &alice, "ACME", 70)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyClaimed));

        // Window closes at height 110; settlement in that EndBlock.
        equity.end_block(&mut store, &mut ev, 110).unwrap();
        assert_eq!(
            bank.balance(&store, &alice, hodl_core::coin::DENOM_UHODL).unwrap(),
            75_000
        );
        assert_eq!(
            bank.balance(&store, &bob, hodl_core::coin::DENOM_UHODL).unwrap(),
            25_000
        );
        bank.assert_supply(&store).unwrap();
    }

    #[test]
    fn late_delist_claim_rejected() {
        let mut store = hodl_store::MemStore::new();
        let bank = Bank::new();
        let equity = Equity::new(bank.clone());
        setup_company(&mut store, &equity, &[(addr(2), 100)], 1_000);
        let treasury = module_account(hodl_core::constants::MODULE_TREASURY);
        bank.mint(&mut store, &treasury, &Coin::uhodl(1_000)).unwrap();

        let params = EquityParams { delist_claim_window_blocks: 100, ..Default::default() };
        let mut ev = EventManager::new();
        equity
            .delist_company(&mut store, &mut ev, &params, "ACME", Some(Coin::uhodl(1_000)), &treasury, 10)
            .unwrap();
        let err = equity
            .register_delist_claim(&mut store, &mut ev, &addr(2), "ACME", 110)
            .unwrap_err();
        assert!(matches!(err, Error::ClaimWindowClosed(_)));
    }
}
