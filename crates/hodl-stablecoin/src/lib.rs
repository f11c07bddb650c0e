//! hodl-stablecoin
//!
//! The HODL collateralization engine: over-collateralized positions in the
//! native `ustake` asset back minted `uhodl`. Solvency is the root economic
//! invariant of the chain — every trade and fee settles in HODL.
//!
//! Key layout:
//!   hodl/pos/<addr20>  → CollateralPosition
//!   hodl/cursor        → last position key visited by the BeginBlock scan

pub mod position;

use hodl_bank::{module_account, Bank};
use hodl_core::coin::{Coin, DENOM_USTAKE};
use hodl_core::constants::{MODULE_FEE_COLLECTOR, MODULE_STABLECOIN, SECONDS_PER_YEAR};
use hodl_core::dec::{cross_ge, cross_lt, Dec};
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::params::StablecoinParams;
use hodl_core::types::{Address, Amount, Height, Timestamp};
use hodl_store::{get_typed, set_typed, Store};
use tracing::info;

pub use position::CollateralPosition;

const POS_PREFIX: &[u8] = b"hodl/pos/";
const CURSOR_KEY: &[u8] = b"hodl/cursor";

fn pos_key(owner: &Address) -> Vec<u8> {
    let mut k = POS_PREFIX.to_vec();
    k.extend_from_slice(owner.as_bytes());
    k
}

/// The stablecoin keeper.
#[derive(Clone)]
pub struct Stablecoin {
    bank: Bank,
}

impl Stablecoin {
    pub fn new(bank: Bank) -> Self {
        Self { bank }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn position<S: Store>(
        &self,
        store: &S,
        owner: &Address,
    ) -> Result<Option<CollateralPosition>, Error> {
        get_typed(store, &pos_key(owner))
    }

    /// All positions in owner byte order. Query and invariant paths.
    pub fn positions<S: Store>(&self, store: &S) -> Result<Vec<CollateralPosition>, Error> {
        store
            .iter_prefix(POS_PREFIX, false)
            .into_iter()
            .map(|(_, v)| hodl_store::codec::from_bytes(&v))
            .collect()
    }

    // ── Mint ─────────────────────────────────────────────────────────────────

    /// Lock `collateral_add` and mint `hodl_out` against the position.
    /// The post-state must satisfy `collateral × price ≥ (debt + fees) ×
    /// min_ratio`; fees count toward the liability so the solvency invariant
    /// survives accrual.
    #[allow(clippy::too_many_arguments)]
    pub fn mint<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &StablecoinParams,
        owner: &Address,
        collateral_add: Amount,
        hodl_out: Amount,
        height: Height,
        now: Timestamp,
    ) -> Result<(), Error> {
        let mut pos = self
            .position(store, owner)?
            .unwrap_or_else(|| CollateralPosition::empty(*owner, height, now));
        let created = pos.is_empty();
        accrue(&mut pos, params, height, now)?;

        if collateral_add > 0 {
            self.bank.transfer(
                store,
                owner,
                &module_account(MODULE_STABLECOIN),
                &Coin::new(DENOM_USTAKE, collateral_add),
            )?;
            pos.collateral = pos
                .collateral
                .checked_add(collateral_add)
                .ok_or(Error::Overflow)?;
        }

        if hodl_out > 0 {
            pos.debt = pos.debt.checked_add(hodl_out).ok_or(Error::Overflow)?;
            let mint_fee = params.mint_fee.mul_amount_floor(hodl_out)?;
            pos.accrued_fee = pos
                .accrued_fee
                .checked_add(mint_fee)
                .ok_or(Error::Overflow)?;
        }

        let liability = pos.liability()?;
        if cross_lt(pos.collateral, params.price, liability, params.min_ratio)? {
            return Err(Error::RatioBelowMin);
        }

        if hodl_out > 0 {
            self.bank.mint(store, owner, &Coin::uhodl(hodl_out))?;
        }
        self.put(store, &pos)?;

        events.emit(
            Event::new("stablecoin", if created { "position_opened" } else { "position_minted" })
                .attr("owner", owner)
                .attr("collateral_add", collateral_add)
                .attr("hodl_out", hodl_out)
                .attr("debt", pos.debt)
                .attr("accrued_fee", pos.accrued_fee),
        );
        info!(owner = %owner, debt = pos.debt, "hodl minted");
        Ok(())
    }

    // ── Burn ─────────────────────────────────────────────────────────────────

    /// Repay debt and withdraw collateral. `hodl_in` pays accrued fees first
    /// (routed to the fee collector), then principal (burned from supply).
    /// The burn fee is charged on `hodl_in` into the fee balance before the
    /// split. Rounding: all fee computations floor.
    #[allow(clippy::too_many_arguments)]
    pub fn burn<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &StablecoinParams,
        owner: &Address,
        hodl_in: Amount,
        collateral_withdraw: Amount,
        height: Height,
        now: Timestamp,
    ) -> Result<(), Error> {
        let mut pos = self
            .position(store, owner)?
            .ok_or_else(|| Error::PositionNotFound(owner.to_string()))?;
        accrue(&mut pos, params, height, now)?;

        if hodl_in > 0 {
            let burn_fee = params.burn_fee.mul_amount_floor(hodl_in)?;
            pos.accrued_fee = pos
                .accrued_fee
                .checked_add(burn_fee)
                .ok_or(Error::Overflow)?;

            let owed = pos.liability()?;
            if hodl_in > owed {
                return Err(Error::InsufficientDebt { debt: owed, got: hodl_in });
            }

            let fee_paid = hodl_in.min(pos.accrued_fee);
            let debt_paid = hodl_in - fee_paid;

            if fee_paid > 0 {
                self.bank.transfer(
                    store,
                    owner,
                    &module_account(MODULE_FEE_COLLECTOR),
                    &Coin::uhodl(fee_paid),
                )?;
                pos.accrued_fee -= fee_paid;
            }
            if debt_paid > 0 {
                self.bank.burn(store, owner, &Coin::uhodl(debt_paid))?;
                pos.debt -= debt_paid;
            }
        }

        if collateral_withdraw > 0 {
            if collateral_withdraw > pos.collateral {
                return Err(Error::InsufficientCollateral {
                    need: collateral_withdraw,
                    have: pos.collateral,
                });
            }
            pos.collateral -= collateral_withdraw;
            self.bank.transfer(
                store,
                &module_account(MODULE_STABLECOIN),
                owner,
                &Coin::new(DENOM_USTAKE, collateral_withdraw),
            )?;
        }

        let liability = pos.liability()?;
        if liability > 0
            && cross_lt(pos.collateral, params.price, liability, params.min_ratio)?
        {
            return Err(Error::RatioBelowMin);
        }

        if liability == 0 && pos.collateral == 0 {
            store.delete(&pos_key(owner));
            events.emit(
                Event::new("stablecoin", "position_closed").attr("owner", owner),
            );
            info!(owner = %owner, "position closed");
        } else {
            self.put(store, &pos)?;
            events.emit(
                Event::new("stablecoin", "position_burned")
                    .attr("owner", owner)
                    .attr("hodl_in", hodl_in)
                    .attr("collateral_withdraw", collateral_withdraw)
                    .attr("debt", pos.debt),
            );
        }
        Ok(())
    }

    // ── Liquidate ────────────────────────────────────────────────────────────

    /// Repay an under-collateralized position and seize collateral plus the
    /// liquidation penalty. Seizure rounds up (toward the liquidator) so
    /// repaid debt is always fully covered; the cap is the position's total
    /// collateral.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &StablecoinParams,
        liquidator: &Address,
        owner: &Address,
        hodl_in: Amount,
        height: Height,
        now: Timestamp,
    ) -> Result<(), Error> {
        let mut pos = self
            .position(store, owner)?
            .ok_or_else(|| Error::PositionNotFound(owner.to_string()))?;
        accrue(&mut pos, params, height, now)?;

        if cross_ge(pos.collateral, params.price, pos.debt, params.liquidation_ratio)? {
            return Err(Error::NotUndercollateralized(owner.to_string()));
        }

        let owed = pos.liability()?;
        let repay = hodl_in.min(owed);
        if repay == 0 {
            return Err(Error::ZeroAmount);
        }

        // Fees first (fee collector), then principal (burned).
        let fee_paid = repay.min(pos.accrued_fee);
        let debt_paid = repay - fee_paid;
        if fee_paid > 0 {
            self.bank.transfer(
                store,
                liquidator,
                &module_account(MODULE_FEE_COLLECTOR),
                &Coin::uhodl(fee_paid),
            )?;
            pos.accrued_fee -= fee_paid;
        }
        if debt_paid > 0 {
            self.bank.burn(store, liquidator, &Coin::uhodl(debt_paid))?;
            pos.debt -= debt_paid;
        }

        // Collateral covering the repaid value, plus the penalty, capped by
        // what the position holds.
        let base = params.price.div_amount_ceil(repay)?;
        let penalty = params.liquidation_penalty.mul_amount_ceil(base)?;
        let seized = base
            .checked_add(penalty)
            .ok_or(Error::Overflow)?
            .min(pos.collateral);
        pos.collateral -= seized;
        self.bank.transfer(
            store,
            &module_account(MODULE_STABLECOIN),
            liquidator,
            &Coin::new(DENOM_USTAKE, seized),
        )?;

        let closed = pos.liability()? == 0;
        if closed {
            // Fully repaid: any remaining collateral returns to the owner.
            if pos.collateral > 0 {
                self.bank.transfer(
                    store,
                    &module_account(MODULE_STABLECOIN),
                    owner,
                    &Coin::new(DENOM_USTAKE, pos.collateral),
                )?;
            }
            store.delete(&pos_key(owner));
        } else {
            self.put(store, &pos)?;
        }

        events.emit(
            Event::new("stablecoin", "position_liquidated")
                .attr("owner", owner)
                .attr("liquidator", liquidator)
                .attr("repaid", repay)
                .attr("seized", seized)
                .attr("closed", closed),
        );
        info!(owner = %owner, repaid = repay, seized, "position liquidated");
        Ok(())
    }

    // ── BeginBlock ───────────────────────────────────────────────────────────

    /// Bounded sweep over positions: accrue fees and flag any that have
    /// fallen under the liquidation ratio. The cursor persists across blocks
    /// so a large position set never exceeds one block's budget.
    pub fn begin_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &StablecoinParams,
        height: Height,
        now: Timestamp,
    ) -> Result<(), Error> {
        let cursor: Option<Vec<u8>> = get_typed(store, CURSOR_KEY)?;
        let all: Vec<(Vec<u8>, Vec<u8>)> = store.iter_prefix(POS_PREFIX, false);

        let start = match &cursor {
            Some(c) => all.partition_point(|(k, _)| k <= c),
            None => 0,
        };
        let budget = params.max_liquidations_per_block as usize;
        let visited = &all[start..(start + budget).min(all.len())];
        let finished_pass = start + visited.len() >= all.len();

        let mut last_key = None;
        for (k, v) in visited {
            let mut pos: CollateralPosition = hodl_store::codec::from_bytes(v)?;
            accrue(&mut pos, params, height, now)?;
            set_typed(store, k, &pos)?;
            if cross_lt(pos.collateral, params.price, pos.debt, params.liquidation_ratio)? {
                events.emit(
                    Event::new("stablecoin", "position_undercollateralized")
                        .attr("owner", pos.owner)
                        .attr("debt", pos.debt)
                        .attr("collateral", pos.collateral),
                );
            }
            last_key = Some(k.clone());
        }

        if finished_pass {
            // Pass complete: restart from the top next block.
            store.delete(CURSOR_KEY);
        } else if let Some(k) = last_key {
            set_typed(store, CURSOR_KEY, &k)?;
        }
        Ok(())
    }

    // ── Invariant ────────────────────────────────────────────────────────────

    /// Solvency: Σ (debt + fees) × min_ratio ≤ Σ collateral × price over all
    /// positions at or above the liquidation ratio. Checked in tests and by
    /// the pipeline's invariant sweep.
    pub fn assert_solvency<S: Store>(
        &self,
        store: &S,
        params: &StablecoinParams,
    ) -> Result<(), Error> {
        let mut healthy_liability: Amount = 0;
        let mut healthy_collateral: Amount = 0;
        for pos in self.positions(store)? {
            if cross_ge(pos.collateral, params.price, pos.debt, params.liquidation_ratio)? {
                healthy_liability = healthy_liability
                    .checked_add(pos.liability()?)
                    .ok_or(Error::Overflow)?;
                healthy_collateral = healthy_collateral
                    .checked_add(pos.collateral)
                    .ok_or(Error::Overflow)?;
            }
        }
        if cross_lt(healthy_collateral, params.price, healthy_liability, params.min_ratio)? {
            return Err(Error::Invariant(format!(
                "stablecoin insolvency: liability {healthy_liability} vs collateral {healthy_collateral}"
            )));
        }
        Ok(())
    }

    fn put<S: Store>(&self, store: &mut S, pos: &CollateralPosition) -> Result<(), Error> {
        set_typed(store, &pos_key(&pos.owner), pos)
    }
}

/// Lazy linear fee accrual: `Δfee = debt × rate × elapsed / year`.
///
/// Computed as `floor(debt × rate) × elapsed / year` so the intermediate
/// stays within u128; the truncation is at most `elapsed / year` base units.
fn accrue(
    pos: &mut CollateralPosition,
    params: &StablecoinParams,
    height: Height,
    now: Timestamp,
) -> Result<(), Error> {
    let elapsed = now.saturating_sub(pos.last_accrual_time);
    if elapsed > 0 && pos.debt > 0 && !params.stability_fee_rate.is_zero() {
        let per_year = params.stability_fee_rate.mul_amount_floor(pos.debt)?;
        let delta = per_year
            .checked_mul(elapsed as u128)
            .ok_or(Error::Overflow)?
            / SECONDS_PER_YEAR as u128;
        pos.accrued_fee = pos.accrued_fee.checked_add(delta).ok_or(Error::Overflow)?;
    }
    pos.last_accrual_height = height;
    pos.last_accrual_time = now;
    Ok(())
}

// Re-exported for tests that need direct accrual control.
#[doc(hidden)]
pub fn accrue_for_test(
    pos: &mut CollateralPosition,
    params: &StablecoinParams,
    height: Height,
    now: Timestamp,
) -> Result<(), Error> {
    accrue(pos, params, height, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::coin::DENOM_UHODL;
    use hodl_store::MemStore;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn setup(balance: Amount) -> (MemStore, Stablecoin, Bank, Address) {
        let mut store = MemStore::new();
        let bank = Bank::new();
        let owner = addr(1);
        bank.mint(&mut store, &owner, &Coin::new(DENOM_USTAKE, balance))
            .unwrap();
        (store, Stablecoin::new(bank.clone()), bank, owner)
    }

    fn params_price(p: Dec) -> StablecoinParams {
        StablecoinParams { price: p, ..Default::default() }
    }

    #[test]
    fn mint_locks_collateral_and_mints_hodl() {
        let (mut store, sc, bank, alice) = setup(2_000_000);
        let mut ev = EventManager::new();
        let params = params_price(Dec::from_ratio(3, 2));

        sc.mint(&mut store, &mut ev, &params, &alice, 2_000_000, 1_000_000, 1, 0)
            .unwrap();

        let pos = sc.position(&store, &alice).unwrap().unwrap();
        assert_eq!(pos.collateral, 2_000_000);
        assert_eq!(pos.debt, 1_000_000);
        assert_eq!(pos.accrued_fee, 1_000);
        assert_eq!(bank.balance(&store, &alice, DENOM_UHODL).unwrap(), 1_000_000);
        assert_eq!(bank.balance(&store, &alice, DENOM_USTAKE).unwrap(), 0);
        bank.assert_supply(&store).unwrap();
        sc.assert_solvency(&store, &params).unwrap();
    }

    #[test]
    fn mint_below_ratio_rejected() {
        let (mut store, sc, _, alice) = setup(2_000_000);
        let mut ev = EventManager::new();
        let params = params_price(Dec::ONE);
        // 2_000_000 collateral at price 1.0 supports at most 1_333_333 debt
        // at ratio 1.5; asking for 1_400_000 must fail.
        let err = sc
            .mint(&mut store, &mut ev, &params, &alice, 2_000_000, 1_400_000, 1, 0)
            .unwrap_err();
        assert!(matches!(err, Error::RatioBelowMin));
        assert!(sc.position(&store, &alice).unwrap().is_none());
    }

    #[test]
    fn mint_at_exact_ratio_accepted() {
        let (mut store, sc, _, alice) = setup(3_000_000);
        let mut ev = EventManager::new();
        // No fees so the boundary is exact: 3_000_000 × 1.0 = 2_000_000 × 1.5.
        let params = StablecoinParams {
            price: Dec::ONE,
            mint_fee: Dec::ZERO,
            ..Default::default()
        };
        sc.mint(&mut store, &mut ev, &params, &alice, 3_000_000, 2_000_000, 1, 0)
            .unwrap();
        // One more uhodl of debt breaks the boundary.
        let err = sc
            .mint(&mut store, &mut ev, &params, &alice, 0, 1, 1, 0)
            .unwrap_err();
        assert!(matches!(err, Error::RatioBelowMin));
    }

    #[test]
    fn mint_burn_round_trip_restores_balances() {
        let (mut store, sc, bank, alice) = setup(2_000_000);
        // Cover the accrued mint fee so the position can close.
        bank.mint(&mut store, &alice, &Coin::uhodl(1_000)).unwrap();
        let mut ev = EventManager::new();
        let params = StablecoinParams {
            price: Dec::from_ratio(3, 2),
            burn_fee: Dec::ZERO,
            ..Default::default()
        };

        sc.mint(&mut store, &mut ev, &params, &alice, 2_000_000, 1_000_000, 1, 0)
            .unwrap();
        sc.burn(&mut store, &mut ev, &params, &alice, 1_001_000, 2_000_000, 2, 0)
            .unwrap();

        assert!(sc.position(&store, &alice).unwrap().is_none());
        assert_eq!(bank.balance(&store, &alice, DENOM_USTAKE).unwrap(), 2_000_000);
        assert_eq!(bank.balance(&store, &alice, DENOM_UHODL).unwrap(), 0);
        bank.assert_supply(&store).unwrap();
    }

    #[test]
    fn burn_more_than_owed_rejected() {
        let (mut store, sc, bank, alice) = setup(2_000_000);
        bank.mint(&mut store, &alice, &Coin::uhodl(10_000)).unwrap();
        let mut ev = EventManager::new();
        let params = StablecoinParams {
            price: Dec::from_ratio(3, 2),
            burn_fee: Dec::ZERO,
            ..Default::default()
        };
        sc.mint(&mut store, &mut ev, &params, &alice, 2_000_000, 1_000_000, 1, 0)
            .unwrap();
        let err = sc
            .burn(&mut store, &mut ev, &params, &alice, 1_002_000, 0, 2, 0)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientDebt { .. }));
    }

    #[test]
    fn withdrawal_below_ratio_rejected() {
        let (mut store, sc, _, alice) = setup(2_000_000);
        let mut ev = EventManager::new();
        let params = params_price(Dec::from_ratio(3, 2));
        sc.mint(&mut store, &mut ev, &params, &alice, 2_000_000, 1_000_000, 1, 0)
            .unwrap();
        let err = sc
            .burn(&mut store, &mut ev, &params, &alice, 0, 1_500_000, 2, 0)
            .unwrap_err();
        assert!(matches!(err, Error::RatioBelowMin));
    }

    #[test]
    fn liquidation_seizes_with_penalty() {
        // Scenario: Bob {collateral 1_000_000, debt 700_000}, price 0.90.
        // Coverage 900_000 < 910_000 required → liquidatable.
        let mut store = MemStore::new();
        let bank = Bank::new();
        let sc = Stablecoin::new(bank.clone());
        let (bob, carol) = (addr(2), addr(3));
        let mut ev = EventManager::new();

        bank.mint(&mut store, &bob, &Coin::new(DENOM_USTAKE, 1_000_000))
            .unwrap();
        let open_params = StablecoinParams {
            price: Dec::from_ratio(3, 2),
            mint_fee: Dec::ZERO,
            ..Default::default()
        };
        sc.mint(&mut store, &mut ev, &open_params, &bob, 1_000_000, 700_000, 1, 0)
            .unwrap();

        // Price drops to 0.90; Carol repays the full debt.
        let params = StablecoinParams {
            price: Dec::from_ratio(9, 10),
            mint_fee: Dec::ZERO,
            ..Default::default()
        };
        bank.mint(&mut store, &carol, &Coin::uhodl(700_000)).unwrap();
        sc.liquidate(&mut store, &mut ev, &params, &carol, &bob, 700_000, 2, 0)
            .unwrap();

        // base = ceil(700_000 / 0.9) = 777_778; penalty = ceil(10%) = 77_778.
        assert_eq!(bank.balance(&store, &carol, DENOM_USTAKE).unwrap(), 855_556);
        assert_eq!(bank.balance(&store, &carol, DENOM_UHODL).unwrap(), 0);
        // Bob keeps the remainder.
        assert_eq!(bank.balance(&store, &bob, DENOM_USTAKE).unwrap(), 144_444);
        assert!(sc.position(&store, &bob).unwrap().is_none());
        bank.assert_supply(&store).unwrap();
    }

    #[test]
    fn healthy_position_cannot_be_liquidated() {
        let (mut store, sc, bank, alice) = setup(2_000_000);
        let mut ev = EventManager::new();
        let params = params_price(Dec::from_ratio(3, 2));
        sc.mint(&mut store, &mut ev, &params, &alice, 2_000_000, 1_000_000, 1, 0)
            .unwrap();

        let carol = addr(3);
        bank.mint(&mut store, &carol, &Coin::uhodl(1_000_000)).unwrap();
        let err = sc
            .liquidate(&mut store, &mut ev, &params, &carol, &alice, 1_000_000, 2, 0)
            .unwrap_err();
        assert!(matches!(err, Error::NotUndercollateralized(_)));
    }

    #[test]
    fn stability_fee_accrues_linearly() {
        let mut pos = CollateralPosition::empty(addr(1), 0, 0);
        pos.debt = 1_000_000_000;
        let params = StablecoinParams {
            stability_fee_rate: Dec::from_bps(500), // 5% APR
            ..Default::default()
        };
        // Half a year.
        accrue_for_test(&mut pos, &params, 100, SECONDS_PER_YEAR / 2).unwrap();
        assert_eq!(pos.accrued_fee, 25_000_000);
        assert_eq!(pos.last_accrual_time, SECONDS_PER_YEAR / 2);
    }

    #[test]
    fn begin_block_flags_undercollateralized() {
        let (mut store, sc, _, alice) = setup(2_000_000);
        let mut ev = EventManager::new();
        let open = params_price(Dec::from_ratio(3, 2));
        sc.mint(&mut store, &mut ev, &open, &alice, 2_000_000, 1_000_000, 1, 0)
            .unwrap();

        let dropped = params_price(Dec::from_ratio(1, 2));
        let mut ev = EventManager::new();
        sc.begin_block(&mut store, &mut ev, &dropped, 2, 12).unwrap();
        assert!(ev
            .events()
            .iter()
            .any(|e| e.ty == "position_undercollateralized"));
    }
}
