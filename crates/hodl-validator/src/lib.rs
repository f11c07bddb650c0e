//! hodl-validator
//!
//! Stake-derived validator tiers, the business-verification state machine,
//! reputation scoring with idle decay, vesting equity rewards, and slashing.
//! Equity reward issuance is orchestrated by the app against the equity
//! module so the cap table stays authoritative; this module records the
//! vesting schedules and releases matured tranches each epoch.
//!
//! Key layout:
//!   val/v/<addr20>                  → Validator
//!   val/verif/<be id>               → BusinessVerification
//!   val/deadline/<be height><be id> → ()
//!   val/vest/<be id>                → VestingAccount
//!   val/vest_by/<addr20><be id>     → ()
//!   val/vest_cursor                 → last key visited by the release sweep

pub mod types;

use hodl_bank::{module_account, Bank};
use hodl_core::coin::Coin;
use hodl_core::constants::{MODULE_INSURANCE, MODULE_VALIDATOR_BOND};
use hodl_core::dec::Dec;
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::params::ValidatorParams;
use hodl_core::tier::Tier;
use hodl_core::types::{Address, Amount, Height};
use hodl_store::keys::be_u64;
use hodl_store::{get_typed, next_id, set_typed, Store};
use tracing::info;

pub use types::{
    required_tier_for_valuation, BusinessVerification, Validator, VerificationStatus,
    VerificationVote, VestingAccount,
};

const VAL_PREFIX: &[u8] = b"val/v/";
const VERIF_PREFIX: &[u8] = b"val/verif/";
const DEADLINE_PREFIX: &[u8] = b"val/deadline/";
const VEST_PREFIX: &[u8] = b"val/vest/";
const VEST_BY_PREFIX: &[u8] = b"val/vest_by/";
const VEST_CURSOR_KEY: &[u8] = b"val/vest_cursor";
const VERIF_ID_COUNTER: &[u8] = b"val/next_verification_id";
const VEST_ID_COUNTER: &[u8] = b"val/next_vesting_id";

fn val_key(operator: &Address) -> Vec<u8> {
    let mut k = VAL_PREFIX.to_vec();
    k.extend_from_slice(operator.as_bytes());
    k
}

fn verif_key(id: u64) -> Vec<u8> {
    let mut k = VERIF_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k
}

fn deadline_key(height: Height, id: u64) -> Vec<u8> {
    let mut k = DEADLINE_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(height));
    k.extend_from_slice(&be_u64(id));
    k
}

fn vest_key(id: u64) -> Vec<u8> {
    let mut k = VEST_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k
}

fn vest_by_key(owner: &Address, id: u64) -> Vec<u8> {
    let mut k = VEST_BY_PREFIX.to_vec();
    k.extend_from_slice(owner.as_bytes());
    k.extend_from_slice(&be_u64(id));
    k
}

/// The validator keeper.
#[derive(Clone)]
pub struct Validators {
    bank: Bank,
}

impl Validators {
    pub fn new(bank: Bank) -> Self {
        Self { bank }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn validator<S: Store + ?Sized>(
        &self,
        store: &S,
        operator: &Address,
    ) -> Result<Option<Validator>, Error> {
        get_typed(store, &val_key(operator))
    }

    pub fn validators<S: Store + ?Sized>(&self, store: &S) -> Result<Vec<Validator>, Error> {
        store
            .iter_prefix(VAL_PREFIX, false)
            .into_iter()
            .map(|(_, v)| hodl_store::codec::from_bytes(&v))
            .collect()
    }

    pub fn verification<S: Store>(
        &self,
        store: &S,
        id: u64,
    ) -> Result<Option<BusinessVerification>, Error> {
        get_typed(store, &verif_key(id))
    }

    /// Approving validators (with tiers) of an approved verification, for
    /// the app's reward orchestration at company creation.
    pub fn approvers<S: Store>(
        &self,
        store: &S,
        id: u64,
    ) -> Result<Vec<(Address, Tier)>, Error> {
        let Some(v) = self.verification(store, id)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for vote in v.votes.iter().filter(|v| v.approve) {
            if let Some(val) = self.validator(store, &vote.validator)? {
                out.push((val.operator, val.tier));
            }
        }
        Ok(out)
    }

    // ── Stake & tier ─────────────────────────────────────────────────────────

    /// Bond additional HODL stake; the tier re-derives immediately (and is
    /// confirmed each BeginBlock).
    pub fn register_tier<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        operator: &Address,
        stake_add: Amount,
        height: Height,
    ) -> Result<Tier, Error> {
        self.bank.transfer(
            store,
            operator,
            &module_account(MODULE_VALIDATOR_BOND),
            &Coin::uhodl(stake_add),
        )?;

        let mut validator = self.validator(store, operator)?.unwrap_or(Validator {
            operator: *operator,
            stake: 0,
            tier: Tier::Bronze,
            verifications_total: 0,
            verifications_successful: 0,
            reputation: Dec::from_int(50),
            last_verification_at: height,
            last_decay_at: height,
            jailed: false,
            jailed_until: 0,
            banned: false,
        });
        if validator.banned {
            return Err(Error::ValidatorJailed(operator.to_string()));
        }
        validator.stake = validator.stake.checked_add(stake_add).ok_or(Error::Overflow)?;
        let tier = Tier::from_stake(validator.stake).ok_or(Error::StakeBelowMinimum {
            min: hodl_core::tier::TIER_BOUNDS[0],
            got: validator.stake,
        })?;
        validator.tier = tier;
        self.put(store, &validator)?;

        events.emit(
            Event::new("validator", "tier_registered")
                .attr("operator", operator.to_valoper())
                .attr("stake", validator.stake)
                .attr("tier", tier),
        );
        info!(operator = %operator.to_valoper(), %tier, "validator tier registered");
        Ok(tier)
    }

    // ── Verification workflow ────────────────────────────────────────────────

    /// Open a verification for a prospective company.
    pub fn submit_verification<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        applicant: &Address,
        symbol: &str,
        company_name: &str,
        valuation: Amount,
        height: Height,
    ) -> Result<u64, Error> {
        let id = next_id(store, VERIF_ID_COUNTER)?;
        let required_tier = required_tier_for_valuation(valuation);
        let deadline = height + params.verification_deadline_blocks;
        let verification = BusinessVerification {
            id,
            applicant: *applicant,
            symbol: symbol.to_string(),
            company_name: company_name.to_string(),
            valuation,
            required_tier,
            assigned: Vec::new(),
            votes: Vec::new(),
            status: VerificationStatus::Pending,
            deadline,
            submitted_at: height,
            rewards_granted: false,
        };
        set_typed(store, &verif_key(id), &verification)?;
        set_typed(store, &deadline_key(deadline, id), &())?;

        events.emit(
            Event::new("validator", "verification_submitted")
                .attr("verification_id", id)
                .attr("symbol", symbol)
                .attr("required_tier", required_tier)
                .attr("deadline", deadline),
        );
        Ok(id)
    }

    /// Claim one of the open validator slots. When the last slot fills the
    /// verification moves to `in_progress`.
    pub fn claim_verification<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        operator: &Address,
        id: u64,
        height: Height,
    ) -> Result<(), Error> {
        let mut v = self
            .verification(store, id)?
            .ok_or(Error::VerificationNotFound(id))?;
        if v.status != VerificationStatus::Pending {
            return Err(Error::VerificationClosed(id));
        }
        let validator = self
            .validator(store, operator)?
            .ok_or_else(|| Error::ValidatorNotFound(operator.to_valoper()))?;
        if !validator.is_active(height) {
            return Err(Error::ValidatorJailed(operator.to_valoper()));
        }
        if validator.tier < v.required_tier {
            return Err(Error::TierTooLow { required: v.required_tier.name() });
        }
        if v.assigned.contains(operator) {
            return Err(Error::SlotAlreadyClaimed(id));
        }
        let slots = params.slots_per_tier[v.required_tier.index()] as usize;
        if v.assigned.len() >= slots {
            return Err(Error::SlotsFull(id));
        }
        v.assigned.push(*operator);
        if v.assigned.len() == slots {
            v.status = VerificationStatus::InProgress;
        }
        set_typed(store, &verif_key(id), &v)?;

        events.emit(
            Event::new("validator", "verification_claimed")
                .attr("verification_id", id)
                .attr("validator", operator.to_valoper())
                .attr("status", v.status.name()),
        );
        Ok(())
    }

    /// Cast an approve/reject vote. Resolves the verification as soon as the
    /// per-tier approval threshold is met or becomes unreachable.
    #[allow(clippy::too_many_arguments)]
    pub fn vote_verification<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        operator: &Address,
        id: u64,
        approve: bool,
        notes_hash: [u8; 32],
        height: Height,
    ) -> Result<(), Error> {
        let mut v = self
            .verification(store, id)?
            .ok_or(Error::VerificationNotFound(id))?;
        if v.status != VerificationStatus::InProgress {
            return Err(Error::VerificationClosed(id));
        }
        if !v.assigned.contains(operator) {
            return Err(Error::NotAssignedValidator(id));
        }
        if v.has_voted(operator) {
            return Err(Error::AlreadyVoted(id));
        }
        v.votes.push(VerificationVote { validator: *operator, approve, notes_hash });

        // Resolution: approvals needed = ceil(assigned × threshold_bps).
        let assigned = v.assigned.len() as u64;
        let needed = (assigned * params.approval_threshold_bps[v.required_tier.index()])
            .div_ceil(10_000) as usize;
        if v.approvals() >= needed {
            v.status = VerificationStatus::Approved;
        } else if v.assigned.len() - v.rejections() < needed {
            // Even if every remaining vote approves, the threshold is
            // unreachable.
            v.status = VerificationStatus::Rejected;
        }

        if !v.status.is_open() {
            self.resolve(store, events, params, &mut v, height)?;
        }
        set_typed(store, &verif_key(id), &v)?;

        events.emit(
            Event::new("validator", "verification_voted")
                .attr("verification_id", id)
                .attr("validator", operator.to_valoper())
                .attr("approve", approve)
                .attr("status", v.status.name()),
        );
        Ok(())
    }

    /// Terminal bookkeeping: reputation updates, counters, and the fixed
    /// HODL reward for approvers of an approved verification.
    fn resolve<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        v: &mut BusinessVerification,
        height: Height,
    ) -> Result<(), Error> {
        store.delete(&deadline_key(v.deadline, v.id));
        let approved = v.status == VerificationStatus::Approved;

        for vote in &v.votes {
            let Some(mut validator) = self.validator(store, &vote.validator)? else {
                continue;
            };
            validator.verifications_total += 1;
            let agreed = vote.approve == approved;
            if agreed {
                validator.verifications_successful += 1;
                // reputation += (100 − reputation) × 0.05
                let gap = Dec::from_int(100).saturating_sub(validator.reputation);
                let bump = Dec(gap.0 / 20);
                validator.reputation = validator.reputation.checked_add(bump)?;
            } else {
                // reputation −= reputation × 0.10
                let drop = Dec(validator.reputation.0 / 10);
                validator.reputation = validator.reputation.saturating_sub(drop);
            }
            validator.last_verification_at = height;
            self.put(store, &validator)?;

            if approved && vote.approve && params.verification_reward_uhodl > 0 {
                self.bank.mint(
                    store,
                    &vote.validator,
                    &Coin::uhodl(params.verification_reward_uhodl),
                )?;
            }
        }

        events.emit(
            Event::new("validator", "verification_resolved")
                .attr("verification_id", v.id)
                .attr("status", v.status.name()),
        );
        info!(verification_id = v.id, status = v.status.name(), "verification resolved");
        Ok(())
    }

    /// Record a vesting grant of already-minted reward shares held by the
    /// validator bond account. Called by the app after the equity module
    /// minted the shares.
    #[allow(clippy::too_many_arguments)]
    pub fn record_vesting<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        owner: &Address,
        tier: Tier,
        denom: &str,
        total: Amount,
        height: Height,
    ) -> Result<u64, Error> {
        let id = next_id(store, VEST_ID_COUNTER)?;
        let vest = VestingAccount {
            id,
            owner: *owner,
            denom: denom.to_string(),
            total,
            released: 0,
            start_height: height,
            cliff_height: height + params.vesting_cliff_blocks[tier.index()],
            end_height: height + params.vesting_total_blocks[tier.index()],
            revoked: false,
        };
        set_typed(store, &vest_key(id), &vest)?;
        set_typed(store, &vest_by_key(owner, id), &())?;
        events.emit(
            Event::new("validator", "vesting_granted")
                .attr("vesting_id", id)
                .attr("owner", owner.to_valoper())
                .attr("denom", denom)
                .attr("total", total)
                .attr("cliff", vest.cliff_height)
                .attr("end", vest.end_height),
        );
        Ok(id)
    }

    /// Mark a verification's equity rewards as consumed by company creation.
    pub fn mark_rewards_granted<S: Store>(&self, store: &mut S, id: u64) -> Result<(), Error> {
        let mut v = self
            .verification(store, id)?
            .ok_or(Error::VerificationNotFound(id))?;
        v.rewards_granted = true;
        set_typed(store, &verif_key(id), &v)
    }

    // ── Slashing ─────────────────────────────────────────────────────────────

    /// Double-sign evidence from consensus: slash a fixed share of stake to
    /// the insurance fund and jail.
    pub fn slash_double_sign<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        operator: &Address,
        height: Height,
    ) -> Result<(), Error> {
        let Some(mut validator) = self.validator(store, operator)? else {
            return Ok(()); // evidence against an unknown operator is ignored
        };
        let slashed = validator.stake * params.double_sign_slash_bps as u128 / 10_000;
        validator.stake -= slashed;
        validator.jailed = true;
        validator.jailed_until = height + params.double_sign_jail_blocks;
        if let Some(tier) = Tier::from_stake(validator.stake) {
            validator.tier = tier;
        }
        self.bank.transfer(
            store,
            &module_account(MODULE_VALIDATOR_BOND),
            &module_account(MODULE_INSURANCE),
            &Coin::uhodl(slashed),
        )?;
        self.put(store, &validator)?;
        events.emit(
            Event::new("validator", "slashed_double_sign")
                .attr("operator", operator.to_valoper())
                .attr("slashed", slashed)
                .attr("jailed_until", validator.jailed_until),
        );
        Ok(())
    }

    /// Governance fraud slash: burn up to the whole stake, permanently ban,
    /// and revoke unvested equity. Returns the clawed-back (denom, amount)
    /// pairs for the app to reconcile with the cap table.
    pub fn slash_fraud<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        operator: &Address,
        slash_bps: u64,
        ban: bool,
    ) -> Result<Vec<(String, Amount)>, Error> {
        let mut validator = self
            .validator(store, operator)?
            .ok_or_else(|| Error::ValidatorNotFound(operator.to_valoper()))?;
        let slashed = validator.stake * slash_bps.min(10_000) as u128 / 10_000;
        validator.stake -= slashed;
        if ban {
            validator.banned = true;
        }
        if slashed > 0 {
            self.bank.transfer(
                store,
                &module_account(MODULE_VALIDATOR_BOND),
                &module_account(MODULE_INSURANCE),
                &Coin::uhodl(slashed),
            )?;
        }
        self.put(store, &validator)?;

        // Revoke unvested rewards.
        let mut clawbacks = Vec::new();
        let mut prefix = VEST_BY_PREFIX.to_vec();
        prefix.extend_from_slice(operator.as_bytes());
        for (k, _) in store.iter_prefix(&prefix, false) {
            let id = u64::from_be_bytes(
                k[k.len() - 8..].try_into().expect("8-byte vesting id"),
            );
            let Some(mut vest) = get_typed::<VestingAccount, S>(store, &vest_key(id))? else {
                continue;
            };
            if vest.revoked {
                continue;
            }
            let unvested = vest.unreleased();
            vest.revoked = true;
            set_typed(store, &vest_key(id), &vest)?;
            if unvested > 0 {
                clawbacks.push((vest.denom.clone(), unvested));
            }
        }

        events.emit(
            Event::new("validator", "slashed_fraud")
                .attr("operator", operator.to_valoper())
                .attr("slashed", slashed)
                .attr("banned", ban)
                .attr("clawbacks", clawbacks.len()),
        );
        info!(operator = %operator.to_valoper(), slashed, ban, "fraud slash executed");
        Ok(clawbacks)
    }

    // ── Block hooks ──────────────────────────────────────────────────────────

    /// Unjail validators whose term ended.
    pub fn begin_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        height: Height,
    ) -> Result<(), Error> {
        for mut validator in self.validators(store)? {
            if validator.jailed && height >= validator.jailed_until {
                validator.jailed = false;
                self.put(store, &validator)?;
                events.emit(
                    Event::new("validator", "unjailed")
                        .attr("operator", validator.operator.to_valoper()),
                );
            }
        }
        Ok(())
    }

    /// EndBlock: expire overdue verifications, release matured vesting
    /// tranches, and on epoch boundaries apply idle reputation decay.
    pub fn end_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        height: Height,
    ) -> Result<(), Error> {
        self.expire_verifications(store, events, params, height)?;
        self.release_vesting(store, events, params, height)?;
        if params.reputation_epoch_blocks > 0 && height % params.reputation_epoch_blocks == 0 {
            self.decay_reputation(store, params, height)?;
        }
        Ok(())
    }

    fn expire_verifications<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        height: Height,
    ) -> Result<(), Error> {
        let mut due = Vec::new();
        for (k, _) in store.iter_prefix(DEADLINE_PREFIX, false) {
            let h_bytes = &k[DEADLINE_PREFIX.len()..DEADLINE_PREFIX.len() + 8];
            let h = u64::from_be_bytes(h_bytes.try_into().expect("8-byte height"));
            if h > height {
                break;
            }
            let id = u64::from_be_bytes(
                k[DEADLINE_PREFIX.len() + 8..].try_into().expect("8-byte id"),
            );
            due.push(id);
        }
        for id in due {
            let Some(mut v) = self.verification(store, id)? else {
                continue;
            };
            if !v.status.is_open() {
                store.delete(&deadline_key(v.deadline, id));
                continue;
            }
            v.status = VerificationStatus::Expired;
            // Expiry is treated as rejection for reputation purposes.
            self.resolve(store, events, params, &mut v, height)?;
            set_typed(store, &verif_key(id), &v)?;
        }
        Ok(())
    }

    /// Bounded sweep over vesting accounts: release matured tranches up to
    /// `max_vesting_releases_per_block`, resuming from a persisted cursor.
    /// Grants accumulate with every approved verification and live for up to
    /// four years, so the set is never scanned whole in one block.
    fn release_vesting<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &ValidatorParams,
        height: Height,
    ) -> Result<(), Error> {
        let cursor: Option<Vec<u8>> = get_typed(store, VEST_CURSOR_KEY)?;
        let all: Vec<(Vec<u8>, Vec<u8>)> = store.iter_prefix(VEST_PREFIX, false);

        let start = match &cursor {
            Some(c) => all.partition_point(|(k, _)| k <= c),
            None => 0,
        };
        let budget = params.max_vesting_releases_per_block as usize;
        let visited = &all[start..(start + budget).min(all.len())];
        let finished_pass = start + visited.len() >= all.len();

        let mut last_key = None;
        for (k, v_bytes) in visited {
            last_key = Some(k.clone());
            let mut vest: VestingAccount = hodl_store::codec::from_bytes(v_bytes)?;
            if vest.revoked {
                store.delete(k);
                store.delete(&vest_by_key(&vest.owner, vest.id));
                continue;
            }
            let vested = vest.vested_at(height);
            if vested <= vest.released {
                continue;
            }
            let delta = vested - vest.released;
            self.bank.transfer(
                store,
                &module_account(MODULE_VALIDATOR_BOND),
                &vest.owner,
                &Coin::new(vest.denom.clone(), delta),
            )?;
            vest.released = vested;
            events.emit(
                Event::new("validator", "vesting_released")
                    .attr("vesting_id", vest.id)
                    .attr("owner", vest.owner.to_valoper())
                    .attr("amount", delta),
            );
            if vest.released == vest.total {
                store.delete(k);
                store.delete(&vest_by_key(&vest.owner, vest.id));
            } else {
                set_typed(store, k, &vest)?;
            }
        }

        if finished_pass {
            // Pass complete: restart from the top next block.
            store.delete(VEST_CURSOR_KEY);
        } else if let Some(k) = last_key {
            set_typed(store, VEST_CURSOR_KEY, &k)?;
        }
        Ok(())
    }

    /// One percent multiplicative decay per idle 30-day period. Runs only on
    /// epoch boundaries and is bounded by the active validator-set size, so
    /// it needs no cursor.
    fn decay_reputation<S: Store>(
        &self,
        store: &mut S,
        params: &ValidatorParams,
        height: Height,
    ) -> Result<(), Error> {
        for mut validator in self.validators(store)? {
            let idle_since = validator.last_verification_at.max(validator.last_decay_at);
            if height.saturating_sub(idle_since) >= params.reputation_decay_after_blocks {
                let drop = Dec(validator.reputation.0 / 100);
                validator.reputation = validator.reputation.saturating_sub(drop);
                validator.last_decay_at = height;
                self.put(store, &validator)?;
            }
        }
        Ok(())
    }

    fn put<S: Store>(&self, store: &mut S, validator: &Validator) -> Result<(), Error> {
        set_typed(store, &val_key(&validator.operator), validator)
    }
}

/// [`hodl_equity::VerificationView`] is implemented in the app crate to keep
/// this crate free of an equity dependency; this helper backs it.
pub fn is_approved_for_symbol<S: Store + ?Sized>(
    store: &S,
    id: u64,
    symbol: &str,
) -> Result<bool, Error> {
    let v: Option<BusinessVerification> = get_typed(store, &verif_key(id))?;
    Ok(v.map(|v| v.status == VerificationStatus::Approved && v.symbol == symbol && !v.rewards_granted)
        .unwrap_or(false))
}
