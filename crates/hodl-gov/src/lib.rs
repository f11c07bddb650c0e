//! hodl-gov
//!
//! Proposal lifecycle: deposit → voting → (passed | rejected | vetoed |
//! failed_quorum) → (executed | execution_failed). Voting power depends on
//! the proposal's payload: bonded-stake power for protocol matters, tier
//! multipliers for validator matters, share holdings × class weight for
//! company matters. Tally order is veto → quorum → threshold; abstain
//! counts toward quorum but never toward the threshold.
//!
//! Execution is orchestrated by the app: `end_block` returns the passed
//! payloads, the app runs each inside its own cache, and reports back via
//! `mark_execution` — a failed payload rolls back leaving only the status.
//!
//! Key layout:
//!   gov/prop/<be id>                → Proposal
//!   gov/vote/<be id><addr20>        → VoteRecord
//!   gov/dep_end/<be height><be id>  → ()
//!   gov/vote_end/<be height><be id> → ()

pub mod types;

use hodl_bank::{module_account, Bank};
use hodl_core::coin::Coin;
use hodl_core::constants::MODULE_GOV_DEPOSITS;
use hodl_core::dec::{cross_ge, Dec};
use hodl_core::error::Error;
use hodl_core::events::{Event, EventManager};
use hodl_core::msg::{ProposalPayload, VoteOption, VotingDomain};
use hodl_core::params::GovParams;
use hodl_core::types::{Address, Amount, Height};
use hodl_store::keys::be_u64;
use hodl_store::{get_typed, next_id, set_typed, Store};
use tracing::info;

pub use types::{Proposal, ProposalStatus, VoteRecord};

const PROP_PREFIX: &[u8] = b"gov/prop/";
const VOTE_PREFIX: &[u8] = b"gov/vote/";
const DEP_END_PREFIX: &[u8] = b"gov/dep_end/";
const VOTE_END_PREFIX: &[u8] = b"gov/vote_end/";
const PROP_ID_COUNTER: &[u8] = b"gov/next_proposal_id";

fn prop_key(id: u64) -> Vec<u8> {
    let mut k = PROP_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k
}

fn vote_key(id: u64, voter: &Address) -> Vec<u8> {
    let mut k = VOTE_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(id));
    k.extend_from_slice(voter.as_bytes());
    k
}

fn dep_end_key(height: Height, id: u64) -> Vec<u8> {
    let mut k = DEP_END_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(height));
    k.extend_from_slice(&be_u64(id));
    k
}

fn vote_end_key(height: Height, id: u64) -> Vec<u8> {
    let mut k = VOTE_END_PREFIX.to_vec();
    k.extend_from_slice(&be_u64(height));
    k.extend_from_slice(&be_u64(id));
    k
}

/// Cross-module view of voting power, injected by the app. All methods take
/// the trait-object store so the implementation can span bank, validator,
/// and equity state.
pub trait VotingPower: Send + Sync {
    /// HODL balance plus bonded stake.
    fn stake_power(&self, store: &dyn Store, addr: &Address) -> Result<Amount, Error>;
    fn total_stake_power(&self, store: &dyn Store) -> Result<Amount, Error>;
    /// Tier multiplier for validators; `None` for non-validators.
    fn tier_power(&self, store: &dyn Store, addr: &Address) -> Result<Option<Amount>, Error>;
    fn total_tier_power(&self, store: &dyn Store) -> Result<Amount, Error>;
    /// Share holdings × class voting weight across the company's classes.
    fn share_power(
        &self,
        store: &dyn Store,
        addr: &Address,
        symbol: &str,
    ) -> Result<Amount, Error>;
    fn total_share_power(&self, store: &dyn Store, symbol: &str) -> Result<Amount, Error>;
}

/// The governance keeper.
#[derive(Clone)]
pub struct Gov {
    bank: Bank,
}

impl Gov {
    pub fn new(bank: Bank) -> Self {
        Self { bank }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn proposal<S: Store>(&self, store: &S, id: u64) -> Result<Option<Proposal>, Error> {
        get_typed(store, &prop_key(id))
    }

    pub fn vote_of<S: Store>(
        &self,
        store: &S,
        id: u64,
        voter: &Address,
    ) -> Result<Option<VoteRecord>, Error> {
        get_typed(store, &vote_key(id, voter))
    }

    // ── Submit & deposit ─────────────────────────────────────────────────────

    /// Open a proposal in the deposit period. The tally fractions and voting
    /// period are snapshotted from the current params (with per-payload
    /// overrides) so a mid-flight parameter change cannot move the goalposts.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_proposal<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &GovParams,
        proposer: &Address,
        title: &str,
        description_hash: [u8; 32],
        payload: ProposalPayload,
        initial_deposit: Amount,
        height: Height,
    ) -> Result<u64, Error> {
        let min_initial = params
            .min_initial_deposit_ratio
            .mul_amount_ceil(params.min_deposit)?;
        if initial_deposit < min_initial {
            return Err(Error::DepositTooSmall { need: min_initial, got: initial_deposit });
        }
        self.bank.transfer(
            store,
            proposer,
            &module_account(MODULE_GOV_DEPOSITS),
            &Coin::uhodl(initial_deposit),
        )?;

        let (quorum, threshold, voting_period) = tally_overrides(params, &payload);
        let id = next_id(store, PROP_ID_COUNTER)?;
        let mut proposal = Proposal {
            id,
            title: title.to_string(),
            description_hash,
            submitter: *proposer,
            payload,
            initial_deposit,
            total_deposit: initial_deposit,
            deposits: vec![(*proposer, initial_deposit)],
            deposit_end: height + params.max_deposit_period_blocks,
            voting_start: 0,
            voting_end: 0,
            status: ProposalStatus::DepositPeriod,
            quorum,
            threshold,
            veto_threshold: params.veto_threshold,
            voting_period,
        };
        set_typed(store, &dep_end_key(proposal.deposit_end, id), &())?;

        if proposal.total_deposit >= params.min_deposit {
            self.start_voting(store, events, &mut proposal, height)?;
        }
        set_typed(store, &prop_key(id), &proposal)?;

        events.emit(
            Event::new("gov", "proposal_submitted")
                .attr("proposal_id", id)
                .attr("type", proposal.payload.type_tag())
                .attr("proposer", proposer)
                .attr("deposit", initial_deposit),
        );
        info!(proposal_id = id, ty = proposal.payload.type_tag(), "proposal submitted");
        Ok(id)
    }

    /// Top up a proposal's deposit during the deposit period.
    pub fn deposit<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &GovParams,
        depositor: &Address,
        id: u64,
        amount: Amount,
        height: Height,
    ) -> Result<(), Error> {
        let mut proposal = self.proposal(store, id)?.ok_or(Error::ProposalNotFound(id))?;
        if proposal.status != ProposalStatus::DepositPeriod {
            return Err(Error::WrongProposalPhase {
                id,
                phase: proposal.status.name(),
                expected: "deposit",
            });
        }
        self.bank.transfer(
            store,
            depositor,
            &module_account(MODULE_GOV_DEPOSITS),
            &Coin::uhodl(amount),
        )?;
        proposal.total_deposit = proposal
            .total_deposit
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        proposal.deposits.push((*depositor, amount));

        if proposal.total_deposit >= params.min_deposit {
            self.start_voting(store, events, &mut proposal, height)?;
        }
        set_typed(store, &prop_key(id), &proposal)?;
        events.emit(
            Event::new("gov", "proposal_deposit")
                .attr("proposal_id", id)
                .attr("depositor", depositor)
                .attr("amount", amount),
        );
        Ok(())
    }

    fn start_voting<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        proposal: &mut Proposal,
        height: Height,
    ) -> Result<(), Error> {
        store.delete(&dep_end_key(proposal.deposit_end, proposal.id));
        proposal.status = ProposalStatus::VotingPeriod;
        proposal.voting_start = height;
        proposal.voting_end = height + proposal.voting_period;
        set_typed(store, &vote_end_key(proposal.voting_end, proposal.id), &())?;
        events.emit(
            Event::new("gov", "voting_started")
                .attr("proposal_id", proposal.id)
                .attr("voting_end", proposal.voting_end),
        );
        Ok(())
    }

    // ── Voting ───────────────────────────────────────────────────────────────

    /// Cast or replace a vote. `weights` are fractions of the voter's power
    /// summing to one (a plain vote is a single full-weight option). Power
    /// itself is measured at tally so deposits and transfers during the
    /// voting period count.
    #[allow(clippy::too_many_arguments)]
    pub fn vote<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        power: &dyn VotingPower,
        voter: &Address,
        id: u64,
        weights: Vec<(VoteOption, Dec)>,
        height: Height,
    ) -> Result<(), Error> {
        let proposal = self.proposal(store, id)?.ok_or(Error::ProposalNotFound(id))?;
        if proposal.status != ProposalStatus::VotingPeriod {
            return Err(Error::WrongProposalPhase {
                id,
                phase: proposal.status.name(),
                expected: "voting",
            });
        }
        if height >= proposal.voting_end {
            return Err(Error::VotingClosed(id));
        }
        if self.power_of(store, power, voter, &proposal)? == 0 {
            return Err(Error::NoVotingPower);
        }
        set_typed(store, &vote_key(id, voter), &VoteRecord { voter: *voter, weights })?;
        events.emit(
            Event::new("gov", "vote_cast")
                .attr("proposal_id", id)
                .attr("voter", voter),
        );
        Ok(())
    }

    fn power_of<S: Store>(
        &self,
        store: &S,
        power: &dyn VotingPower,
        voter: &Address,
        proposal: &Proposal,
    ) -> Result<Amount, Error> {
        match proposal.payload.voting_domain() {
            VotingDomain::Stake => power.stake_power(store, voter),
            VotingDomain::ValidatorTier => Ok(power.tier_power(store, voter)?.unwrap_or(0)),
            VotingDomain::Shares { symbol } => power.share_power(store, voter, &symbol),
        }
    }

    fn total_power<S: Store>(
        &self,
        store: &S,
        power: &dyn VotingPower,
        proposal: &Proposal,
    ) -> Result<Amount, Error> {
        match proposal.payload.voting_domain() {
            VotingDomain::Stake => power.total_stake_power(store),
            VotingDomain::ValidatorTier => power.total_tier_power(store),
            VotingDomain::Shares { symbol } => power.total_share_power(store, &symbol),
        }
    }

    // ── EndBlock ─────────────────────────────────────────────────────────────

    /// Discard expired deposit periods and tally proposals whose voting
    /// period ends at this height. Returns the passed proposals for the app
    /// to execute.
    pub fn end_block<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &GovParams,
        power: &dyn VotingPower,
        height: Height,
    ) -> Result<Vec<(u64, ProposalPayload)>, Error> {
        self.expire_deposit_periods(store, events, height)?;
        self.tally_due(store, events, params, power, height)
    }

    fn expire_deposit_periods<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        height: Height,
    ) -> Result<(), Error> {
        let mut due = Vec::new();
        for (k, _) in store.iter_prefix(DEP_END_PREFIX, false) {
            let h_bytes = &k[DEP_END_PREFIX.len()..DEP_END_PREFIX.len() + 8];
            let h = u64::from_be_bytes(h_bytes.try_into().expect("8-byte height"));
            if h > height {
                break;
            }
            let id = u64::from_be_bytes(
                k[DEP_END_PREFIX.len() + 8..].try_into().expect("8-byte id"),
            );
            due.push((k, id));
        }
        for (index_key, id) in due {
            store.delete(&index_key);
            let Some(mut proposal) = self.proposal(store, id)? else {
                continue;
            };
            if proposal.status != ProposalStatus::DepositPeriod {
                continue;
            }
            // Deposit threshold never reached: discard and refund everyone.
            self.refund_deposits(store, &proposal, None)?;
            proposal.status = ProposalStatus::Rejected;
            set_typed(store, &prop_key(id), &proposal)?;
            events.emit(
                Event::new("gov", "deposit_period_expired").attr("proposal_id", id),
            );
        }
        Ok(())
    }

    fn tally_due<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        params: &GovParams,
        power: &dyn VotingPower,
        height: Height,
    ) -> Result<Vec<(u64, ProposalPayload)>, Error> {
        let mut due = Vec::new();
        for (k, _) in store.iter_prefix(VOTE_END_PREFIX, false) {
            let h_bytes = &k[VOTE_END_PREFIX.len()..VOTE_END_PREFIX.len() + 8];
            let h = u64::from_be_bytes(h_bytes.try_into().expect("8-byte height"));
            if h > height {
                break;
            }
            let id = u64::from_be_bytes(
                k[VOTE_END_PREFIX.len() + 8..].try_into().expect("8-byte id"),
            );
            due.push((k, id));
        }

        let mut passed = Vec::new();
        for (index_key, id) in due {
            store.delete(&index_key);
            let Some(mut proposal) = self.proposal(store, id)? else {
                continue;
            };
            if proposal.status != ProposalStatus::VotingPeriod {
                continue;
            }
            let status = self.tally(store, power, &proposal)?;
            proposal.status = status;

            // Vetoed proposals burn the proposer's deposit share when the
            // burn parameter is on; every other outcome refunds in full.
            let burn_proposer = status == ProposalStatus::Vetoed && params.burn_deposits;
            self.refund_deposits(
                store,
                &proposal,
                burn_proposer.then_some(proposal.submitter),
            )?;

            if status == ProposalStatus::Passed {
                passed.push((id, proposal.payload.clone()));
            }
            set_typed(store, &prop_key(id), &proposal)?;
            events.emit(
                Event::new("gov", "proposal_tallied")
                    .attr("proposal_id", id)
                    .attr("result", status.name()),
            );
            info!(proposal_id = id, result = status.name(), "proposal tallied");
        }
        Ok(passed)
    }

    /// The tally: veto → quorum → threshold. Abstain counts toward quorum
    /// but not toward the threshold.
    fn tally<S: Store>(
        &self,
        store: &S,
        power: &dyn VotingPower,
        proposal: &Proposal,
    ) -> Result<ProposalStatus, Error> {
        let mut totals: [Amount; 4] = [0; 4];
        let mut vote_prefix = VOTE_PREFIX.to_vec();
        vote_prefix.extend_from_slice(&be_u64(proposal.id));
        for (_, v) in store.iter_prefix(&vote_prefix, false) {
            let record: VoteRecord = hodl_store::codec::from_bytes(&v)?;
            let voter_power = self.power_of(store, power, &record.voter, proposal)?;
            for (option, weight) in &record.weights {
                let slot = match option {
                    VoteOption::Yes => 0,
                    VoteOption::No => 1,
                    VoteOption::Abstain => 2,
                    VoteOption::Veto => 3,
                };
                totals[slot] = totals[slot]
                    .checked_add(weight.mul_amount_floor(voter_power)?)
                    .ok_or(Error::Overflow)?;
            }
        }
        let [yes, no, abstain, veto] = totals;
        let participation = yes + no + abstain + veto;

        // 1. Veto.
        if participation > 0
            && cross_ge(veto, Dec::ONE, participation, proposal.veto_threshold)?
        {
            return Ok(ProposalStatus::Vetoed);
        }
        // 2. Quorum: participation / total_eligible ≥ quorum. Equality meets
        //    quorum.
        let total_eligible = self.total_power(store, power, proposal)?;
        if total_eligible == 0
            || !cross_ge(participation, Dec::ONE, total_eligible, proposal.quorum)?
        {
            return Ok(ProposalStatus::FailedQuorum);
        }
        // 3. Threshold on yes / (yes + no).
        if yes + no > 0 && cross_ge(yes, Dec::ONE, yes + no, proposal.threshold)? {
            Ok(ProposalStatus::Passed)
        } else {
            Ok(ProposalStatus::Rejected)
        }
    }

    fn refund_deposits<S: Store>(
        &self,
        store: &mut S,
        proposal: &Proposal,
        burn_for: Option<Address>,
    ) -> Result<(), Error> {
        let escrow = module_account(MODULE_GOV_DEPOSITS);
        for (depositor, amount) in &proposal.deposits {
            if Some(*depositor) == burn_for {
                self.bank.burn(store, &escrow, &Coin::uhodl(*amount))?;
            } else {
                self.bank
                    .transfer(store, &escrow, depositor, &Coin::uhodl(*amount))?;
            }
        }
        Ok(())
    }

    /// Record the app's execution outcome for a passed proposal.
    pub fn mark_execution<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        id: u64,
        ok: bool,
    ) -> Result<(), Error> {
        let mut proposal = self.proposal(store, id)?.ok_or(Error::ProposalNotFound(id))?;
        proposal.status = if ok {
            ProposalStatus::Executed
        } else {
            ProposalStatus::ExecutionFailed
        };
        set_typed(store, &prop_key(id), &proposal)?;
        events.emit(
            Event::new("gov", "proposal_executed")
                .attr("proposal_id", id)
                .attr("ok", ok),
        );
        Ok(())
    }
}

/// Per-payload tally parameter overrides: `increase_authorized` carries the
/// 0.75/0.50 supermajority, emergency actions vote fast at a high threshold.
fn tally_overrides(params: &GovParams, payload: &ProposalPayload) -> (Dec, Dec, Height) {
    match payload {
        ProposalPayload::IncreaseAuthorized { .. } => (
            params.increase_authorized_quorum,
            params.increase_authorized_threshold,
            params.voting_period_blocks,
        ),
        ProposalPayload::Emergency { .. } => (
            params.quorum,
            params.emergency_threshold,
            params.emergency_voting_period_blocks,
        ),
        _ => (params.quorum, params.threshold, params.voting_period_blocks),
    }
}
