//! The deterministic block pipeline.
//!
//! Consensus drives this type through the ABCI-like surface: `init_chain`,
//! `begin_block`, `deliver_tx`, `end_block`, `commit`, `query`. Transactions
//! apply strictly sequentially; each runs in a write cache over the pending
//! block image, so a failed handler discards everything except the auth
//! layer's sequence bump and fee. `commit` seals the image and returns the
//! BLAKE3 app-hash.

use std::sync::Arc;

use hodl_bank::{apply_fee_split, module_account, Bank};
use hodl_core::constants::{MODULE_TREASURY, MODULE_VALIDATOR_BOND};
use hodl_core::dec::Dec;
use hodl_core::error::{Error, ErrorKind};
use hodl_core::events::{Event, EventManager};
use hodl_core::msg::{EmergencyAction, Msg, ProposalPayload, VoteOption};
use hodl_core::params::Params;
use hodl_core::tx::Tx;
use hodl_core::types::{Address, Height, Timestamp, TxHash};
use hodl_crypto::SignatureVerifier;
use hodl_dex::Dex;
use hodl_equity::{dividend, Equity, EquityHook};
use hodl_genesis::Genesis;
use hodl_gov::Gov;
use hodl_stablecoin::Stablecoin;
use hodl_store::{apply_writes, get_typed, set_typed, Cache, MemStore, StateDb, Store};
use hodl_validator::Validators;
use tracing::{error, info, warn};

use crate::auth;
use crate::power::{AppPower, AppVerifications};

const PARAMS_KEY: &[u8] = b"params";
const UPGRADE_KEY: &[u8] = b"app/upgrade";

/// Result of one `deliver_tx`. Code 0 is success; failure codes follow the
/// error taxonomy (1xx decode, 2xx auth, 3xx precondition, 9xx internal).
#[derive(Debug)]
pub struct TxResult {
    pub code: u32,
    pub log: String,
    pub events: Vec<Event>,
    pub tx_hash: Option<TxHash>,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// One validator-set entry reported back to consensus from EndBlock.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorUpdate {
    pub operator: Address,
    /// Voting power for the consensus engine: bonded stake, zero while
    /// jailed or banned.
    pub power: u128,
}

/// EndBlock output: the block-phase events plus the validator set handed to
/// the consensus engine.
#[derive(Debug, Default)]
pub struct BlockResult {
    pub events: Vec<Event>,
    pub validator_updates: Vec<ValidatorUpdate>,
}

/// The application state machine.
pub struct App {
    db: StateDb,
    /// The block under construction: a clone of the committed image mutated
    /// through the block, sealed at `commit`.
    pending: MemStore,
    height: Height,
    time: Timestamp,
    chain_id: String,
    params: Params,
    verifier: Arc<dyn SignatureVerifier>,
    bank: Bank,
    stablecoin: Stablecoin,
    equity: Equity,
    dex: Dex,
    validators: Validators,
    gov: Gov,
    power: AppPower,
    block_events: Vec<Event>,
}

impl App {
    pub fn new(db: StateDb, verifier: Arc<dyn SignatureVerifier>) -> App {
        // The transfer hook reads companies through a hook-less bank; every
        // keeper then shares the hooked bank.
        let mut bank = Bank::new();
        let hook_equity = Equity::new(Bank::new());
        bank.add_hook(Arc::new(EquityHook::new(hook_equity)));

        let equity = Equity::new(bank.clone());
        let validators = Validators::new(bank.clone());
        let params = Params::default();
        let power = AppPower {
            bank: bank.clone(),
            equity: equity.clone(),
            validators: validators.clone(),
            gov_tier_multipliers: params.gov.tier_multipliers,
        };
        let pending = db.committed().clone();

        App {
            pending,
            db,
            height: 0,
            time: 0,
            chain_id: String::new(),
            params,
            verifier,
            stablecoin: Stablecoin::new(bank.clone()),
            equity,
            dex: Dex::new(bank.clone()),
            validators,
            gov: Gov::new(bank.clone()),
            power,
            bank,
            block_events: Vec::new(),
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    // ── InitChain ────────────────────────────────────────────────────────────

    /// Load the genesis document and seed height 0. Any failure aborts node
    /// start.
    pub fn init_chain(&mut self, genesis_json: &str) -> Result<[u8; 32], Error> {
        let genesis = Genesis::from_json(genesis_json)?;
        self.chain_id = genesis.chain_id.clone();

        let mut image = MemStore::new();
        hodl_genesis::apply(
            &mut image,
            &genesis,
            &self.bank,
            &self.equity,
            &self.dex,
            &self.validators,
        )?;
        self.params = genesis.params.clone();
        self.power.gov_tier_multipliers = self.params.gov.tier_multipliers;

        *self.db.committed_mut() = image;
        self.pending = self.db.committed().clone();
        let app_hash = self.db.commit(0)?;
        info!(chain_id = %self.chain_id, "chain initialised");
        Ok(app_hash)
    }

    // ── BeginBlock ───────────────────────────────────────────────────────────

    /// Start a block: accrual and maintenance sweeps, circuit-breaker
    /// reopens, double-sign evidence from consensus.
    pub fn begin_block(
        &mut self,
        height: Height,
        time: Timestamp,
        double_sign_evidence: &[Address],
    ) -> Result<(), Error> {
        self.pending = self.db.committed().clone();
        self.height = height;
        self.time = time;
        self.block_events.clear();
        self.params = get_typed(&self.pending, PARAMS_KEY)?.unwrap_or_default();
        self.power.gov_tier_multipliers = self.params.gov.tier_multipliers;

        let mut events = EventManager::new();
        for operator in double_sign_evidence {
            self.validators.slash_double_sign(
                &mut self.pending,
                &mut events,
                &self.params.validator,
                operator,
                height,
            )?;
        }
        self.validators
            .begin_block(&mut self.pending, &mut events, height)?;
        self.stablecoin.begin_block(
            &mut self.pending,
            &mut events,
            &self.params.stablecoin,
            height,
            time,
        )?;
        self.dex
            .begin_block(&mut self.pending, &mut events, &self.params.dex, height)?;

        self.block_events.extend(events.take());
        Ok(())
    }

    // ── DeliverTx ────────────────────────────────────────────────────────────

    /// Apply one transaction. Auth effects (sequence bump, fee) survive a
    /// failed handler; everything else rolls back with the tx cache.
    pub fn deliver_tx(&mut self, raw: &[u8]) -> TxResult {
        let tx = match Tx::decode(raw).and_then(|tx| {
            tx.validate_basic()?;
            Ok(tx)
        }) {
            Ok(tx) => tx,
            Err(e) => return fail(None, &e),
        };
        let tx_hash = tx.hash();
        if tx.body.chain_id != self.chain_id {
            return fail(Some(tx_hash), &Error::Decode("wrong chain id".into()));
        }

        // ── Auth: verify, charge fee, bump sequences ─────────────────────────
        let mut auth_events = EventManager::new();
        let signers = {
            let mut auth_cache = Cache::new(&self.pending);
            match auth::authenticate(
                &mut auth_cache,
                &self.bank,
                self.verifier.as_ref(),
                &self.params.auth,
                &tx,
            ) {
                Ok(signers) => {
                    let writes = auth_cache.into_writes();
                    apply_writes(&mut self.pending, writes);
                    signers
                }
                Err(e) => return fail(Some(tx_hash), &e),
            }
        };
        auth_events.emit(
            Event::new("auth", "tx_authenticated")
                .attr("tx_hash", tx_hash)
                .attr("fee", &tx.fee)
                .attr("payer", signers[0]),
        );

        // ── Handlers: all messages in one atomic cache ───────────────────────
        let mut handler_events = EventManager::new();
        let mut tx_cache = Cache::new(&self.pending);
        for msg in &tx.body.msgs {
            if let Err(e) = self.handle_msg(&mut tx_cache, &mut handler_events, msg, &signers) {
                if e.kind() == ErrorKind::Invariant {
                    // Consensus-halting: never swallowed.
                    error!(%e, "invariant violation during tx execution");
                    panic!("invariant violation: {e}");
                }
                warn!(tx = %tx_hash, code = e.code(), %e, "tx failed");
                return TxResult {
                    code: e.code(),
                    log: e.to_string(),
                    events: auth_events.take(),
                    tx_hash: Some(tx_hash),
                };
            }
        }
        let writes = tx_cache.into_writes();
        apply_writes(&mut self.pending, writes);

        let mut events = auth_events.take();
        events.extend(handler_events.take());
        TxResult { code: 0, log: String::new(), events, tx_hash: Some(tx_hash) }
    }

    fn handle_msg<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        msg: &Msg,
        signers: &[Address],
    ) -> Result<(), Error> {
        if !signers.contains(&msg.signer()) {
            return Err(Error::UnauthorizedSigner(msg.signer().to_string()));
        }
        let (height, time) = (self.height, self.time);
        let p = &self.params;

        match msg {
            Msg::Send { from, to, amount } => {
                self.bank.send(store, from, to, amount, height)?;
                events.emit(
                    Event::new("bank", "transfer")
                        .attr("from", from)
                        .attr("to", to)
                        .attr("amount", amount),
                );
                Ok(())
            }

            Msg::MintHodl { owner, collateral_add, hodl_out } => self.stablecoin.mint(
                store, events, &p.stablecoin, owner, *collateral_add, *hodl_out, height, time,
            ),
            Msg::BurnHodl { owner, hodl_in, collateral_withdraw } => self.stablecoin.burn(
                store, events, &p.stablecoin, owner, *hodl_in, *collateral_withdraw, height, time,
            ),
            Msg::Liquidate { liquidator, position_owner, hodl_in } => self.stablecoin.liquidate(
                store, events, &p.stablecoin, liquidator, position_owner, *hodl_in, height, time,
            ),

            Msg::CreateCompany {
                owner,
                verification_id,
                symbol,
                name,
                jurisdiction,
                classes,
                founders,
            } => {
                let company = self.equity.create_company(
                    store,
                    events,
                    &AppVerifications,
                    owner,
                    *verification_id,
                    symbol,
                    name,
                    jurisdiction,
                    classes,
                    founders,
                    height,
                )?;
                self.grant_verification_rewards(store, events, *verification_id, &company)
            }
            Msg::IssueShares { owner, symbol, class_id, to, shares } => self
                .equity
                .issue_shares(store, events, owner, symbol, class_id, to, *shares),
            Msg::TransferShares { from, to, denom, shares } => self.equity.transfer_shares(
                store, events, &p.equity, from, to, denom, *shares, height,
            ),
            Msg::DeclareDividend { owner, symbol, class_id, total, pay_height, expiry_height } => {
                dividend::declare(
                    &self.equity,
                    store,
                    events,
                    owner,
                    symbol,
                    class_id,
                    total.clone(),
                    *pay_height,
                    *expiry_height,
                    height,
                )
                .map(|_| ())
            }
            Msg::ClaimDividend { claimer, dividend_id } => {
                dividend::claim(&self.equity, store, events, claimer, *dividend_id, height)
                    .map(|_| ())
            }
            Msg::RegisterDelistClaim { holder, symbol } => self
                .equity
                .register_delist_claim(store, events, holder, symbol, height),

            Msg::PlaceOrder {
                owner,
                market,
                side,
                order_type,
                tif,
                qty,
                price,
                stop_price,
                expires_at,
                max_slippage_bps,
            } => self
                .dex
                .place_order(
                    store, events, &p.dex, owner, market, *side, *order_type, *tif, *qty, *price,
                    *stop_price, *expires_at, *max_slippage_bps, height, time,
                )
                .map(|_| ()),
            Msg::CancelOrder { owner, order_id } => {
                self.dex.cancel_order(store, events, owner, *order_id)
            }
            Msg::Swap { owner, from_denom, to_denom, in_amount, min_out, max_slippage_bps } => self
                .dex
                .swap(
                    store, events, &p.dex, owner, from_denom, to_denom, *in_amount, *min_out,
                    *max_slippage_bps, height, time,
                )
                .map(|_| ()),

            Msg::RegisterValidatorTier { operator, stake_amount } => self
                .validators
                .register_tier(store, events, operator, *stake_amount, height)
                .map(|_| ()),
            Msg::SubmitVerification { applicant, symbol, company_name, valuation } => self
                .validators
                .submit_verification(
                    store, events, &p.validator, applicant, symbol, company_name, *valuation,
                    height,
                )
                .map(|_| ()),
            Msg::ClaimVerification { validator, verification_id } => self
                .validators
                .claim_verification(
                    store, events, &p.validator, validator, *verification_id, height,
                ),
            Msg::VoteVerification { validator, verification_id, approve, notes_hash } => self
                .validators
                .vote_verification(
                    store, events, &p.validator, validator, *verification_id, *approve,
                    *notes_hash, height,
                ),

            Msg::SubmitProposal { proposer, title, description_hash, payload, initial_deposit } => {
                self.gov
                    .submit_proposal(
                        store,
                        events,
                        &p.gov,
                        proposer,
                        title,
                        *description_hash,
                        payload.clone(),
                        *initial_deposit,
                        height,
                    )
                    .map(|_| ())
            }
            Msg::Deposit { depositor, proposal_id, amount } => self.gov.deposit(
                store, events, &p.gov, depositor, *proposal_id, *amount, height,
            ),
            Msg::Vote { voter, proposal_id, option } => self.gov.vote(
                store,
                events,
                &self.power,
                voter,
                *proposal_id,
                vec![(*option, Dec::ONE)],
                height,
            ),
            Msg::VoteWeighted { voter, proposal_id, weights } => self.gov.vote(
                store,
                events,
                &self.power,
                voter,
                *proposal_id,
                weights.clone(),
                height,
            ),
        }
    }

    /// Company creation consumes the approved verification: each approving
    /// validator is granted equity at its tier rate, minted to the bond
    /// escrow under a vesting schedule.
    fn grant_verification_rewards<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        verification_id: u64,
        company: &hodl_equity::Company,
    ) -> Result<(), Error> {
        let approvers = self.validators.approvers(store, verification_id)?;
        let class = &company.classes[0];
        let bond = module_account(MODULE_VALIDATOR_BOND);
        for (operator, tier) in approvers {
            let rate_bps = self.params.validator.equity_rate_bps[tier.index()];
            let shares = class.outstanding * rate_bps as u128 / 10_000;
            if shares == 0 {
                continue;
            }
            let granted = self.equity.grant_reward_shares(
                store,
                events,
                &company.symbol,
                &class.class_id,
                &bond,
                shares,
            )?;
            if granted > 0 {
                self.validators.record_vesting(
                    store,
                    events,
                    &self.params.validator,
                    &operator,
                    tier,
                    &class.denom,
                    granted,
                    self.height,
                )?;
            }
        }
        self.validators.mark_rewards_granted(store, verification_id)
    }

    // ── EndBlock ─────────────────────────────────────────────────────────────

    /// Module maintenance, proposal tallies, payload execution, and the fee
    /// split sweep. Returns the block-phase events and the validator set for
    /// consensus.
    pub fn end_block(&mut self) -> Result<BlockResult, Error> {
        let height = self.height;
        let mut events = EventManager::new();

        self.dex
            .end_block(&mut self.pending, &mut events, &self.params.dex, height)?;
        self.equity.end_block(&mut self.pending, &mut events, height)?;
        self.validators
            .end_block(&mut self.pending, &mut events, &self.params.validator, height)?;

        let passed = self.gov.end_block(
            &mut self.pending,
            &mut events,
            &self.params.gov,
            &self.power,
            height,
        )?;
        for (id, payload) in passed {
            // Best-effort atomic execution: a failure drops the payload's
            // cache, leaving only the status change.
            let mut payload_events = EventManager::new();
            let outcome = {
                let mut cache = Cache::new(&self.pending);
                self.execute_payload(&mut cache, &mut payload_events, &payload)
                    .map(|()| cache.into_writes())
            };
            let ok = match outcome {
                Ok(writes) => {
                    apply_writes(&mut self.pending, writes);
                    payload_events.take().into_iter().for_each(|e| events.emit(e));
                    true
                }
                Err(e) => {
                    warn!(proposal_id = id, %e, "proposal execution failed");
                    false
                }
            };
            self.gov
                .mark_execution(&mut self.pending, &mut events, id, ok)?;
        }

        self.sweep_fees(&mut events)?;

        let validator_updates = self
            .validators
            .validators(&self.pending)?
            .into_iter()
            .map(|v| ValidatorUpdate {
                operator: v.operator,
                power: if v.is_active(height) { v.stake } else { 0 },
            })
            .collect();

        let mut out = std::mem::take(&mut self.block_events);
        out.extend(events.take());
        Ok(BlockResult { events: out, validator_updates })
    }

    /// The typed payload executor: a match on the sum, one function per kind.
    fn execute_payload<S: Store>(
        &self,
        store: &mut S,
        events: &mut EventManager,
        payload: &ProposalPayload,
    ) -> Result<(), Error> {
        let height = self.height;
        match payload {
            ProposalPayload::ParameterSet { changes } => {
                let mut params: Params =
                    get_typed(store, PARAMS_KEY)?.unwrap_or_else(|| self.params.clone());
                for change in changes {
                    params.apply(change)?;
                }
                params.validate()?;
                set_typed(store, PARAMS_KEY, &params)?;
                events.emit(
                    Event::new("gov", "params_updated").attr("changes", changes.len()),
                );
                Ok(())
            }
            ProposalPayload::SoftwareUpgrade { name, height: upgrade_height } => {
                set_typed(store, UPGRADE_KEY, &(name.clone(), *upgrade_height))?;
                events.emit(
                    Event::new("gov", "upgrade_scheduled")
                        .attr("name", name)
                        .attr("height", *upgrade_height),
                );
                Ok(())
            }
            ProposalPayload::TreasurySpend { recipient, amount } => {
                self.bank
                    .transfer(store, &module_account(MODULE_TREASURY), recipient, amount)?;
                events.emit(
                    Event::new("gov", "treasury_spend")
                        .attr("recipient", recipient)
                        .attr("amount", amount),
                );
                Ok(())
            }
            ProposalPayload::SlashValidator { operator, slash_bps, ban } => {
                let clawbacks =
                    self.validators
                        .slash_fraud(store, events, operator, *slash_bps, *ban)?;
                let bond = module_account(MODULE_VALIDATOR_BOND);
                for (denom, amount) in clawbacks {
                    self.equity
                        .clawback_shares(store, events, &denom, &bond, amount)?;
                }
                Ok(())
            }
            ProposalPayload::IncreaseAuthorized { symbol, class_id, new_authorized } => self
                .equity
                .increase_authorized(store, events, symbol, class_id, *new_authorized),
            ProposalPayload::ListCompany { symbol } => {
                self.equity.list_company(store, events, symbol)?;
                let market = format!("{symbol}/HODL");
                if self.dex.market(store, &market)?.is_some() {
                    self.dex.set_market_halted(store, events, &market, false)?;
                }
                Ok(())
            }
            ProposalPayload::DelistCompany { symbol, compensation } => {
                self.equity.delist_company(
                    store,
                    events,
                    &self.params.equity,
                    symbol,
                    compensation.clone(),
                    &module_account(MODULE_TREASURY),
                    height,
                )?;
                let market = format!("{symbol}/HODL");
                if self.dex.market(store, &market)?.is_some() {
                    self.dex.set_market_halted(store, events, &market, true)?;
                }
                Ok(())
            }
            ProposalPayload::CompanyParameter { symbol, key, value } => self
                .equity
                .set_company_parameter(store, events, symbol, key, value),
            ProposalPayload::Emergency { action } => match action {
                EmergencyAction::HaltMarket { symbol } => {
                    self.dex.set_market_halted(store, events, symbol, true)
                }
                EmergencyAction::ResumeMarket { symbol } => {
                    self.dex.set_market_halted(store, events, symbol, false)
                }
                EmergencyAction::SetFreezeWarning { symbol, active } => {
                    self.equity.set_freeze_warning(store, events, symbol, *active)
                }
            },
        }
    }

    /// Split collected fees treasury / validators / insurance per the
    /// governance parameter set. The validator share distributes pro-rata by
    /// stake; rounding dust stays with the treasury.
    fn sweep_fees(&mut self, events: &mut EventManager) -> Result<(), Error> {
        let active: Vec<_> = self
            .validators
            .validators(&self.pending)?
            .into_iter()
            .filter(|v| v.is_active(self.height))
            .map(|v| (v.operator, v.stake))
            .collect();
        apply_fee_split(
            &mut self.pending,
            &self.bank,
            &self.params.fee_split,
            &active,
            events,
        )
    }

    // ── Commit ───────────────────────────────────────────────────────────────

    /// Seal the pending image as the committed state and return the
    /// app-hash.
    pub fn commit(&mut self) -> Result<[u8; 32], Error> {
        *self.db.committed_mut() = self.pending.clone();
        self.db.commit(self.height)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Read-only access against the immutable snapshot at `height` (latest
    /// when `None`). See [`crate::query`] for the request vocabulary.
    pub fn query(
        &self,
        req: crate::query::QueryRequest,
        height: Option<Height>,
    ) -> Result<crate::query::QueryResponse, Error> {
        let snapshot = self
            .db
            .snapshot_at(height)
            .ok_or_else(|| Error::Storage("no snapshot at requested height".into()))?;
        crate::query::dispatch(self, &snapshot, req)
    }

    // ── Invariants ───────────────────────────────────────────────────────────

    /// The committed-state invariants: supply conservation, stablecoin
    /// solvency, cap-table consistency, and book funds. Wired into tests; a
    /// production node may run it on an interval. Any failure is
    /// consensus-halting.
    pub fn assert_invariants(&self) -> Result<(), Error> {
        self.bank.assert_supply(&self.pending)?;
        self.stablecoin
            .assert_solvency(&self.pending, &self.params.stablecoin)?;
        self.equity.assert_cap_table(&self.pending)?;
        self.dex.assert_book_funds(&self.pending)?;
        Ok(())
    }

    pub(crate) fn keepers(
        &self,
    ) -> (&Bank, &Stablecoin, &Equity, &Dex, &Validators, &Gov) {
        (&self.bank, &self.stablecoin, &self.equity, &self.dex, &self.validators, &self.gov)
    }

    pub(crate) fn current_params(&self) -> &Params {
        &self.params
    }
}

fn fail(tx_hash: Option<TxHash>, e: &Error) -> TxResult {
    TxResult { code: e.code(), log: e.to_string(), events: Vec::new(), tx_hash }
}
