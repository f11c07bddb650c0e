//! The message vocabulary of the chain.
//!
//! Every state-changing operation is one [`Msg`] variant. A signed
//! transaction carries one or more messages sharing a fee and signer set
//! (see [`crate::tx`]). `validate_basic` enforces the stateless field
//! constraints; stateful checks belong to the module handlers.

use serde::{Deserialize, Serialize};

use crate::coin::{validate_denom, validate_symbol, Coin};
use crate::constants::{
    MAX_JURISDICTION_LEN, MAX_NAME_LEN, MAX_SHARE_CLASSES, MAX_TITLE_LEN, MAX_WEIGHTED_OPTIONS,
};
use crate::dec::Dec;
use crate::error::Error;
use crate::types::{Address, Amount, Height};

// ── DEX vocabulary ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopLimit,
}

/// Time-in-force.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tif {
    /// Good till cancelled; rests until filled, cancelled, or default expiry.
    Gtc,
    /// Immediate or cancel; remainder cancelled after the match loop.
    Ioc,
    /// Fill or kill; rejected unless the full quantity can cross.
    Fok,
    /// Good till date; GTC with a caller-supplied expiry height.
    Gtd,
}

// ── Equity vocabulary ────────────────────────────────────────────────────────

/// A restriction checked by the bank pre-transfer hook on share denoms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferRestriction {
    /// Receiving addresses must be registered in one of these jurisdictions.
    JurisdictionLock { allowed: Vec<String> },
    /// No transfers out of founder accounts before this height.
    VestingCliff { until_height: Height },
}

/// Share-class parameters supplied at company creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClassSpec {
    /// `common`, `preferred`, `employee`, or a custom lowercase id.
    pub class_id: String,
    pub authorized: Amount,
    pub voting_weight: Dec,
    pub restrictions: Vec<TransferRestriction>,
}

/// Founder allocation minted at company creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderAllocation {
    pub address: Address,
    pub class_id: String,
    pub shares: Amount,
}

// ── Governance vocabulary ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteOption {
    Yes,
    No,
    Abstain,
    Veto,
}

/// A single module-scoped parameter change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    pub module: String,
    pub key: String,
    pub value: String,
}

/// Emergency actions carry a short voting period and a high threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyAction {
    HaltMarket { symbol: String },
    ResumeMarket { symbol: String },
    SetFreezeWarning { symbol: String, active: bool },
}

/// Typed execution payload of a passed proposal. The executor is a match on
/// this sum; new kinds extend it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalPayload {
    /// Apply parameter changes across module param registries.
    ParameterSet { changes: Vec<ParamChange> },
    /// Record a scheduled software upgrade (halts at `height` for operators).
    SoftwareUpgrade { name: String, height: Height },
    /// Spend from the community treasury module account.
    TreasurySpend { recipient: Address, amount: Coin },
    /// Slash a validator for proven fraudulent verification.
    SlashValidator {
        operator: Address,
        slash_bps: u64,
        ban: bool,
    },
    /// Raise a share class's authorized cap (threshold 0.75, quorum 0.50).
    IncreaseAuthorized {
        symbol: String,
        class_id: String,
        new_authorized: Amount,
    },
    /// Re-list a halted company and reactivate its markets.
    ListCompany { symbol: String },
    /// Forcibly delist; opens the compensation claim window.
    DelistCompany {
        symbol: String,
        compensation: Option<Coin>,
    },
    /// Set a company-scoped parameter (e.g. withdrawal limits).
    CompanyParameter {
        symbol: String,
        key: String,
        value: String,
    },
    Emergency { action: EmergencyAction },
}

/// Which electorate votes on a proposal, per the voting-power rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingDomain {
    /// HODL stake + delegated bonded stake.
    Stake,
    /// Validators only, weighted by tier multiplier.
    ValidatorTier,
    /// Holders of the affected share denom, weighted by class voting weight.
    Shares { symbol: String },
}

impl ProposalPayload {
    pub fn voting_domain(&self) -> VotingDomain {
        match self {
            ProposalPayload::SlashValidator { .. } => VotingDomain::ValidatorTier,
            ProposalPayload::IncreaseAuthorized { symbol, .. }
            | ProposalPayload::CompanyParameter { symbol, .. } => {
                VotingDomain::Shares { symbol: symbol.clone() }
            }
            _ => VotingDomain::Stake,
        }
    }

    /// Short tag used in events and queries.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ProposalPayload::ParameterSet { .. } => "protocol_parameter_set",
            ProposalPayload::SoftwareUpgrade { .. } => "software_upgrade_schedule",
            ProposalPayload::TreasurySpend { .. } => "treasury_spend",
            ProposalPayload::SlashValidator { .. } => "validator_slash",
            ProposalPayload::IncreaseAuthorized { .. } => "increase_authorized",
            ProposalPayload::ListCompany { .. } => "company_list",
            ProposalPayload::DelistCompany { .. } => "company_delist",
            ProposalPayload::CompanyParameter { .. } => "company_parameter",
            ProposalPayload::Emergency { .. } => "emergency_action",
        }
    }
}

// ── Msg ──────────────────────────────────────────────────────────────────────

/// Every state-changing operation on the chain is one of these variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    // ── Bank ─────────────────────────────────────────────────────────────────
    /// Send any denom between accounts. Share denoms pass through the equity
    /// transfer-restriction hook.
    Send {
        from: Address,
        to: Address,
        amount: Coin,
    },

    // ── Stablecoin ───────────────────────────────────────────────────────────
    /// Lock collateral and mint HODL against it.
    MintHodl {
        owner: Address,
        collateral_add: Amount,
        hodl_out: Amount,
    },

    /// Repay HODL debt and withdraw collateral.
    BurnHodl {
        owner: Address,
        hodl_in: Amount,
        collateral_withdraw: Amount,
    },

    /// Repay an under-collateralized position and seize its collateral.
    Liquidate {
        liquidator: Address,
        position_owner: Address,
        hodl_in: Amount,
    },

    // ── Equity ───────────────────────────────────────────────────────────────
    /// Create a company from an approved business verification.
    CreateCompany {
        owner: Address,
        verification_id: u64,
        symbol: String,
        name: String,
        jurisdiction: String,
        classes: Vec<ShareClassSpec>,
        founders: Vec<FounderAllocation>,
    },

    /// Mint additional shares of an existing class, bounded by `authorized`.
    IssueShares {
        owner: Address,
        symbol: String,
        class_id: String,
        to: Address,
        shares: Amount,
    },

    /// Transfer shares; equivalent to `Send` of the share denom but subject
    /// to treasury withdrawal limits when sent from the company treasury.
    TransferShares {
        from: Address,
        to: Address,
        denom: String,
        shares: Amount,
    },

    /// Lock a dividend pool and snapshot holdings at the current height.
    DeclareDividend {
        owner: Address,
        symbol: String,
        class_id: String,
        total: Coin,
        pay_height: Height,
        expiry_height: Height,
    },

    /// Claim a matured dividend entitlement. Idempotent per address.
    ClaimDividend { claimer: Address, dividend_id: u64 },

    /// Register a holding in a forced-delisting compensation window.
    RegisterDelistClaim { holder: Address, symbol: String },

    // ── DEX ──────────────────────────────────────────────────────────────────
    PlaceOrder {
        owner: Address,
        market: String,
        side: Side,
        order_type: OrderType,
        tif: Tif,
        qty: Amount,
        /// Limit price; required for Limit and StopLimit.
        price: Option<Amount>,
        /// Trigger price; required for Stop and StopLimit.
        stop_price: Option<Amount>,
        /// Expiry height for GTD orders.
        expires_at: Option<Height>,
        /// Slippage cap for market buys, in basis points off the best ask.
        max_slippage_bps: Option<u64>,
    },

    CancelOrder { owner: Address, order_id: u64 },

    /// Single-taker atomic swap; aborts entirely below `min_out`.
    Swap {
        owner: Address,
        from_denom: String,
        to_denom: String,
        in_amount: Amount,
        min_out: Amount,
        max_slippage_bps: u64,
    },

    // ── Validator ────────────────────────────────────────────────────────────
    /// Bond HODL stake; tier is re-derived from the resulting stake.
    RegisterValidatorTier {
        operator: Address,
        stake_amount: Amount,
    },

    /// Open a business verification for a prospective company.
    SubmitVerification {
        applicant: Address,
        symbol: String,
        company_name: String,
        /// Self-declared valuation in uhodl; selects the required tier.
        valuation: Amount,
    },

    /// Claim one of the open validator slots on a verification.
    ClaimVerification {
        validator: Address,
        verification_id: u64,
    },

    /// Vote on a claimed verification slot.
    VoteVerification {
        validator: Address,
        verification_id: u64,
        approve: bool,
        /// Commitment to off-chain due-diligence notes.
        notes_hash: [u8; 32],
    },

    // ── Governance ───────────────────────────────────────────────────────────
    SubmitProposal {
        proposer: Address,
        title: String,
        description_hash: [u8; 32],
        payload: ProposalPayload,
        initial_deposit: Amount,
    },

    Deposit {
        depositor: Address,
        proposal_id: u64,
        amount: Amount,
    },

    Vote {
        voter: Address,
        proposal_id: u64,
        option: VoteOption,
    },

    /// Split the voter's power across options; weights are fractions of the
    /// voter's total power and must sum to exactly 1.
    VoteWeighted {
        voter: Address,
        proposal_id: u64,
        weights: Vec<(VoteOption, Dec)>,
    },
}

impl Msg {
    /// The address that must be in the transaction's signer set.
    pub fn signer(&self) -> Address {
        use Msg::*;
        match self {
            Send { from, .. } => *from,
            MintHodl { owner, .. } | BurnHodl { owner, .. } => *owner,
            Liquidate { liquidator, .. } => *liquidator,
            CreateCompany { owner, .. }
            | IssueShares { owner, .. }
            | DeclareDividend { owner, .. } => *owner,
            TransferShares { from, .. } => *from,
            ClaimDividend { claimer, .. } => *claimer,
            RegisterDelistClaim { holder, .. } => *holder,
            PlaceOrder { owner, .. } | CancelOrder { owner, .. } | Swap { owner, .. } => *owner,
            RegisterValidatorTier { operator, .. } => *operator,
            SubmitVerification { applicant, .. } => *applicant,
            ClaimVerification { validator, .. } | VoteVerification { validator, .. } => *validator,
            SubmitProposal { proposer, .. } => *proposer,
            Deposit { depositor, .. } => *depositor,
            Vote { voter, .. } | VoteWeighted { voter, .. } => *voter,
        }
    }

    /// The module a message routes to, used in events and error reports.
    pub fn route(&self) -> &'static str {
        use Msg::*;
        match self {
            Send { .. } => "bank",
            MintHodl { .. } | BurnHodl { .. } | Liquidate { .. } => "stablecoin",
            CreateCompany { .. } | IssueShares { .. } | TransferShares { .. }
            | DeclareDividend { .. } | ClaimDividend { .. } | RegisterDelistClaim { .. } => {
                "equity"
            }
            PlaceOrder { .. } | CancelOrder { .. } | Swap { .. } => "dex",
            RegisterValidatorTier { .. } | SubmitVerification { .. }
            | ClaimVerification { .. } | VoteVerification { .. } => "validator",
            SubmitProposal { .. } | Deposit { .. } | Vote { .. } | VoteWeighted { .. } => "gov",
        }
    }

    /// Stateless field validation. Bounds all inputs so per-message work is
    /// bounded without a gas meter.
    pub fn validate_basic(&self) -> Result<(), Error> {
        use Msg::*;
        match self {
            Send { amount, .. } => {
                validate_denom(&amount.denom)?;
                nonzero(amount.amount)
            }
            MintHodl { collateral_add, hodl_out, .. } => {
                if *collateral_add == 0 && *hodl_out == 0 {
                    return Err(Error::ZeroAmount);
                }
                Ok(())
            }
            BurnHodl { hodl_in, collateral_withdraw, .. } => {
                if *hodl_in == 0 && *collateral_withdraw == 0 {
                    return Err(Error::ZeroAmount);
                }
                Ok(())
            }
            Liquidate { hodl_in, .. } => nonzero(*hodl_in),
            CreateCompany { symbol, name, jurisdiction, classes, founders, .. } => {
                validate_symbol(symbol)?;
                bounded("name", name, MAX_NAME_LEN)?;
                bounded("jurisdiction", jurisdiction, MAX_JURISDICTION_LEN)?;
                if classes.is_empty() || classes.len() > MAX_SHARE_CLASSES {
                    return Err(Error::FieldTooLong {
                        field: "classes",
                        max: MAX_SHARE_CLASSES,
                    });
                }
                for c in classes {
                    if c.class_id.is_empty()
                        || !c.class_id.chars().all(|ch| ch.is_ascii_lowercase())
                    {
                        return Err(Error::InvalidDenom(c.class_id.clone()));
                    }
                    nonzero(c.authorized)?;
                }
                for f in founders {
                    nonzero(f.shares)?;
                }
                Ok(())
            }
            IssueShares { symbol, shares, .. } => {
                validate_symbol(symbol)?;
                nonzero(*shares)
            }
            TransferShares { denom, shares, .. } => {
                validate_denom(denom)?;
                nonzero(*shares)
            }
            DeclareDividend { symbol, total, pay_height, expiry_height, .. } => {
                validate_symbol(symbol)?;
                validate_denom(&total.denom)?;
                nonzero(total.amount)?;
                if expiry_height <= pay_height {
                    return Err(Error::Decode(
                        "dividend expiry must be after pay height".into(),
                    ));
                }
                Ok(())
            }
            ClaimDividend { .. } => Ok(()),
            RegisterDelistClaim { symbol, .. } => validate_symbol(symbol),
            PlaceOrder { market, order_type, qty, price, stop_price, .. } => {
                bounded("market", market, MAX_NAME_LEN)?;
                nonzero(*qty)?;
                match order_type {
                    OrderType::Limit | OrderType::StopLimit if price.is_none() => {
                        return Err(Error::PriceRequired)
                    }
                    OrderType::Stop | OrderType::StopLimit if stop_price.is_none() => {
                        return Err(Error::StopPriceRequired)
                    }
                    _ => {}
                }
                if let Some(p) = price {
                    nonzero(*p)?;
                }
                if let Some(p) = stop_price {
                    nonzero(*p)?;
                }
                Ok(())
            }
            CancelOrder { .. } => Ok(()),
            Swap { from_denom, to_denom, in_amount, .. } => {
                validate_denom(from_denom)?;
                validate_denom(to_denom)?;
                if from_denom == to_denom {
                    return Err(Error::Decode("swap denoms must differ".into()));
                }
                nonzero(*in_amount)
            }
            RegisterValidatorTier { stake_amount, .. } => nonzero(*stake_amount),
            SubmitVerification { symbol, company_name, valuation, .. } => {
                validate_symbol(symbol)?;
                bounded("company_name", company_name, MAX_NAME_LEN)?;
                nonzero(*valuation)
            }
            ClaimVerification { .. } => Ok(()),
            VoteVerification { .. } => Ok(()),
            SubmitProposal { title, initial_deposit, .. } => {
                bounded("title", title, MAX_TITLE_LEN)?;
                nonzero(*initial_deposit)
            }
            Deposit { amount, .. } => nonzero(*amount),
            Vote { .. } => Ok(()),
            VoteWeighted { weights, .. } => {
                if weights.is_empty() || weights.len() > MAX_WEIGHTED_OPTIONS {
                    return Err(Error::InvalidWeights);
                }
                let mut sum = Dec::ZERO;
                for (_, w) in weights {
                    if w.is_zero() {
                        return Err(Error::InvalidWeights);
                    }
                    sum = sum.checked_add(*w)?;
                }
                if sum != Dec::ONE {
                    return Err(Error::InvalidWeights);
                }
                Ok(())
            }
        }
    }
}

fn nonzero(amount: Amount) -> Result<(), Error> {
    if amount == 0 {
        Err(Error::ZeroAmount)
    } else {
        Ok(())
    }
}

fn bounded(field: &'static str, s: &str, max: usize) -> Result<(), Error> {
    if s.len() > max {
        Err(Error::FieldTooLong { field, max })
    } else {
        Ok(())
    }
}
