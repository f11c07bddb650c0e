use thiserror::Error;

use crate::types::Amount;

/// Broad failure classes, used by the pipeline to decide how a failed
/// transaction is treated (see the result-code mapping on [`Error::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed tx / message, field constraints violated. Fee still deducted
    /// when the signature was valid.
    Decode,
    /// Signature / sequence / fee failures. Rejected before the handler runs.
    Auth,
    /// Handler precondition failed. Working cache rolled back, fee retained.
    Precondition,
    /// Internal consistency violation — escalated to a node halt.
    Invariant,
}

#[derive(Debug, Error)]
pub enum Error {
    // ── Decode / validation ──────────────────────────────────────────────────
    #[error("malformed transaction: {0}")]
    Decode(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid denom: {0}")]
    InvalidDenom(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("memo exceeds maximum length of {max} bytes")]
    MemoTooLong { max: usize },

    #[error("too many messages in transaction: max {max}")]
    TooManyMessages { max: usize },

    #[error("{field} exceeds maximum length of {max}")]
    FieldTooLong { field: &'static str, max: usize },

    // ── Auth ─────────────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("insufficient fee: need {need}, have {have}")]
    InsufficientFee { need: Amount, have: Amount },

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("message signer {0} not present in transaction signer set")]
    UnauthorizedSigner(String),

    // ── Bank ─────────────────────────────────────────────────────────────────
    #[error("insufficient funds: need {need} {denom}, have {have}")]
    InsufficientFunds {
        denom: String,
        need: Amount,
        have: Amount,
    },

    // ── Stablecoin ───────────────────────────────────────────────────────────
    #[error("collateral ratio below minimum")]
    RatioBelowMin,

    #[error("insufficient collateral: need {need} ustake, have {have}")]
    InsufficientCollateral { need: Amount, have: Amount },

    #[error("repayment exceeds outstanding debt: debt {debt}, got {got}")]
    InsufficientDebt { debt: Amount, got: Amount },

    #[error("no collateral position for {0}")]
    PositionNotFound(String),

    #[error("position for {0} is not below the liquidation ratio")]
    NotUndercollateralized(String),

    // ── Equity ───────────────────────────────────────────────────────────────
    #[error("company symbol already taken: {0}")]
    SymbolTaken(String),

    #[error("company not found: {0}")]
    CompanyNotFound(String),

    #[error("unknown share class {class} for company {symbol}")]
    UnknownShareClass { symbol: String, class: String },

    #[error("issuance exceeds authorized shares: authorized {authorized}, outstanding {outstanding}, requested {requested}")]
    ExceedsAuthorized {
        authorized: Amount,
        outstanding: Amount,
        requested: Amount,
    },

    #[error("transfer restricted: {0}")]
    TransferRestricted(String),

    #[error("treasury withdrawal limit exceeded: {0}")]
    TreasuryLimitExceeded(String),

    #[error("dividend not found: {0}")]
    DividendNotFound(u64),

    #[error("dividend already claimed by this address")]
    AlreadyClaimed,

    #[error("dividend {id} not payable until height {pay_height}")]
    DividendNotPayable { id: u64, pay_height: u64 },

    #[error("dividend {0} has expired")]
    DividendExpired(u64),

    #[error("no recorded holdings for this address in dividend {0}")]
    NoDividendEntitlement(u64),

    #[error("signer is not the company owner")]
    NotCompanyOwner,

    #[error("company {0} is not listed")]
    CompanyNotListed(String),

    #[error("business verification {0} is not approved")]
    VerificationNotApproved(u64),

    #[error("delisting claim window for company {0} has closed")]
    ClaimWindowClosed(u64),

    // ── DEX ──────────────────────────────────────────────────────────────────
    #[error("market not found: {0}")]
    MarketNotFound(String),

    #[error("market already exists: {0}")]
    MarketExists(String),

    #[error("market {0} is halted")]
    MarketHalted(String),

    #[error("order not found: {0}")]
    OrderNotFound(u64),

    #[error("only the order owner may cancel")]
    NotOrderOwner,

    #[error("price {price} not divisible by tick size {tick}")]
    InvalidTick { price: Amount, tick: Amount },

    #[error("quantity {qty} not divisible by lot size {lot}")]
    InvalidLot { qty: Amount, lot: Amount },

    #[error("order size {qty} below market minimum {min}")]
    OrderBelowMinSize { qty: Amount, min: Amount },

    #[error("order size {qty} above market maximum {max}")]
    OrderAboveMaxSize { qty: Amount, max: Amount },

    #[error("fill-or-kill order cannot be fully filled")]
    CannotFillOrKill,

    #[error("slippage limit exceeded: minimum out {min_out}, would receive {got}")]
    Slippage { min_out: Amount, got: Amount },

    #[error("self-trade prevented: resting order {0} shares an owner with the taker")]
    SelfTradePrevented(u64),

    #[error("limit price required for this order type")]
    PriceRequired,

    #[error("stop price required for this order type")]
    StopPriceRequired,

    #[error("expiry height {expires_at} is not in the future (current {now})")]
    ExpiryInPast { expires_at: u64, now: u64 },

    #[error("no liquidity in market {0}")]
    NoLiquidity(String),

    // ── Validator ────────────────────────────────────────────────────────────
    #[error("validator not found: {0}")]
    ValidatorNotFound(String),

    #[error("stake below Bronze minimum: need {min}, got {got}")]
    StakeBelowMinimum { min: Amount, got: Amount },

    #[error("verification not found: {0}")]
    VerificationNotFound(u64),

    #[error("verification {0} is not accepting votes")]
    VerificationClosed(u64),

    #[error("validator already claimed a slot on verification {0}")]
    SlotAlreadyClaimed(u64),

    #[error("all validator slots on verification {0} are taken")]
    SlotsFull(u64),

    #[error("validator tier too low for this verification: required {required}")]
    TierTooLow { required: &'static str },

    #[error("validator already voted on verification {0}")]
    AlreadyVoted(u64),

    #[error("validator {0} is jailed")]
    ValidatorJailed(String),

    #[error("validator is not assigned to verification {0}")]
    NotAssignedValidator(u64),

    // ── Governance ───────────────────────────────────────────────────────────
    #[error("proposal not found: {0}")]
    ProposalNotFound(u64),

    #[error("proposal {id} is in phase {phase}, expected {expected}")]
    WrongProposalPhase {
        id: u64,
        phase: &'static str,
        expected: &'static str,
    },

    #[error("initial deposit below minimum: need {need}, got {got}")]
    DepositTooSmall { need: Amount, got: Amount },

    #[error("voting on proposal {0} is closed")]
    VotingClosed(u64),

    #[error("voter has no voting power on this proposal")]
    NoVotingPower,

    #[error("weighted vote weights must be positive and sum to the voter's power")]
    InvalidWeights,

    // ── Storage / internal ───────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// The taxonomy class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            Decode(_) | InvalidAddress(_) | InvalidDenom(_) | ZeroAmount
            | MemoTooLong { .. } | TooManyMessages { .. } | FieldTooLong { .. } => {
                ErrorKind::Decode
            }
            InvalidSignature | SequenceMismatch { .. } | InsufficientFee { .. }
            | UnknownAccount(_) | UnauthorizedSigner(_) => ErrorKind::Auth,
            // Overflow is reachable from absurd user inputs; it rejects the
            // transaction rather than halting the node.
            Storage(_) | Serialization(_) | Invariant(_) => ErrorKind::Invariant,
            _ => ErrorKind::Precondition,
        }
    }

    /// Stable numeric result code carried in the tx result. 0 is success;
    /// codes group by kind: 1xx decode, 2xx auth, 3xx precondition, 9xx
    /// internal.
    pub fn code(&self) -> u32 {
        use Error::*;
        match self {
            Decode(_) => 100,
            InvalidAddress(_) => 101,
            InvalidDenom(_) => 102,
            ZeroAmount => 103,
            MemoTooLong { .. } => 104,
            TooManyMessages { .. } => 105,
            FieldTooLong { .. } => 106,

            InvalidSignature => 200,
            SequenceMismatch { .. } => 201,
            InsufficientFee { .. } => 202,
            UnknownAccount(_) => 203,
            UnauthorizedSigner(_) => 204,

            InsufficientFunds { .. } => 300,
            RatioBelowMin => 310,
            InsufficientCollateral { .. } => 311,
            InsufficientDebt { .. } => 312,
            PositionNotFound(_) => 313,
            NotUndercollateralized(_) => 314,
            SymbolTaken(_) => 320,
            CompanyNotFound(_) => 321,
            UnknownShareClass { .. } => 322,
            ExceedsAuthorized { .. } => 323,
            TransferRestricted(_) => 324,
            TreasuryLimitExceeded(_) => 325,
            DividendNotFound(_) => 326,
            AlreadyClaimed => 327,
            DividendNotPayable { .. } => 328,
            DividendExpired(_) => 329,
            NoDividendEntitlement(_) => 330,
            NotCompanyOwner => 331,
            CompanyNotListed(_) => 332,
            VerificationNotApproved(_) => 333,
            ClaimWindowClosed(_) => 334,
            MarketNotFound(_) => 340,
            MarketExists(_) => 341,
            MarketHalted(_) => 342,
            OrderNotFound(_) => 343,
            NotOrderOwner => 344,
            InvalidTick { .. } => 345,
            InvalidLot { .. } => 346,
            OrderBelowMinSize { .. } => 347,
            OrderAboveMaxSize { .. } => 348,
            CannotFillOrKill => 349,
            Slippage { .. } => 350,
            SelfTradePrevented(_) => 351,
            PriceRequired => 352,
            StopPriceRequired => 353,
            ExpiryInPast { .. } => 354,
            NoLiquidity(_) => 355,
            ValidatorNotFound(_) => 360,
            StakeBelowMinimum { .. } => 361,
            VerificationNotFound(_) => 362,
            VerificationClosed(_) => 363,
            SlotAlreadyClaimed(_) => 364,
            SlotsFull(_) => 365,
            TierTooLow { .. } => 366,
            AlreadyVoted(_) => 367,
            ValidatorJailed(_) => 368,
            NotAssignedValidator(_) => 369,
            ProposalNotFound(_) => 380,
            WrongProposalPhase { .. } => 381,
            DepositTooSmall { .. } => 382,
            VotingClosed(_) => 383,
            NoVotingPower => 384,
            InvalidWeights => 385,

            Storage(_) => 900,
            Serialization(_) => 901,
            Overflow => 902,
            Invariant(_) => 903,
        }
    }
}
