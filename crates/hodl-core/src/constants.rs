//! ─── ShareHODL Protocol Constants ───────────────────────────────────────────
//!
//! "Tokenized equity with a stable settlement asset."
//!
//! Base unit:  uhodl (1 HODL = 1,000,000 uhodl)
//! Collateral: ustake (the native staking asset)
//! Shares:     u<SYMBOL>, optionally u<SYMBOL>.<class>

// ── Units ────────────────────────────────────────────────────────────────────

/// 1 HODL expressed in uhodl.
pub const UHODL_PER_HODL: u128 = 1_000_000;

/// BIP44 coin type used by wallets deriving ShareHODL keys.
pub const BIP44_COIN_TYPE: u32 = 118;

// ── Time ─────────────────────────────────────────────────────────────────────

/// Seconds per year, used by the linear stability-fee accrual.
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 3600;

/// Expected block time in seconds. Duration-like parameters are expressed in
/// blocks; this constant only documents the conversion used for defaults.
pub const EXPECTED_BLOCK_SECS: u64 = 6;

/// Blocks per day at the expected block time.
pub const BLOCKS_PER_DAY: u64 = 24 * 3600 / EXPECTED_BLOCK_SECS;

/// Blocks per 30-day month at the expected block time.
pub const BLOCKS_PER_MONTH: u64 = 30 * BLOCKS_PER_DAY;

// ── Transaction limits ───────────────────────────────────────────────────────

/// Maximum messages per transaction.
pub const MAX_MSGS_PER_TX: usize = 16;

/// Maximum memo size in bytes.
pub const MAX_MEMO_BYTES: usize = 256;

/// Maximum raw transaction size in bytes.
pub const MAX_TX_BYTES: usize = 64 * 1024;

/// Maximum proposal title length.
pub const MAX_TITLE_LEN: usize = 140;

/// Maximum company / market name length.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum jurisdiction string length.
pub const MAX_JURISDICTION_LEN: usize = 48;

/// Maximum share classes per company.
pub const MAX_SHARE_CLASSES: usize = 8;

/// Maximum distinct options in a weighted vote (yes/no/abstain/veto).
pub const MAX_WEIGHTED_OPTIONS: usize = 4;

// ── Module accounts ──────────────────────────────────────────────────────────

/// Named module accounts. Their addresses are BLAKE3-derived and hold no
/// public key; nothing can ever sign for them.
pub const MODULE_STABLECOIN: &str = "stablecoin";
pub const MODULE_DEX: &str = "dex";
pub const MODULE_DIVIDEND_ESCROW: &str = "dividend_escrow";
pub const MODULE_GOV_DEPOSITS: &str = "gov_deposits";
pub const MODULE_FEE_COLLECTOR: &str = "fee_collector";
pub const MODULE_TREASURY: &str = "treasury";
pub const MODULE_INSURANCE: &str = "insurance";
pub const MODULE_VALIDATOR_BOND: &str = "validator_bond";
pub const MODULE_DELIST_POOL: &str = "delist_pool";

/// All module account names, in registry order.
pub const MODULE_ACCOUNTS: &[&str] = &[
    MODULE_STABLECOIN,
    MODULE_DEX,
    MODULE_DIVIDEND_ESCROW,
    MODULE_GOV_DEPOSITS,
    MODULE_FEE_COLLECTOR,
    MODULE_TREASURY,
    MODULE_INSURANCE,
    MODULE_VALIDATOR_BOND,
    MODULE_DELIST_POOL,
];
