//! Governance-tunable parameters for every module.
//!
//! The aggregate [`Params`] is persisted as one record and loaded by the
//! pipeline each block. A passed `protocol_parameter_set` proposal mutates
//! individual keys through [`Params::apply`]; unknown module/key pairs fail
//! the execution, which the governance module reports as `execution_failed`.

use serde::{Deserialize, Serialize};

use crate::coin::DENOM_UHODL;
use crate::constants::{BLOCKS_PER_DAY, BLOCKS_PER_MONTH, UHODL_PER_HODL};
use crate::dec::Dec;
use crate::error::Error;
use crate::msg::ParamChange;
use crate::types::Amount;

// ── Auth ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthParams {
    /// Denoms accepted for fee payment.
    pub fee_denoms: Vec<String>,
    /// Minimum fee per transaction, in the paying denom's base units.
    pub min_fee: Amount,
}

impl Default for AuthParams {
    fn default() -> Self {
        Self { fee_denoms: vec![DENOM_UHODL.to_string()], min_fee: 1_000 }
    }
}

// ── Stablecoin ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StablecoinParams {
    /// Minimum collateral ratio on entry and after any position touch.
    pub min_ratio: Dec,
    /// Ratio below which a position becomes liquidatable.
    pub liquidation_ratio: Dec,
    /// Annual stability fee rate applied linearly to outstanding debt.
    pub stability_fee_rate: Dec,
    /// Extra collateral share seized on liquidation.
    pub liquidation_penalty: Dec,
    pub mint_fee: Dec,
    pub burn_fee: Dec,
    /// Collateral → USD price. Governance-set until an oracle module exists.
    pub price: Dec,
    /// Cap on positions visited by the BeginBlock liquidation scan.
    pub max_liquidations_per_block: u64,
}

impl Default for StablecoinParams {
    fn default() -> Self {
        Self {
            min_ratio: Dec::from_ratio(3, 2),
            liquidation_ratio: Dec::from_ratio(13, 10),
            stability_fee_rate: Dec::ZERO,
            liquidation_penalty: Dec::from_bps(1_000),
            mint_fee: Dec::from_bps(10),
            burn_fee: Dec::from_bps(10),
            price: Dec::ONE,
            max_liquidations_per_block: 1_024,
        }
    }
}

// ── Equity ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquityParams {
    /// Height-based day length for the treasury withdrawal counter.
    pub blocks_per_day: u64,
    /// Max single treasury withdrawal under a freeze warning, in bps of the
    /// treasury balance.
    pub withdrawal_single_bps: u64,
    /// Rolling daily treasury withdrawal cap under a freeze warning, in bps.
    pub withdrawal_daily_bps: u64,
    /// Length of the delisting compensation registration window, in blocks.
    pub delist_claim_window_blocks: u64,
}

impl Default for EquityParams {
    fn default() -> Self {
        Self {
            blocks_per_day: BLOCKS_PER_DAY,
            withdrawal_single_bps: 1_000,
            withdrawal_daily_bps: 2_000,
            delist_claim_window_blocks: 30 * BLOCKS_PER_DAY,
        }
    }
}

// ── DEX ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DexParams {
    /// Default fees for newly listed markets.
    pub default_maker_fee: Dec,
    pub default_taker_fee: Dec,
    /// Default GTC expiry, in blocks (90 days).
    pub gtc_expiry_blocks: u64,
    /// Circuit breaker: reference window, trigger move, and halt duration.
    pub breaker_window_blocks: u64,
    pub breaker_move_bps: u64,
    pub breaker_halt_blocks: u64,
    /// Rolling statistics window (24 h in blocks).
    pub stats_window_blocks: u64,
    /// Cap on orders expired per market per EndBlock.
    pub max_expirations_per_block: u64,
}

impl Default for DexParams {
    fn default() -> Self {
        Self {
            default_maker_fee: Dec::from_bps(10),
            default_taker_fee: Dec::from_bps(20),
            gtc_expiry_blocks: 90 * BLOCKS_PER_DAY,
            breaker_window_blocks: 50,
            breaker_move_bps: 2_000,
            breaker_halt_blocks: 50,
            stats_window_blocks: BLOCKS_PER_DAY,
            max_expirations_per_block: 1_024,
        }
    }
}

// ── Validator ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorParams {
    /// Required approval share per tier, in bps of assigned validators.
    /// Unanimous for the small tiers, 75%/80% above (open question #1
    /// resolved as per-tier governance parameters).
    pub approval_threshold_bps: [u64; 5],
    /// Validator slots collected per tier before a verification starts.
    pub slots_per_tier: [u32; 5],
    /// Blocks a verification may stay open before expiring as rejected.
    pub verification_deadline_blocks: u64,
    /// Fixed HODL reward per approving validator, paid on approval.
    pub verification_reward_uhodl: Amount,
    /// Equity reward rate per tier, in bps of company outstanding shares.
    pub equity_rate_bps: [u64; 5],
    /// Vesting cliff per tier, in blocks.
    pub vesting_cliff_blocks: [u64; 5],
    /// Total vesting duration per tier, in blocks.
    pub vesting_total_blocks: [u64; 5],
    /// Cap on vesting accounts visited by the EndBlock release sweep.
    pub max_vesting_releases_per_block: u64,
    /// Double-sign evidence slash, in bps of stake.
    pub double_sign_slash_bps: u64,
    /// Jail duration after double-sign evidence, in blocks.
    pub double_sign_jail_blocks: u64,
    /// Idle period after which reputation starts to decay, in blocks.
    pub reputation_decay_after_blocks: u64,
    /// Epoch between reputation-decay sweeps, in blocks.
    pub reputation_epoch_blocks: u64,
}

impl Default for ValidatorParams {
    fn default() -> Self {
        Self {
            approval_threshold_bps: [10_000, 10_000, 7_500, 8_000, 8_000],
            slots_per_tier: [3, 3, 4, 5, 5],
            verification_deadline_blocks: 7 * BLOCKS_PER_DAY,
            verification_reward_uhodl: 50 * UHODL_PER_HODL,
            equity_rate_bps: [10, 15, 25, 40, 60],
            vesting_cliff_blocks: [
                6 * BLOCKS_PER_MONTH,
                9 * BLOCKS_PER_MONTH,
                12 * BLOCKS_PER_MONTH,
                12 * BLOCKS_PER_MONTH,
                18 * BLOCKS_PER_MONTH,
            ],
            vesting_total_blocks: [
                12 * BLOCKS_PER_MONTH,
                18 * BLOCKS_PER_MONTH,
                24 * BLOCKS_PER_MONTH,
                36 * BLOCKS_PER_MONTH,
                48 * BLOCKS_PER_MONTH,
            ],
            max_vesting_releases_per_block: 1_024,
            double_sign_slash_bps: 500,
            double_sign_jail_blocks: 7 * BLOCKS_PER_DAY,
            reputation_decay_after_blocks: 30 * BLOCKS_PER_DAY,
            reputation_epoch_blocks: BLOCKS_PER_DAY,
        }
    }
}

// ── Governance ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovParams {
    pub min_deposit: Amount,
    /// Fraction of `min_deposit` required as the initial deposit.
    pub min_initial_deposit_ratio: Dec,
    pub max_deposit_period_blocks: u64,
    pub voting_period_blocks: u64,
    pub quorum: Dec,
    pub threshold: Dec,
    pub veto_threshold: Dec,
    /// Burn the proposer's deposit share when a proposal is vetoed.
    pub burn_deposits: bool,
    /// Overrides for emergency proposals.
    pub emergency_voting_period_blocks: u64,
    pub emergency_threshold: Dec,
    /// Overrides for `increase_authorized` proposals.
    pub increase_authorized_quorum: Dec,
    pub increase_authorized_threshold: Dec,
    /// Voting power multiplier per validator tier.
    pub tier_multipliers: [u64; 5],
}

impl Default for GovParams {
    fn default() -> Self {
        Self {
            min_deposit: 10_000 * UHODL_PER_HODL,
            min_initial_deposit_ratio: Dec::from_bps(1_000),
            max_deposit_period_blocks: 14 * BLOCKS_PER_DAY,
            voting_period_blocks: 14 * BLOCKS_PER_DAY,
            quorum: Dec::from_bps(4_000),
            threshold: Dec::from_bps(5_000),
            veto_threshold: Dec::from_bps(3_340),
            burn_deposits: true,
            emergency_voting_period_blocks: BLOCKS_PER_DAY / 4,
            emergency_threshold: Dec::from_bps(7_500),
            increase_authorized_quorum: Dec::from_bps(5_000),
            increase_authorized_threshold: Dec::from_bps(7_500),
            tier_multipliers: [2, 5, 10, 20, 25],
        }
    }
}

// ── Fee split ────────────────────────────────────────────────────────────────

/// How collected protocol fees are split at each EndBlock sweep. The three
/// shares must sum to 10_000 bps (open question #4 resolved as one parameter
/// set).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub treasury_bps: u64,
    pub validators_bps: u64,
    pub insurance_bps: u64,
}

impl Default for FeeSplit {
    fn default() -> Self {
        Self { treasury_bps: 5_000, validators_bps: 3_000, insurance_bps: 2_000 }
    }
}

// ── Aggregate ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Params {
    pub auth: AuthParams,
    pub stablecoin: StablecoinParams,
    pub equity: EquityParams,
    pub dex: DexParams,
    pub validator: ValidatorParams,
    pub gov: GovParams,
    pub fee_split: FeeSplit,
}

impl Params {
    /// Sanity checks applied at genesis and after every parameter change.
    pub fn validate(&self) -> Result<(), Error> {
        if self.stablecoin.min_ratio < self.stablecoin.liquidation_ratio {
            return Err(Error::Decode(
                "min_ratio must be at least liquidation_ratio".into(),
            ));
        }
        if self.stablecoin.liquidation_ratio <= Dec::ONE {
            return Err(Error::Decode(
                "liquidation_ratio must exceed 1.0".into(),
            ));
        }
        let split =
            self.fee_split.treasury_bps + self.fee_split.validators_bps + self.fee_split.insurance_bps;
        if split != 10_000 {
            return Err(Error::Decode(format!(
                "fee split must sum to 10000 bps, got {split}"
            )));
        }
        for bps in self.validator.approval_threshold_bps {
            if !(5_000..=10_000).contains(&bps) {
                return Err(Error::Decode(
                    "approval thresholds must be in [5000, 10000] bps".into(),
                ));
            }
        }
        for slots in self.validator.slots_per_tier {
            if !(3..=5).contains(&slots) {
                return Err(Error::Decode(
                    "verification slots must be in [3, 5]".into(),
                ));
            }
        }
        if self.gov.quorum > Dec::ONE || self.gov.threshold > Dec::ONE {
            return Err(Error::Decode("governance fractions must be ≤ 1".into()));
        }
        Ok(())
    }

    /// Apply one governance parameter change. The post-change aggregate is
    /// re-validated by the caller.
    pub fn apply(&mut self, change: &ParamChange) -> Result<(), Error> {
        let v = change.value.as_str();
        match (change.module.as_str(), change.key.as_str()) {
            ("auth", "min_fee") => self.auth.min_fee = parse_amount(v)?,
            ("stablecoin", "min_ratio") => self.stablecoin.min_ratio = parse_dec(v)?,
            ("stablecoin", "liquidation_ratio") => {
                self.stablecoin.liquidation_ratio = parse_dec(v)?
            }
            ("stablecoin", "stability_fee_rate") => {
                self.stablecoin.stability_fee_rate = parse_dec(v)?
            }
            ("stablecoin", "liquidation_penalty") => {
                self.stablecoin.liquidation_penalty = parse_dec(v)?
            }
            ("stablecoin", "mint_fee") => self.stablecoin.mint_fee = parse_dec(v)?,
            ("stablecoin", "burn_fee") => self.stablecoin.burn_fee = parse_dec(v)?,
            ("stablecoin", "price") => self.stablecoin.price = parse_dec(v)?,
            ("stablecoin", "max_liquidations_per_block") => {
                self.stablecoin.max_liquidations_per_block = parse_u64(v)?
            }
            ("equity", "blocks_per_day") => self.equity.blocks_per_day = parse_u64(v)?,
            ("equity", "withdrawal_single_bps") => {
                self.equity.withdrawal_single_bps = parse_u64(v)?
            }
            ("equity", "withdrawal_daily_bps") => {
                self.equity.withdrawal_daily_bps = parse_u64(v)?
            }
            ("equity", "delist_claim_window_blocks") => {
                self.equity.delist_claim_window_blocks = parse_u64(v)?
            }
            ("dex", "default_maker_fee") => self.dex.default_maker_fee = parse_dec(v)?,
            ("dex", "default_taker_fee") => self.dex.default_taker_fee = parse_dec(v)?,
            ("dex", "gtc_expiry_blocks") => self.dex.gtc_expiry_blocks = parse_u64(v)?,
            ("dex", "breaker_window_blocks") => self.dex.breaker_window_blocks = parse_u64(v)?,
            ("dex", "breaker_move_bps") => self.dex.breaker_move_bps = parse_u64(v)?,
            ("dex", "breaker_halt_blocks") => self.dex.breaker_halt_blocks = parse_u64(v)?,
            ("validator", "verification_deadline_blocks") => {
                self.validator.verification_deadline_blocks = parse_u64(v)?
            }
            ("validator", "verification_reward_uhodl") => {
                self.validator.verification_reward_uhodl = parse_amount(v)?
            }
            ("validator", "double_sign_slash_bps") => {
                self.validator.double_sign_slash_bps = parse_u64(v)?
            }
            ("validator", "double_sign_jail_blocks") => {
                self.validator.double_sign_jail_blocks = parse_u64(v)?
            }
            ("validator", "max_vesting_releases_per_block") => {
                self.validator.max_vesting_releases_per_block = parse_u64(v)?
            }
            ("gov", "min_deposit") => self.gov.min_deposit = parse_amount(v)?,
            ("gov", "voting_period_blocks") => self.gov.voting_period_blocks = parse_u64(v)?,
            ("gov", "quorum") => self.gov.quorum = parse_dec(v)?,
            ("gov", "threshold") => self.gov.threshold = parse_dec(v)?,
            ("gov", "veto_threshold") => self.gov.veto_threshold = parse_dec(v)?,
            ("gov", "burn_deposits") => self.gov.burn_deposits = parse_bool(v)?,
            ("fee_split", "treasury_bps") => self.fee_split.treasury_bps = parse_u64(v)?,
            ("fee_split", "validators_bps") => self.fee_split.validators_bps = parse_u64(v)?,
            ("fee_split", "insurance_bps") => self.fee_split.insurance_bps = parse_u64(v)?,
            (module, key) => {
                return Err(Error::Decode(format!(
                    "unknown parameter {module}/{key}"
                )))
            }
        }
        Ok(())
    }
}

fn parse_dec(v: &str) -> Result<Dec, Error> {
    v.parse()
}

fn parse_u64(v: &str) -> Result<u64, Error> {
    v.parse()
        .map_err(|_| Error::Decode(format!("invalid integer: {v}")))
}

fn parse_amount(v: &str) -> Result<Amount, Error> {
    v.parse()
        .map_err(|_| Error::Decode(format!("invalid amount: {v}")))
}

fn parse_bool(v: &str) -> Result<bool, Error> {
    v.parse()
        .map_err(|_| Error::Decode(format!("invalid bool: {v}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Params::default().validate().unwrap();
    }

    #[test]
    fn apply_known_key() {
        let mut p = Params::default();
        p.apply(&ParamChange {
            module: "stablecoin".into(),
            key: "price".into(),
            value: "1.5".into(),
        })
        .unwrap();
        assert_eq!(p.stablecoin.price, Dec::from_ratio(3, 2));
    }

    #[test]
    fn apply_unknown_key_fails() {
        let mut p = Params::default();
        let err = p.apply(&ParamChange {
            module: "dex".into(),
            key: "bogus".into(),
            value: "1".into(),
        });
        assert!(err.is_err());
    }

    #[test]
    fn bad_fee_split_rejected() {
        let mut p = Params::default();
        p.fee_split.treasury_bps = 9_000;
        assert!(p.validate().is_err());
    }
}
