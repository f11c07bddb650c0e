use serde::{Deserialize, Serialize};

use hodl_core::constants::UHODL_PER_HODL;
use hodl_core::dec::Dec;
use hodl_core::tier::Tier;
use hodl_core::types::{Address, Amount, Height};

/// On-chain validator record. The tier is derived purely from bonded stake
/// and re-derived on every stake change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: Address,
    /// HODL bonded in the validator bond module account.
    pub stake: Amount,
    pub tier: Tier,
    pub verifications_total: u64,
    pub verifications_successful: u64,
    /// 0..100 fixed-point performance score.
    pub reputation: Dec,
    /// Height of the last resolved verification this validator voted in.
    pub last_verification_at: Height,
    /// Height of the last applied idle-decay step.
    pub last_decay_at: Height,
    pub jailed: bool,
    pub jailed_until: Height,
    /// Permanently excluded after a fraud slash.
    pub banned: bool,
}

impl Validator {
    pub fn is_active(&self, height: Height) -> bool {
        !self.banned && (!self.jailed || height >= self.jailed_until)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// Collecting validator slots.
    Pending,
    /// Slots full; votes being cast.
    InProgress,
    Approved,
    Rejected,
    /// Deadline passed without resolution; treated as rejected.
    Expired,
}

impl VerificationStatus {
    pub fn is_open(self) -> bool {
        matches!(self, VerificationStatus::Pending | VerificationStatus::InProgress)
    }

    pub fn name(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::Expired => "expired",
        }
    }
}

/// One validator's vote on a verification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationVote {
    pub validator: Address,
    pub approve: bool,
    /// Commitment to the off-chain due-diligence notes.
    pub notes_hash: [u8; 32],
}

/// An off-chain business due-diligence assignment, tracked on-chain as a
/// state machine: pending → in_progress → approved | rejected | expired.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessVerification {
    pub id: u64,
    pub applicant: Address,
    /// The prospective company symbol this verification covers.
    pub symbol: String,
    pub company_name: String,
    /// Self-declared valuation in uhodl; selects the required tier.
    pub valuation: Amount,
    pub required_tier: Tier,
    pub assigned: Vec<Address>,
    pub votes: Vec<VerificationVote>,
    pub status: VerificationStatus,
    pub deadline: Height,
    pub submitted_at: Height,
    /// Set once company creation consumed the equity rewards.
    pub rewards_granted: bool,
}

impl BusinessVerification {
    pub fn has_voted(&self, validator: &Address) -> bool {
        self.votes.iter().any(|v| v.validator == *validator)
    }

    pub fn approvals(&self) -> usize {
        self.votes.iter().filter(|v| v.approve).count()
    }

    pub fn rejections(&self) -> usize {
        self.votes.iter().filter(|v| !v.approve).count()
    }
}

/// Tier required to verify a business, by declared valuation.
/// Bands: < 1M HODL Bronze, < 5M Silver, < 20M Gold, < 100M Platinum,
/// else Diamond.
pub fn required_tier_for_valuation(valuation: Amount) -> Tier {
    const M: Amount = 1_000_000 * UHODL_PER_HODL;
    match valuation {
        v if v < M => Tier::Bronze,
        v if v < 5 * M => Tier::Silver,
        v if v < 20 * M => Tier::Gold,
        v if v < 100 * M => Tier::Platinum,
        _ => Tier::Diamond,
    }
}

/// Equity rewards vest with a cliff and then linearly to `end_height`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VestingAccount {
    pub id: u64,
    pub owner: Address,
    pub denom: String,
    pub total: Amount,
    pub released: Amount,
    pub start_height: Height,
    pub cliff_height: Height,
    pub end_height: Height,
    /// Set by a fraud clawback; nothing further releases.
    pub revoked: bool,
}

impl VestingAccount {
    /// Amount vested by `height`: zero before the cliff, linear from cliff
    /// to end, everything after.
    pub fn vested_at(&self, height: Height) -> Amount {
        if self.revoked || height < self.cliff_height {
            return self.released.min(self.total);
        }
        if height >= self.end_height {
            return self.total;
        }
        let span = (self.end_height - self.cliff_height) as u128;
        let elapsed = (height - self.cliff_height) as u128;
        self.total * elapsed / span
    }

    pub fn unreleased(&self) -> Amount {
        self.total - self.released
    }
}
