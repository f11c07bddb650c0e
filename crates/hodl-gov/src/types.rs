use serde::{Deserialize, Serialize};

use hodl_core::dec::Dec;
use hodl_core::msg::{ProposalPayload, VoteOption};
use hodl_core::types::{Address, Amount, Height};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    DepositPeriod,
    VotingPeriod,
    Passed,
    Rejected,
    Vetoed,
    FailedQuorum,
    Executed,
    ExecutionFailed,
}

impl ProposalStatus {
    pub fn name(self) -> &'static str {
        match self {
            ProposalStatus::DepositPeriod => "deposit",
            ProposalStatus::VotingPeriod => "voting",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Vetoed => "vetoed",
            ProposalStatus::FailedQuorum => "failed_quorum",
            ProposalStatus::Executed => "executed",
            ProposalStatus::ExecutionFailed => "execution_failed",
        }
    }
}

/// A governance proposal. Tally fractions and the voting period are
/// snapshotted at submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub title: String,
    /// BLAKE3 commitment to the full proposal text, kept off-chain.
    pub description_hash: [u8; 32],
    pub submitter: Address,
    pub payload: ProposalPayload,
    pub initial_deposit: Amount,
    pub total_deposit: Amount,
    /// Individual contributions, for refunds and the veto burn.
    pub deposits: Vec<(Address, Amount)>,
    pub deposit_end: Height,
    pub voting_start: Height,
    pub voting_end: Height,
    pub status: ProposalStatus,
    pub quorum: Dec,
    pub threshold: Dec,
    pub veto_threshold: Dec,
    pub voting_period: Height,
}

/// A voter's (possibly split) ballot. Weights are fractions of the voter's
/// power and sum to one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: Address,
    pub weights: Vec<(VoteOption, Dec)>,
}
