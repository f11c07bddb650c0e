use serde::{Deserialize, Serialize};

use hodl_core::coin::{share_class_denom, share_denom, Coin};
use hodl_core::dec::Dec;
use hodl_core::msg::TransferRestriction;
use hodl_core::types::{Address, Amount, Height};

/// Default share class id; its denom omits the class suffix.
pub const CLASS_COMMON: &str = "common";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyStatus {
    Listed,
    Halted,
    Delisted,
}

/// One share class of a company. `outstanding` is kept equal to the bank
/// supply of the class denom — the cap table lives in bank balances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareClass {
    pub class_id: String,
    pub denom: String,
    pub authorized: Amount,
    pub outstanding: Amount,
    pub voting_weight: Dec,
    pub restrictions: Vec<TransferRestriction>,
}

impl ShareClass {
    pub fn denom_for(symbol: &str, class_id: &str) -> String {
        if class_id == CLASS_COMMON {
            share_denom(symbol)
        } else {
            share_class_denom(symbol, class_id)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: u64,
    pub symbol: String,
    pub name: String,
    pub jurisdiction: String,
    pub status: CompanyStatus,
    /// The controlling account: may issue shares and declare dividends.
    pub owner: Address,
    /// Holds unissued treasury shares; withdrawal-limited under a freeze
    /// warning.
    pub treasury_address: Address,
    /// Set by governance or the validator council during a fraud response.
    pub freeze_warning: bool,
    pub verification_id: u64,
    pub classes: Vec<ShareClass>,
    pub created_at: Height,
}

impl Company {
    pub fn class(&self, class_id: &str) -> Option<&ShareClass> {
        self.classes.iter().find(|c| c.class_id == class_id)
    }

    pub fn class_mut(&mut self, class_id: &str) -> Option<&mut ShareClass> {
        self.classes.iter_mut().find(|c| c.class_id == class_id)
    }

    pub fn class_by_denom(&self, denom: &str) -> Option<&ShareClass> {
        self.classes.iter().find(|c| c.denom == denom)
    }
}

/// Rolling treasury withdrawal window, reset by height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreasuryWindow {
    pub window_start: Height,
    /// Treasury balance when the window opened; the daily cap is a fraction
    /// of this.
    pub start_balance: Amount,
    pub withdrawn: Amount,
}

/// A declared dividend. Holdings at `record_height` are snapshotted into
/// per-address records so claims are pure lookups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub id: u64,
    pub company_id: u64,
    pub symbol: String,
    pub class_id: String,
    pub total: Coin,
    pub record_height: Height,
    pub pay_height: Height,
    pub expiry_height: Height,
    /// Outstanding shares of the class at `record_height`.
    pub outstanding_at_record: Amount,
    /// Sum already paid out to claimers.
    pub claimed_total: Amount,
    /// Set once the expiry sweep returned the residue to the treasury.
    pub settled: bool,
    /// BLAKE3 commitment over the snapshot entries, for external audit.
    pub snapshot_root: [u8; 32],
}

/// A forced-delisting compensation round. Claims register within the window;
/// the pool splits by registered shares at window end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelistRound {
    pub symbol: String,
    pub pool: Coin,
    pub window_end: Height,
    pub total_registered: Amount,
}
