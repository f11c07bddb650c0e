use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Token amount in micro base units (`uhodl`, `ustake`, `u<SYMBOL>`). u128
/// comfortably covers any realistic supply with headroom for fee arithmetic.
pub type Amount = u128;

/// Block height as delivered by consensus.
pub type Height = u64;

/// Block time in Unix seconds (UTC), taken from the block header only.
pub type Timestamp = i64;

/// Per-account transaction counter (replay protection).
pub type Sequence = u64;

// ── Bech32 HRPs ──────────────────────────────────────────────────────────────

/// Account address prefix.
pub const HRP_ACCOUNT: &str = "hodl";
/// Validator operator address prefix.
pub const HRP_VALOPER: &str = "hodlvaloper";
/// Validator consensus address prefix.
pub const HRP_VALCONS: &str = "hodlvalcons";

// ── Address ──────────────────────────────────────────────────────────────────

/// 20-byte account identifier: the first 20 bytes of BLAKE3(public_key).
///
/// Rendered as bech32 with the `hodl` HRP for accounts; the same payload is
/// rendered under `hodlvaloper` when the account acts as a validator operator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Bech32 rendering under an arbitrary HRP.
    pub fn to_bech32(&self, hrp: &str) -> String {
        bech32::encode(hrp, self.0.to_base32(), Variant::Bech32)
            .expect("bech32 encoding of a 20-byte payload is infallible")
    }

    /// Parse a bech32 address, requiring the given HRP.
    pub fn from_bech32(s: &str, expect_hrp: &str) -> Result<Self, Error> {
        let (hrp, data, variant) =
            bech32::decode(s).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        if hrp != expect_hrp || variant != Variant::Bech32 {
            return Err(Error::InvalidAddress(format!("expected HRP {expect_hrp}")));
        }
        let bytes =
            Vec::<u8>::from_base32(&data).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(Error::InvalidAddress(format!(
                "expected 20-byte payload, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Account rendering (`hodl1…`).
    pub fn to_account(&self) -> String {
        self.to_bech32(HRP_ACCOUNT)
    }

    /// Validator operator rendering (`hodlvaloper1…`).
    pub fn to_valoper(&self) -> String {
        self.to_bech32(HRP_VALOPER)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_account())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}…)", &self.to_account()[..12])
    }
}

// ── TxHash ───────────────────────────────────────────────────────────────────

/// 32-byte transaction identifier: BLAKE3 of the raw tx bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}…)", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bech32_round_trip() {
        let addr = Address::from_bytes([7u8; 20]);
        let s = addr.to_account();
        assert!(s.starts_with("hodl1"));
        let back = Address::from_bech32(&s, HRP_ACCOUNT).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn bech32_wrong_hrp_rejected() {
        let addr = Address::from_bytes([7u8; 20]);
        let s = addr.to_valoper();
        assert!(s.starts_with("hodlvaloper1"));
        assert!(Address::from_bech32(&s, HRP_ACCOUNT).is_err());
    }
}
