//! The signed transaction envelope.
//!
//! A transaction is a sequence of typed messages sharing one fee and one
//! signer set. Canonical encoding is bincode of the full structure; the
//! sign-bytes are bincode of a [`SignDoc`] carrying `(chain_id,
//! account_number, sequence)` for replay protection.

use serde::{Deserialize, Serialize};

use crate::coin::Coin;
use crate::constants::{MAX_MEMO_BYTES, MAX_MSGS_PER_TX, MAX_TX_BYTES};
use crate::error::Error;
use crate::msg::Msg;
use crate::types::{Sequence, TxHash};

/// One declared signer: the key that signs and the sequence it claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Raw Ed25519 public key bytes (32).
    pub pubkey: Vec<u8>,
    pub sequence: Sequence,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxBody {
    pub chain_id: String,
    pub memo: String,
    pub msgs: Vec<Msg>,
}

/// A fully-formed signed transaction as delivered by consensus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub body: TxBody,
    /// Fee deducted from the primary (first) signer.
    pub fee: Coin,
    pub signers: Vec<SignerInfo>,
    /// One signature per signer, over that signer's [`SignDoc`] bytes.
    pub signatures: Vec<Vec<u8>>,
}

/// The canonical structure each signature covers.
#[derive(Serialize)]
pub struct SignDoc<'a> {
    pub chain_id: &'a str,
    pub account_number: u64,
    pub sequence: Sequence,
    pub fee: &'a Coin,
    pub memo: &'a str,
    pub msgs: &'a [Msg],
}

impl Tx {
    /// Decode from raw consensus bytes. Enforces the size cap before parsing.
    pub fn decode(raw: &[u8]) -> Result<Tx, Error> {
        if raw.len() > MAX_TX_BYTES {
            return Err(Error::Decode(format!(
                "transaction exceeds {MAX_TX_BYTES} bytes"
            )));
        }
        bincode::deserialize(raw).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("tx serialization is infallible")
    }

    /// BLAKE3 of the canonical encoding.
    pub fn hash(&self) -> TxHash {
        TxHash::from_bytes(*blake3::hash(&self.encode()).as_bytes())
    }

    /// The canonical bytes signer `i` must sign, given its account number.
    pub fn sign_bytes(&self, signer_index: usize, account_number: u64) -> Vec<u8> {
        let doc = SignDoc {
            chain_id: &self.body.chain_id,
            account_number,
            sequence: self.signers[signer_index].sequence,
            fee: &self.fee,
            memo: &self.body.memo,
            msgs: &self.body.msgs,
        };
        bincode::serialize(&doc).expect("sign doc serialization is infallible")
    }

    /// Stateless validation of the envelope and every message.
    pub fn validate_basic(&self) -> Result<(), Error> {
        if self.body.msgs.is_empty() {
            return Err(Error::Decode("transaction carries no messages".into()));
        }
        if self.body.msgs.len() > MAX_MSGS_PER_TX {
            return Err(Error::TooManyMessages { max: MAX_MSGS_PER_TX });
        }
        if self.body.memo.len() > MAX_MEMO_BYTES {
            return Err(Error::MemoTooLong { max: MAX_MEMO_BYTES });
        }
        if self.signers.is_empty() {
            return Err(Error::Decode("transaction declares no signers".into()));
        }
        if self.signers.len() != self.signatures.len() {
            return Err(Error::Decode(
                "signer and signature counts differ".into(),
            ));
        }
        for msg in &self.body.msgs {
            msg.validate_basic()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Msg;
    use crate::types::Address;

    fn sample_tx() -> Tx {
        Tx {
            body: TxBody {
                chain_id: "sharehodl-1".into(),
                memo: String::new(),
                msgs: vec![Msg::Send {
                    from: Address::from_bytes([1; 20]),
                    to: Address::from_bytes([2; 20]),
                    amount: Coin::uhodl(500),
                }],
            },
            fee: Coin::uhodl(100),
            signers: vec![SignerInfo { pubkey: vec![0; 32], sequence: 0 }],
            signatures: vec![vec![0; 64]],
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let tx = sample_tx();
        let raw = tx.encode();
        let back = Tx::decode(&raw).unwrap();
        assert_eq!(tx, back);
        assert_eq!(tx.hash(), back.hash());
    }

    #[test]
    fn sign_bytes_change_with_sequence() {
        let mut tx = sample_tx();
        let a = tx.sign_bytes(0, 7);
        tx.signers[0].sequence = 1;
        let b = tx.sign_bytes(0, 7);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_tx_rejected() {
        let mut tx = sample_tx();
        tx.body.msgs.clear();
        assert!(tx.validate_basic().is_err());
    }
}
