//! Account records and transaction authentication.
//!
//! For every declared signer: the claimed sequence must match the account,
//! the signature must verify over the canonical sign-bytes, and the fee is
//! deducted from the primary signer. Sequence increments and the fee stick
//! even when the message handlers later fail — replay protection must not
//! roll back.
//!
//! Key layout:
//!   auth/acc/<addr20>  → Account

use serde::{Deserialize, Serialize};

use hodl_bank::{module_account, Bank};
use hodl_core::constants::MODULE_FEE_COLLECTOR;
use hodl_core::error::Error;
use hodl_core::params::AuthParams;
use hodl_core::tx::Tx;
use hodl_core::types::{Address, Sequence};
use hodl_crypto::{address_from_pubkey, SignatureVerifier};
use hodl_store::{get_typed, next_id, set_typed, Store};

const ACC_PREFIX: &[u8] = b"auth/acc/";
const ACC_NUMBER_COUNTER: &[u8] = b"auth/next_account_number";

fn acc_key(addr: &Address) -> Vec<u8> {
    let mut k = ACC_PREFIX.to_vec();
    k.extend_from_slice(addr.as_bytes());
    k
}

/// On-chain account state. Created on first use, never destroyed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    /// Unique, monotonic, fixed at creation. Part of the sign-bytes for
    /// replay protection across chain forks.
    pub account_number: u64,
    pub sequence: Sequence,
    /// Set on the first signed transaction.
    pub pubkey: Option<Vec<u8>>,
}

pub fn account<S: Store>(store: &S, addr: &Address) -> Result<Option<Account>, Error> {
    get_typed(store, &acc_key(addr))
}

/// Load or create the account record for `addr`.
pub fn account_or_create<S: Store>(store: &mut S, addr: &Address) -> Result<Account, Error> {
    if let Some(acc) = account(store, addr)? {
        return Ok(acc);
    }
    let account_number = next_id(store, ACC_NUMBER_COUNTER)?;
    let acc = Account { address: *addr, account_number, sequence: 0, pubkey: None };
    set_typed(store, &acc_key(addr), &acc)?;
    Ok(acc)
}

fn put_account<S: Store>(store: &mut S, acc: &Account) -> Result<(), Error> {
    set_typed(store, &acc_key(&acc.address), acc)
}

/// Authenticate a transaction and charge its fee. On success the signer
/// addresses are returned for message-level authorization; the sequence
/// bumps and the fee transfer are already applied to `store`.
pub fn authenticate<S: Store>(
    store: &mut S,
    bank: &Bank,
    verifier: &dyn SignatureVerifier,
    params: &AuthParams,
    tx: &Tx,
) -> Result<Vec<Address>, Error> {
    // ── Signature & sequence checks (no writes yet) ──────────────────────────
    let mut signers = Vec::with_capacity(tx.signers.len());
    for (i, signer) in tx.signers.iter().enumerate() {
        let addr = address_from_pubkey(&signer.pubkey);
        let acc = account(store, &addr)?;
        let (expected_seq, account_number) = match &acc {
            Some(a) => {
                if let Some(pk) = &a.pubkey {
                    if *pk != signer.pubkey {
                        return Err(Error::InvalidSignature);
                    }
                }
                (a.sequence, a.account_number)
            }
            // First signed tx from a fresh key: sequence 0, number assigned
            // below.
            None => (0, 0),
        };
        if signer.sequence != expected_seq {
            return Err(Error::SequenceMismatch {
                expected: expected_seq,
                got: signer.sequence,
            });
        }
        // Convention: a first-ever signature covers account number 0; the
        // real number is assigned once the whole tx authenticates.
        let sign_bytes = tx.sign_bytes(i, account_number);
        if !verifier.verify(&signer.pubkey, &sign_bytes, &tx.signatures[i]) {
            return Err(Error::InvalidSignature);
        }
        signers.push(addr);
    }

    // ── Fee ──────────────────────────────────────────────────────────────────
    if !params.fee_denoms.contains(&tx.fee.denom) {
        return Err(Error::InvalidDenom(tx.fee.denom.clone()));
    }
    if tx.fee.amount < params.min_fee {
        return Err(Error::InsufficientFee { need: params.min_fee, have: tx.fee.amount });
    }
    let payer = signers[0];
    let have = bank.balance(store, &payer, &tx.fee.denom)?;
    if have < tx.fee.amount {
        return Err(Error::InsufficientFee { need: tx.fee.amount, have });
    }
    bank.transfer(store, &payer, &module_account(MODULE_FEE_COLLECTOR), &tx.fee)?;

    // ── Commit auth effects: pubkeys and sequence bumps ──────────────────────
    for (addr, signer) in signers.iter().zip(&tx.signers) {
        let mut acc = account_or_create(store, addr)?;
        if acc.pubkey.is_none() {
            acc.pubkey = Some(signer.pubkey.clone());
        }
        acc.sequence += 1;
        put_account(store, &acc)?;
    }
    Ok(signers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::coin::Coin;
    use hodl_core::msg::Msg;
    use hodl_core::tx::{SignerInfo, TxBody};
    use hodl_crypto::{Ed25519Verifier, KeyPair};
    use hodl_store::MemStore;

    fn signed_tx(kp: &KeyPair, sequence: u64, account_number: u64, fee: u128) -> Tx {
        let mut tx = Tx {
            body: TxBody {
                chain_id: "sharehodl-1".into(),
                memo: String::new(),
                msgs: vec![Msg::Send {
                    from: kp.address,
                    to: Address::from_bytes([9; 20]),
                    amount: Coin::uhodl(100),
                }],
            },
            fee: Coin::uhodl(fee),
            signers: vec![SignerInfo { pubkey: kp.public_key.clone(), sequence }],
            signatures: vec![],
        };
        let sign_bytes = tx.sign_bytes(0, account_number);
        tx.signatures = vec![kp.sign(&sign_bytes)];
        tx
    }

    fn setup(kp: &KeyPair, balance: u128) -> (MemStore, Bank) {
        let mut store = MemStore::new();
        let bank = Bank::new();
        bank.mint(&mut store, &kp.address, &Coin::uhodl(balance)).unwrap();
        (store, bank)
    }

    #[test]
    fn valid_signature_and_fee() {
        let kp = KeyPair::generate();
        let (mut store, bank) = setup(&kp, 1_000_000);
        let tx = signed_tx(&kp, 0, 0, 5_000);
        let params = AuthParams::default();

        let signers =
            authenticate(&mut store, &bank, &Ed25519Verifier, &params, &tx).unwrap();
        assert_eq!(signers, vec![kp.address]);

        let acc = account(&store, &kp.address).unwrap().unwrap();
        assert_eq!(acc.sequence, 1);
        assert_eq!(acc.pubkey, Some(kp.public_key.clone()));
        assert_eq!(
            bank.balance(&store, &kp.address, "uhodl").unwrap(),
            1_000_000 - 5_000
        );
    }

    #[test]
    fn wrong_sequence_rejected() {
        let kp = KeyPair::generate();
        let (mut store, bank) = setup(&kp, 1_000_000);
        let tx = signed_tx(&kp, 3, 0, 5_000);
        let err = authenticate(&mut store, &bank, &Ed25519Verifier, &AuthParams::default(), &tx)
            .unwrap_err();
        assert!(matches!(err, Error::SequenceMismatch { expected: 0, got: 3 }));
    }

    #[test]
    fn tampered_body_rejected() {
        let kp = KeyPair::generate();
        let (mut store, bank) = setup(&kp, 1_000_000);
        let mut tx = signed_tx(&kp, 0, 0, 5_000);
        tx.body.memo = "tampered".into();
        let err = authenticate(&mut store, &bank, &Ed25519Verifier, &AuthParams::default(), &tx)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature));
    }

    #[test]
    fn replay_rejected_after_sequence_bump() {
        let kp = KeyPair::generate();
        let (mut store, bank) = setup(&kp, 1_000_000);
        let params = AuthParams::default();
        let tx = signed_tx(&kp, 0, 0, 5_000);
        authenticate(&mut store, &bank, &Ed25519Verifier, &params, &tx).unwrap();
        let err =
            authenticate(&mut store, &bank, &Ed25519Verifier, &params, &tx).unwrap_err();
        assert!(matches!(err, Error::SequenceMismatch { .. }));
    }

    #[test]
    fn fee_below_minimum_rejected() {
        let kp = KeyPair::generate();
        let (mut store, bank) = setup(&kp, 1_000_000);
        let tx = signed_tx(&kp, 0, 0, 1);
        let err = authenticate(&mut store, &bank, &Ed25519Verifier, &AuthParams::default(), &tx)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFee { .. }));
    }
}
