use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hodl_core::types::Address;
use rand::rngs::OsRng;

use crate::hash::address_from_pubkey;

/// An Ed25519 keypair plus its derived account address.
pub struct KeyPair {
    signing: SigningKey,
    pub public_key: Vec<u8>,
    pub address: Address,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let public_key = signing.verifying_key().to_bytes().to_vec();
        let address = address_from_pubkey(&public_key);
        Self { signing, public_key, address }
    }

    /// Deterministic keypair from a 32-byte seed. Test fixtures only — a
    /// predictable seed must never reach a real deployment.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let public_key = signing.verifying_key().to_bytes().to_vec();
        let address = address_from_pubkey(&public_key);
        Self { signing, public_key, address }
    }

    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing.sign(msg).to_bytes().to_vec()
    }
}

/// Signature verification seam. The consensus integration may substitute its
/// own primitive; the state machine only sees this trait.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, pubkey: &[u8], msg: &[u8], signature: &[u8]) -> bool;
}

/// Production verifier backed by ed25519-dalek.
#[derive(Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, pubkey: &[u8], msg: &[u8], signature: &[u8]) -> bool {
        let Ok(pk_bytes) = <[u8; 32]>::try_from(pubkey) else {
            return false;
        };
        let Ok(pk) = VerifyingKey::from_bytes(&pk_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        pk.verify(msg, &Signature::from_bytes(&sig_bytes)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let kp = KeyPair::generate();
        let msg = b"sharehodl sign bytes";
        let sig = kp.sign(msg);
        assert!(Ed25519Verifier.verify(&kp.public_key, msg, &sig));
        assert!(!Ed25519Verifier.verify(&kp.public_key, b"other", &sig));
    }

    #[test]
    fn seeded_keypair_is_deterministic() {
        let a = KeyPair::from_seed([42u8; 32]);
        let b = KeyPair::from_seed([42u8; 32]);
        assert_eq!(a.address, b.address);
    }
}
