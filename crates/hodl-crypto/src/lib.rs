//! hodl-crypto
//!
//! Ed25519 keypairs, BLAKE3 hashing helpers, and address derivation. The
//! state machine consumes signatures only through [`SignatureVerifier`] so
//! the consensus layer can substitute its own primitives.

pub mod hash;
pub mod keypair;

pub use hash::{address_from_pubkey, digest, module_address};
pub use keypair::{Ed25519Verifier, KeyPair, SignatureVerifier};
