use hodl_core::types::Address;

/// BLAKE3 digest of arbitrary bytes.
pub fn digest(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive an account address from an Ed25519 public key: the first 20 bytes
/// of BLAKE3(pubkey).
pub fn address_from_pubkey(pubkey: &[u8]) -> Address {
    let hash = blake3::hash(pubkey);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.as_bytes()[..20]);
    Address::from_bytes(out)
}

/// Derive a module-account address from the module name. Module accounts
/// hold no public key; nothing can sign for them.
pub fn module_address(name: &str) -> Address {
    let mut input = b"module/".to_vec();
    input.extend_from_slice(name.as_bytes());
    let hash = blake3::hash(&input);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.as_bytes()[..20]);
    Address::from_bytes(out)
}
