//! Key-layout helpers.
//!
//! Keys are built from a module prefix plus big-endian integer components so
//! lexicographic byte order equals numeric order. Descending indices (bid
//! price levels) store the bitwise complement.

use hodl_core::types::{Amount, Height};

/// u64 component, ascending byte order.
pub fn be_u64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

/// u128 component, ascending byte order.
pub fn be_u128(v: Amount) -> [u8; 16] {
    v.to_be_bytes()
}

/// u128 component, descending byte order (bitwise complement).
pub fn be_u128_desc(v: Amount) -> [u8; 16] {
    (!v).to_be_bytes()
}

/// Height component, ascending byte order.
pub fn be_height(h: Height) -> [u8; 8] {
    h.to_be_bytes()
}

/// Concatenate key parts.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for p in parts {
        out.extend_from_slice(p);
    }
    out
}

/// Parse a trailing big-endian u64 from a key.
pub fn tail_u64(key: &[u8]) -> Option<u64> {
    let tail = key.get(key.len().checked_sub(8)?..)?;
    Some(u64::from_be_bytes(tail.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_sorts_numerically() {
        assert!(be_u128(5) < be_u128(10));
        assert!(be_u128(255) < be_u128(256));
    }

    #[test]
    fn complement_sorts_descending() {
        assert!(be_u128_desc(10) < be_u128_desc(5));
        assert!(be_u128_desc(256) < be_u128_desc(255));
    }

    #[test]
    fn tail_u64_round_trip() {
        let key = concat(&[b"ord/", &be_u64(77)]);
        assert_eq!(tail_u64(&key), Some(77));
    }
}
