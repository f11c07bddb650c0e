//! hodl-store
//!
//! The versioned key-value store underneath every module: a deterministic
//! in-memory committed image with sled write-behind persistence
//! ([`db::StateDb`]), write-overlay caches with rollback ([`cache::Cache`]),
//! height-indexed immutable snapshots for the query layer, the canonical
//! version-tagged codec, and key-layout helpers.

pub mod cache;
pub mod codec;
pub mod db;
pub mod keys;
pub mod store;

pub use cache::{apply_writes, Cache};
pub use db::{Snapshot, StateDb};
pub use store::{MemStore, Store};

use hodl_core::error::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and decode a typed record.
pub fn get_typed<T: DeserializeOwned, S: Store + ?Sized>(
    store: &S,
    key: &[u8],
) -> Result<Option<T>, Error> {
    match store.get(key) {
        Some(bytes) => Ok(Some(codec::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a typed record.
pub fn set_typed<T: Serialize, S: Store + ?Sized>(
    store: &mut S,
    key: &[u8],
    value: &T,
) -> Result<(), Error> {
    store.set(key, codec::to_bytes(value)?);
    Ok(())
}

/// Allocate the next value of a named monotonic counter, starting at 1.
pub fn next_id<S: Store + ?Sized>(store: &mut S, counter_key: &[u8]) -> Result<u64, Error> {
    let current: u64 = get_typed(store, counter_key)?.unwrap_or(1);
    set_typed(store, counter_key, &(current + 1))?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let mut s = MemStore::new();
        set_typed(&mut s, b"k", &("abc".to_string(), 7u32)).unwrap();
        let v: Option<(String, u32)> = get_typed(&s, b"k").unwrap();
        assert_eq!(v, Some(("abc".to_string(), 7)));
    }

    #[test]
    fn counters_are_monotonic() {
        let mut s = MemStore::new();
        assert_eq!(next_id(&mut s, b"ctr").unwrap(), 1);
        assert_eq!(next_id(&mut s, b"ctr").unwrap(), 2);
        assert_eq!(next_id(&mut s, b"ctr").unwrap(), 3);
    }
}
