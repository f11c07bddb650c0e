//! Canonical, version-tagged entity encoding.
//!
//! Every persisted record is `[CODEC_VERSION] ++ bincode(entity)`. Decoding
//! rejects unknown versions instead of guessing, so a node never silently
//! misreads a record written by a future release.

use hodl_core::error::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CODEC_VERSION: u8 = 1;

pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let mut out = vec![CODEC_VERSION];
    let body = bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))?;
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    match bytes.split_first() {
        Some((&CODEC_VERSION, body)) => {
            bincode::deserialize(body).map_err(|e| Error::Serialization(e.to_string()))
        }
        Some((version, _)) => Err(Error::Serialization(format!(
            "unknown codec version {version}"
        ))),
        None => Err(Error::Serialization("empty record".into())),
    }
}
