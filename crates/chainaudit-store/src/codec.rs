//! Byte codec for every value the store persists.
//!
//! JSON with sorted maps: struct fields serialize in declaration order and
//! all map-typed values are backed by sorted maps, so the same logical
//! value always encodes to the same bytes. Self-describing, which is what
//! lets operation metadata (arbitrarily nested, heterogeneous) survive a
//! round trip. Persisted data is not compatible across codec changes.

use chainaudit_core::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value to its canonical byte representation.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
