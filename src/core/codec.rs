// src/core/codec.rs

//! JSON encoding for structured values kept in the store as plain strings.

use crate::core::LinkError;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serializes `value` to its JSON text form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, LinkError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| LinkError::Serialization(e.to_string()))
}

/// Parses stored JSON text into `T`. Both malformed JSON and well-formed JSON
/// that does not fit `T` are reported as `LinkError::Deserialization`.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, LinkError> {
    serde_json::from_slice(raw).map_err(|e| LinkError::Deserialization(e.to_string()))
}
