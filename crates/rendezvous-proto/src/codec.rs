//! CBOR encode/decode for wire records.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Codec failures. Encode errors are local bugs or resource exhaustion;
/// decode errors mean the peer sent something this version cannot read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Deserialization failed.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Encode a record to CBOR bytes.
///
/// # Errors
///
/// `CodecError::Encode` if serialization fails.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode a record from CBOR bytes.
///
/// # Errors
///
/// `CodecError::Decode` if the bytes are not a valid encoding of `T`.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
