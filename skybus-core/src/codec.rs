//! Pluggable payload serialization.
//!
//! The session layer never touches concrete wire formats: payloads are
//! turned into bytes and back through a [`MessageCodec`]. [`JsonCodec`] is
//! the default — human-readable and convenient while developing — and any
//! other serde-compatible format (bincode, CBOR, a DSDL-style binary
//! codec) can be plugged in by implementing the trait.
//!
//! ```rust
//! use skybus_core::{JsonCodec, MessageCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Reading {
//!     channel: u8,
//!     value: f32,
//! }
//!
//! let codec = JsonCodec;
//! let reading = Reading { channel: 3, value: 1.5 };
//!
//! let bytes = codec.encode(&reading).unwrap();
//! let decoded: Reading = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded, reading);
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type for codec operations.
#[derive(Debug)]
pub enum CodecError {
    /// Failed to encode a value to bytes.
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes into a value.
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(e) => write!(f, "encode error: {}", e),
            CodecError::Decode(e) => write!(f, "decode error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(e) => Some(e.as_ref()),
            CodecError::Decode(e) => Some(e.as_ref()),
        }
    }
}

/// Pluggable payload serialization format.
///
/// The trait requires `Clone + 'static` so codec instances can be handed
/// to each endpoint and to the background tasks that decode on their
/// behalf. Codecs are expected to be stateless or cheaply clonable.
pub trait MessageCodec: Clone + 'static {
    /// Encode a serializable value to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are not a valid
    /// encoding of `T`.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec backed by `serde_json`.
///
/// The default codec. Inefficient compared to binary formats but
/// self-describing, which makes malformed-payload diagnostics and test
/// fixtures trivially readable.
#[derive(Clone, Copy, Default, Debug)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
