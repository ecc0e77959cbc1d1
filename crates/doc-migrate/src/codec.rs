//! The byte-level codec seam.
//!
//! The engine never touches bytes itself. It asks a [`Codec`] to turn a
//! serde value into bytes and back. The codec must be self-describing: the
//! envelope inlines payload fields next to the version tag and reads the tag
//! without knowing the payload's shape.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A self-describing serde format.
pub trait Codec: Send + Sync {
    /// Error type of this format.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encode a value to bytes.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, Self::Error>;

    /// Decode bytes into a value of shape `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// JSON documents via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(bytes)
    }
}
