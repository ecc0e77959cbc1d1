use core::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{MigrateError, Result};
use crate::version::Version;

/// Name of the reserved field holding the version tag.
pub const VERSION_FIELD: &str = "_version";

/// A payload together with its version tag.
///
/// On the wire the tag is one top-level `_version` field and the payload's
/// own fields sit inline next to it:
///
/// ```text
/// {"_version": "0.1", "home": "h", "address": "a", "gender": "g"}
/// ```
///
/// # Example
///
/// ```
/// use doc_migrate::{peek_version, Envelope, JsonCodec, Version};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Note { text: String }
///
/// let note = Note { text: "hi".into() };
/// let bytes = Envelope::encode(&JsonCodec, Version::new(1, 0), &note).unwrap();
/// assert_eq!(bytes, br#"{"_version":"1.0","text":"hi"}"#);
///
/// assert_eq!(peek_version(&JsonCodec, &bytes).unwrap(), Version::new(1, 0));
/// let decoded: Envelope<Note> = Envelope::decode(&JsonCodec, &bytes).unwrap();
/// assert_eq!(decoded.payload, note);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Schema version of the payload.
    #[serde(rename = "_version")]
    pub version: Version,
    /// The payload, flattened next to the tag.
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Create a new envelope.
    pub fn new(version: Version, payload: P) -> Self {
        Self { version, payload }
    }

    /// Split into tag and payload.
    pub fn into_parts(self) -> (Version, P) {
        (self.version, self.payload)
    }
}

impl<P: Serialize> Envelope<P> {
    /// Encode `payload` tagged with `version`.
    pub fn encode<C: Codec>(codec: &C, version: Version, payload: &P) -> Result<Vec<u8>> {
        codec
            .encode(&Envelope { version, payload })
            .map_err(MigrateError::codec)
    }
}

impl<P: DeserializeOwned> Envelope<P> {
    /// Decode bytes into a tagged payload of shape `P`, consuming the tag.
    pub fn decode<C: Codec>(codec: &C, bytes: &[u8]) -> Result<Self> {
        codec.decode(bytes).map_err(MigrateError::codec)
    }
}

/// Read only the version tag of an encoded document.
///
/// Returns `Ok(None)` when the field is absent or does not hold a valid
/// version string. Fails only if the bytes are not a document at all.
pub fn peek_tag<C: Codec>(codec: &C, bytes: &[u8]) -> Result<Option<Version>> {
    let tag: Tag = codec.decode(bytes).map_err(MigrateError::codec)?;
    tracing::trace!(tag = ?tag.version.0, "peeked version tag");
    Ok(tag.version.0)
}

/// Read only the version tag, failing with `NoVersionTag` if it is missing
/// or unparsable.
pub fn peek_version<C: Codec>(codec: &C, bytes: &[u8]) -> Result<Version> {
    peek_tag(codec, bytes)?.ok_or(MigrateError::NoVersionTag)
}

#[derive(Deserialize)]
struct Tag {
    #[serde(rename = "_version", default)]
    version: LenientVersion,
}

/// Accepts any value; keeps it only if it is a valid version string.
#[derive(Debug, Default)]
struct LenientVersion(Option<Version>);

impl<'de> Deserialize<'de> for LenientVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        struct LenientVisitor;

        impl<'de> Visitor<'de> for LenientVisitor {
            type Value = LenientVersion;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("any value")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(Version::parse(v).ok()))
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_i128<E: de::Error>(self, _: i128) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_u128<E: de::Error>(self, _: u128) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_char<E: de::Error>(self, _: char) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_bytes<E: de::Error>(self, _: &[u8]) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_unit<E: de::Error>(self) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_none<E: de::Error>(self) -> core::result::Result<Self::Value, E> {
                Ok(LenientVersion(None))
            }

            fn visit_some<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> core::result::Result<Self::Value, D::Error> {
                LenientVersion::deserialize(deserializer)
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> core::result::Result<Self::Value, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(LenientVersion(None))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> core::result::Result<Self::Value, A::Error> {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(LenientVersion(None))
            }
        }

        deserializer.deserialize_any(LenientVisitor)
    }
}
