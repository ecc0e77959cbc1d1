use thiserror::Error;

use crate::version::{Version, VersionError};

/// Result alias for load, save and transform operations.
pub type Result<T, E = MigrateError> = core::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised while loading, transforming or saving a document.
///
/// None of these are transient: each one points at bad data or a missing
/// registration, and the engine never retries.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Text does not match the `"<minor>.<patch>"` grammar.
    #[error(transparent)]
    InvalidVersionFormat(#[from] VersionError),

    /// The document lacks a parsable `_version` field.
    #[error("document has no valid `_version` tag")]
    NoVersionTag,

    /// No decoder is registered for the stored version.
    #[error("no decoder registered for stored version {version}")]
    LoaderNotFound { version: Version },

    /// No forward edge leads from `from` towards `target`.
    #[error("no transform leads from version {from} towards {target}")]
    TransformerNotFound { from: Version, target: Version },

    /// A payload did not have the shape its version tag promised.
    #[error("expected a payload of version {expected}, found version {found}")]
    TransformerPayloadMismatch { expected: Version, found: Version },

    /// The requested target is older than the document.
    #[error("cannot downgrade from version {from} to {target}; bump the current version instead")]
    DowngradeNotAllowed { from: Version, target: Version },

    /// The underlying codec failed to encode or decode.
    #[error("codec error: {source}")]
    Codec {
        #[source]
        source: BoxError,
    },
}

impl MigrateError {
    /// Wrap a codec error.
    pub fn codec(source: impl Into<BoxError>) -> Self {
        Self::Codec {
            source: source.into(),
        }
    }
}

/// Error raised while building a [`Registry`](crate::Registry).
///
/// These surface at startup, never during a load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A version string in the registration tables is malformed.
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    /// Two decoders were registered for the same version.
    #[error("a decoder for version {0} is already registered")]
    DuplicateDecoder(Version),

    /// Two transforms were registered for the same edge.
    #[error("a transform from {from} to {to} is already registered")]
    DuplicateTransform { from: Version, to: Version },

    /// The transform does not strictly advance the version.
    #[error("transform from {from} to {to} does not move forward")]
    BackwardTransform { from: Version, to: Version },

    /// A derived decoder was registered under another schema's version.
    #[error("decoder for schema version {schema} registered under version {registered}")]
    DecoderVersionMismatch { registered: Version, schema: Version },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_name_the_versions() {
        let err = MigrateError::DowngradeNotAllowed {
            from: Version::new(0, 3),
            target: Version::new(0, 1),
        };
        assert!(err.to_string().contains("0.3"));
        assert!(err.to_string().contains("0.1"));

        let err = RegistryError::BackwardTransform {
            from: Version::new(1, 0),
            to: Version::new(0, 9),
        };
        assert_eq!(err.to_string(), "transform from 1.0 to 0.9 does not move forward");
    }

    #[test]
    fn codec_error_keeps_source() {
        let json_err = serde_json::from_str::<u8>("nope").unwrap_err();
        let err = MigrateError::codec(json_err);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("codec error"));
    }
}
