//! Schema versions.
//!
//! A [`Version`] is an ordered `(minor, patch)` pair with the canonical text
//! form `"<minor>.<patch>"`. Stored documents carry this text in their
//! reserved tag field.

use core::fmt;
use core::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Error produced when text is not a `"<minor>.<patch>"` version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version format {input:?}: expected \"<minor>.<patch>\"")]
pub struct VersionError {
    /// The rejected input.
    pub input: String,
}

impl VersionError {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

/// A schema revision.
///
/// Ordering compares `minor` first, then `patch`.
///
/// # Example
///
/// ```
/// use doc_migrate::Version;
///
/// let v: Version = "0.2".parse().unwrap();
/// assert_eq!(v, Version::new(0, 2));
/// assert_eq!(v.to_string(), "0.2");
/// assert!(v < v.next_minor().unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    minor: u32,
    patch: u32,
}

impl Version {
    /// The `0.0` version.
    pub const ZERO: Version = Version::new(0, 0);

    /// Build a version from its parts.
    pub const fn new(minor: u32, patch: u32) -> Self {
        Self { minor, patch }
    }

    /// Parse the canonical `"<minor>.<patch>"` form.
    ///
    /// Both parts must be non-empty runs of ASCII digits that fit in a `u32`.
    /// Signs, whitespace and extra components are rejected.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let (minor, patch) = text.split_once('.').ok_or_else(|| VersionError::new(text))?;
        Ok(Self {
            minor: parse_part(minor).ok_or_else(|| VersionError::new(text))?,
            patch: parse_part(patch).ok_or_else(|| VersionError::new(text))?,
        })
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    /// The version with `minor` bumped by one. `patch` is carried over.
    ///
    /// Returns `None` if `minor` is already `u32::MAX`.
    pub fn next_minor(&self) -> Option<Self> {
        Some(Self::new(self.minor.checked_add(1)?, self.patch))
    }

    /// The version with `patch` bumped by one.
    ///
    /// Returns `None` if `patch` is already `u32::MAX`.
    pub fn next_patch(&self) -> Option<Self> {
        Some(Self::new(self.minor, self.patch.checked_add(1)?))
    }
}

fn parse_part(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Version {
    type Error = VersionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionVisitor;

        impl Visitor<'_> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a \"<minor>.<patch>\" version string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Version, E> {
                Version::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(VersionVisitor)
    }
}
