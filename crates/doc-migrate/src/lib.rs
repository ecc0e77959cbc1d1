//! # doc-migrate
//!
//! Versioned documents whose schema can evolve without breaking records that
//! are already stored.
//!
//! Every stored document carries a `_version` tag next to its own fields.
//! On read, the tag selects a decoder for that historical shape, and a chain
//! of pure transforms upgrades the decoded value one version at a time until
//! it reaches the shape the application currently uses. On write, the
//! current version is always used.
//!
//! ## How It Works
//!
//! 1. Each historical shape is a serde record implementing [`Schema`].
//! 2. An enum over all shapes implements [`Document`] (usually derived).
//! 3. A [`Registry`] maps versions to decoders and `(from, to)` pairs to
//!    transforms. It is built once and read-only afterwards.
//! 4. [`Registry::load`] peeks the tag, decodes, and walks the transform
//!    graph up to the requested version. [`Registry::save`] writes a record
//!    with its own version tag.
//!
//! ## Key Concepts
//!
//! - **Forward only**: every edge strictly increases the version; asking for
//!   an older version than the stored one is an error.
//! - **Greedy by default**: without a direct edge to the target, the walk
//!   takes the largest one-hop jump. [`PathStrategy::Shortest`] switches to
//!   a breadth-first search.
//! - **Planned before applied**: the whole path is resolved before the first
//!   transform runs.
//!
//! ## Example
//!
//! ```
//! use doc_migrate::{schema, Document, Registry};
//! use serde::{Deserialize, Serialize};
//!
//! #[schema(version = "0.1")]
//! #[derive(Debug, Serialize, Deserialize)]
//! struct SensorV1 { celsius: f64 }
//!
//! #[schema(version = "0.2")]
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct SensorV2 { kelvin: f64 }
//!
//! #[derive(Document)]
//! enum Sensor { V1(SensorV1), V2(SensorV2) }
//!
//! let registry = Registry::<Sensor>::builder()
//!     .decoder::<SensorV1>()?
//!     .decoder::<SensorV2>()?
//!     .transform(|old: SensorV1| SensorV2 { kelvin: old.celsius + 273.0 })?
//!     .build();
//!
//! let stored = br#"{"_version": "0.1", "celsius": 20.0}"#;
//! let sensor: SensorV2 = registry.load_current(stored)?;
//! assert_eq!(sensor, SensorV2 { kelvin: 293.0 });
//!
//! let bytes = registry.save(&sensor)?;
//! assert_eq!(bytes, br#"{"_version":"0.2","kelvin":293.0}"#);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod codec;
mod config;
mod engine;
mod envelope;
mod error;
mod registry;
mod schema;
mod version;

pub use codec::{Codec, JsonCodec};
pub use config::{MigrationConfig, PathStrategy};
pub use envelope::{peek_tag, peek_version, Envelope, VERSION_FIELD};
pub use error::{MigrateError, RegistryError, Result};
pub use registry::{Decoder, Registry, RegistryBuilder, Transform, TransformFn};
pub use schema::{Document, Schema};
pub use version::{Version, VersionError};

// Re-export proc macros when the `macros` feature is enabled.
#[cfg(feature = "macros")]
pub use doc_migrate_macros::{schema, Document};
