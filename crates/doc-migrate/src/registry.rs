//! Decoder table and transform graph.
//!
//! A [`Registry`] is assembled once through a [`RegistryBuilder`] and is
//! read-only afterwards. Every mistake the builder can see (malformed
//! version strings, duplicate entries, edges that do not move forward) is
//! reported there, so a registry that builds is safe to share across
//! threads and never changes under a load.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::codec::{Codec, JsonCodec};
use crate::config::MigrationConfig;
use crate::envelope::{peek_tag, Envelope};
use crate::error::{MigrateError, RegistryError, Result};
use crate::schema::{Document, Schema};
use crate::version::Version;

type DecodeFn<D, C> = dyn Fn(&C, &[u8]) -> Result<D> + Send + Sync;

/// A type-erased transform over the document union.
pub type TransformFn<D> = Box<dyn Fn(D) -> Result<D> + Send + Sync>;

/// Turns raw bytes of one stored version into a document.
pub struct Decoder<D, C = JsonCodec> {
    schema: Option<Version>,
    decode: Box<DecodeFn<D, C>>,
}

impl<D, C> Decoder<D, C>
where
    D: Document + 'static,
    C: Codec + 'static,
{
    /// The decoder derived from a schema record.
    ///
    /// A tagged document is decoded as an [`Envelope`], which consumes the
    /// tag before the inline fields reach `S`. An untagged document (only
    /// loadable through `assume_version`) is decoded as a bare `S`.
    pub fn derived<S>() -> Self
    where
        S: Schema + Into<D> + 'static,
    {
        Self {
            schema: Some(S::VERSION),
            decode: Box::new(|codec: &C, bytes: &[u8]| {
                let record: S = match peek_tag(codec, bytes)? {
                    Some(_) => Envelope::<S>::decode(codec, bytes)?.payload,
                    None => codec.decode(bytes).map_err(MigrateError::codec)?,
                };
                Ok(record.into())
            }),
        }
    }

    /// A custom decoder.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&C, &[u8]) -> Result<D> + Send + Sync + 'static,
    {
        Self {
            schema: None,
            decode: Box::new(f),
        }
    }

    pub(crate) fn decode(&self, codec: &C, bytes: &[u8]) -> Result<D> {
        (self.decode)(codec, bytes)
    }
}

impl<D, C> fmt::Debug for Decoder<D, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// One edge of the version graph.
pub struct Transform<D> {
    from: Version,
    to: Version,
    apply: TransformFn<D>,
}

impl<D: Document + 'static> Transform<D> {
    /// Wrap a typed upgrade function `S -> T`.
    ///
    /// The edge is `S::VERSION -> T::VERSION`. The document is narrowed to
    /// `S` before the call; a document holding another shape fails with
    /// `TransformerPayloadMismatch`.
    pub fn typed<S, T, F>(f: F) -> Self
    where
        S: Schema + TryFrom<D, Error = D> + 'static,
        T: Schema + Into<D> + 'static,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self::try_typed(move |old: S| Ok(f(old)))
    }

    /// Like [`Transform::typed`] for upgrades that can fail.
    pub fn try_typed<S, T, F>(f: F) -> Self
    where
        S: Schema + TryFrom<D, Error = D> + 'static,
        T: Schema + Into<D> + 'static,
        F: Fn(S) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            from: S::VERSION,
            to: T::VERSION,
            apply: Box::new(move |doc: D| {
                let old = S::try_from(doc).map_err(|other| {
                    MigrateError::TransformerPayloadMismatch {
                        expected: S::VERSION,
                        found: other.version(),
                    }
                })?;
                Ok(f(old)?.into())
            }),
        }
    }

    /// Wrap an untyped function over the document union.
    ///
    /// The engine checks that the returned document is tagged `to`.
    pub fn from_fn<F>(from: Version, to: Version, f: F) -> Self
    where
        F: Fn(D) -> Result<D> + Send + Sync + 'static,
    {
        Self {
            from,
            to,
            apply: Box::new(f),
        }
    }

    pub fn source(&self) -> Version {
        self.from
    }

    pub fn target(&self) -> Version {
        self.to
    }

    pub(crate) fn apply(&self, doc: D) -> Result<D> {
        let found = doc.version();
        if found != self.from {
            return Err(MigrateError::TransformerPayloadMismatch {
                expected: self.from,
                found,
            });
        }
        let out = (self.apply)(doc)?;
        let found = out.version();
        if found != self.to {
            return Err(MigrateError::TransformerPayloadMismatch {
                expected: self.to,
                found,
            });
        }
        Ok(out)
    }
}

impl<D> fmt::Debug for Transform<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// The frozen decoder table and transform graph for one document type.
///
/// Loading and saving live in the engine methods on this type.
pub struct Registry<D, C = JsonCodec> {
    pub(crate) codec: C,
    pub(crate) config: MigrationConfig,
    pub(crate) decoders: BTreeMap<Version, Decoder<D, C>>,
    pub(crate) transforms: BTreeMap<Version, BTreeMap<Version, Transform<D>>>,
    pub(crate) reachable: BTreeMap<Version, BTreeSet<Version>>,
}

impl<D: Document + 'static> Registry<D, JsonCodec> {
    /// Start building a registry that stores documents as JSON.
    pub fn builder() -> RegistryBuilder<D, JsonCodec> {
        RegistryBuilder::with_codec(JsonCodec)
    }
}

impl<D, C> Registry<D, C> {
    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Versions with a registered decoder, ascending.
    pub fn decoder_versions(&self) -> Vec<Version> {
        self.decoders.keys().copied().collect()
    }

    /// All registered edges as `(from, to)` pairs, ascending.
    pub fn registered_transforms(&self) -> Vec<(Version, Version)> {
        self.transforms
            .iter()
            .flat_map(|(from, targets)| targets.keys().map(move |to| (*from, *to)))
            .collect()
    }

    /// Versions reachable from `version` in one hop.
    pub fn reachable_from(&self, version: Version) -> Option<&BTreeSet<Version>> {
        self.reachable.get(&version)
    }
}

impl<D, C: fmt::Debug> fmt::Debug for Registry<D, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("codec", &self.codec)
            .field("config", &self.config)
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .field("reachable", &self.reachable)
            .finish()
    }
}

/// Builder for a [`Registry`].
///
/// Each registration returns `Result<Self, RegistryError>` so a bad table
/// stops startup at the offending entry.
///
/// # Example
///
/// ```
/// use doc_migrate::{Document, Registry, Schema, Version};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct V1 { name: String }
/// impl Schema for V1 { const VERSION: Version = Version::new(1, 0); }
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct V2 { name: String, tags: Vec<String> }
/// impl Schema for V2 { const VERSION: Version = Version::new(2, 0); }
///
/// #[derive(Document)]
/// enum Item { V1(V1), V2(V2) }
///
/// let registry = Registry::<Item>::builder()
///     .decoder::<V1>()?
///     .decoder::<V2>()?
///     .transform(|old: V1| V2 { name: old.name, tags: vec![] })?
///     .build();
///
/// let item: V2 = registry.load_current(br#"{"_version":"1.0","name":"pen"}"#)?;
/// assert_eq!(item, V2 { name: "pen".into(), tags: vec![] });
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RegistryBuilder<D, C = JsonCodec> {
    codec: C,
    config: MigrationConfig,
    decoders: BTreeMap<Version, Decoder<D, C>>,
    transforms: BTreeMap<Version, BTreeMap<Version, Transform<D>>>,
}

impl<D, C: fmt::Debug> fmt::Debug for RegistryBuilder<D, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("codec", &self.codec)
            .field("config", &self.config)
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .field("transforms", &self.transforms)
            .finish()
    }
}

impl<D, C> RegistryBuilder<D, C>
where
    D: Document + 'static,
    C: Codec + 'static,
{
    /// Start building a registry over a custom codec.
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            config: MigrationConfig::default(),
            decoders: BTreeMap::new(),
            transforms: BTreeMap::new(),
        }
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the derived decoder for `S` under `S::VERSION`.
    pub fn decoder<S>(self) -> Result<Self, RegistryError>
    where
        S: Schema + Into<D> + 'static,
    {
        self.insert_decoder(S::VERSION, Decoder::derived::<S>())
    }

    /// Register a custom decoder under `version`.
    pub fn decoder_fn<F>(self, version: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(&C, &[u8]) -> Result<D> + Send + Sync + 'static,
    {
        self.register_decoder(version, Decoder::from_fn(f))
    }

    /// Register either kind of decoder under a version string.
    pub fn register_decoder(
        self,
        version: &str,
        decoder: Decoder<D, C>,
    ) -> Result<Self, RegistryError> {
        let version = Version::parse(version)?;
        if let Some(schema) = decoder.schema {
            if schema != version {
                return Err(RegistryError::DecoderVersionMismatch {
                    registered: version,
                    schema,
                });
            }
        }
        self.insert_decoder(version, decoder)
    }

    /// Register every `(version, decoder)` entry of a table.
    pub fn decoder_table<'a, I>(self, table: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (&'a str, Decoder<D, C>)>,
    {
        table
            .into_iter()
            .try_fold(self, |builder, (version, decoder)| {
                builder.register_decoder(version, decoder)
            })
    }

    fn insert_decoder(
        mut self,
        version: Version,
        decoder: Decoder<D, C>,
    ) -> Result<Self, RegistryError> {
        if self.decoders.contains_key(&version) {
            return Err(RegistryError::DuplicateDecoder(version));
        }
        self.decoders.insert(version, decoder);
        Ok(self)
    }

    /// Register a typed upgrade `S -> T`.
    pub fn transform<S, T, F>(self, f: F) -> Result<Self, RegistryError>
    where
        S: Schema + TryFrom<D, Error = D> + 'static,
        T: Schema + Into<D> + 'static,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        self.register_transform(Transform::typed(f))
    }

    /// Register an untyped transform between two version strings.
    pub fn transform_fn<F>(self, from: &str, to: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(D) -> Result<D> + Send + Sync + 'static,
    {
        let from = Version::parse(from)?;
        let to = Version::parse(to)?;
        self.register_transform(Transform::from_fn(from, to, f))
    }

    /// Register every edge of a `source -> (target -> transform)` table.
    pub fn transform_table<'a, I, J>(self, table: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (&'a str, J)>,
        J: IntoIterator<Item = (&'a str, TransformFn<D>)>,
    {
        let mut builder = self;
        for (from, targets) in table {
            for (to, f) in targets {
                builder = builder.transform_fn(from, to, f)?;
            }
        }
        Ok(builder)
    }

    /// Register a prepared transform.
    pub fn register_transform(mut self, transform: Transform<D>) -> Result<Self, RegistryError> {
        let (from, to) = (transform.from, transform.to);
        if to <= from {
            return Err(RegistryError::BackwardTransform { from, to });
        }
        let targets = self.transforms.entry(from).or_default();
        if targets.contains_key(&to) {
            return Err(RegistryError::DuplicateTransform { from, to });
        }
        targets.insert(to, transform);
        Ok(self)
    }

    /// Freeze the tables.
    pub fn build(self) -> Registry<D, C> {
        let reachable = self
            .transforms
            .iter()
            .map(|(from, targets)| (*from, targets.keys().copied().collect()))
            .collect();
        tracing::debug!(
            decoders = self.decoders.len(),
            sources = self.transforms.len(),
            "built migration registry"
        );
        Registry {
            codec: self.codec,
            config: self.config,
            decoders: self.decoders,
            transforms: self.transforms,
            reachable,
        }
    }
}
