//! Loading, saving and the transform walk.

use std::collections::{BTreeMap, VecDeque};

use crate::codec::Codec;
use crate::config::PathStrategy;
use crate::envelope::{peek_tag, Envelope};
use crate::error::{MigrateError, Result};
use crate::registry::Registry;
use crate::schema::{Document, Schema};
use crate::version::Version;

impl<D, C> Registry<D, C>
where
    D: Document + 'static,
    C: Codec + 'static,
{
    /// The versions a document at `from` passes through on its way to
    /// `target`, excluding `from` itself.
    ///
    /// The path depends only on the registered edges, so it is computed
    /// before any transform runs: a missing edge is reported without touching
    /// the document.
    pub fn plan(&self, from: Version, target: Version) -> Result<Vec<Version>> {
        if from > target {
            return Err(MigrateError::DowngradeNotAllowed { from, target });
        }
        if from == target {
            return Ok(Vec::new());
        }
        match self.config.path_strategy {
            PathStrategy::Greedy => self.plan_greedy(from, target),
            PathStrategy::Shortest => self.plan_shortest(from, target),
        }
    }

    fn plan_greedy(&self, from: Version, target: Version) -> Result<Vec<Version>> {
        let mut path = Vec::new();
        let mut current = from;
        while current != target {
            let next = self
                .reachable
                .get(&current)
                .and_then(|targets| {
                    if targets.contains(&target) {
                        Some(target)
                    } else {
                        targets.last().copied()
                    }
                })
                .ok_or(MigrateError::TransformerNotFound {
                    from: current,
                    target,
                })?;
            // Edges only move forward, so once past the target there is no
            // way back. The error names the last version reached, not the
            // overshoot.
            if next > target {
                tracing::debug!(
                    from = %current,
                    overshoot = %next,
                    %target,
                    "greedy hop passes the target"
                );
                return Err(MigrateError::TransformerNotFound {
                    from: current,
                    target,
                });
            }
            path.push(next);
            current = next;
        }
        Ok(path)
    }

    fn plan_shortest(&self, from: Version, target: Version) -> Result<Vec<Version>> {
        let mut parent: BTreeMap<Version, Version> = BTreeMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                break;
            }
            let Some(targets) = self.reachable.get(&current) else {
                continue;
            };
            for &next in targets.iter().rev() {
                if next > target || parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, current);
                queue.push_back(next);
            }
        }

        if !parent.contains_key(&target) {
            return Err(MigrateError::TransformerNotFound { from, target });
        }
        let mut path = vec![target];
        let mut current = target;
        while let Some(&prev) = parent.get(&current) {
            if prev == from {
                break;
            }
            path.push(prev);
            current = prev;
        }
        path.reverse();
        Ok(path)
    }

    /// Upgrade `doc` to `target`, one registered edge at a time.
    ///
    /// A document already at `target` is returned untouched without running
    /// any transform.
    pub fn transform(&self, doc: D, target: Version) -> Result<D> {
        let from = doc.version();
        let path = self.plan(from, target)?;

        let mut doc = doc;
        let mut current = from;
        for next in path {
            let step = self
                .transforms
                .get(&current)
                .and_then(|targets| targets.get(&next))
                .ok_or(MigrateError::TransformerNotFound {
                    from: current,
                    target,
                })?;
            tracing::debug!(from = %current, to = %next, %target, "applying transform");
            doc = step.apply(doc)?;
            current = next;
        }
        Ok(doc)
    }

    /// Decode `bytes` with the decoder for their stored version and upgrade
    /// the result to `target`.
    pub fn load(&self, bytes: &[u8], target: Version) -> Result<D> {
        let stored = self.stored_version(bytes)?;
        let decoder = self
            .decoders
            .get(&stored)
            .ok_or(MigrateError::LoaderNotFound { version: stored })?;

        tracing::debug!(%stored, %target, "loading document");
        let doc = decoder.decode(&self.codec, bytes)?;
        let found = doc.version();
        if found != stored {
            return Err(MigrateError::TransformerPayloadMismatch {
                expected: stored,
                found,
            });
        }
        self.transform(doc, target)
    }

    /// Load `bytes` as the current shape `S`.
    pub fn load_current<S>(&self, bytes: &[u8]) -> Result<S>
    where
        S: Schema + TryFrom<D, Error = D>,
    {
        let doc = self.load(bytes, S::VERSION)?;
        S::try_from(doc).map_err(|other| MigrateError::TransformerPayloadMismatch {
            expected: S::VERSION,
            found: other.version(),
        })
    }

    /// Encode `value` tagged with its own version. No transform is applied.
    pub fn save<S: Schema>(&self, value: &S) -> Result<Vec<u8>> {
        Envelope::encode(&self.codec, S::VERSION, value)
    }

    /// Whether loading `bytes` as `target` would run any transform.
    pub fn needs_migration(&self, bytes: &[u8], target: Version) -> Result<bool> {
        Ok(self.stored_version(bytes)? != target)
    }

    /// Check that every version with a decoder can be upgraded to `target`.
    ///
    /// Meant to run once at startup, right after [`RegistryBuilder::build`].
    ///
    /// [`RegistryBuilder::build`]: crate::RegistryBuilder::build
    pub fn validate(&self, target: Version) -> Result<()> {
        for version in self.decoders.keys() {
            self.plan(*version, target)?;
        }
        Ok(())
    }

    fn stored_version(&self, bytes: &[u8]) -> Result<Version> {
        match peek_tag(&self.codec, bytes)? {
            Some(version) => Ok(version),
            None => match self.config.assume_version {
                Some(version) => {
                    tracing::warn!(%version, "document has no version tag, assuming configured version");
                    Ok(version)
                }
                None => Err(MigrateError::NoVersionTag),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::config::MigrationConfig;
    use crate::registry::RegistryBuilder;

    /// A single-field counter document where every version shares one shape.
    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        version: Version,
        hits: Vec<Version>,
    }

    impl Document for Counter {
        fn version(&self) -> Version {
            self.version
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn builder_with_edges(edges: &[(&str, &str)]) -> RegistryBuilder<Counter> {
        let mut builder = Registry::<Counter>::builder();
        for &(from, to) in edges {
            let to_version = v(to);
            builder = builder
                .transform_fn(from, to, move |mut doc: Counter| {
                    doc.version = to_version;
                    doc.hits.push(to_version);
                    Ok(doc)
                })
                .unwrap();
        }
        builder
    }

    fn counter(version: &str) -> Counter {
        Counter {
            version: v(version),
            hits: Vec::new(),
        }
    }

    #[test]
    fn same_version_is_a_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let registry = Registry::<Counter>::builder()
            .transform_fn("0.1", "0.2", move |doc| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(doc)
            })
            .unwrap()
            .build();

        let doc = counter("0.1");
        let out = registry.transform(doc.clone(), v("0.1")).unwrap();
        assert_eq!(out, doc);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn downgrade_rejected() {
        let registry = builder_with_edges(&[("0.1", "0.2")]).build();
        let err = registry.transform(counter("0.2"), v("0.1")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::DowngradeNotAllowed { from, target } if from == v("0.2") && target == v("0.1")
        ));
    }

    #[test]
    fn walks_chain_in_order() {
        let registry = builder_with_edges(&[("0.1", "0.2"), ("0.2", "0.3"), ("0.3", "1.0")]).build();
        let out = registry.transform(counter("0.1"), v("1.0")).unwrap();
        assert_eq!(out.version, v("1.0"));
        assert_eq!(out.hits, vec![v("0.2"), v("0.3"), v("1.0")]);

        let out = registry.transform(counter("0.2"), v("0.3")).unwrap();
        assert_eq!(out.hits, vec![v("0.3")]);
    }

    #[test]
    fn direct_edge_wins_over_bigger_jump() {
        let registry = builder_with_edges(&[("0.1", "0.2"), ("0.1", "0.5"), ("0.2", "0.5")]).build();
        assert_eq!(registry.plan(v("0.1"), v("0.2")).unwrap(), vec![v("0.2")]);
    }

    #[test]
    fn greedy_takes_the_largest_jump() {
        let registry = builder_with_edges(&[
            ("0.1", "0.2"),
            ("0.1", "0.3"),
            ("0.2", "0.3"),
            ("0.3", "0.4"),
        ])
        .build();
        assert_eq!(
            registry.plan(v("0.1"), v("0.4")).unwrap(),
            vec![v("0.3"), v("0.4")]
        );
    }

    #[test]
    fn greedy_can_strand_where_shortest_succeeds() {
        // 0.1 -> 0.5 is a dead end; 0.1 -> 0.2 -> 0.3 reaches the target.
        let edges = [("0.1", "0.2"), ("0.1", "0.5"), ("0.2", "0.3")];

        let greedy = builder_with_edges(&edges).build();
        let err = greedy.transform(counter("0.1"), v("0.3")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::TransformerNotFound { from, target } if from == v("0.1") && target == v("0.3")
        ));

        let shortest = builder_with_edges(&edges)
            .config(MigrationConfig::default().path_strategy(PathStrategy::Shortest))
            .build();
        let out = shortest.transform(counter("0.1"), v("0.3")).unwrap();
        assert_eq!(out.hits, vec![v("0.2"), v("0.3")]);
    }

    #[test]
    fn greedy_overshoot_reports_last_version_reached() {
        // 0.2 only jumps to 0.6, past the 0.4 target.
        let registry = builder_with_edges(&[("0.1", "0.2"), ("0.2", "0.6")]).build();
        let err = registry.plan(v("0.1"), v("0.4")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::TransformerNotFound { from, target } if from == v("0.2") && target == v("0.4")
        ));
    }

    #[test]
    fn greedy_dead_end_after_a_hop() {
        let registry = builder_with_edges(&[("0.1", "0.4"), ("0.1", "0.2"), ("0.2", "0.3")]).build();
        // Greedy jumps 0.1 -> 0.4, which has no outgoing edge towards 0.9.
        let err = registry.plan(v("0.1"), v("0.9")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::TransformerNotFound { from, .. } if from == v("0.4")
        ));
    }

    #[test]
    fn shortest_prefers_fewer_hops() {
        let registry = builder_with_edges(&[
            ("0.1", "0.2"),
            ("0.2", "0.3"),
            ("0.3", "0.4"),
            ("0.1", "0.3"),
            ("0.2", "0.4"),
        ])
        .config(MigrationConfig::default().path_strategy(PathStrategy::Shortest))
        .build();
        assert_eq!(
            registry.plan(v("0.1"), v("0.4")).unwrap(),
            vec![v("0.3"), v("0.4")]
        );
    }

    #[test]
    fn unreachable_target_leaves_input_untouched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let registry = Registry::<Counter>::builder()
            .transform_fn("0.1", "0.2", move |mut doc: Counter| {
                seen.fetch_add(1, Ordering::SeqCst);
                doc.version = Version::new(0, 2);
                Ok(doc)
            })
            .unwrap()
            .build();

        let original = counter("0.1");
        let err = registry.transform(original.clone(), v("0.7")).unwrap_err();
        assert!(matches!(err, MigrateError::TransformerNotFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(original, counter("0.1"));
    }

    #[test]
    fn failing_transform_aborts_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&later);
        let registry = Registry::<Counter>::builder()
            .transform_fn("0.1", "0.2", |_| {
                Err(MigrateError::TransformerPayloadMismatch {
                    expected: Version::new(0, 1),
                    found: Version::new(9, 9),
                })
            })
            .unwrap()
            .transform_fn("0.2", "0.3", move |doc| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(doc)
            })
            .unwrap()
            .build();

        let err = registry.transform(counter("0.1"), v("0.3")).unwrap_err();
        assert!(matches!(err, MigrateError::TransformerPayloadMismatch { .. }));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mislabelled_output_is_a_mismatch() {
        let registry = Registry::<Counter>::builder()
            .transform_fn("0.1", "0.2", Ok)
            .unwrap()
            .build();
        let err = registry.transform(counter("0.1"), v("0.2")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::TransformerPayloadMismatch { expected, found }
                if expected == v("0.2") && found == v("0.1")
        ));
    }

    fn counter_decoder(version: &'static str) -> impl Fn(&crate::JsonCodec, &[u8]) -> Result<Counter> {
        move |_: &crate::JsonCodec, _: &[u8]| Ok(counter(version))
    }

    #[test]
    fn load_errors() {
        let registry = builder_with_edges(&[("0.1", "0.2")])
            .decoder_fn("0.1", counter_decoder("0.1"))
            .unwrap()
            .build();

        let err = registry.load(br#"{"n": 1}"#, v("0.2")).unwrap_err();
        assert!(matches!(err, MigrateError::NoVersionTag));

        let err = registry.load(br#"{"_version": "0.4"}"#, v("0.4")).unwrap_err();
        assert!(matches!(err, MigrateError::LoaderNotFound { version } if version == v("0.4")));

        let err = registry.load(br#"{"_version": "0.1"}"#, v("0.3")).unwrap_err();
        assert!(matches!(err, MigrateError::TransformerNotFound { .. }));

        let out = registry.load(br#"{"_version": "0.1"}"#, v("0.2")).unwrap();
        assert_eq!(out.version, v("0.2"));
    }

    #[test]
    fn decoder_must_return_its_own_version() {
        let registry = Registry::<Counter>::builder()
            .decoder_fn("0.1", counter_decoder("0.3"))
            .unwrap()
            .build();
        let err = registry.load(br#"{"_version": "0.1"}"#, v("0.3")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::TransformerPayloadMismatch { expected, found }
                if expected == v("0.1") && found == v("0.3")
        ));
    }

    #[test]
    fn untagged_documents_with_assumed_version() {
        let registry = builder_with_edges(&[("0.1", "0.2")])
            .decoder_fn("0.1", counter_decoder("0.1"))
            .unwrap()
            .config(MigrationConfig::default().assume_version(v("0.1")))
            .build();

        let out = registry.load(br#"{"n": 1}"#, v("0.2")).unwrap();
        assert_eq!(out.hits, vec![v("0.2")]);
        assert!(registry.needs_migration(br#"{"n": 1}"#, v("0.2")).unwrap());
        assert!(!registry
            .needs_migration(br#"{"_version": "0.2"}"#, v("0.2"))
            .unwrap());
    }

    #[test]
    fn validate_finds_stranded_decoders() {
        let registry = builder_with_edges(&[("0.1", "0.2")])
            .decoder_fn("0.1", counter_decoder("0.1"))
            .unwrap()
            .decoder_fn("0.2", counter_decoder("0.2"))
            .unwrap()
            .build();
        assert!(registry.validate(v("0.2")).is_ok());

        let registry = builder_with_edges(&[("0.2", "0.3")])
            .decoder_fn("0.1", counter_decoder("0.1"))
            .unwrap()
            .build();
        let err = registry.validate(v("0.3")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::TransformerNotFound { from, .. } if from == v("0.1")
        ));
    }
}
