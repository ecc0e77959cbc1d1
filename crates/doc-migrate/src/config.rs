use serde::Deserialize;

use crate::version::Version;

/// How the engine picks the next hop when no edge leads straight to the
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStrategy {
    /// Jump to the greatest version reachable in one hop.
    ///
    /// This never backtracks, so it can strand a document when a path
    /// exists only through a smaller jump.
    #[default]
    Greedy,
    /// Breadth-first search for the path with the fewest hops. Ties go to
    /// the path whose first differing hop is the larger jump.
    Shortest,
}

/// Configuration for the migration engine.
///
/// # Example
///
/// ```
/// use doc_migrate::{MigrationConfig, PathStrategy, Version};
///
/// let config = MigrationConfig::from_toml_str(r#"
///     path_strategy = "shortest"
///     assume_version = "0.1"
/// "#).unwrap();
///
/// assert_eq!(config.path_strategy, PathStrategy::Shortest);
/// assert_eq!(config.assume_version, Some(Version::new(0, 1)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Hop selection strategy.
    pub path_strategy: PathStrategy,
    /// Version given to documents that carry no tag, e.g. data written before
    /// versioning was introduced. When unset, such documents are rejected.
    pub assume_version: Option<Version>,
}

impl MigrationConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Set the path strategy.
    pub fn path_strategy(mut self, strategy: PathStrategy) -> Self {
        self.path_strategy = strategy;
        self
    }

    /// Set the version assumed for untagged documents.
    pub fn assume_version(mut self, version: Version) -> Self {
        self.assume_version = Some(version);
        self
    }
}
