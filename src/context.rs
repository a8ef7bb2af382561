//! Per-run context.
//!
//! Every input and output location, the resolver configuration, and the
//! event override table are gathered once into a [`RunContext`] and passed by
//! reference to each stage. Nothing reads paths from process-wide state.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::IdentityResult;
use crate::overrides::EventOverrides;

/// File locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub observations: PathBuf,
    pub ledger: PathBuf,
    pub frozen_marker: PathBuf,
    pub overrides: PathBuf,
    pub config: PathBuf,
    pub quarantine: PathBuf,
    pub bootstrap_artifact: PathBuf,
    pub fuzzy_artifact: PathBuf,
    pub unmapped_artifact: PathBuf,
    pub quarantine_artifact: PathBuf,
}

impl RunPaths {
    /// Default layout under `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        let out = root.join("out");
        let overrides = root.join("overrides");
        Self {
            observations: out.join("observations.csv"),
            ledger: overrides.join("person_aliases.csv"),
            frozen_marker: overrides.join("person_aliases.lock"),
            overrides: overrides.join("overrides.toml"),
            config: root.join("resolver.toml"),
            quarantine: out.join("persons_quarantine.csv"),
            bootstrap_artifact: out.join("person_alias_map_bootstrap.csv"),
            fuzzy_artifact: out.join("person_alias_suggestions_fuzzy.csv"),
            unmapped_artifact: out.join("unmapped_review.csv"),
            quarantine_artifact: out.join("quarantine_resolution.csv"),
        }
    }
}

/// Everything a stage needs besides the ledger itself.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub paths: RunPaths,
    pub config: ResolverConfig,
    pub overrides: EventOverrides,
}

impl RunContext {
    /// Loads configuration and the override table named by `paths`.
    ///
    /// Missing config or override files yield defaults.
    ///
    /// # Errors
    /// - `ConfigError` for unparsable or out-of-range configuration
    /// - `ConfigError::UnsupportedVersion` for an override table of another version
    pub fn load(paths: RunPaths) -> IdentityResult<Self> {
        let config = ResolverConfig::load_or_default(&paths.config)?;
        let overrides = EventOverrides::load_or_default(&paths.overrides)?;
        debug!(
            config = %paths.config.display(),
            event_overrides = overrides.len(),
            "run context loaded"
        );
        Ok(Self {
            paths,
            config,
            overrides,
        })
    }

    /// Context with default configuration and no event overrides.
    #[must_use]
    pub fn with_defaults(paths: RunPaths) -> Self {
        Self {
            paths,
            config: ResolverConfig::default(),
            overrides: EventOverrides::default(),
        }
    }
}
