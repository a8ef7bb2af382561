//! Resolver configuration.
//!
//! Every weight and threshold the clusterer and review generators use is a
//! named field here. Values are calibration points: changing them changes
//! which pairs reach a reviewer, never what the ledger accepts.
//!
//! ```toml
//! [scoring]
//! same_first_initial = 0.25
//!
//! [fuzzy]
//! min_score = 0.8
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IdentityResult};

/// Additive fuzzy pair weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Awarded to every pair sharing a surname bucket.
    pub baseline: f64,
    pub same_first_initial: f64,
    pub initial_vs_full: f64,
    pub first_name_prefix: f64,
    pub same_first_token: f64,
    /// Upper bound on any pair score; must stay below 1.0.
    pub cap: f64,
    /// Minimum length of the shorter given name for the prefix bonus.
    pub prefix_min_len: usize,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            baseline: 0.40,
            same_first_initial: 0.25,
            initial_vs_full: 0.20,
            first_name_prefix: 0.10,
            same_first_token: 0.10,
            cap: 0.99,
            prefix_min_len: 3,
        }
    }
}

/// Fuzzy pass thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Names with fewer appearances are left out of the fuzzy pass.
    pub min_appearances: u64,
    pub min_score: f64,
    /// Members kept per surname bucket after sorting by usage.
    pub max_bucket: usize,
    /// Lower bound applied to `max_bucket`.
    pub min_bucket: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            min_appearances: 20,
            min_score: 0.75,
            max_bucket: 40,
            min_bucket: 5,
        }
    }
}

impl FuzzyConfig {
    /// Effective bucket truncation for a bucket of `len` members.
    #[must_use]
    pub fn bucket_limit(&self, len: usize) -> usize {
        len.min(self.max_bucket).max(self.min_bucket)
    }
}

/// Exact-key bootstrap thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Clusters with less total usage are not surfaced.
    pub min_usage_total: u64,
    /// Minimum members for a cluster with no existing identity.
    pub min_members: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            min_usage_total: 1,
            min_members: 2,
        }
    }
}

/// Unmapped-name review limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmappedConfig {
    pub min_appearances: u64,
    pub max_events: usize,
    pub max_co_competitors: usize,
    pub max_candidates: usize,
}

impl Default for UnmappedConfig {
    fn default() -> Self {
        Self {
            min_appearances: 1,
            max_events: 5,
            max_co_competitors: 10,
            max_candidates: 10,
        }
    }
}

/// Complete resolver configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub scoring: ScoreWeights,
    pub fuzzy: FuzzyConfig,
    pub bootstrap: BootstrapConfig,
    pub unmapped: UnmappedConfig,
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("must be within [0, 1] (got {value})")));
    }
    Ok(())
}

impl ResolverConfig {
    /// Loads and validates a config file; a missing file yields defaults.
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed TOML
    /// - `ConfigError::InvalidValue` for out-of-range values
    pub fn load_or_default(path: &Path) -> IdentityResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(config.validate()?)
    }

    /// Checks ranges and returns the config unchanged when valid.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first bad field.
    pub fn validate(self) -> Result<Self, ConfigError> {
        let s = &self.scoring;
        check_unit("scoring.baseline", s.baseline)?;
        check_unit("scoring.same_first_initial", s.same_first_initial)?;
        check_unit("scoring.initial_vs_full", s.initial_vs_full)?;
        check_unit("scoring.first_name_prefix", s.first_name_prefix)?;
        check_unit("scoring.same_first_token", s.same_first_token)?;
        if !(s.cap > 0.0 && s.cap < 1.0) {
            return Err(invalid("scoring.cap", format!("must be in (0, 1) (got {})", s.cap)));
        }
        if s.prefix_min_len == 0 {
            return Err(invalid("scoring.prefix_min_len", "must be at least 1"));
        }

        check_unit("fuzzy.min_score", self.fuzzy.min_score)?;
        if self.fuzzy.max_bucket == 0 || self.fuzzy.min_bucket == 0 {
            return Err(invalid("fuzzy.max_bucket", "bucket sizes must be non-zero"));
        }

        if self.bootstrap.min_members < 2 {
            return Err(invalid("bootstrap.min_members", "a cluster needs at least 2 members"));
        }

        let u = &self.unmapped;
        if u.max_events == 0 || u.max_co_competitors == 0 || u.max_candidates == 0 {
            return Err(invalid("unmapped", "list limits must be non-zero"));
        }
        Ok(self)
    }
}
