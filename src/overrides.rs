//! Versioned per-event override table.
//!
//! Corrections to event metadata (a wrong year, an event that must be
//! excluded) live in a TOML file loaded once at start-up:
//!
//! ```toml
//! version = 1
//!
//! [events."1024"]
//! year = 1997
//! note = "source page shows the registration year"
//!
//! [events."2210"]
//! exclude = true
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IdentityResult};

/// Current override table format version.
pub const OVERRIDES_VERSION: u32 = 1;

/// Override fields for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOverride {
    /// Replaces the observed year for every placement of the event.
    pub year: Option<i32>,
    /// Drops every observation of the event.
    pub exclude: bool,
    /// Marks the source page as known-broken.
    pub broken_source: bool,
    pub note: Option<String>,
}

/// Mapping event_id → override fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOverrides {
    pub version: u32,
    #[serde(default)]
    pub events: BTreeMap<String, EventOverride>,
}

impl Default for EventOverrides {
    fn default() -> Self {
        Self {
            version: OVERRIDES_VERSION,
            events: BTreeMap::new(),
        }
    }
}

impl EventOverrides {
    /// Loads the table, or returns an empty table when `path` does not exist.
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed TOML
    /// - `ConfigError::UnsupportedVersion` for a version this build cannot read
    pub fn load_or_default(path: &Path) -> IdentityResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let table: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if table.version != OVERRIDES_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: table.version,
                expected: OVERRIDES_VERSION,
            }
            .into());
        }
        Ok(table)
    }

    #[must_use]
    pub fn get(&self, event_id: &str) -> Option<&EventOverride> {
        self.events.get(event_id.trim())
    }

    /// Returns true if observations of `event_id` must be dropped.
    #[must_use]
    pub fn is_excluded(&self, event_id: &str) -> bool {
        self.get(event_id).is_some_and(|o| o.exclude)
    }

    /// The effective year for an observation of `event_id`.
    #[must_use]
    pub fn effective_year(&self, event_id: &str, observed: Option<i32>) -> Option<i32> {
        self.get(event_id).and_then(|o| o.year).or(observed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
