//! Per-raw-name usage statistics.
//!
//! Aggregation is keyed by the exact outer-trimmed raw string. Two spellings
//! that normalize to the same key are still counted separately; merging is
//! the clusterer's job.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::observation::{RawNameObservation, Side};

/// Usage statistics for one raw name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameUsage {
    pub appearances: u64,
    pub as_side1: u64,
    pub as_side2: u64,
    pub years: BTreeSet<i32>,
    pub divisions: BTreeSet<String>,
    pub events: BTreeSet<String>,
    pub countries: BTreeSet<String>,
}

impl NameUsage {
    fn record(&mut self, obs: &RawNameObservation) {
        self.appearances += 1;
        match obs.side {
            Side::One => self.as_side1 += 1,
            Side::Two => self.as_side2 += 1,
        }
        if let Some(year) = obs.year {
            self.years.insert(year);
        }
        let division = obs.division.trim();
        if !division.is_empty() {
            self.divisions.insert(division.to_string());
        }
        let event = obs.event_id.trim();
        if !event.is_empty() {
            self.events.insert(event.to_string());
        }
        if let Some(country) = obs.country.as_deref().map(str::trim) {
            if !country.is_empty() {
                self.countries.insert(country.to_string());
            }
        }
    }

    #[must_use]
    pub fn first_year(&self) -> Option<i32> {
        self.years.first().copied()
    }

    #[must_use]
    pub fn last_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    /// Years rendered as `first-last`, a single year, or empty.
    #[must_use]
    pub fn year_span(&self) -> String {
        match (self.first_year(), self.last_year()) {
            (Some(a), Some(b)) if a == b => a.to_string(),
            (Some(a), Some(b)) => format!("{a}-{b}"),
            _ => String::new(),
        }
    }
}

/// Usage statistics for every non-blank raw name in a run.
#[derive(Debug, Clone, Default)]
pub struct UsageTable {
    by_name: BTreeMap<String, NameUsage>,
}

impl UsageTable {
    #[must_use]
    pub fn get(&self, raw_name: &str) -> Option<&NameUsage> {
        self.by_name.get(raw_name.trim())
    }

    /// Appearance count for `raw_name`, zero if never observed.
    #[must_use]
    pub fn appearances(&self, raw_name: &str) -> u64 {
        self.get(raw_name).map_or(0, |u| u.appearances)
    }

    /// Names in lexicographic order with their usage.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NameUsage)> {
        self.by_name.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Folds observations into per-name statistics. Blank names are skipped.
#[must_use]
pub fn aggregate<'a, I>(observations: I) -> UsageTable
where
    I: IntoIterator<Item = &'a RawNameObservation>,
{
    let mut by_name: BTreeMap<String, NameUsage> = BTreeMap::new();
    for obs in observations {
        let Some(name) = obs.name() else { continue };
        by_name.entry(name.to_string()).or_default().record(obs);
    }
    UsageTable { by_name }
}
