//! Co-occurrence evidence.
//!
//! Two raw names that appear in the same `(event_id, division)` were
//! different competitors in that division, so they can never be the same
//! person. The index is built once per run, before clustering, and is
//! consulted by every merge proposal.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::observation::RawNameObservation;

/// Symmetric set of "known distinct" raw-name pairs.
#[derive(Debug, Clone, Default)]
pub struct CooccurrenceIndex {
    pairs: HashSet<(String, String)>,
    groups: usize,
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl CooccurrenceIndex {
    /// Builds the index from every observation in the run.
    #[must_use]
    pub fn build<'a, I>(observations: I) -> Self
    where
        I: IntoIterator<Item = &'a RawNameObservation>,
    {
        let mut groups: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
        for obs in observations {
            let Some(name) = obs.name() else { continue };
            groups
                .entry((obs.event_id.trim(), obs.division.trim()))
                .or_default()
                .insert(name);
        }

        let mut pairs = HashSet::new();
        for names in groups.values() {
            let names: Vec<&str> = names.iter().copied().collect();
            for (i, a) in names.iter().enumerate() {
                for b in &names[i + 1..] {
                    pairs.insert(ordered(a, b));
                }
            }
        }
        Self {
            pairs,
            groups: groups.len(),
        }
    }

    /// True when `a` and `b` competed against or alongside each other.
    #[must_use]
    pub fn are_distinct(&self, a: &str, b: &str) -> bool {
        let (a, b) = (a.trim(), b.trim());
        a != b && self.pairs.contains(&ordered(a, b))
    }

    /// First known-distinct pair among `names`, if any.
    #[must_use]
    pub fn first_conflict<'a>(&self, names: &[&'a str]) -> Option<(&'a str, &'a str)> {
        names.iter().enumerate().find_map(|(i, a)| {
            names[i + 1..]
                .iter()
                .find(|b| self.are_distinct(a, b))
                .map(|b| (*a, *b))
        })
    }

    /// Number of distinct pairs recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of `(event, division)` groups seen while building.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups
    }
}
