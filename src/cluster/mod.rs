//! Candidate clustering.
//!
//! Two passes propose merges for human review:
//!
//! - [`exact`]: names sharing a grouping key (the "safe" pass)
//! - [`fuzzy`]: names sharing a surname bucket, scored pairwise (the
//!   "questionable" pass)
//!
//! Neither pass writes to the ledger. Polluted names and names with an empty
//! grouping key are excluded from both.

pub mod exact;
pub mod fuzzy;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::aggregate::{NameUsage, UsageTable};
use crate::evidence::CooccurrenceIndex;
use crate::identifier::PersonId;
use crate::ledger::AliasLedger;
use crate::normalize::normalize;
use crate::triage::TriageRules;

pub use exact::exact_clusters;
pub use fuzzy::{fuzzy_pairs, FuzzyPair, FuzzyPass};

/// Read-only inputs shared by both passes.
#[derive(Clone, Copy)]
pub struct ClusterContext<'a> {
    pub usage: &'a UsageTable,
    pub evidence: &'a CooccurrenceIndex,
    pub triage: &'a TriageRules,
    pub ledger: &'a AliasLedger,
}

impl<'a> ClusterContext<'a> {
    /// Builds a member for `raw_name`, resolving it through the ledger.
    #[must_use]
    pub fn member(&self, raw_name: &str, usage: &NameUsage) -> ClusterMember {
        let resolved = self.ledger.lookup(raw_name);
        ClusterMember {
            raw_name: raw_name.to_string(),
            appearances: usage.appearances,
            as_side1: usage.as_side1,
            as_side2: usage.as_side2,
            person_id: resolved.map(|r| r.person_id),
            person_canon: resolved.map(|r| r.person_canon.clone()),
        }
    }

    /// Names eligible for clustering, in lexicographic order.
    ///
    /// Polluted names and names with an empty grouping key are left out.
    pub fn eligible(&self) -> impl Iterator<Item = (&'a str, &'a NameUsage)> + 'a {
        let triage = self.triage;
        self.usage
            .iter()
            .filter(move |(name, _)| !triage.is_polluted(name) && !normalize(name).is_empty())
    }

    /// First ledger alias of `person_id` seen competing alongside `raw_name`.
    ///
    /// A hit means `raw_name` can never join that person.
    #[must_use]
    pub fn person_conflict(&self, raw_name: &str, person_id: PersonId) -> Option<String> {
        self.ledger
            .identity(person_id)?
            .aliases
            .into_iter()
            .find(|alias| self.evidence.are_distinct(raw_name, alias))
    }
}

/// A raw name inside a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterMember {
    pub raw_name: String,
    pub appearances: u64,
    pub as_side1: u64,
    pub as_side2: u64,
    /// Present when the ledger already maps this name.
    pub person_id: Option<PersonId>,
    pub person_canon: Option<String>,
}

impl ClusterMember {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.person_id.is_some()
    }
}

/// A transient proposal that a set of raw names denote one person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateCluster {
    pub cluster_key: String,
    /// Members ordered by appearances descending, then name.
    pub members: Vec<ClusterMember>,
    pub total_usage_count: u64,
    pub evidence_reasons: Vec<String>,
    /// First pair of members seen competing in the same event division.
    pub conflict: Option<(String, String)>,
}

impl CandidateCluster {
    /// Distinct existing person ids among members.
    #[must_use]
    pub fn person_ids(&self) -> BTreeSet<PersonId> {
        self.members.iter().filter_map(|m| m.person_id).collect()
    }

    /// Members the ledger does not map yet.
    pub fn unresolved(&self) -> impl Iterator<Item = &ClusterMember> {
        self.members.iter().filter(|m| !m.is_resolved())
    }

    /// Member names in cluster order.
    #[must_use]
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.raw_name.as_str()).collect()
    }

    /// Most-used member carrying an existing person id.
    #[must_use]
    pub fn most_used_resolved(&self) -> Option<&ClusterMember> {
        self.members.iter().find(|m| m.is_resolved())
    }
}

/// Sorts members by appearances descending, ties alphabetical.
pub fn sort_by_usage(members: &mut [ClusterMember]) {
    members.sort_by(|a, b| {
        b.appearances
            .cmp(&a.appearances)
            .then_with(|| a.raw_name.cmp(&b.raw_name))
    });
}
