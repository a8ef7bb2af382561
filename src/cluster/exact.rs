//! Exact-key clustering.

use std::collections::BTreeMap;

use tracing::debug;

use crate::normalize::normalize;
use crate::scoring::REASON_COOCCURS;

use super::{sort_by_usage, CandidateCluster, ClusterContext, ClusterMember};

/// Reason tag carried by every exact-key cluster.
pub const REASON_SAME_KEY: &str = "same_normalized_key";

/// Groups eligible names by grouping key.
///
/// Every key yields one cluster, including single-member and
/// fully-resolved ones; callers decide which clusters reach a reviewer.
/// Clusters are returned in key order.
#[must_use]
pub fn exact_clusters(ctx: &ClusterContext<'_>) -> Vec<CandidateCluster> {
    let mut groups: BTreeMap<String, Vec<ClusterMember>> = BTreeMap::new();
    for (name, usage) in ctx.eligible() {
        groups
            .entry(normalize(name))
            .or_default()
            .push(ctx.member(name, usage));
    }

    let clusters: Vec<CandidateCluster> = groups
        .into_iter()
        .map(|(key, mut members)| {
            sort_by_usage(&mut members);
            let names: Vec<&str> = members.iter().map(|m| m.raw_name.as_str()).collect();
            let conflict = ctx
                .evidence
                .first_conflict(&names)
                .map(|(a, b)| (a.to_string(), b.to_string()));

            let mut evidence_reasons = vec![REASON_SAME_KEY.to_string()];
            if let Some((a, b)) = &conflict {
                evidence_reasons.push(format!("{REASON_COOCCURS}: {a} | {b}"));
            }
            CandidateCluster {
                cluster_key: key,
                total_usage_count: members.iter().map(|m| m.appearances).sum(),
                members,
                evidence_reasons,
                conflict,
            }
        })
        .collect();

    debug!(clusters = clusters.len(), "exact-key clustering complete");
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::evidence::CooccurrenceIndex;
    use crate::identifier::{IdTag, PersonId};
    use crate::ledger::{AliasLedger, AliasRecord, AliasStatus};
    use crate::observation::{RawNameObservation, Side};
    use crate::triage::TriageRules;
    use tempfile::tempdir;

    fn obs(name: &str, event: &str, division: &str) -> RawNameObservation {
        RawNameObservation::new(name, event, division, Some(2000), Side::One)
    }

    #[test]
    fn test_groups_by_key_and_resolves_members() {
        let dir = tempdir().unwrap();
        let ledger_path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&ledger_path, &marker).unwrap();
        let mut ledger = AliasLedger::open(&ledger_path, &marker).unwrap();
        let id = PersonId::derive(IdTag::AutoCluster, "jon smith");
        ledger.stage(AliasRecord::new("Jon Smith", id, "Jon Smith", AliasStatus::Verified, ""));

        let data = vec![
            obs("Jon Smith", "1", "Open"),
            obs("Jon Smith", "2", "Open"),
            obs("JON  SMITH", "3", "Open"),
            obs("Jon A. Smith", "4", "Open"),
            obs("Pay $5 Jon Smith", "5", "Open"),
            obs("Ken Shults", "1", "Open"),
        ];
        let usage = aggregate(&data);
        let evidence = CooccurrenceIndex::build(&data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger: &ledger,
        };

        let clusters = exact_clusters(&ctx);
        assert_eq!(clusters.len(), 2);
        let jon = clusters.iter().find(|c| c.cluster_key == "jon smith").unwrap();
        assert_eq!(jon.member_names(), vec!["Jon Smith", "JON  SMITH", "Jon A. Smith"]);
        assert_eq!(jon.total_usage_count, 4);
        assert_eq!(jon.person_ids().len(), 1);
        assert_eq!(jon.unresolved().count(), 2);
        assert!(jon.conflict.is_none());
    }

    #[test]
    fn test_cooccurring_members_are_flagged() {
        let dir = tempdir().unwrap();
        let ledger_path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&ledger_path, &marker).unwrap();
        let ledger = AliasLedger::open(&ledger_path, &marker).unwrap();

        let data = vec![obs("John Smith", "1", "Open"), obs("John A. Smith", "1", "Open")];
        let usage = aggregate(&data);
        let evidence = CooccurrenceIndex::build(&data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger: &ledger,
        };
        let clusters = exact_clusters(&ctx);
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].conflict.is_some());
        assert!(clusters[0].evidence_reasons[1].starts_with(REASON_COOCCURS));
    }
}
