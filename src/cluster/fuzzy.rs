//! Surname-bucket fuzzy pairing.
//!
//! Names are bucketed by surname. A name whose surname is a single letter
//! ("Jim K.") joins every bucket whose surname starts with that letter, as
//! well as the bucket for the letter itself. Each bucket is truncated to the
//! most-used members before pairs are scored, which bounds the quadratic pair
//! count for common surnames.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::{FuzzyConfig, ScoreWeights};
use crate::normalize::NameParts;
use crate::scoring::{meets_threshold, score_pair, PairScore};

use super::{ClusterContext, ClusterMember};

/// A scored pair at or above the minimum score.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyPair {
    /// Surname bucket the pair was scored in.
    pub bucket: String,
    /// The more-used member (ties alphabetical).
    pub a: ClusterMember,
    pub b: ClusterMember,
    pub a_parts: NameParts,
    pub b_parts: NameParts,
    pub score: PairScore,
}

/// Output of one fuzzy pass.
#[derive(Debug, Clone, Default)]
pub struct FuzzyPass {
    pub pairs: Vec<FuzzyPair>,
    pub buckets: usize,
    pub pairs_scored: usize,
    /// Pairs dropped by the co-occurrence veto.
    pub vetoed: usize,
}

struct Entry {
    member: ClusterMember,
    parts: NameParts,
}

/// Scores every same-bucket pair and keeps those meeting `fuzzy.min_score`.
///
/// Pairs where both names are already resolved are skipped. Pairs are
/// returned in bucket order, then by position in the usage-sorted bucket.
#[must_use]
pub fn fuzzy_pairs(
    ctx: &ClusterContext<'_>,
    fuzzy: &FuzzyConfig,
    weights: &ScoreWeights,
) -> FuzzyPass {
    let mut entries: Vec<Entry> = ctx
        .eligible()
        .filter(|(_, usage)| usage.appearances >= fuzzy.min_appearances)
        .filter_map(|(name, usage)| {
            NameParts::parse(name).map(|parts| Entry {
                member: ctx.member(name, usage),
                parts,
            })
        })
        .collect();
    entries.sort_by(|x, y| {
        y.member
            .appearances
            .cmp(&x.member.appearances)
            .then_with(|| x.member.raw_name.cmp(&y.member.raw_name))
    });

    let mut buckets: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, entry) in entries.iter().enumerate() {
        buckets.entry(entry.parts.last.as_str()).or_default().push(i);
    }
    let full_surnames: Vec<String> = buckets
        .keys()
        .filter(|k| k.chars().count() > 1)
        .map(|k| (*k).to_string())
        .collect();
    for (i, entry) in entries.iter().enumerate() {
        if !entry.parts.has_abbreviated_last() {
            continue;
        }
        for surname in full_surnames.iter().filter(|s| s.starts_with(entry.parts.last.as_str())) {
            if let Some(bucket) = buckets.get_mut(surname.as_str()) {
                bucket.push(i);
            }
        }
    }

    let mut pass = FuzzyPass::default();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (surname, mut members) in buckets {
        if members.len() < 2 {
            continue;
        }
        pass.buckets += 1;
        // Entries are usage-sorted, so index order is usage order.
        members.sort_unstable();
        members.truncate(fuzzy.bucket_limit(members.len()));

        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                let (x, y) = (&entries[i], &entries[j]);
                if x.member.is_resolved() && y.member.is_resolved() {
                    continue;
                }
                if !seen.insert((i, j)) {
                    continue;
                }
                pass.pairs_scored += 1;
                let cooccur = ctx
                    .evidence
                    .are_distinct(&x.member.raw_name, &y.member.raw_name);
                let score = score_pair(&x.parts, &y.parts, cooccur, weights);
                if score.is_vetoed() {
                    pass.vetoed += 1;
                    continue;
                }
                if !meets_threshold(score.score, fuzzy.min_score) {
                    continue;
                }
                pass.pairs.push(FuzzyPair {
                    bucket: surname.to_string(),
                    a: x.member.clone(),
                    b: y.member.clone(),
                    a_parts: x.parts.clone(),
                    b_parts: y.parts.clone(),
                    score,
                });
            }
        }
    }

    debug!(
        buckets = pass.buckets,
        scored = pass.pairs_scored,
        kept = pass.pairs.len(),
        vetoed = pass.vetoed,
        "fuzzy pairing complete"
    );
    pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::evidence::CooccurrenceIndex;
    use crate::ledger::AliasLedger;
    use crate::observation::{RawNameObservation, Side};
    use crate::scoring::{REASON_INITIAL_VS_FULL, REASON_SAME_LAST_NAME};
    use crate::triage::TriageRules;
    use tempfile::tempdir;

    fn obs(name: &str, event: &str) -> RawNameObservation {
        RawNameObservation::new(name, event, "Open Singles", Some(2005), Side::One)
    }

    fn run(data: &[RawNameObservation]) -> FuzzyPass {
        let fuzzy = FuzzyConfig {
            min_appearances: 1,
            ..FuzzyConfig::default()
        };
        run_with(data, &fuzzy)
    }

    fn run_with(data: &[RawNameObservation], fuzzy: &FuzzyConfig) -> FuzzyPass {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let usage = aggregate(data);
        let evidence = CooccurrenceIndex::build(data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger: &ledger,
        };
        fuzzy_pairs(&ctx, fuzzy, &ScoreWeights::default())
    }

    #[test]
    fn test_abbreviated_surname_pairs_with_full_surname() {
        let pass = run(&[obs("Jim K.", "1"), obs("Jim Kovacs", "2"), obs("Jim Kovacs", "3")]);
        assert_eq!(pass.pairs.len(), 1);
        let pair = &pass.pairs[0];
        assert_eq!(pair.bucket, "kovacs");
        assert_eq!(pair.a.raw_name, "Jim Kovacs");
        assert_eq!(pair.b.raw_name, "Jim K.");
        assert!(pair.score.reasons.contains(&REASON_SAME_LAST_NAME));
        assert!(pair.score.reasons.contains(&REASON_INITIAL_VS_FULL));
    }

    #[test]
    fn test_cooccurring_pair_is_vetoed() {
        let pass = run(&[obs("K. Shults", "1"), obs("Ken Shults", "1")]);
        assert!(pass.pairs.is_empty());
        assert_eq!(pass.vetoed, 1);
    }

    #[test]
    fn test_below_threshold_pairs_dropped() {
        let pass = run(&[obs("Ken Shults", "1"), obs("Mary Shults", "2")]);
        assert_eq!(pass.pairs_scored, 1);
        assert!(pass.pairs.is_empty());
    }

    #[test]
    fn test_names_without_grouping_key_are_skipped() {
        let pass = run(&[obs("J. R.", "1"), obs("Jim Roberts", "2"), obs("Jim Roberts", "3")]);
        assert_eq!(pass.pairs_scored, 0);
        assert!(pass.pairs.is_empty());
    }

    #[test]
    fn test_bucket_truncation_keeps_most_used_names() {
        let fuzzy = FuzzyConfig {
            min_appearances: 1,
            max_bucket: 2,
            min_bucket: 2,
            ..FuzzyConfig::default()
        };
        let data = vec![
            obs("Ken Shults", "1"),
            obs("Ken Shults", "2"),
            obs("Ken Shults", "3"),
            obs("Kenny Shults", "4"),
            obs("Kenny Shults", "5"),
            obs("K. Shults", "6"),
        ];
        let pass = run_with(&data, &fuzzy);
        assert_eq!(pass.buckets, 1);
        assert_eq!(pass.pairs_scored, 1);
        assert!(pass
            .pairs
            .iter()
            .all(|p| p.a.raw_name != "K. Shults" && p.b.raw_name != "K. Shults"));

        // Without truncation the rare spelling is paired too.
        let wide = run(&data);
        assert_eq!(wide.pairs_scored, 3);
        assert!(wide.pairs.iter().any(|p| p.b.raw_name == "K. Shults"));
    }

    #[test]
    fn test_min_appearances_filters_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("K. Shults", "1"), obs("Ken Shults", "2")];
        let usage = aggregate(&data);
        let evidence = CooccurrenceIndex::build(&data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger: &ledger,
        };
        let pass = fuzzy_pairs(&ctx, &FuzzyConfig::default(), &ScoreWeights::default());
        assert_eq!(pass.pairs_scored, 0);
    }
}
