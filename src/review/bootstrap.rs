//! Bootstrap alias map: exact-key clusters for review.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::apply::{ApplySummary, Decision, AUTO_SINGLE_ID};
use crate::cluster::{exact_clusters, CandidateCluster, ClusterContext};
use crate::config::BootstrapConfig;
use crate::error::{IdentityResult, RowIssueKind};
use crate::identifier::{IdTag, PersonId};
use crate::ledger::{AliasLedger, AliasRecord, AliasStatus};
use crate::normalize::normalize;
use crate::scoring::{cluster_confidence, ConfidenceLabel, REASON_COOCCURS};
use crate::table::TableReader;

use super::{join_list, ReviewRow};

/// Note on clusters holding more than one existing identity.
pub const NOTE_MULTIPLE_IDS: &str = "multiple_person_ids";

/// One unresolved alias of an exact-key cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRow {
    pub alias_group_key: String,
    pub alias_name: String,
    pub suggested_canonical_player_id: Option<PersonId>,
    pub suggested_canonical_name: String,
    pub confidence: ConfidenceLabel,
    pub usage_count_total: u64,
    pub player_ids_in_group: BTreeSet<PersonId>,
    pub countries_seen: BTreeSet<String>,
    pub decision: String,
    pub notes: String,
}

impl ReviewRow for BootstrapRow {
    const HEADER: &'static [&'static str] = &[
        "alias_group_key",
        "alias_name",
        "suggested_canonical_player_id",
        "suggested_canonical_name",
        "confidence",
        "usage_count_total",
        "player_ids_in_group",
        "countries_seen",
        "decision",
        "notes",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.alias_group_key.clone(),
            self.alias_name.clone(),
            self.suggested_canonical_player_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            self.suggested_canonical_name.clone(),
            self.confidence.to_string(),
            self.usage_count_total.to_string(),
            join_list(self.player_ids_in_group.iter().map(ToString::to_string)),
            join_list(&self.countries_seen),
            self.decision.clone(),
            self.notes.clone(),
        ]
    }
}

struct Suggestion {
    id: Option<PersonId>,
    name: String,
    decision: &'static str,
    notes: String,
}

fn suggest(cluster: &CandidateCluster, ledger: &AliasLedger) -> Suggestion {
    if let Some((a, b)) = &cluster.conflict {
        return Suggestion {
            id: None,
            name: String::new(),
            decision: "",
            notes: format!("{REASON_COOCCURS}: {a} | {b}"),
        };
    }
    let ids = cluster.person_ids();
    if let Some(resolved) = cluster.most_used_resolved() {
        let id = resolved.person_id;
        let name = id
            .and_then(|id| ledger.identity(id))
            .map(|identity| identity.canonical_name)
            .or_else(|| resolved.person_canon.clone())
            .unwrap_or_default();
        let (decision, notes) = if ids.len() == 1 {
            (AUTO_SINGLE_ID, String::new())
        } else {
            ("", NOTE_MULTIPLE_IDS.to_string())
        };
        return Suggestion {
            id,
            name,
            decision,
            notes,
        };
    }
    let name = cluster
        .members
        .first()
        .map(|m| m.raw_name.clone())
        .unwrap_or_default();
    Suggestion {
        id: Some(PersonId::derive(IdTag::AutoCluster, &cluster.cluster_key)),
        name,
        decision: "",
        notes: String::new(),
    }
}

/// Builds bootstrap rows, sorted for review.
///
/// A cluster is surfaced when it has at least one unresolved member and
/// either carries an existing identity or has `min_members` members.
#[must_use]
pub fn generate_bootstrap(ctx: &ClusterContext<'_>, config: &BootstrapConfig) -> Vec<BootstrapRow> {
    let mut rows = Vec::new();
    for cluster in exact_clusters(ctx) {
        if cluster.unresolved().next().is_none() {
            continue;
        }
        let ids = cluster.person_ids();
        if ids.is_empty() && cluster.members.len() < config.min_members {
            continue;
        }
        if cluster.total_usage_count < config.min_usage_total {
            continue;
        }

        let suggestion = suggest(&cluster, ctx.ledger);
        let confidence = if cluster.conflict.is_some() {
            ConfidenceLabel::Low
        } else {
            let reference = Some(normalize(&suggestion.name))
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| cluster.cluster_key.clone());
            cluster_confidence(&reference, &cluster.member_names())
        };
        let countries: BTreeSet<String> = cluster
            .members
            .iter()
            .filter_map(|m| ctx.usage.get(&m.raw_name))
            .flat_map(|u| u.countries.iter().cloned())
            .collect();

        for member in cluster.unresolved() {
            let mut row = BootstrapRow {
                alias_group_key: cluster.cluster_key.clone(),
                alias_name: member.raw_name.clone(),
                suggested_canonical_player_id: suggestion.id,
                suggested_canonical_name: suggestion.name.clone(),
                confidence,
                usage_count_total: cluster.total_usage_count,
                player_ids_in_group: ids.clone(),
                countries_seen: countries.clone(),
                decision: suggestion.decision.to_string(),
                notes: suggestion.notes.clone(),
            };
            // The suggested person may hold aliases outside this cluster.
            let conflict = suggestion
                .id
                .and_then(|id| ctx.person_conflict(&member.raw_name, id));
            if let Some(other) = conflict {
                row.confidence = ConfidenceLabel::Low;
                row.decision.clear();
                row.notes = format!("{REASON_COOCCURS}: {} | {other}", member.raw_name);
            }
            rows.push(row);
        }
    }

    rows.sort_by(|a, b| {
        b.usage_count_total
            .cmp(&a.usage_count_total)
            .then_with(|| a.confidence.rank().cmp(&b.confidence.rank()))
            .then_with(|| a.alias_group_key.cmp(&b.alias_group_key))
            .then_with(|| a.alias_name.cmp(&b.alias_name))
    });
    debug!(rows = rows.len(), "generated bootstrap review rows");
    rows
}

/// Applies a reviewed bootstrap artifact.
///
/// # Errors
/// - `Frozen` when the ledger is frozen
/// - `MissingInput` / `SchemaViolation` for the artifact
/// - `RejectedDecisions` when a row maps to an unknown person id
pub fn apply_bootstrap(
    ledger: &mut AliasLedger,
    artifact: &Path,
    now: DateTime<Utc>,
) -> IdentityResult<ApplySummary> {
    ledger.ensure_writable()?;
    let mut table = TableReader::open(
        artifact,
        &["alias_name", "suggested_canonical_player_id", "suggested_canonical_name", "decision"],
        "run `person-identity bootstrap generate` and fill the decision column first",
    )?;
    let rows = table.rows()?;
    let mut summary = ApplySummary::new("bootstrap");
    summary.rows_read = rows.len();

    for row in &rows {
        let alias = table.cell(row, "alias_name");
        if alias.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let decision = match Decision::parse(table.cell(row, "decision")) {
            Ok(d) => d,
            Err(text) => {
                summary.issue(RowIssueKind::UnknownDecision, row.line, format!("'{text}' for {alias}"));
                summary.skipped += 1;
                continue;
            }
        };
        let notes = table.cell(row, "notes");

        let (person_id, canon, status, decided_by) = match decision {
            Decision::Pending | Decision::Reject => {
                summary.skipped += 1;
                continue;
            }
            Decision::Target(id) => match ledger.identity(id) {
                Some(identity) => (id, identity.canonical_name, AliasStatus::Verified, "reviewer"),
                None => {
                    summary.issue(
                        RowIssueKind::UnknownTarget,
                        row.line,
                        format!("{id} is not a known person (alias {alias})"),
                    );
                    continue;
                }
            },
            Decision::AutoSingleId | Decision::Accept | Decision::Candidate => {
                let suggested = table.cell(row, "suggested_canonical_player_id");
                let canon = table.cell(row, "suggested_canonical_name");
                let Ok(id) = suggested.parse::<PersonId>() else {
                    summary.issue(
                        RowIssueKind::IncompleteRow,
                        row.line,
                        format!("no usable suggested id for {alias}"),
                    );
                    summary.skipped += 1;
                    continue;
                };
                // A known person keeps its ledger name whatever the sheet says.
                let canon = match ledger.identity(id) {
                    Some(identity) => identity.canonical_name,
                    None if canon.is_empty() => alias.to_string(),
                    None => canon.to_string(),
                };
                match decision {
                    Decision::AutoSingleId => (id, canon, AliasStatus::Verified, "auto_single_id"),
                    Decision::Candidate => (id, canon, AliasStatus::Candidate, "reviewer"),
                    _ => (id, canon, AliasStatus::Verified, "reviewer"),
                }
            }
        };

        let record =
            AliasRecord::new(alias, person_id, canon, status, notes).decided(decided_by, now);
        summary.stage(ledger, record);
    }

    summary.finish(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::evidence::CooccurrenceIndex;
    use crate::observation::{RawNameObservation, Side};
    use crate::review::write_artifact;
    use crate::triage::TriageRules;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn setup(ledger_rows: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        std::fs::write(
            &path,
            format!("alias,person_id,person_canon,status,notes\n{ledger_rows}"),
        )
        .unwrap();
        (dir, path, marker)
    }

    fn obs(name: &str, event: &str) -> RawNameObservation {
        let mut o = RawNameObservation::new(name, event, "Open Singles", Some(1999), Side::One);
        o.country = Some("USA".to_string());
        o
    }

    fn rows_for(ledger: &AliasLedger, data: &[RawNameObservation]) -> Vec<BootstrapRow> {
        let usage = aggregate(data);
        let evidence = CooccurrenceIndex::build(data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger,
        };
        generate_bootstrap(&ctx, &BootstrapConfig::default())
    }

    #[test]
    fn test_single_existing_id_is_prefilled_and_resolved_alias_gets_no_row() {
        let id = PersonId::derive(IdTag::AutoCluster, "jon smith");
        let (_dir, path, marker) = setup(&format!("Jon Smith,{id},Jon Smith,verified,\n"));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Jon Smith", "1"), obs("Jon Smith", "2"), obs("JON SMITH", "3")];

        let rows = rows_for(&ledger, &data);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.alias_name, "JON SMITH");
        assert_eq!(row.suggested_canonical_player_id, Some(id));
        assert_eq!(row.suggested_canonical_name, "Jon Smith");
        assert_eq!(row.decision, AUTO_SINGLE_ID);
        assert_eq!(row.confidence, ConfidenceLabel::High);
        assert_eq!(row.usage_count_total, 3);
        assert_eq!(row.cells()[7], "USA");
    }

    #[test]
    fn test_new_cluster_gets_auto_id_and_blank_decision() {
        let (_dir, path, marker) = setup("");
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Ken Shults", "1"), obs("Ken Shults", "2"), obs("Ken  SHULTS", "3")];

        let rows = rows_for(&ledger, &data);
        assert_eq!(rows.len(), 2);
        let expected = PersonId::derive(IdTag::AutoCluster, "ken shults");
        assert!(rows.iter().all(|r| r.suggested_canonical_player_id == Some(expected)));
        assert!(rows.iter().all(|r| r.decision.is_empty()));
        assert!(rows.iter().all(|r| r.suggested_canonical_name == "Ken Shults"));
        assert_eq!(rows[0].alias_name, "Ken  SHULTS");
    }

    #[test]
    fn test_singletons_without_identity_are_not_surfaced() {
        let (_dir, path, marker) = setup("");
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        assert!(rows_for(&ledger, &[obs("Ken Shults", "1")]).is_empty());
    }

    #[test]
    fn test_multiple_ids_suggest_most_used_and_leave_decision_blank() {
        let p1 = PersonId::derive(IdTag::AutoCluster, "ken shults");
        let p2 = PersonId::derive(IdTag::StubUnmapped, "KEN SHULTS");
        let (_dir, path, marker) = setup(&format!(
            "Ken Shults,{p1},Ken Shults,verified,\nKEN SHULTS,{p2},KEN SHULTS,verified,\n"
        ));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![
            obs("Ken Shults", "1"),
            obs("Ken Shults", "2"),
            obs("Ken Shults", "3"),
            obs("KEN SHULTS", "4"),
            obs("Ken  Shults", "5"),
        ];

        let rows = rows_for(&ledger, &data);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.alias_name, "Ken  Shults");
        assert_eq!(row.suggested_canonical_player_id, Some(p1));
        assert_eq!(row.suggested_canonical_name, "Ken Shults");
        assert_eq!(row.decision, "");
        assert_eq!(row.notes, NOTE_MULTIPLE_IDS);
        assert_eq!(row.player_ids_in_group, BTreeSet::from([p1, p2]));
    }

    #[test]
    fn test_conflicting_cluster_has_no_suggestion() {
        let (_dir, path, marker) = setup("");
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Ken Shults", "1"), obs("Ken Shults", "2"), obs("KEN SHULTS", "1")];

        let rows = rows_for(&ledger, &data);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.suggested_canonical_player_id, None);
            assert_eq!(row.suggested_canonical_name, "");
            assert_eq!(row.decision, "");
            assert_eq!(row.confidence, ConfidenceLabel::Low);
            assert!(row.notes.starts_with(REASON_COOCCURS));
        }
    }

    #[test]
    fn test_single_id_not_prefilled_when_name_met_another_alias() {
        let id = PersonId::derive(IdTag::AutoCluster, "jon smith");
        let (_dir, path, marker) = setup(&format!(
            "Jon Smith,{id},Jon Smith,verified,\nJ. Smith,{id},Jon Smith,verified,\n"
        ));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Jon Smith", "1"), obs("JON SMITH", "9"), obs("J. Smith", "9")];

        let rows = rows_for(&ledger, &data);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.alias_name, "JON SMITH");
        assert_eq!(row.decision, "");
        assert_eq!(row.confidence, ConfidenceLabel::Low);
        assert_eq!(row.notes, format!("{REASON_COOCCURS}: JON SMITH | J. Smith"));
    }

    #[test]
    fn test_apply_takes_canon_from_ledger_for_known_id() {
        let id = PersonId::derive(IdTag::AutoCluster, "jon smith");
        let (dir, path, marker) = setup(&format!("Jon Smith,{id},Jon Smith,verified,\n"));
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("bootstrap.csv");
        std::fs::write(
            &artifact,
            format!(
                "alias_group_key,alias_name,suggested_canonical_player_id,suggested_canonical_name,decision\n\
                 jon smith,JON SMITH,{id},Jonathan Smith,accept\n"
            ),
        )
        .unwrap();

        apply_bootstrap(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(ledger.lookup("JON SMITH").unwrap().person_canon, "Jon Smith");
        assert_eq!(ledger.identity(id).unwrap().aliases.len(), 2);
    }

    #[test]
    fn test_apply_auto_single_id_then_reapply_is_noop() {
        let id = PersonId::derive(IdTag::AutoCluster, "jon smith");
        let (dir, path, marker) = setup(&format!("Jon Smith,{id},Jon Smith,verified,\n"));
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Jon Smith", "1"), obs("JON SMITH", "3")];
        let rows = rows_for(&ledger, &data);
        let artifact = dir.path().join("bootstrap.csv");
        write_artifact(&artifact, &rows).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let summary = apply_bootstrap(&mut ledger, &artifact, now).unwrap();
        assert_eq!(summary.appended, 1);
        let record = ledger.lookup("JON SMITH").unwrap();
        assert_eq!(record.person_id, id);
        assert_eq!(record.decided_by.as_deref(), Some("auto_single_id"));

        let again = apply_bootstrap(&mut ledger, &artifact, now).unwrap();
        assert_eq!(again.appended, 0);
        assert_eq!(again.already_present, 1);
    }

    #[test]
    fn test_apply_rejects_unknown_target_without_writing() {
        let (dir, path, marker) = setup("");
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let before = std::fs::read(&path).unwrap();
        let artifact = dir.path().join("bootstrap.csv");
        let stranger = PersonId::derive(IdTag::AutoCluster, "nobody");
        std::fs::write(
            &artifact,
            format!(
                "alias_group_key,alias_name,suggested_canonical_player_id,suggested_canonical_name,decision\n\
                 ken shults,Ken Shults,,,accept\n\
                 ken shults,K Shults,,,{stranger}\n"
            ),
        )
        .unwrap();

        let err = apply_bootstrap(&mut ledger, &artifact, Utc::now()).unwrap_err();
        assert!(format!("{err}").contains("1 row(s)"));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
