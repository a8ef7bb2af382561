//! Fuzzy ("questionable") alias suggestions.
//!
//! Rows come from scored surname-bucket pairs. Only unresolved names get a
//! row; a resolved partner lends its identity to the proposal. A name seen
//! competing against anyone already under a proposal (in this artifact or in
//! the ledger) gets a row with a blank proposal instead.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::apply::{ApplySummary, Decision};
use crate::cluster::{fuzzy_pairs, ClusterContext, ClusterMember, FuzzyPair, FuzzyPass};
use crate::config::{FuzzyConfig, ScoreWeights};
use crate::error::{IdentityResult, RowIssueKind};
use crate::identifier::{IdTag, PersonId};
use crate::ledger::{AliasLedger, AliasRecord, AliasStatus};
use crate::normalize::match_key;
use crate::scoring::{format_score, REASON_COOCCURS};
use crate::table::TableReader;

use super::ReviewRow;

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyRow {
    /// `surname|first_initial`.
    pub cluster_key: String,
    /// Blank when the alias co-occurs with someone under the pair's proposal.
    pub proposed_person_id: Option<PersonId>,
    pub alias: String,
    pub person_canon: String,
    pub confidence: f64,
    pub reason: String,
    pub appearances: u64,
    pub as_player1: u64,
    pub as_player2: u64,
    pub human_decision: String,
    pub notes: String,
}

impl ReviewRow for FuzzyRow {
    const HEADER: &'static [&'static str] = &[
        "cluster_key",
        "proposed_person_id",
        "alias",
        "person_canon",
        "confidence",
        "reason",
        "appearances",
        "as_player1",
        "as_player2",
        "human_decision",
        "notes",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.cluster_key.clone(),
            self.proposed_person_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            self.alias.clone(),
            self.person_canon.clone(),
            format_score(self.confidence),
            self.reason.clone(),
            self.appearances.to_string(),
            self.as_player1.to_string(),
            self.as_player2.to_string(),
            self.human_decision.clone(),
            self.notes.clone(),
        ]
    }
}

/// The identity a pair proposes: the first resolved member's, else a
/// questionable id minted from the bucket, initial and canonical key.
fn proposal(pair: &FuzzyPair, cluster_key: &str) -> (PersonId, String) {
    for member in [&pair.a, &pair.b] {
        if let (Some(id), Some(canon)) = (member.person_id, &member.person_canon) {
            return (id, canon.clone());
        }
    }
    let canon = pair.a.raw_name.clone();
    let key = format!("{cluster_key}|{}", match_key(&canon));
    (PersonId::derive(IdTag::QuestionableCluster, &key), canon)
}

/// A name `raw_name` competed against that is already under proposal `id`,
/// either earlier in this artifact or in the ledger.
fn proposal_conflict(
    ctx: &ClusterContext<'_>,
    assigned: &HashMap<PersonId, Vec<String>>,
    raw_name: &str,
    id: PersonId,
) -> Option<String> {
    assigned
        .get(&id)
        .and_then(|names| names.iter().find(|n| ctx.evidence.are_distinct(raw_name, n)))
        .cloned()
        .or_else(|| ctx.person_conflict(raw_name, id))
}

/// Turns a fuzzy pass into review rows.
#[must_use]
pub fn rows_from_pass(ctx: &ClusterContext<'_>, pass: &FuzzyPass) -> Vec<FuzzyRow> {
    let mut rows = Vec::new();
    let mut seen: HashSet<(Option<PersonId>, String)> = HashSet::new();
    let mut assigned: HashMap<PersonId, Vec<String>> = HashMap::new();
    for pair in &pass.pairs {
        let initial = pair.a_parts.first_initial().map(String::from).unwrap_or_default();
        let cluster_key = format!("{}|{initial}", pair.bucket);
        let (person_id, canon) = proposal(pair, &cluster_key);
        let unresolved = [&pair.a, &pair.b]
            .into_iter()
            .filter(|m| !m.is_resolved());
        for member in unresolved {
            let name = &member.raw_name;
            if seen.contains(&(Some(person_id), name.clone())) {
                continue;
            }
            let row = match proposal_conflict(ctx, &assigned, name, person_id) {
                Some(other) => {
                    debug!(alias = %name, conflicts_with = %other, "fuzzy proposal vetoed");
                    let mut row = row_for(member, &cluster_key, None, "", pair);
                    row.notes = format!("{REASON_COOCCURS}: {name} | {other}");
                    row
                }
                None => row_for(member, &cluster_key, Some(person_id), &canon, pair),
            };
            if !seen.insert((row.proposed_person_id, name.clone())) {
                continue;
            }
            if let Some(id) = row.proposed_person_id {
                assigned.entry(id).or_default().push(name.clone());
            }
            rows.push(row);
        }
    }
    rows.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.appearances.cmp(&a.appearances))
            .then_with(|| a.alias.cmp(&b.alias))
            .then_with(|| a.proposed_person_id.cmp(&b.proposed_person_id))
    });
    rows
}

fn row_for(
    member: &ClusterMember,
    cluster_key: &str,
    person_id: Option<PersonId>,
    canon: &str,
    pair: &FuzzyPair,
) -> FuzzyRow {
    FuzzyRow {
        cluster_key: cluster_key.to_string(),
        proposed_person_id: person_id,
        alias: member.raw_name.clone(),
        person_canon: canon.to_string(),
        confidence: (pair.score.score * 1000.0).round() / 1000.0,
        reason: pair.score.reason_text(),
        appearances: member.appearances,
        as_player1: member.as_side1,
        as_player2: member.as_side2,
        human_decision: String::new(),
        notes: String::new(),
    }
}

/// Runs the fuzzy pass and builds sorted review rows.
#[must_use]
pub fn generate_fuzzy(
    ctx: &ClusterContext<'_>,
    fuzzy: &FuzzyConfig,
    weights: &ScoreWeights,
) -> (Vec<FuzzyRow>, FuzzyPass) {
    let pass = fuzzy_pairs(ctx, fuzzy, weights);
    let rows = rows_from_pass(ctx, &pass);
    debug!(rows = rows.len(), pairs = pass.pairs.len(), "generated fuzzy review rows");
    (rows, pass)
}

/// Applies a reviewed fuzzy artifact.
///
/// `accept` verifies the proposal, `candidate` records it unverified, and a
/// UUID redirects the alias to that known person.
///
/// # Errors
/// - `Frozen` when the ledger is frozen
/// - `MissingInput` / `SchemaViolation` for the artifact
/// - `RejectedDecisions` when a row maps to an unknown person id
pub fn apply_fuzzy(
    ledger: &mut AliasLedger,
    artifact: &Path,
    now: DateTime<Utc>,
) -> IdentityResult<ApplySummary> {
    ledger.ensure_writable()?;
    let mut table = TableReader::open(
        artifact,
        &["proposed_person_id", "alias", "person_canon", "human_decision"],
        "run `person-identity fuzzy generate` and fill human_decision first",
    )?;
    let rows = table.rows()?;
    let mut summary = ApplySummary::new("fuzzy");
    summary.rows_read = rows.len();

    for row in &rows {
        let alias = table.cell(row, "alias");
        let decision = match Decision::parse(table.cell(row, "human_decision")) {
            Ok(d) => d,
            Err(text) => {
                summary.issue(RowIssueKind::UnknownDecision, row.line, format!("'{text}' for {alias}"));
                summary.skipped += 1;
                continue;
            }
        };
        if alias.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let notes = table.cell(row, "notes");
        let record = match decision {
            Decision::Pending | Decision::Reject | Decision::AutoSingleId => {
                summary.skipped += 1;
                continue;
            }
            Decision::Target(id) => {
                let Some(identity) = ledger.identity(id) else {
                    summary.issue(
                        RowIssueKind::UnknownTarget,
                        row.line,
                        format!("{id} is not a known person (alias {alias})"),
                    );
                    continue;
                };
                AliasRecord::new(alias, id, identity.canonical_name, AliasStatus::Verified, notes)
            }
            Decision::Accept | Decision::Candidate => {
                let Ok(id) = table.cell(row, "proposed_person_id").parse::<PersonId>() else {
                    summary.issue(
                        RowIssueKind::IncompleteRow,
                        row.line,
                        format!("no usable proposed id for {alias}"),
                    );
                    summary.skipped += 1;
                    continue;
                };
                // A known person keeps its ledger name whatever the sheet says.
                let canon = match ledger.identity(id) {
                    Some(identity) => identity.canonical_name,
                    None => match table.cell(row, "person_canon") {
                        "" => alias.to_string(),
                        canon => canon.to_string(),
                    },
                };
                let status = if decision == Decision::Candidate {
                    AliasStatus::Candidate
                } else {
                    AliasStatus::Verified
                };
                AliasRecord::new(alias, id, canon, status, notes)
            }
        };
        summary.stage(ledger, record.decided("fuzzy_review", now));
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
    use crate::scoring::{REASON_INITIAL_VS_FULL, REASON_SAME_LAST_NAME};
    use crate::triage::TriageRules;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn obs(name: &str, event: &str) -> RawNameObservation {
        RawNameObservation::new(name, event, "Open Singles", Some(2005), Side::One)
    }

    fn ledger_with(rows: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        fs::write(&path, format!("alias,person_id,person_canon,status,notes\n{rows}")).unwrap();
        (dir, path, marker)
    }

    fn generate(ledger: &AliasLedger, data: &[RawNameObservation]) -> Vec<FuzzyRow> {
        let usage = aggregate(data);
        let evidence = CooccurrenceIndex::build(data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger,
        };
        let fuzzy = FuzzyConfig {
            min_appearances: 1,
            ..FuzzyConfig::default()
        };
        generate_fuzzy(&ctx, &fuzzy, &ScoreWeights::default()).0
    }

    #[test]
    fn test_abbreviated_surname_surfaces_with_reasons() {
        let (_dir, path, marker) = ledger_with("");
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Jim K.", "1"), obs("Jim Kovacs", "2"), obs("Jim Kovacs", "3")];

        let rows = generate(&ledger, &data);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.cluster_key == "kovacs|j"));
        assert!(rows.iter().all(|r| r.person_canon == "Jim Kovacs"));
        assert_eq!(rows[0].proposed_person_id, rows[1].proposed_person_id);
        assert_eq!(rows[0].alias, "Jim Kovacs");
        assert!(rows[0].confidence >= 0.75);
        assert!(rows[0].reason.contains(REASON_SAME_LAST_NAME));
        assert!(rows[0].reason.contains(REASON_INITIAL_VS_FULL));
        assert_eq!(rows[0].cells()[4], "0.990");
    }

    #[test]
    fn test_resolved_partner_lends_identity() {
        let id = PersonId::derive(IdTag::AutoCluster, "ken shults");
        let (_dir, path, marker) = ledger_with(&format!("Ken Shults,{id},Ken Shults,verified,\n"));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Ken Shults", "1"), obs("Ken Shults", "2"), obs("K. Shults", "3")];

        let rows = generate(&ledger, &data);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alias, "K. Shults");
        assert_eq!(rows[0].proposed_person_id, Some(id));
        assert_eq!(rows[0].person_canon, "Ken Shults");
    }

    #[test]
    fn test_cooccurring_names_never_share_a_proposal() {
        let (_dir, path, marker) = ledger_with("");
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![
            obs("Ken Shults", "1"),
            obs("Ken Shults", "2"),
            obs("Ken Shults", "3"),
            obs("K. Shults", "4"),
            obs("K. Shults", "5"),
            obs("Kenny Shults", "4"),
            obs("Kenny Shults", "6"),
        ];

        let rows = generate(&ledger, &data);
        assert_eq!(rows.len(), 3);
        let by_alias = |alias: &str| rows.iter().find(|r| r.alias == alias).unwrap();
        let ken = by_alias("Ken Shults");
        let initial = by_alias("K. Shults");
        let kenny = by_alias("Kenny Shults");
        assert!(ken.proposed_person_id.is_some());
        assert_eq!(initial.proposed_person_id, ken.proposed_person_id);
        assert_eq!(kenny.proposed_person_id, None);
        assert_eq!(kenny.person_canon, "");
        assert_eq!(kenny.notes, format!("{REASON_COOCCURS}: Kenny Shults | K. Shults"));
        assert_eq!(kenny.cells()[1], "");
    }

    #[test]
    fn test_resolved_partner_not_lent_across_ledger_conflict() {
        let id = PersonId::derive(IdTag::AutoCluster, "ken shults");
        let (_dir, path, marker) = ledger_with(&format!(
            "Ken Shults,{id},Ken Shults,verified,\nKenneth Shults,{id},Ken Shults,verified,\n"
        ));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![
            obs("Ken Shults", "1"),
            obs("Ken Shults", "2"),
            obs("K. Shults", "3"),
            obs("Kenneth Shults", "3"),
        ];

        let rows = generate(&ledger, &data);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alias, "K. Shults");
        assert_eq!(rows[0].proposed_person_id, None);
        assert!(rows[0].notes.contains("Kenneth Shults"));
    }

    #[test]
    fn test_accept_appends_and_reapply_is_noop() {
        let (dir, path, marker) = ledger_with("");
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![obs("Jim K.", "1"), obs("Jim Kovacs", "2")];
        let mut rows = generate(&ledger, &data);
        for row in &mut rows {
            row.human_decision = "accept".to_string();
        }
        let artifact = dir.path().join("fuzzy.csv");
        write_artifact(&artifact, &rows).unwrap();

        let summary = apply_fuzzy(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(summary.appended, 2);
        let a = ledger.lookup("Jim K.").unwrap().person_id;
        assert_eq!(ledger.lookup("Jim Kovacs").unwrap().person_id, a);

        let again = apply_fuzzy(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(again.appended, 0);
        assert_eq!(again.already_present, 2);
    }

    #[test]
    fn test_candidate_and_reject() {
        let (dir, path, marker) = ledger_with("");
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let proposed = PersonId::derive(IdTag::QuestionableCluster, "shults|k|ken shults");
        let artifact = dir.path().join("fuzzy.csv");
        fs::write(
            &artifact,
            format!(
                "cluster_key,proposed_person_id,alias,person_canon,human_decision\n\
                 shults|k,{proposed},K. Shults,Ken Shults,candidate\n\
                 shults|k,{proposed},Ken Shults,Ken Shults,reject\n"
            ),
        )
        .unwrap();
        let summary = apply_fuzzy(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(summary.appended, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(ledger.lookup("K. Shults").unwrap().status, AliasStatus::Candidate);
        assert!(!ledger.contains("Ken Shults"));
    }

    #[test]
    fn test_known_person_keeps_ledger_canon() {
        let id = PersonId::derive(IdTag::AutoCluster, "ken shults");
        let (dir, path, marker) = ledger_with(&format!("Ken Shults,{id},Ken Shults,verified,\n"));
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("fuzzy.csv");
        fs::write(
            &artifact,
            format!(
                "cluster_key,proposed_person_id,alias,person_canon,human_decision\n\
                 shults|k,{id},K. Shults,Kenneth Shults,accept\n"
            ),
        )
        .unwrap();

        apply_fuzzy(&mut ledger, &artifact, Utc::now()).unwrap();
        let record = ledger.lookup("K. Shults").unwrap();
        assert_eq!(record.person_id, id);
        assert_eq!(record.person_canon, "Ken Shults");
    }

    #[test]
    fn test_accept_with_blank_proposal_is_skipped() {
        let (dir, path, marker) = ledger_with("");
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("fuzzy.csv");
        fs::write(
            &artifact,
            "cluster_key,proposed_person_id,alias,person_canon,human_decision\n\
             shults|k,,Kenny Shults,,accept\n",
        )
        .unwrap();

        let summary = apply_fuzzy(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(summary.appended, 0);
        assert_eq!(summary.issues[0].kind, RowIssueKind::IncompleteRow);
        assert!(!ledger.contains("Kenny Shults"));
    }
}
