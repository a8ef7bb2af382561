//! Quarantine split review.
//!
//! A quarantined identity is a bad merge: one canonical name that is really
//! two people run together ("John Adams Mary Lee"). When the upstream
//! evidence names both halves, the reviewer can split it. A split maps each
//! half to an existing or stub identity and redirects the bad canonical name
//! to the first half.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::aggregate::UsageTable;
use crate::apply::ApplySummary;
use crate::error::{IdentityResult, LedgerError, RowIssue, RowIssueKind};
use crate::identifier::{IdTag, PersonId};
use crate::ledger::{AliasLedger, AliasRecord, AliasStatus};
use crate::table::TableReader;

use super::ReviewRow;

/// Evidence prefix for entries whose two halves are known.
pub const SPLIT_KNOWN_PREFIX: &str = "split_known:";
/// Separator between the two halves inside split evidence.
pub const SPLIT_SEPARATOR: &str = "||";

pub const NOTE_STUB: &str = "stub:quarantine_split";
pub const NOTE_EXISTING: &str = "quarantine_split:existing_person";
pub const NOTE_REDIRECT: &str = "quarantine_split:redirect_from_concat";

/// One quarantined identity as reported upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineEntry {
    pub bad_person_canon: String,
    pub bad_person_id: String,
    pub evidence_tag: String,
}

impl QuarantineEntry {
    /// The two names of `split_known` evidence.
    ///
    /// Returns `Ok(None)` for other evidence kinds.
    ///
    /// # Errors
    /// Describes why `split_known` evidence does not yield exactly two names.
    pub fn split_names(&self) -> Result<Option<(String, String)>, String> {
        let Some(payload) = self.evidence_tag.trim().strip_prefix(SPLIT_KNOWN_PREFIX) else {
            return Ok(None);
        };
        let parts: Vec<&str> = payload.split(SPLIT_SEPARATOR).map(str::trim).collect();
        match parts.as_slice() {
            [a, b] if !a.is_empty() && !b.is_empty() => Ok(Some(((*a).to_string(), (*b).to_string()))),
            [_] => Err(format!("no '{SPLIT_SEPARATOR}' separator in '{}'", self.evidence_tag)),
            _ => Err(format!("expected exactly two names in '{}'", self.evidence_tag)),
        }
    }
}

/// Reads the quarantine table (`person_canon, person_id, quarantine_evidence`).
///
/// # Errors
/// `MissingInput` / `SchemaViolation` for the table.
pub fn load_quarantine(path: &Path) -> IdentityResult<Vec<QuarantineEntry>> {
    let mut table = TableReader::open(
        path,
        &["person_canon", "person_id", "quarantine_evidence"],
        "rebuild the person tables upstream to produce the quarantine list",
    )?;
    let rows = table.rows()?;
    Ok(rows
        .iter()
        .map(|row| QuarantineEntry {
            bad_person_canon: table.cell(row, "person_canon").to_string(),
            bad_person_id: table.cell(row, "person_id").to_string(),
            evidence_tag: table.cell(row, "quarantine_evidence").to_string(),
        })
        .collect())
}

/// Reviewer action on a split row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAction {
    Split,
    Skip,
    /// The names need correcting by hand; blocks the whole apply.
    Manual,
}

impl SplitAction {
    #[must_use]
    pub fn parse(cell: &str) -> Option<Self> {
        match cell.trim().to_ascii_lowercase().as_str() {
            "split" => Some(Self::Split),
            "skip" => Some(Self::Skip),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRow {
    pub old_person_canon: String,
    pub old_person_id: String,
    pub name_1: String,
    pub name_2: String,
    pub action: String,
    pub notes: String,
}

impl ReviewRow for QuarantineRow {
    const HEADER: &'static [&'static str] =
        &["old_person_canon", "old_person_id", "name_1", "name_2", "action", "notes"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.old_person_canon.clone(),
            self.old_person_id.clone(),
            self.name_1.clone(),
            self.name_2.clone(),
            self.action.clone(),
            self.notes.clone(),
        ]
    }
}

/// Builds split rows for `split_known` entries not yet redirected.
///
/// Rows are ordered by the bad canonical name's appearances in `usage`,
/// most first, then alphabetically. Malformed evidence is reported per entry
/// and skipped.
#[must_use]
pub fn generate_quarantine(
    entries: &[QuarantineEntry],
    ledger: &AliasLedger,
    usage: &UsageTable,
) -> (Vec<QuarantineRow>, Vec<RowIssue>) {
    let mut rows = Vec::new();
    let mut issues = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let (name_1, name_2) = match entry.split_names() {
            Ok(Some(names)) => names,
            Ok(None) => continue,
            Err(message) => {
                let issue = RowIssue::new(
                    RowIssueKind::MalformedEvidence,
                    Some(i as u64 + 1),
                    format!("{}: {message}", entry.bad_person_canon),
                );
                warn!("{issue}");
                issues.push(issue);
                continue;
            }
        };
        if ledger.contains(&entry.bad_person_canon) {
            continue;
        }
        rows.push(QuarantineRow {
            old_person_canon: entry.bad_person_canon.clone(),
            old_person_id: entry.bad_person_id.clone(),
            name_1,
            name_2,
            action: "split".to_string(),
            notes: String::new(),
        });
    }
    rows.sort_by(|a, b| {
        usage
            .appearances(&b.old_person_canon)
            .cmp(&usage.appearances(&a.old_person_canon))
            .then_with(|| a.old_person_canon.cmp(&b.old_person_canon))
            .then_with(|| a.old_person_id.cmp(&b.old_person_id))
    });
    debug!(rows = rows.len(), malformed = issues.len(), "generated quarantine review rows");
    (rows, issues)
}

/// Resolves one split half to `(person_id, canonical name)`, staging a
/// record when the name is not aliased yet.
fn resolve_half(
    ledger: &mut AliasLedger,
    summary: &mut ApplySummary,
    name: &str,
    user_notes: &str,
    now: DateTime<Utc>,
) -> (PersonId, String) {
    if let Some(existing) = ledger.lookup(name) {
        summary.already_present += 1;
        return (existing.person_id, existing.person_canon.clone());
    }
    let (id, default_note) = match ledger.canon_to_id(name) {
        Some(id) => (id, NOTE_EXISTING),
        None => (PersonId::derive(IdTag::StubQuarantineSplit, name), NOTE_STUB),
    };
    let notes = if user_notes.is_empty() { default_note } else { user_notes };
    summary.stage(
        ledger,
        AliasRecord::new(name, id, name, AliasStatus::Verified, notes).decided("quarantine_review", now),
    );
    (id, name.to_string())
}

/// Applies a reviewed quarantine artifact.
///
/// # Errors
/// - `Frozen` when the ledger is frozen
/// - `MissingInput` / `SchemaViolation` for the artifact
/// - `PendingManualRows` when any row is still marked `manual`
pub fn apply_quarantine(
    ledger: &mut AliasLedger,
    artifact: &Path,
    now: DateTime<Utc>,
) -> IdentityResult<ApplySummary> {
    ledger.ensure_writable()?;
    let mut table = TableReader::open(
        artifact,
        &["old_person_canon", "name_1", "name_2", "action"],
        "run `person-identity quarantine generate` first",
    )?;
    let rows = table.rows()?;
    let mut summary = ApplySummary::new("quarantine");
    summary.rows_read = rows.len();

    let manual = rows
        .iter()
        .filter(|row| SplitAction::parse(table.cell(row, "action")) == Some(SplitAction::Manual))
        .count();
    if manual > 0 {
        return Err(LedgerError::PendingManualRows {
            action: "manual".to_string(),
            count: manual,
        }
        .into());
    }

    for row in &rows {
        let action_cell = table.cell(row, "action");
        match SplitAction::parse(action_cell) {
            Some(SplitAction::Split) => {}
            Some(SplitAction::Skip | SplitAction::Manual) => {
                summary.skipped += 1;
                continue;
            }
            None => {
                summary.issue(
                    RowIssueKind::UnknownDecision,
                    row.line,
                    format!("action '{action_cell}' is not split, skip or manual"),
                );
                summary.skipped += 1;
                continue;
            }
        }

        let old_canon = table.cell(row, "old_person_canon");
        let name_1 = table.cell(row, "name_1");
        let name_2 = table.cell(row, "name_2");
        if old_canon.is_empty() || name_1.is_empty() || name_2.is_empty() {
            summary.issue(
                RowIssueKind::IncompleteRow,
                row.line,
                "old_person_canon, name_1 and name_2 are all required for a split",
            );
            summary.skipped += 1;
            continue;
        }
        let user_notes = table.cell(row, "notes");

        let (first_id, first_canon) = resolve_half(ledger, &mut summary, name_1, user_notes, now);
        resolve_half(ledger, &mut summary, name_2, user_notes, now);

        let notes = if user_notes.is_empty() { NOTE_REDIRECT } else { user_notes };
        summary.stage(
            ledger,
            AliasRecord::new(old_canon, first_id, first_canon, AliasStatus::Verified, notes)
                .decided("quarantine_review", now),
        );
    }

    summary.finish(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::observation::{RawNameObservation, Side};
    use crate::review::write_artifact;
    use std::fs;
    use tempfile::tempdir;

    fn entry(canon: &str, evidence: &str) -> QuarantineEntry {
        QuarantineEntry {
            bad_person_canon: canon.to_string(),
            bad_person_id: "0d6a7c5e-2f1b-5c1e-9e4e-7a3c1d2b4f60".to_string(),
            evidence_tag: evidence.to_string(),
        }
    }

    #[test]
    fn test_split_names() {
        let ok = entry("John Adams Mary Lee", "split_known:John Adams || Mary Lee");
        assert_eq!(
            ok.split_names().unwrap(),
            Some(("John Adams".to_string(), "Mary Lee".to_string()))
        );
        assert_eq!(entry("X", "suspected_concat").split_names().unwrap(), None);
        assert!(entry("X", "split_known:John Adams").split_names().is_err());
        assert!(entry("X", "split_known:A || B || C").split_names().is_err());
        assert!(entry("X", "split_known: || B").split_names().is_err());
    }

    #[test]
    fn test_generate_skips_malformed_and_redirected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let ledger = AliasLedger::open(&path, &marker).unwrap();

        let entries = vec![
            entry("Zoe Park Ann Li", "split_known:Zoe Park || Ann Li"),
            entry("John Adams Mary Lee", "split_known:John Adams || Mary Lee"),
            entry("Bad Row", "split_known:nothing here"),
            entry("Other", "suspected_concat"),
        ];
        let (rows, issues) = generate_quarantine(&entries, &ledger, &UsageTable::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].old_person_canon, "John Adams Mary Lee");
        assert_eq!(rows[0].action, "split");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, RowIssueKind::MalformedEvidence);
        assert_eq!(issues[0].line, Some(3));
    }

    #[test]
    fn test_rows_ordered_by_impact_then_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let ledger = AliasLedger::open(&path, &marker).unwrap();

        let seen = |name: &str, event: &str| {
            RawNameObservation::new(name, event, "Open Doubles", Some(2001), Side::One)
        };
        let usage = aggregate(&[
            seen("Zoe Park Ann Li", "1"),
            seen("Zoe Park Ann Li", "2"),
            seen("Bo Kim Al Wu", "3"),
        ]);
        let entries = vec![
            entry("Bo Kim Al Wu", "split_known:Bo Kim || Al Wu"),
            entry("John Adams Mary Lee", "split_known:John Adams || Mary Lee"),
            entry("Zoe Park Ann Li", "split_known:Zoe Park || Ann Li"),
            entry("Amy Ng Tom Ray", "split_known:Amy Ng || Tom Ray"),
        ];
        let (rows, _) = generate_quarantine(&entries, &ledger, &usage);
        let order: Vec<&str> = rows.iter().map(|r| r.old_person_canon.as_str()).collect();
        assert_eq!(
            order,
            vec!["Zoe Park Ann Li", "Bo Kim Al Wu", "Amy Ng Tom Ray", "John Adams Mary Lee"]
        );
    }

    #[test]
    fn test_split_produces_three_rows_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();

        let entries = vec![entry("John Adams Mary Lee", "split_known:John Adams || Mary Lee")];
        let (rows, _) = generate_quarantine(&entries, &ledger, &UsageTable::default());
        let artifact = dir.path().join("quarantine_resolution.csv");
        write_artifact(&artifact, &rows).unwrap();

        let summary = apply_quarantine(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(summary.appended, 3);
        let john = PersonId::derive(IdTag::StubQuarantineSplit, "John Adams");
        assert_eq!(ledger.lookup("John Adams").unwrap().person_id, john);
        assert_eq!(
            ledger.lookup("Mary Lee").unwrap().person_id,
            PersonId::derive(IdTag::StubQuarantineSplit, "Mary Lee")
        );
        let redirect = ledger.lookup("John Adams Mary Lee").unwrap();
        assert_eq!(redirect.person_id, john);
        assert_eq!(redirect.person_canon, "John Adams");
        assert_eq!(redirect.notes, NOTE_REDIRECT);

        let again = apply_quarantine(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(again.appended, 0);
        assert_eq!(AliasLedger::open(&path, &marker).unwrap().len(), 3);
    }

    #[test]
    fn test_existing_person_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        let mary = PersonId::derive(IdTag::AutoCluster, "mary lee");
        fs::write(
            &path,
            format!("alias,person_id,person_canon,status,notes\nM. Lee,{mary},Mary Lee,verified,\n"),
        )
        .unwrap();
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("q.csv");
        fs::write(
            &artifact,
            "old_person_canon,old_person_id,name_1,name_2,action,notes\n\
             Mary Lee John Adams,x,Mary Lee,John Adams,split,\n",
        )
        .unwrap();

        apply_quarantine(&mut ledger, &artifact, Utc::now()).unwrap();
        let record = ledger.lookup("Mary Lee").unwrap();
        assert_eq!(record.person_id, mary);
        assert_eq!(record.notes, NOTE_EXISTING);
        assert_eq!(ledger.lookup("Mary Lee John Adams").unwrap().person_id, mary);
    }

    #[test]
    fn test_manual_rows_abort() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("q.csv");
        fs::write(
            &artifact,
            "old_person_canon,old_person_id,name_1,name_2,action,notes\n\
             A B C D,x,A B,C D,split,\n\
             E F G H,y,E F,G H,manual,\n",
        )
        .unwrap();
        let err = apply_quarantine(&mut ledger, &artifact, Utc::now()).unwrap_err();
        assert!(format!("{err}").contains("'manual'"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_incomplete_rows_are_skipped_with_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        AliasLedger::init(&path, &marker).unwrap();
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("q.csv");
        fs::write(
            &artifact,
            "old_person_canon,old_person_id,name_1,name_2,action,notes\nA B C D,x,A B,,split,\n",
        )
        .unwrap();
        let summary = apply_quarantine(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(summary.appended, 0);
        assert_eq!(summary.issues[0].kind, RowIssueKind::IncompleteRow);
    }
}
