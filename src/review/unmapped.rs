//! Unmapped-name review.
//!
//! Every person-like observed name the ledger does not map gets one row with
//! the evidence a reviewer needs to identify it: where and when it appeared,
//! which known persons it competed alongside, and which known persons it
//! could abbreviate. A blank target on apply is itself a decision: the name
//! becomes a stub identity of its own.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::apply::ApplySummary;
use crate::cluster::ClusterContext;
use crate::config::UnmappedConfig;
use crate::error::{IdentityResult, RowIssueKind};
use crate::identifier::{IdTag, PersonId};
use crate::ledger::{AliasLedger, AliasRecord, AliasStatus, PersonIdentity};
use crate::normalize::match_key;
use crate::table::TableReader;

use super::{join_list, ReviewRow};

/// Default note for a name mapped to an existing person.
pub const NOTE_IDENTIFIED: &str = "gate4:identified";
/// Default note for a name minted as its own stub.
pub const NOTE_STUB: &str = "stub:abbreviated_name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedRow {
    pub name: String,
    pub appearances: u64,
    pub years: BTreeSet<i32>,
    /// Capped list of event ids.
    pub events: Vec<String>,
    pub divisions: BTreeSet<String>,
    pub co_competitors: Vec<String>,
    /// `Canonical Name [person_id]` entries, best match first.
    pub candidate_matches: Vec<String>,
    pub alias_target_id: String,
    pub notes: String,
}

impl ReviewRow for UnmappedRow {
    const HEADER: &'static [&'static str] = &[
        "name",
        "appearances",
        "years",
        "events",
        "divisions",
        "co_competitors",
        "candidate_matches",
        "alias_target_id",
        "notes",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.appearances.to_string(),
            join_list(self.years.iter().map(ToString::to_string)),
            join_list(&self.events),
            join_list(&self.divisions),
            join_list(&self.co_competitors),
            join_list(&self.candidate_matches),
            self.alias_target_id.clone(),
            self.notes.clone(),
        ]
    }
}

fn tokens(raw: &str) -> Vec<String> {
    match_key(raw)
        .split(|c: char| c == ' ' || c == '/')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Known persons the unmapped `name` could abbreviate.
///
/// A candidate shares the leading token and, when `name` has more than one
/// token, its surname starts with the first letter of `name`'s final token.
/// Persons with any alias seen competing against `name` are excluded.
fn candidate_matches(
    name: &str,
    identities: &[PersonIdentity],
    ctx: &ClusterContext<'_>,
    limit: usize,
) -> Vec<String> {
    let name_tokens = tokens(name);
    let Some(first) = name_tokens.first() else {
        return Vec::new();
    };
    let initial = (name_tokens.len() >= 2)
        .then(|| name_tokens.last().and_then(|t| t.chars().next()))
        .flatten();
    let name_key = match_key(name);

    let mut scored: Vec<(f64, &PersonIdentity)> = identities
        .iter()
        .filter(|identity| {
            let canon_tokens = tokens(&identity.canonical_name);
            if canon_tokens.first() != Some(first) {
                return false;
            }
            match (initial, canon_tokens.last()) {
                (Some(c), Some(last)) if canon_tokens.len() >= 2 => last.starts_with(c),
                _ => true,
            }
        })
        .filter(|identity| {
            !identity
                .aliases
                .iter()
                .any(|alias| ctx.evidence.are_distinct(name, alias))
        })
        .map(|identity| {
            let sim = strsim::jaro_winkler(&name_key, &match_key(&identity.canonical_name));
            (sim, identity)
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.canonical_name.cmp(&b.canonical_name))
            .then_with(|| a.person_id.cmp(&b.person_id))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, identity)| format!("{} [{}]", identity.canonical_name, identity.person_id))
        .collect()
}

/// Builds unmapped-name rows, most-used first.
#[must_use]
pub fn generate_unmapped(ctx: &ClusterContext<'_>, config: &UnmappedConfig) -> Vec<UnmappedRow> {
    let identities = ctx.ledger.identities();

    let mut event_canons: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for (name, usage) in ctx.usage.iter() {
        if let Some(record) = ctx.ledger.lookup(name) {
            for event in &usage.events {
                event_canons
                    .entry(event.as_str())
                    .or_default()
                    .insert(record.person_canon.clone());
            }
        }
    }

    let mut rows: Vec<UnmappedRow> = ctx
        .usage
        .iter()
        .filter(|(name, usage)| {
            usage.appearances >= config.min_appearances
                && !ctx.ledger.contains(name)
                && ctx.triage.classify(name).class.is_person_like()
        })
        .map(|(name, usage)| {
            let co_competitors: BTreeSet<&String> = usage
                .events
                .iter()
                .filter_map(|e| event_canons.get(e.as_str()))
                .flatten()
                .collect();
            UnmappedRow {
                name: name.to_string(),
                appearances: usage.appearances,
                years: usage.years.clone(),
                events: usage.events.iter().take(config.max_events).cloned().collect(),
                divisions: usage.divisions.clone(),
                co_competitors: co_competitors
                    .into_iter()
                    .take(config.max_co_competitors)
                    .cloned()
                    .collect(),
                candidate_matches: candidate_matches(name, &identities, ctx, config.max_candidates),
                alias_target_id: String::new(),
                notes: String::new(),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.appearances.cmp(&a.appearances).then_with(|| a.name.cmp(&b.name)));
    debug!(rows = rows.len(), "generated unmapped review rows");
    rows
}

/// Applies a reviewed unmapped-name artifact.
///
/// A row with a target id maps the name to that (known) person; a blank
/// target mints a stub. Any unknown or malformed target aborts the whole
/// apply before anything is written.
///
/// # Errors
/// - `Frozen` when the ledger is frozen
/// - `MissingInput` / `SchemaViolation` for the artifact
/// - `RejectedDecisions` when any target is unknown or malformed
pub fn apply_unmapped(
    ledger: &mut AliasLedger,
    artifact: &Path,
    now: DateTime<Utc>,
) -> IdentityResult<ApplySummary> {
    ledger.ensure_writable()?;
    let mut table = TableReader::open(
        artifact,
        &["name", "alias_target_id"],
        "run `person-identity unmapped generate` first",
    )?;
    let rows = table.rows()?;
    let mut summary = ApplySummary::new("unmapped");
    summary.rows_read = rows.len();

    for row in &rows {
        let name = table.cell(row, "name");
        if name.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let target = table.cell(row, "alias_target_id");
        let notes = table.cell(row, "notes");

        let record = if target.is_empty() {
            let id = PersonId::derive(IdTag::StubUnmapped, name);
            let notes = if notes.is_empty() { NOTE_STUB } else { notes };
            AliasRecord::new(name, id, name, AliasStatus::Verified, notes)
        } else {
            let identity = target
                .parse::<PersonId>()
                .ok()
                .and_then(|id| ledger.identity(id));
            let Some(identity) = identity else {
                summary.issue(
                    RowIssueKind::UnknownTarget,
                    row.line,
                    format!("alias_target_id '{target}' is not a known person (name {name})"),
                );
                continue;
            };
            let notes = if notes.is_empty() { NOTE_IDENTIFIED } else { notes };
            AliasRecord::new(
                name,
                identity.person_id,
                identity.canonical_name,
                AliasStatus::Verified,
                notes,
            )
        };
        summary.stage(ledger, record.decided("unmapped_review", now));
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
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn obs(name: &str, event: &str, division: &str, year: i32) -> RawNameObservation {
        RawNameObservation::new(name, event, division, Some(year), Side::One)
    }

    fn ledger_with(rows: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aliases.csv");
        let marker = dir.path().join("aliases.lock");
        fs::write(&path, format!("alias,person_id,person_canon,status,notes\n{rows}")).unwrap();
        (dir, path, marker)
    }

    fn generate(ledger: &AliasLedger, data: &[RawNameObservation]) -> Vec<UnmappedRow> {
        let usage = aggregate(data);
        let evidence = CooccurrenceIndex::build(data);
        let triage = TriageRules::default();
        let ctx = ClusterContext {
            usage: &usage,
            evidence: &evidence,
            triage: &triage,
            ledger,
        };
        generate_unmapped(&ctx, &UnmappedConfig::default())
    }

    #[test]
    fn test_abbreviated_name_surfaces_full_name_candidate() {
        let dubois = PersonId::derive(IdTag::AutoCluster, "francois dubois");
        let (_dir, path, marker) =
            ledger_with(&format!("Francois Dubois,{dubois},Francois Dubois,verified,\n"));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![
            obs("François D.", "10", "Open Singles", 2004),
            obs("François D.", "11", "Open Singles", 2005),
            obs("Ken Shults", "10", "Open Doubles", 2004),
            obs("Francois Dubois", "12", "Open Singles", 2006),
            obs("Portland Footbag Club", "10", "Open Singles", 2004),
        ];
        let rows = generate(&ledger, &data);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["François D.", "Ken Shults"]);

        let francois = &rows[0];
        assert_eq!(francois.appearances, 2);
        assert_eq!(francois.cells()[2], "2004 | 2005");
        assert_eq!(francois.candidate_matches, vec![format!("Francois Dubois [{dubois}]")]);
        assert!(francois.alias_target_id.is_empty());
    }

    #[test]
    fn test_cooccurring_person_is_not_a_candidate() {
        let dubois = PersonId::derive(IdTag::AutoCluster, "francois dubois");
        let (_dir, path, marker) =
            ledger_with(&format!("Francois Dubois,{dubois},Francois Dubois,verified,\n"));
        let ledger = AliasLedger::open(&path, &marker).unwrap();
        let data = vec![
            obs("François D.", "10", "Open Singles", 2004),
            obs("Francois Dubois", "10", "Open Singles", 2004),
        ];
        let rows = generate(&ledger, &data);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].candidate_matches.is_empty());
        assert_eq!(rows[0].co_competitors, vec!["Francois Dubois".to_string()]);
    }

    #[test]
    fn test_apply_identifies_and_stubs() {
        let dubois = PersonId::derive(IdTag::AutoCluster, "francois dubois");
        let (dir, path, marker) =
            ledger_with(&format!("Francois Dubois,{dubois},Francois Dubois,verified,\n"));
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("unmapped_review.csv");
        let mut rows = vec![
            UnmappedRow {
                name: "François D.".to_string(),
                appearances: 2,
                years: BTreeSet::new(),
                events: Vec::new(),
                divisions: BTreeSet::new(),
                co_competitors: Vec::new(),
                candidate_matches: Vec::new(),
                alias_target_id: dubois.to_string(),
                notes: String::new(),
            },
        ];
        let mut stub = rows[0].clone();
        stub.name = "Zed Q.".to_string();
        stub.alias_target_id.clear();
        rows.push(stub);
        write_artifact(&artifact, &rows).unwrap();

        let summary = apply_unmapped(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(summary.appended, 2);
        let identified = ledger.lookup("François D.").unwrap();
        assert_eq!(identified.person_id, dubois);
        assert_eq!(identified.notes, NOTE_IDENTIFIED);
        let stubbed = ledger.lookup("Zed Q.").unwrap();
        assert_eq!(stubbed.person_id, PersonId::derive(IdTag::StubUnmapped, "Zed Q."));
        assert_eq!(stubbed.notes, NOTE_STUB);

        let again = apply_unmapped(&mut ledger, &artifact, Utc::now()).unwrap();
        assert_eq!(again.appended, 0);
    }

    #[test]
    fn test_apply_aborts_on_unknown_target() {
        let (dir, path, marker) = ledger_with("");
        let mut ledger = AliasLedger::open(&path, &marker).unwrap();
        let artifact = dir.path().join("unmapped_review.csv");
        fs::write(
            &artifact,
            "name,alias_target_id,notes\nZed Q.,,\nFrançois D.,not-a-uuid,\n",
        )
        .unwrap();
        let before = fs::read(&path).unwrap();
        assert!(apply_unmapped(&mut ledger, &artifact, Utc::now()).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!ledger.contains("Zed Q."));
    }
}
