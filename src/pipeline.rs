//! Review-cycle stages.
//!
//! Each stage opens what it needs from a [`RunContext`], does its work, and
//! returns a summary. Generation stages never touch the ledger; apply stages
//! append to it through one atomic commit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{aggregate, UsageTable};
use crate::apply::ApplySummary;
use crate::cluster::ClusterContext;
use crate::context::RunContext;
use crate::error::{IdentityResult, RowIssue};
use crate::identifier::PersonId;
use crate::evidence::CooccurrenceIndex;
use crate::ledger::{AliasLedger, PersonStatus};
use crate::observation::load_observations;
use crate::review::{bootstrap, fuzzy, quarantine, unmapped, write_artifact};
use crate::triage::TriageRules;

/// The four review artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Bootstrap,
    Fuzzy,
    Unmapped,
    Quarantine,
}

impl ArtifactKind {
    pub const ALL: [Self; 4] = [Self::Bootstrap, Self::Fuzzy, Self::Unmapped, Self::Quarantine];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Fuzzy => "fuzzy",
            Self::Unmapped => "unmapped",
            Self::Quarantine => "quarantine",
        }
    }

    /// Where this kind's artifact lives for `ctx`.
    #[must_use]
    pub fn artifact_path(self, ctx: &RunContext) -> &PathBuf {
        match self {
            Self::Bootstrap => &ctx.paths.bootstrap_artifact,
            Self::Fuzzy => &ctx.paths.fuzzy_artifact,
            Self::Unmapped => &ctx.paths.unmapped_artifact,
            Self::Quarantine => &ctx.paths.quarantine_artifact,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown artifact kind '{s}'"))
    }
}

/// Outcome of one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateSummary {
    pub artifact: ArtifactKind,
    pub path: PathBuf,
    pub rows: usize,
    pub observations: usize,
    /// Observations dropped by event overrides.
    pub excluded: usize,
    pub issues: Vec<RowIssue>,
}

impl fmt::Display for GenerateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} row(s) written to {} ({} observation(s), {} excluded, {} issue(s))",
            self.artifact,
            self.rows,
            self.path.display(),
            self.observations,
            self.excluded,
            self.issues.len()
        )
    }
}

/// Observation-derived inputs shared by the clustering stages.
pub struct Analysis {
    pub usage: UsageTable,
    pub evidence: CooccurrenceIndex,
    pub triage: TriageRules,
    pub observations: usize,
    pub excluded: usize,
    pub issues: Vec<RowIssue>,
}

impl Analysis {
    /// Loads observations and builds the usage table and evidence index.
    ///
    /// # Errors
    /// `MissingInput` / `SchemaViolation` for the observation table.
    pub fn load(ctx: &RunContext) -> IdentityResult<Self> {
        let loaded = load_observations(&ctx.paths.observations, &ctx.overrides)?;
        let usage = aggregate(&loaded.observations);
        let evidence = CooccurrenceIndex::build(&loaded.observations);
        info!(
            observations = loaded.observations.len(),
            names = usage.len(),
            distinct_pairs = evidence.len(),
            "observations analysed"
        );
        Ok(Self {
            usage,
            evidence,
            triage: TriageRules::default(),
            observations: loaded.observations.len(),
            excluded: loaded.excluded,
            issues: loaded.issues,
        })
    }

    #[must_use]
    pub fn cluster_context<'a>(&'a self, ledger: &'a AliasLedger) -> ClusterContext<'a> {
        ClusterContext {
            usage: &self.usage,
            evidence: &self.evidence,
            triage: &self.triage,
            ledger,
        }
    }
}

fn open_ledger(ctx: &RunContext) -> IdentityResult<AliasLedger> {
    AliasLedger::open(&ctx.paths.ledger, &ctx.paths.frozen_marker)
}

/// Creates an empty ledger at the context's ledger path.
///
/// # Errors
/// `Frozen` or `AlreadyExists`, plus I/O errors.
pub fn init_ledger(ctx: &RunContext) -> IdentityResult<PathBuf> {
    AliasLedger::init(&ctx.paths.ledger, &ctx.paths.frozen_marker)
}

/// Runs a stage that clusters observations against the ledger.
fn observation_stage<F>(
    ctx: &RunContext,
    ledger: &AliasLedger,
    kind: ArtifactKind,
    write_rows: F,
) -> IdentityResult<GenerateSummary>
where
    F: FnOnce(&ClusterContext<'_>) -> IdentityResult<usize>,
{
    let analysis = Analysis::load(ctx)?;
    let rows = write_rows(&analysis.cluster_context(ledger))?;
    Ok(GenerateSummary {
        artifact: kind,
        path: kind.artifact_path(ctx).clone(),
        rows,
        observations: analysis.observations,
        excluded: analysis.excluded,
        issues: analysis.issues,
    })
}

/// Writes one review artifact.
///
/// # Errors
/// - `MissingInput` / `SchemaViolation` for the ledger or the stage's input table
/// - I/O and CSV errors writing the artifact
pub fn generate(ctx: &RunContext, kind: ArtifactKind) -> IdentityResult<GenerateSummary> {
    let ledger = open_ledger(ctx)?;
    let path = kind.artifact_path(ctx);

    let summary = match kind {
        ArtifactKind::Quarantine => {
            let entries = quarantine::load_quarantine(&ctx.paths.quarantine)?;
            // Observations only rank the rows here, so they are optional.
            let analysis = if ctx.paths.observations.exists() {
                Some(Analysis::load(ctx)?)
            } else {
                None
            };
            let empty = UsageTable::default();
            let usage = analysis.as_ref().map_or(&empty, |a| &a.usage);
            let (rows, mut issues) = quarantine::generate_quarantine(&entries, &ledger, usage);
            write_artifact(path, &rows)?;
            let (observations, excluded) = analysis
                .as_ref()
                .map_or((0, 0), |a| (a.observations, a.excluded));
            if let Some(analysis) = analysis {
                issues.extend(analysis.issues);
            }
            GenerateSummary {
                artifact: kind,
                path: path.clone(),
                rows: rows.len(),
                observations,
                excluded,
                issues,
            }
        }
        ArtifactKind::Bootstrap => observation_stage(ctx, &ledger, kind, |cluster_ctx| {
            let rows = bootstrap::generate_bootstrap(cluster_ctx, &ctx.config.bootstrap);
            write_artifact(path, &rows)?;
            Ok(rows.len())
        })?,
        ArtifactKind::Fuzzy => observation_stage(ctx, &ledger, kind, |cluster_ctx| {
            let (rows, _) =
                fuzzy::generate_fuzzy(cluster_ctx, &ctx.config.fuzzy, &ctx.config.scoring);
            write_artifact(path, &rows)?;
            Ok(rows.len())
        })?,
        ArtifactKind::Unmapped => observation_stage(ctx, &ledger, kind, |cluster_ctx| {
            let rows = unmapped::generate_unmapped(cluster_ctx, &ctx.config.unmapped);
            write_artifact(path, &rows)?;
            Ok(rows.len())
        })?,
    };

    info!(
        artifact = %kind,
        rows = summary.rows,
        path = %summary.path.display(),
        "review artifact written"
    );
    Ok(summary)
}

/// Applies the human-edited artifact of `kind` to the ledger.
///
/// # Errors
/// - `Frozen` when the frozen marker exists; nothing is written
/// - `MissingInput` / `SchemaViolation` for the ledger or artifact
/// - `RejectedDecisions` / `PendingManualRows`; nothing is written
pub fn apply(ctx: &RunContext, kind: ArtifactKind, now: DateTime<Utc>) -> IdentityResult<ApplySummary> {
    let mut ledger = open_ledger(ctx)?;
    let artifact = kind.artifact_path(ctx);
    match kind {
        ArtifactKind::Bootstrap => bootstrap::apply_bootstrap(&mut ledger, artifact, now),
        ArtifactKind::Fuzzy => fuzzy::apply_fuzzy(&mut ledger, artifact, now),
        ArtifactKind::Unmapped => unmapped::apply_unmapped(&mut ledger, artifact, now),
        ArtifactKind::Quarantine => quarantine::apply_quarantine(&mut ledger, artifact, now),
    }
}

/// Ledger counts reported by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub path: PathBuf,
    pub aliases: usize,
    pub persons: usize,
    pub verified: usize,
    pub candidate: usize,
    pub stub: usize,
    pub frozen: bool,
    /// Person ids whose rows disagree on `person_canon`.
    pub ids_with_multiple_canons: Vec<PersonId>,
    /// Canonical names carried by more than one person id.
    pub canons_with_multiple_ids: Vec<String>,
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ledger:    {}", self.path.display())?;
        writeln!(f, "aliases:   {}", self.aliases)?;
        writeln!(
            f,
            "persons:   {} ({} verified, {} candidate, {} stub)",
            self.persons, self.verified, self.candidate, self.stub
        )?;
        write!(f, "frozen:    {}", if self.frozen { "yes" } else { "no" })?;
        if !self.ids_with_multiple_canons.is_empty() {
            let ids: Vec<String> = self
                .ids_with_multiple_canons
                .iter()
                .map(ToString::to_string)
                .collect();
            write!(f, "\nids with several canonical names: {}", ids.join(", "))?;
        }
        if !self.canons_with_multiple_ids.is_empty() {
            write!(
                f,
                "\ncanonical names with several ids: {}",
                self.canons_with_multiple_ids.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Ids with more than one canonical name, and canonical names with more
/// than one id, both sorted.
fn canon_conflicts(ledger: &AliasLedger) -> (Vec<PersonId>, Vec<String>) {
    let mut canons_by_id: BTreeMap<PersonId, BTreeSet<&str>> = BTreeMap::new();
    let mut ids_by_canon: BTreeMap<&str, BTreeSet<PersonId>> = BTreeMap::new();
    for record in ledger.records() {
        canons_by_id
            .entry(record.person_id)
            .or_default()
            .insert(record.person_canon.as_str());
        ids_by_canon
            .entry(record.person_canon.as_str())
            .or_default()
            .insert(record.person_id);
    }
    let ids = canons_by_id
        .into_iter()
        .filter(|(_, canons)| canons.len() > 1)
        .map(|(id, _)| id)
        .collect();
    let canons = ids_by_canon
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(canon, _)| canon.to_string())
        .collect();
    (ids, canons)
}

/// Summarises the ledger.
///
/// # Errors
/// `MissingInput` / `SchemaViolation` / `Malformed` for the ledger.
pub fn status(ctx: &RunContext) -> IdentityResult<LedgerStatus> {
    let ledger = open_ledger(ctx)?;
    let mut report = LedgerStatus {
        path: ledger.path().to_path_buf(),
        aliases: ledger.len(),
        frozen: ledger.is_frozen(),
        ..LedgerStatus::default()
    };
    for identity in ledger.identities() {
        report.persons += 1;
        match identity.status {
            PersonStatus::Verified => report.verified += 1,
            PersonStatus::Candidate => report.candidate += 1,
            PersonStatus::Stub => report.stub += 1,
        }
    }
    (report.ids_with_multiple_canons, report.canons_with_multiple_ids) = canon_conflicts(&ledger);
    if !report.ids_with_multiple_canons.is_empty() || !report.canons_with_multiple_ids.is_empty() {
        warn!(
            ids = report.ids_with_multiple_canons.len(),
            canons = report.canons_with_multiple_ids.len(),
            "ledger canonical names are inconsistent"
        );
    }
    Ok(report)
}
