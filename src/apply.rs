//! Shared machinery for applying human decisions to the ledger.
//!
//! Every applier follows the same protocol: refuse up front when the ledger
//! is frozen, stage one record per implied identity (already-present aliases
//! are silently skipped), abort without writing when any row names an
//! unknown target, and otherwise commit everything in one atomic append.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{IdentityResult, LedgerError, RowIssue, RowIssueKind};
use crate::identifier::PersonId;
use crate::ledger::{AliasLedger, AliasRecord};

/// A reviewer's decision cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Blank: not decided yet.
    Pending,
    /// Prefilled for clusters with exactly one existing identity.
    AutoSingleId,
    /// Accept the machine suggestion as verified.
    Accept,
    /// Accept the machine suggestion as a candidate.
    Candidate,
    /// Map to this existing person instead of the suggestion.
    Target(PersonId),
    Reject,
}

pub const AUTO_SINGLE_ID: &str = "AUTO_SINGLE_ID";

impl Decision {
    /// Parses a decision cell. Matching is case-insensitive.
    ///
    /// # Errors
    /// Returns the unrecognised text.
    pub fn parse(cell: &str) -> Result<Self, String> {
        let trimmed = cell.trim();
        if trimmed.eq_ignore_ascii_case(AUTO_SINGLE_ID) {
            return Ok(Self::AutoSingleId);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Ok(Self::Pending),
            "accept" | "accepted" | "yes" | "y" | "verify" | "verified" => Ok(Self::Accept),
            "candidate" => Ok(Self::Candidate),
            "reject" | "rejected" | "no" | "n" | "skip" => Ok(Self::Reject),
            _ => trimmed
                .parse::<PersonId>()
                .map(Self::Target)
                .map_err(|_| trimmed.to_string()),
        }
    }
}

/// Outcome of one apply run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplySummary {
    pub artifact: String,
    pub rows_read: usize,
    pub appended: usize,
    /// Records whose alias was already in the ledger.
    pub already_present: usize,
    /// Rows left undecided, rejected or skipped.
    pub skipped: usize,
    pub issues: Vec<RowIssue>,
}

impl ApplySummary {
    #[must_use]
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            ..Self::default()
        }
    }

    /// Stages `record`, counting it as appended or already present.
    pub fn stage(&mut self, ledger: &mut AliasLedger, record: AliasRecord) {
        if ledger.stage(record) {
            self.appended += 1;
        } else {
            self.already_present += 1;
        }
    }

    /// Records a recoverable row problem and logs it.
    pub fn issue(&mut self, kind: RowIssueKind, line: u64, message: impl Into<String>) {
        let issue = RowIssue::new(kind, Some(line), message);
        warn!(artifact = %self.artifact, "{issue}");
        self.issues.push(issue);
    }

    fn rejected(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.kind == RowIssueKind::UnknownTarget)
            .count()
    }

    /// Commits staged rows unless a row named an unknown target.
    ///
    /// # Errors
    /// - `RejectedDecisions` when any row named an unknown target; nothing is written
    /// - `Frozen` and I/O errors from the commit
    pub fn finish(mut self, ledger: &mut AliasLedger) -> IdentityResult<Self> {
        let rejected = self.rejected();
        if rejected > 0 {
            ledger.discard_staged();
            return Err(LedgerError::RejectedDecisions { count: rejected }.into());
        }
        self.appended = ledger.commit()?;
        info!(
            artifact = %self.artifact,
            appended = self.appended,
            already_present = self.already_present,
            skipped = self.skipped,
            issues = self.issues.len(),
            "applied review decisions"
        );
        Ok(self)
    }
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} row(s) read, {} alias(es) appended, {} already present, {} skipped, {} issue(s)",
            self.artifact,
            self.rows_read,
            self.appended,
            self.already_present,
            self.skipped,
            self.issues.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::IdTag;

    #[test]
    fn test_decision_vocabulary() {
        assert_eq!(Decision::parse("").unwrap(), Decision::Pending);
        assert_eq!(Decision::parse("auto_single_id").unwrap(), Decision::AutoSingleId);
        assert_eq!(Decision::parse(" Accept ").unwrap(), Decision::Accept);
        assert_eq!(Decision::parse("skip").unwrap(), Decision::Reject);
        assert_eq!(Decision::parse("candidate").unwrap(), Decision::Candidate);
        let id = PersonId::derive(IdTag::AutoCluster, "x");
        assert_eq!(Decision::parse(&id.to_string()).unwrap(), Decision::Target(id));
        assert_eq!(Decision::parse("maybe").unwrap_err(), "maybe");
    }

    #[test]
    fn test_summary_display() {
        let mut summary = ApplySummary::new("unmapped");
        summary.rows_read = 3;
        summary.appended = 2;
        summary.skipped = 1;
        assert_eq!(
            summary.to_string(),
            "unmapped: 3 row(s) read, 2 alias(es) appended, 0 already present, 1 skipped, 0 issue(s)"
        );
    }

    #[test]
    fn test_summary_json_carries_issues() {
        let mut summary = ApplySummary::new("fuzzy");
        summary.issue(RowIssueKind::IncompleteRow, 7, "no usable proposed id for Kenny Shults");
        let value = serde_json::to_value(&summary).unwrap();
        let issues = value["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["kind"], "incomplete_row");
        assert_eq!(issues[0]["line"], 7);
    }
}
