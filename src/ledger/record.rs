//! Ledger rows and the identities derived from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::{IdTag, PersonId};

/// Review status of one alias row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasStatus {
    /// Tentatively accepted; may be superseded by a redirect.
    Candidate,
    /// Confirmed by a reviewer (or by an unambiguous automatic rule).
    Verified,
}

impl AliasStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for AliasStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AliasStatus {
    type Err = String;

    /// Blank cells read as `candidate`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "candidate" => Ok(Self::Candidate),
            "verified" => Ok(Self::Verified),
            other => Err(format!("unknown alias status '{other}'")),
        }
    }
}

/// One alias → person mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub alias: String,
    pub person_id: PersonId,
    pub person_canon: String,
    pub status: AliasStatus,
    pub notes: String,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl AliasRecord {
    /// Record with no provenance.
    #[must_use]
    pub fn new(
        alias: impl Into<String>,
        person_id: PersonId,
        person_canon: impl Into<String>,
        status: AliasStatus,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into().trim().to_string(),
            person_id,
            person_canon: person_canon.into().trim().to_string(),
            status,
            notes: notes.into(),
            decided_by: None,
            decided_at: None,
        }
    }

    /// Stamps who decided and when.
    #[must_use]
    pub fn decided(mut self, by: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.decided_by = Some(by.into());
        self.decided_at = Some(at);
        self
    }

    /// Cell value for a ledger column; unknown columns are blank.
    #[must_use]
    pub fn cell(&self, column: &str) -> String {
        match column {
            "alias" => self.alias.clone(),
            "person_id" => self.person_id.to_string(),
            "person_canon" => self.person_canon.clone(),
            "status" => self.status.to_string(),
            "notes" => self.notes.clone(),
            "decided_by" => self.decided_by.clone().unwrap_or_default(),
            "decided_at" => self
                .decided_at
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Derived status of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    Candidate,
    Verified,
    /// Minted from a single unresolved name; no real-world identity confirmed.
    Stub,
}

impl fmt::Display for PersonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidate => write!(f, "candidate"),
            Self::Verified => write!(f, "verified"),
            Self::Stub => write!(f, "stub"),
        }
    }
}

/// A person as seen through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonIdentity {
    pub person_id: PersonId,
    pub canonical_name: String,
    pub status: PersonStatus,
    /// Aliases in ledger order.
    pub aliases: Vec<String>,
}

impl PersonIdentity {
    /// Folds the records of one person (in ledger order) into an identity.
    ///
    /// The canonical name is taken from the first record.
    #[must_use]
    pub fn from_records(records: &[&AliasRecord]) -> Option<Self> {
        let first = records.first()?;
        let person_id = first.person_id;
        let canonical_name = first.person_canon.clone();
        let is_stub = IdTag::STUBS
            .iter()
            .any(|tag| PersonId::derive(*tag, &canonical_name) == person_id);
        let status = if is_stub {
            PersonStatus::Stub
        } else if records.iter().any(|r| r.status == AliasStatus::Verified) {
            PersonStatus::Verified
        } else {
            PersonStatus::Candidate
        };
        Some(Self {
            person_id,
            canonical_name,
            status,
            aliases: records.iter().map(|r| r.alias.clone()).collect(),
        })
    }
}
