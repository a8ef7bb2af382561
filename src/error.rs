//! Error types for the identity engine.
//!
//! Structural failures (missing inputs, schema violations, a frozen ledger)
//! are strongly typed using thiserror and abort a run. Per-row data-quality
//! problems are not errors: they are collected as [`RowIssue`] values and
//! reported in the run summary.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while reading input tables.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Missing input: {}", path.display())]
    MissingInput {
        path: PathBuf,
        hint: String,
    },

    #[error("{} is missing required columns: {}", path.display(), missing.join(", "))]
    SchemaViolation {
        path: PathBuf,
        missing: Vec<String>,
    },

    #[error("{}:{line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

/// Errors raised by the alias ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Alias ledger is frozen (marker present at {})", marker.display())]
    Frozen {
        marker: PathBuf,
    },

    #[error("Alias '{alias}' appears more than once in the ledger")]
    DuplicateAlias {
        alias: String,
    },

    #[error("Ledger already exists at {}", path.display())]
    AlreadyExists {
        path: PathBuf,
    },

    #[error("Decision rejected: {count} row(s) reference unknown or invalid person ids")]
    RejectedDecisions {
        count: usize,
    },

    #[error("Apply aborted: {count} row(s) still marked '{action}'")]
    PendingManualRows {
        action: String,
        count: usize,
    },
}

/// Errors raised while loading configuration or override tables.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse {}: {message}", path.display())]
    Parse {
        path: PathBuf,
        message: String,
    },

    #[error("Invalid configuration value '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    #[error("Unsupported override table version {found} (expected {expected})")]
    UnsupportedVersion {
        found: u32,
        expected: u32,
    },
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl IdentityError {
    /// Shorthand for a missing-input error with a remediation hint.
    #[must_use]
    pub fn missing(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        Self::Input(InputError::MissingInput {
            path: path.into(),
            hint: hint.into(),
        })
    }

    /// Returns true if a required input file was absent.
    #[must_use]
    pub const fn is_missing_input(&self) -> bool {
        matches!(self, Self::Input(InputError::MissingInput { .. }))
    }

    /// Returns true if an input table lacked required columns.
    #[must_use]
    pub const fn is_schema_violation(&self) -> bool {
        matches!(self, Self::Input(InputError::SchemaViolation { .. }))
    }

    /// Returns true if the ledger refused a write because it is frozen.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::Frozen { .. }))
    }

    /// A short, user-facing suggestion for fixing the condition.
    #[must_use]
    pub fn remediation(&self) -> String {
        match self {
            Self::Input(InputError::MissingInput { hint, .. }) => hint.clone(),
            Self::Input(InputError::SchemaViolation { .. }) => {
                "regenerate the table with the prior stage or add the listed columns".to_string()
            }
            Self::Input(InputError::Malformed { .. }) => {
                "fix the reported line and re-run".to_string()
            }
            Self::Ledger(LedgerError::Frozen { marker }) => format!(
                "remove {} to allow new aliases, then re-run",
                marker.display()
            ),
            Self::Ledger(LedgerError::DuplicateAlias { .. }) => {
                "remove the duplicated alias row by hand; the ledger must map each alias once"
                    .to_string()
            }
            Self::Ledger(LedgerError::AlreadyExists { .. }) => {
                "the ledger is already initialised; nothing to do".to_string()
            }
            Self::Ledger(LedgerError::RejectedDecisions { .. }) => {
                "fix the reported target ids in the review artifact and re-run apply".to_string()
            }
            Self::Ledger(LedgerError::PendingManualRows { .. }) => {
                "correct name_1/name_2 on the manual rows and set action to split or skip"
                    .to_string()
            }
            Self::Config(_) => "fix the configuration file and re-run".to_string(),
            Self::Io(_) | Self::Csv(_) => "check file permissions and contents".to_string(),
        }
    }
}

/// Result type alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Kind of a recoverable, per-row data-quality problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
    /// Quarantine evidence did not parse into exactly two names.
    MalformedEvidence,
    /// A year cell could not be parsed.
    InvalidYear,
    /// A side cell was not 1 or 2.
    InvalidSide,
    /// A review row was incomplete and was skipped.
    IncompleteRow,
    /// A human decision referenced an unknown or malformed id.
    UnknownTarget,
    /// A decision value was not understood.
    UnknownDecision,
}

impl fmt::Display for RowIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEvidence => write!(f, "malformed_evidence"),
            Self::InvalidYear => write!(f, "invalid_year"),
            Self::InvalidSide => write!(f, "invalid_side"),
            Self::IncompleteRow => write!(f, "incomplete_row"),
            Self::UnknownTarget => write!(f, "unknown_target"),
            Self::UnknownDecision => write!(f, "unknown_decision"),
        }
    }
}

/// A recoverable issue attached to one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub kind: RowIssueKind,
    /// 1-based data line in the source table (header excluded), when known.
    pub line: Option<u64>,
    pub message: String,
}

impl RowIssue {
    #[must_use]
    pub fn new(kind: RowIssueKind, line: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] row {line}: {}", self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}
