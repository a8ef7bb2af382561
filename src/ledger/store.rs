//! The alias ledger file.
//!
//! The ledger is a CSV table owned by human reviewers. This module never
//! rewrites or reorders existing rows: a commit copies the current bytes
//! verbatim, appends the staged rows, and replaces the file by atomic rename.
//! The frozen marker is checked when an apply starts and again at commit.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{IdentityError, IdentityResult, InputError, LedgerError};
use crate::identifier::PersonId;
use crate::table::{encode_rows, write_table, AtomicWriter, TableReader};

use super::record::{AliasRecord, AliasStatus, PersonIdentity};

/// Columns every ledger must carry.
pub const REQUIRED_COLUMNS: [&str; 5] = ["alias", "person_id", "person_canon", "status", "notes"];

/// Header written by [`AliasLedger::init`].
pub const FULL_HEADER: [&str; 7] = [
    "alias",
    "person_id",
    "person_canon",
    "status",
    "notes",
    "decided_by",
    "decided_at",
];

/// Loaded ledger plus rows staged for the next commit.
#[derive(Debug)]
pub struct AliasLedger {
    path: PathBuf,
    marker: PathBuf,
    header: Vec<String>,
    records: Vec<AliasRecord>,
    by_alias: HashMap<String, usize>,
    staged: Vec<AliasRecord>,
}

impl AliasLedger {
    /// Creates an empty ledger with the full header.
    ///
    /// # Errors
    /// - `Frozen` if the marker exists
    /// - `AlreadyExists` if a ledger is already present
    pub fn init(path: &Path, marker: &Path) -> IdentityResult<PathBuf> {
        if marker.exists() {
            return Err(LedgerError::Frozen {
                marker: marker.to_path_buf(),
            }
            .into());
        }
        if path.exists() {
            return Err(LedgerError::AlreadyExists {
                path: path.to_path_buf(),
            }
            .into());
        }
        let written = write_table(path, &FULL_HEADER, Vec::<Vec<&str>>::new())?;
        info!(path = %written.display(), "initialised alias ledger");
        Ok(written)
    }

    /// Loads the ledger at `path`; `marker` is the frozen-marker location.
    ///
    /// # Errors
    /// - `MissingInput` when the ledger does not exist
    /// - `SchemaViolation` for missing columns
    /// - `Malformed` for an unparsable person id, status or timestamp
    /// - `DuplicateAlias` when an alias is mapped twice
    pub fn open(path: &Path, marker: &Path) -> IdentityResult<Self> {
        let mut table = TableReader::open(
            path,
            &REQUIRED_COLUMNS,
            "create it with `person-identity init` or restore it from version control",
        )?;
        let header = table.headers().to_vec();
        let rows = table.rows()?;

        let malformed = |line: u64, message: String| -> IdentityError {
            InputError::Malformed {
                path: path.to_path_buf(),
                line,
                message,
            }
            .into()
        };

        let mut records = Vec::with_capacity(rows.len());
        let mut by_alias = HashMap::with_capacity(rows.len());
        for row in &rows {
            let alias = table.cell(row, "alias");
            if alias.is_empty() {
                continue;
            }
            let person_id: PersonId = table
                .cell(row, "person_id")
                .parse()
                .map_err(|e| malformed(row.line, format!("invalid person_id: {e}")))?;
            let status: AliasStatus = table
                .cell(row, "status")
                .parse()
                .map_err(|e| malformed(row.line, e))?;
            let decided_by = Some(table.cell(row, "decided_by"))
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let decided_at = match table.cell(row, "decided_at") {
                "" => None,
                s => Some(
                    DateTime::parse_from_rfc3339(s)
                        .map_err(|e| malformed(row.line, format!("invalid decided_at: {e}")))?
                        .with_timezone(&Utc),
                ),
            };

            if by_alias.insert(alias.to_string(), records.len()).is_some() {
                return Err(LedgerError::DuplicateAlias {
                    alias: alias.to_string(),
                }
                .into());
            }
            records.push(AliasRecord {
                alias: alias.to_string(),
                person_id,
                person_canon: table.cell(row, "person_canon").to_string(),
                status,
                notes: table.cell(row, "notes").to_string(),
                decided_by,
                decided_at,
            });
        }

        debug!(path = %path.display(), aliases = records.len(), "loaded alias ledger");
        Ok(Self {
            path: path.to_path_buf(),
            marker: marker.to_path_buf(),
            header,
            records,
            by_alias,
            staged: Vec::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Header in file order. Authoritative for the column order of appended rows.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.marker.exists()
    }

    /// Fails with `Frozen` when the marker exists.
    ///
    /// # Errors
    /// Returns `LedgerError::Frozen`.
    pub fn ensure_writable(&self) -> IdentityResult<()> {
        if self.is_frozen() {
            return Err(LedgerError::Frozen {
                marker: self.marker.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Committed records in ledger order.
    #[must_use]
    pub fn records(&self) -> &[AliasRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when `alias` is committed or staged.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.lookup(alias).is_some()
    }

    /// Record for `alias`, looking through staged rows as well.
    #[must_use]
    pub fn lookup(&self, alias: &str) -> Option<&AliasRecord> {
        let alias = alias.trim();
        self.by_alias
            .get(alias)
            .map(|&i| &self.records[i])
            .or_else(|| self.staged.iter().find(|r| r.alias == alias))
    }

    /// True when some committed or staged row maps to `person_id`.
    #[must_use]
    pub fn knows_person(&self, person_id: PersonId) -> bool {
        self.all_records().any(|r| r.person_id == person_id)
    }

    /// Person id of the first row whose canonical name is `canon`.
    #[must_use]
    pub fn canon_to_id(&self, canon: &str) -> Option<PersonId> {
        let canon = canon.trim();
        self.all_records()
            .find(|r| r.person_canon == canon)
            .map(|r| r.person_id)
    }

    /// Identity for `person_id` derived from every row that maps to it.
    #[must_use]
    pub fn identity(&self, person_id: PersonId) -> Option<PersonIdentity> {
        let rows: Vec<&AliasRecord> = self
            .all_records()
            .filter(|r| r.person_id == person_id)
            .collect();
        PersonIdentity::from_records(&rows)
    }

    /// Every identity, ordered by person id.
    #[must_use]
    pub fn identities(&self) -> Vec<PersonIdentity> {
        let mut grouped: BTreeMap<PersonId, Vec<&AliasRecord>> = BTreeMap::new();
        for record in self.all_records() {
            grouped.entry(record.person_id).or_default().push(record);
        }
        grouped
            .values()
            .filter_map(|rows| PersonIdentity::from_records(rows))
            .collect()
    }

    fn all_records(&self) -> impl Iterator<Item = &AliasRecord> {
        self.records.iter().chain(self.staged.iter())
    }

    /// Stages a record for the next commit.
    ///
    /// Returns false (and stages nothing) when the alias is already present,
    /// which is what makes re-applying a review artifact a no-op.
    pub fn stage(&mut self, record: AliasRecord) -> bool {
        if record.alias.is_empty() || self.contains(&record.alias) {
            return false;
        }
        self.staged.push(record);
        true
    }

    /// Rows staged since the last commit.
    #[must_use]
    pub fn staged(&self) -> &[AliasRecord] {
        &self.staged
    }

    /// Drops every staged row.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
    }

    /// Appends staged rows to the ledger file and returns how many were written.
    ///
    /// Nothing is written when nothing is staged.
    ///
    /// # Errors
    /// - `Frozen` if the marker appeared since the ledger was opened
    /// - I/O or CSV errors; the ledger file is unchanged on failure
    pub fn commit(&mut self) -> IdentityResult<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        self.ensure_writable()?;

        let mut existing = fs::read(&self.path)?;
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            existing.push(b'\n');
        }
        let appended = encode_rows(
            None,
            self.staged
                .iter()
                .map(|r| self.header.iter().map(|col| r.cell(col)).collect::<Vec<_>>()),
        )?;

        let mut writer = AtomicWriter::create(&self.path)?;
        writer.write_all(&existing)?;
        writer.write_all(&appended)?;
        writer.commit()?;

        let count = self.staged.len();
        for record in self.staged.drain(..) {
            self.by_alias.insert(record.alias.clone(), self.records.len());
            self.records.push(record);
        }
        info!(path = %self.path.display(), appended = count, "committed alias ledger");
        Ok(count)
    }
}
