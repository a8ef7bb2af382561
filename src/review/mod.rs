//! Review artifacts.
//!
//! Each artifact kind is a CSV table with a fixed header, one row per
//! decision a human has to make, and a blank decision column. Generation is
//! deterministic: rows are stable-sorted by impact then name, so regenerating
//! against an unchanged ledger produces byte-identical output.
//!
//! Each submodule pairs the generator for one artifact kind with the applier
//! that reads the human-edited copy back.

pub mod bootstrap;
pub mod fuzzy;
pub mod quarantine;
pub mod unmapped;

use std::path::{Path, PathBuf};

use crate::error::IdentityResult;
use crate::table::write_table;

pub use bootstrap::BootstrapRow;
pub use fuzzy::FuzzyRow;
pub use quarantine::{QuarantineEntry, QuarantineRow};
pub use unmapped::UnmappedRow;

/// Separator for multi-valued cells.
pub const LIST_SEPARATOR: &str = " | ";

/// One row of a review artifact.
pub trait ReviewRow {
    /// Column names in output order.
    const HEADER: &'static [&'static str];

    /// Cell values in [`Self::HEADER`] order.
    fn cells(&self) -> Vec<String>;
}

/// Writes rows (already in their final order) under the row type's header.
///
/// # Errors
/// Propagates CSV encoding and I/O errors.
pub fn write_artifact<R: ReviewRow>(path: &Path, rows: &[R]) -> IdentityResult<PathBuf> {
    write_table(path, R::HEADER, rows.iter().map(ReviewRow::cells))
}

/// Joins values with [`LIST_SEPARATOR`].
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}
