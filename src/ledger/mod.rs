//! Append-only alias ledger.
//!
//! Each alias maps to exactly one person. Rows are only ever appended;
//! corrections are new redirect rows, never edits. A zero-byte frozen marker
//! next to the ledger turns every append into a hard failure.

mod record;
mod store;

pub use record::{AliasRecord, AliasStatus, PersonIdentity, PersonStatus};
pub use store::{AliasLedger, FULL_HEADER, REQUIRED_COLUMNS};
