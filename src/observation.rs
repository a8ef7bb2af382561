//! Raw name observations.
//!
//! One observation is one competitor slot of one placement. A placement row
//! may name two competitors, so the left and right slots arrive as two
//! parallel streams distinguished by [`Side`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IdentityResult, RowIssue, RowIssueKind};
use crate::overrides::EventOverrides;
use crate::table::TableReader;

/// Columns every observation table must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["raw_name", "event_id", "division", "year"];

/// Competitor slot within a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// Left / first-named competitor.
    One,
    /// Right / partner competitor.
    Two,
}

impl Side {
    /// Parses `1` or `2`; blank means side one.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "1" => Some(Self::One),
            "2" => Some(Self::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "1"),
            Self::Two => write!(f, "2"),
        }
    }
}

/// An immutable observation of a raw name in an event placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNameObservation {
    pub raw_name: String,
    pub event_id: String,
    pub division: String,
    pub year: Option<i32>,
    pub side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl RawNameObservation {
    /// Creates an observation without a country.
    #[must_use]
    pub fn new(
        raw_name: impl Into<String>,
        event_id: impl Into<String>,
        division: impl Into<String>,
        year: Option<i32>,
        side: Side,
    ) -> Self {
        Self {
            raw_name: raw_name.into(),
            event_id: event_id.into(),
            division: division.into(),
            year,
            side,
            country: None,
        }
    }

    /// The name with outer whitespace removed; `None` when blank.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        let trimmed = self.raw_name.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Observations loaded from a table together with recovered row issues.
#[derive(Debug, Default)]
pub struct LoadedObservations {
    pub observations: Vec<RawNameObservation>,
    pub issues: Vec<RowIssue>,
    /// Rows dropped because their event is excluded by an override.
    pub excluded: usize,
}

/// Reads the observation table, applying event overrides.
///
/// # Errors
/// - `MissingInput` when the table does not exist
/// - `SchemaViolation` when a required column is absent
pub fn load_observations(
    path: &Path,
    overrides: &EventOverrides,
) -> IdentityResult<LoadedObservations> {
    let mut table = TableReader::open(
        path,
        &REQUIRED_COLUMNS,
        "run the placement extraction stage first to produce the observation table",
    )?;
    let has_side = table.has_column("side");
    let has_country = table.has_column("country");
    let rows = table.rows()?;

    let mut loaded = LoadedObservations::default();
    for row in &rows {
        let event_id = table.cell(row, "event_id");
        if overrides.is_excluded(event_id) {
            loaded.excluded += 1;
            continue;
        }

        let year_cell = table.cell(row, "year");
        let observed_year = if year_cell.is_empty() {
            None
        } else if let Ok(y) = year_cell.parse::<i32>() {
            Some(y)
        } else {
            warn!(line = row.line, year = year_cell, "unparsable year; treated as unknown");
            loaded.issues.push(RowIssue::new(
                RowIssueKind::InvalidYear,
                Some(row.line),
                format!("year '{year_cell}' is not a number"),
            ));
            None
        };

        let side = if has_side {
            let cell = table.cell(row, "side");
            if let Some(side) = Side::parse(cell) {
                side
            } else {
                warn!(line = row.line, side = cell, "side must be 1 or 2; row skipped");
                loaded.issues.push(RowIssue::new(
                    RowIssueKind::InvalidSide,
                    Some(row.line),
                    format!("side '{cell}' is not 1 or 2"),
                ));
                continue;
            }
        } else {
            Side::One
        };

        let country = if has_country {
            Some(table.cell(row, "country"))
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        loaded.observations.push(RawNameObservation {
            raw_name: table.cell(row, "raw_name").to_string(),
            event_id: event_id.to_string(),
            division: table.cell(row, "division").to_string(),
            year: overrides.effective_year(event_id, observed_year),
            side,
            country,
        });
    }

    debug!(
        path = %path.display(),
        rows = rows.len(),
        kept = loaded.observations.len(),
        excluded = loaded.excluded,
        "loaded observations"
    );
    Ok(loaded)
}
