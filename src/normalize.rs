//! Name normalization.
//!
//! Two independent keys are derived from a raw name:
//!
//! - [`normalize`] produces the *grouping key* used for exact-key clustering.
//!   Middle initials are dropped so `"John A. Smith"` and `"John Smith"`
//!   collapse onto one key.
//! - [`match_key`] produces the *comparison key* used only by fuzzy scoring.
//!   It keeps initials (they are the signal) and keeps `/` so team pairs can
//!   be split later.
//!
//! Both functions are pure, total and idempotent.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Decomposes to NFKD and drops combining marks.
#[must_use]
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

fn fold(raw: &str, keep: impl Fn(char) -> bool) -> String {
    let lowered = strip_diacritics(raw.trim()).to_lowercase();
    let mapped: String = lowered
        .chars()
        .map(|c| if keep(c) { c } else { ' ' })
        .collect();
    collapse_whitespace(&mapped)
}

/// Collapses runs of whitespace into single spaces and trims both ends.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Computes the grouping key for a raw name.
///
/// Returns an empty string for input that is blank or consists only of
/// punctuation and initials. Callers treat an empty key as ungroupable.
///
/// # Examples
///
/// ```
/// use person_identity::normalize::normalize;
///
/// assert_eq!(normalize("  François  D. Müller "), "francois muller");
/// assert_eq!(normalize("J. R."), "");
/// ```
#[must_use]
pub fn normalize(raw: &str) -> String {
    let folded = fold(raw, |c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ');
    folded
        .split(' ')
        .filter(|tok| !is_single_letter(tok))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes the comparison key used by fuzzy scoring.
///
/// Same folding as [`normalize`] but single-letter tokens and `/` survive.
///
/// ```
/// use person_identity::normalize::match_key;
///
/// assert_eq!(match_key("Jim K."), "jim k");
/// assert_eq!(match_key("Ken Shults/Jim Caveney"), "ken shults/jim caveney");
/// ```
#[must_use]
pub fn match_key(raw: &str) -> String {
    fold(raw, |c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' || c == '/'
    })
}

/// Splits a match key on team-pair boundaries.
#[must_use]
pub fn split_team(match_key: &str) -> Vec<String> {
    match_key
        .split('/')
        .map(collapse_whitespace)
        .filter(|part| !part.is_empty())
        .collect()
}

fn is_single_letter(tok: &str) -> bool {
    let mut chars = tok.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_lowercase())
}

/// Leading and trailing tokens of a single competitor's match key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    /// Leading token (given name or initial).
    pub first: String,
    /// Final token (surname or surname initial).
    pub last: String,
    /// Number of tokens in the match key.
    pub token_count: usize,
}

impl NameParts {
    /// Parses a raw name. Returns `None` for blank names and team pairs.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let key = match_key(raw);
        if key.contains('/') {
            return None;
        }
        let tokens: Vec<&str> = key.split(' ').filter(|t| !t.is_empty()).collect();
        let first = (*tokens.first()?).to_string();
        let last = (*tokens.last()?).to_string();
        Some(Self {
            first,
            last,
            token_count: tokens.len(),
        })
    }

    /// First character of the leading token.
    #[must_use]
    pub fn first_initial(&self) -> Option<char> {
        self.first.chars().next()
    }

    /// `"k shults"`: the leading token is a single letter.
    #[must_use]
    pub fn has_initial_first(&self) -> bool {
        self.token_count >= 2 && is_single_letter(&self.first)
    }

    /// `"jim k"`: the surname is abbreviated to a single letter.
    #[must_use]
    pub fn has_abbreviated_last(&self) -> bool {
        self.token_count >= 2 && is_single_letter(&self.last)
    }

    /// Either the given name or the surname is abbreviated.
    #[must_use]
    pub fn is_initial_form(&self) -> bool {
        self.has_initial_first() || self.has_abbreviated_last()
    }
}
