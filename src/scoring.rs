//! Confidence scoring.
//!
//! Exact-key clusters get a coarse label describing how consistently their
//! members normalize. Fuzzy pairs get an additive score built from named
//! signals; each signal that fires contributes its weight and a reason tag.
//! Co-occurrence in one event division is a veto: the score drops to zero no
//! matter what else matched.

use std::fmt;

use serde::Serialize;

use crate::config::ScoreWeights;
use crate::normalize::{normalize, NameParts};

pub const REASON_SAME_LAST_NAME: &str = "same_last_name";
pub const REASON_SAME_FIRST_INITIAL: &str = "same_first_initial";
pub const REASON_INITIAL_VS_FULL: &str = "initial_vs_full";
pub const REASON_FIRST_NAME_PREFIX: &str = "first_name_prefix";
pub const REASON_SAME_FIRST_TOKEN: &str = "same_first_token";
pub const REASON_ABBREVIATED_LAST_NAME: &str = "abbreviated_last_name";
pub const REASON_COOCCURS: &str = "cooccurs_same_event_division";

/// Coarse confidence label for exact-key clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Med,
    Low,
}

impl ConfidenceLabel {
    /// Sort rank, strongest first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Med => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Med => write!(f, "med"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Labels a group of names against a reference grouping key.
///
/// - `high`: every member normalizes to `reference_key`
/// - `med`: at least two members and they all share one last token
/// - `low`: otherwise
#[must_use]
pub fn cluster_confidence<S: AsRef<str>>(reference_key: &str, members: &[S]) -> ConfidenceLabel {
    let keys: Vec<String> = members
        .iter()
        .map(|m| normalize(m.as_ref()))
        .filter(|k| !k.is_empty())
        .collect();
    if !keys.is_empty() && keys.iter().all(|k| k == reference_key) {
        return ConfidenceLabel::High;
    }
    let mut lasts: Vec<&str> = keys.iter().filter_map(|k| k.split(' ').last()).collect();
    let count = lasts.len();
    lasts.sort_unstable();
    lasts.dedup();
    if count >= 2 && lasts.len() == 1 {
        ConfidenceLabel::Med
    } else {
        ConfidenceLabel::Low
    }
}

/// Score and evidence for one fuzzy pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub score: f64,
    pub reasons: Vec<&'static str>,
}

impl PairScore {
    fn zero() -> Self {
        Self {
            score: 0.0,
            reasons: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_vetoed(&self) -> bool {
        self.reasons.contains(&REASON_COOCCURS)
    }

    /// Reason tags joined for an artifact cell.
    #[must_use]
    pub fn reason_text(&self) -> String {
        self.reasons.join(";")
    }
}

/// True when `a`'s single-letter surname abbreviates `b`'s surname.
fn abbreviates(a: &NameParts, b: &NameParts) -> bool {
    a.has_abbreviated_last() && !b.has_abbreviated_last() && b.last.starts_with(a.last.as_str())
}

/// Surname relation between two parsed names.
#[must_use]
pub fn shares_surname(a: &NameParts, b: &NameParts) -> bool {
    !a.last.is_empty() && (a.last == b.last || abbreviates(a, b) || abbreviates(b, a))
}

fn prefix_related(a: &str, b: &str, min_len: usize) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
    short.len() >= min_len && long.starts_with(short)
}

/// Scores a pair of names sharing a surname bucket.
///
/// `cooccur` is the co-occurrence fact for the pair; when true the result is a
/// zero score carrying only the veto tag.
#[must_use]
pub fn score_pair(a: &NameParts, b: &NameParts, cooccur: bool, weights: &ScoreWeights) -> PairScore {
    if !shares_surname(a, b) {
        return PairScore::zero();
    }
    if cooccur {
        return PairScore {
            score: 0.0,
            reasons: vec![REASON_COOCCURS],
        };
    }

    let mut score = weights.baseline;
    let mut reasons = vec![REASON_SAME_LAST_NAME];
    if a.last != b.last {
        reasons.push(REASON_ABBREVIATED_LAST_NAME);
    }

    if a.first_initial().is_some() && a.first_initial() == b.first_initial() {
        score += weights.same_first_initial;
        reasons.push(REASON_SAME_FIRST_INITIAL);
    }
    if a.is_initial_form() != b.is_initial_form() {
        score += weights.initial_vs_full;
        reasons.push(REASON_INITIAL_VS_FULL);
    }
    if prefix_related(&a.first, &b.first, weights.prefix_min_len) {
        score += weights.first_name_prefix;
        reasons.push(REASON_FIRST_NAME_PREFIX);
    }
    if !a.first.is_empty() && a.first == b.first {
        score += weights.same_first_token;
        reasons.push(REASON_SAME_FIRST_TOKEN);
    }

    PairScore {
        score: score.min(weights.cap),
        reasons,
    }
}

/// Threshold comparison tolerant of summation rounding (0.40 + 0.25 + 0.10).
#[must_use]
pub fn meets_threshold(score: f64, min_score: f64) -> bool {
    score + 1e-9 >= min_score
}

/// Rounds a score to three decimals for artifact output.
#[must_use]
pub fn format_score(score: f64) -> String {
    format!("{:.3}", (score * 1000.0).round() / 1000.0)
}
