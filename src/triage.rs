//! Name triage: an ordered table of named heuristics.
//!
//! Each rule is a predicate plus a tag. Rules are evaluated in priority order;
//! the first match decides the [`NameClass`], and every matching tag is kept
//! for audit. Names classed as [`NameClass::Pollution`] are excluded from
//! every clustering pass.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::collapse_whitespace;

static POLLUTION_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[:$€£]|\s\d+\.\s|\banonymous\b").unwrap());

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d+(st|nd|rd|th)\b").unwrap());

static CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap());

static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(results?|finals?|rounds?|partners?|events?|divisions?|place|placings|placement|scores?|rank|ranking|pools?|semis?|qual|qualifier|notes?|unknown|tbd|saturday|sunday|monday|tuesday|wednesday|thursday|friday)\b",
    )
    .unwrap()
});

static CLUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fc|club|team|association|assoc|footbag|footstar|freestyle|net|circle)\b")
        .unwrap()
});

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(usa|us|canada|uk|ger|cze|pol|bc|ab|on)\b").unwrap());

static MOJIBAKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{FFFD}ÃÂÐÞðþ]").unwrap());

static QMARK_IN_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-zÀ-ÖØ-öø-ÿ]\?[A-Za-zÀ-ÖØ-öø-ÿ]").unwrap());

static MULTI_PERSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(&|and|\+)\s+|/|,\s*").unwrap());

static PERSON_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-zÀ-ÖØ-öø-ÿ'’-]+\.?$").unwrap());

const PLACEHOLDERS: &[&str] = &["?", "-", "unknown", "n/a", "na", "tbd"];

/// Coarse class assigned to a raw name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameClass {
    /// Annotation debris (money, numbered fragments, placeholders). Never clustered.
    Pollution,
    /// Headings, narrative, multi-person blobs.
    FragmentOrMeta,
    /// Clubs and organisations.
    NonPersonEntity,
    /// A person name damaged by an encoding round trip.
    EncodingCorrupt,
    /// Looks like a single person.
    LikelyPerson,
    /// No rule matched.
    Ambiguous,
}

impl NameClass {
    /// Whether names of this class may be surfaced as persons for review.
    #[must_use]
    pub const fn is_person_like(self) -> bool {
        matches!(self, Self::EncodingCorrupt | Self::LikelyPerson | Self::Ambiguous)
    }
}

impl fmt::Display for NameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pollution => write!(f, "POLLUTION"),
            Self::FragmentOrMeta => write!(f, "FRAGMENT_OR_META"),
            Self::NonPersonEntity => write!(f, "NON_PERSON_ENTITY"),
            Self::EncodingCorrupt => write!(f, "ENCODING_CORRUPT_PERSON"),
            Self::LikelyPerson => write!(f, "LIKELY_PERSON"),
            Self::Ambiguous => write!(f, "AMBIGUOUS"),
        }
    }
}

/// A named heuristic.
#[derive(Clone, Copy)]
pub struct TriageRule {
    pub tag: &'static str,
    pub class: NameClass,
    predicate: fn(&str) -> bool,
}

impl TriageRule {
    #[must_use]
    pub const fn new(tag: &'static str, class: NameClass, predicate: fn(&str) -> bool) -> Self {
        Self {
            tag,
            class,
            predicate,
        }
    }

    /// Evaluates the predicate against a whitespace-collapsed name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        (self.predicate)(name)
    }
}

impl fmt::Debug for TriageRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageRule")
            .field("tag", &self.tag)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Outcome of triaging one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triage {
    pub class: NameClass,
    /// Tag of the winning rule (`no_rule_match` when none matched).
    pub tag: &'static str,
    /// Every matching tag, in priority order.
    pub matched: Vec<&'static str>,
}

impl Triage {
    #[must_use]
    pub fn is_polluted(&self) -> bool {
        self.class == NameClass::Pollution
    }
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct TriageRules {
    rules: Vec<TriageRule>,
}

impl Default for TriageRules {
    fn default() -> Self {
        Self {
            rules: vec![
                TriageRule::new("empty_or_placeholder", NameClass::Pollution, |n| {
                    n.is_empty() || PLACEHOLDERS.contains(&n.to_lowercase().as_str())
                }),
                TriageRule::new("pollution_token", NameClass::Pollution, |n| {
                    POLLUTION_TOKEN_RE.is_match(&format!(" {n} "))
                }),
                TriageRule::new("ordinal_placement", NameClass::Pollution, |n| {
                    ORDINAL_RE.is_match(n)
                }),
                TriageRule::new("control_characters", NameClass::Pollution, |n| {
                    CONTROL_RE.is_match(n)
                }),
                TriageRule::new("heading_or_narrative", NameClass::FragmentOrMeta, |n| {
                    META_RE.is_match(n) || n.split(' ').count() >= 6
                }),
                TriageRule::new("club_or_org", NameClass::NonPersonEntity, |n| {
                    CLUB_RE.is_match(n)
                }),
                TriageRule::new("dangling_paren_tail", NameClass::FragmentOrMeta, |n| {
                    n.ends_with(')') && !n.contains('(')
                }),
                TriageRule::new("location_fragment", NameClass::FragmentOrMeta, |n| {
                    LOCATION_RE.is_match(n) && (n.contains(')') || n.contains('-'))
                }),
                TriageRule::new("encoding_corruption", NameClass::EncodingCorrupt, |n| {
                    MOJIBAKE_RE.is_match(n) || QMARK_IN_WORD_RE.is_match(n)
                }),
                TriageRule::new("multi_person_blob", NameClass::FragmentOrMeta, |n| {
                    MULTI_PERSON_RE.is_match(n)
                }),
                TriageRule::new("personish_shape", NameClass::LikelyPerson, personish_shape),
            ],
        }
    }
}

impl TriageRules {
    /// Builds a table from an explicit rule list.
    #[must_use]
    pub fn new(rules: Vec<TriageRule>) -> Self {
        Self { rules }
    }

    /// The rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[TriageRule] {
        &self.rules
    }

    /// Classifies a raw name.
    #[must_use]
    pub fn classify(&self, raw: &str) -> Triage {
        let name = collapse_whitespace(raw);
        let matched: Vec<&'static str> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(&name))
            .map(|rule| rule.tag)
            .collect();

        let winner = self.rules.iter().find(|rule| rule.matches(&name));
        match winner {
            Some(rule) => Triage {
                class: rule.class,
                tag: rule.tag,
                matched,
            },
            None => Triage {
                class: NameClass::Ambiguous,
                tag: "no_rule_match",
                matched,
            },
        }
    }

    /// True when the name must not take part in clustering.
    #[must_use]
    pub fn is_polluted(&self, raw: &str) -> bool {
        self.classify(raw).is_polluted()
    }
}

fn personish_shape(name: &str) -> bool {
    let tokens: Vec<&str> = name.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() || tokens.len() > 4 {
        return false;
    }
    let has_lower = name.chars().any(char::is_lowercase);
    if !has_lower {
        return false;
    }
    let ok = tokens.iter().filter(|t| PERSON_TOKEN_RE.is_match(t)).count();
    // ok / len >= 0.75 without floating point
    ok * 4 >= tokens.len() * 3
}
