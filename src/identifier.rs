//! Person identifiers and deterministic identifier assignment.
//!
//! A person identifier is a UUID. Identifiers minted by this crate are
//! version-5 (name-based) UUIDs over a fixed namespace and a tag-prefixed key,
//! so the same key always yields the same identifier with no lookup table.
//! Distinct tags keep identically-spelled names minted for different purposes
//! from colliding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for stub identities minted at the review gates (RFC 4122 URL namespace).
pub const STUB_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// Namespace for proposed identities in suggestion artifacts.
pub const SUGGESTION_NAMESPACE: Uuid = Uuid::from_u128(0x2f9f_3b6e_1d4a_4f8f_8b1f_7f7e_2d4f_2c11);

/// Globally unique, stable person identifier.
///
/// # Examples
///
/// ```
/// use person_identity::identifier::{IdTag, PersonId};
///
/// let a = PersonId::derive(IdTag::StubUnmapped, "François D.");
/// let b = PersonId::derive(IdTag::StubUnmapped, "François D.");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(Uuid);

impl PersonId {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Mints the identifier for `key` under the namespace and prefix of `tag`.
    #[must_use]
    pub fn derive(tag: IdTag, key: &str) -> Self {
        let mut name = String::with_capacity(tag.prefix().len() + key.len());
        name.push_str(tag.prefix());
        name.push_str(key);
        assign(&name, tag.namespace())
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PersonId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for PersonId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Call-site tag for minted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdTag {
    /// Stub for an unmapped name resolved without a known person.
    StubUnmapped,
    /// Stub for a name produced by splitting a quarantined identity.
    StubQuarantineSplit,
    /// Proposal for an exact-key cluster with no existing identity.
    AutoCluster,
    /// Proposal for a fuzzy ("questionable") cluster.
    QuestionableCluster,
}

impl IdTag {
    /// Text prepended to the key before hashing.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::StubUnmapped => "stub:unmapped:",
            Self::StubQuarantineSplit => "stub:quarantine_split:",
            Self::AutoCluster => "AUTO:",
            Self::QuestionableCluster => "Q:",
        }
    }

    /// Namespace the tag hashes under.
    #[must_use]
    pub const fn namespace(self) -> Uuid {
        match self {
            Self::StubUnmapped | Self::StubQuarantineSplit => STUB_NAMESPACE,
            Self::AutoCluster | Self::QuestionableCluster => SUGGESTION_NAMESPACE,
        }
    }

    /// Tags whose identifiers denote stub identities.
    pub const STUBS: [Self; 2] = [Self::StubUnmapped, Self::StubQuarantineSplit];
}

/// Name-based (v5) identifier over `namespace` and an already tag-prefixed key.
#[must_use]
pub fn assign(key: &str, namespace: Uuid) -> PersonId {
    PersonId(Uuid::new_v5(&namespace, key.as_bytes()))
}
