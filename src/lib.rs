//! # person-identity - identity resolution for competitor names
//!
//! Tournament result archives spell the same competitor many ways:
//! diacritics dropped, first names abbreviated, surnames truncated, typos.
//! This crate decides which raw name strings denote the same person, assigns
//! each confirmed person a stable identifier, and never silently merges two
//! different humans.
//!
//! ## Core Concepts
//!
//! - **Observation**: one raw name seen in one placement of one event division
//! - **Alias ledger**: the append-only mapping alias → person id → canonical name
//! - **Review artifact**: a CSV of machine suggestions with a blank decision column
//! - **Co-occurrence veto**: two names seen competing in the same event
//!   division are never proposed as the same person
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chrono::Utc;
//! use person_identity::{generate, apply, ArtifactKind, RunContext, RunPaths};
//!
//! let ctx = RunContext::load(RunPaths::under("data".as_ref()))?;
//! let summary = generate(&ctx, ArtifactKind::Bootstrap)?;
//! // ... a reviewer fills in the decision column ...
//! let applied = apply(&ctx, ArtifactKind::Bootstrap, Utc::now())?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Names and identifiers
pub mod error;
pub mod identifier;
pub mod normalize;
pub mod triage;

// Inputs
pub mod config;
pub mod context;
pub mod observation;
pub mod overrides;
pub mod table;

// Analysis
pub mod aggregate;
pub mod cluster;
pub mod evidence;
pub mod scoring;

// Ledger and review gates
pub mod apply;
pub mod ledger;
pub mod pipeline;
pub mod review;

pub use apply::{ApplySummary, Decision};
pub use cluster::{CandidateCluster, ClusterContext, ClusterMember};
pub use config::ResolverConfig;
pub use context::{RunContext, RunPaths};
pub use error::{IdentityError, IdentityResult, RowIssue, RowIssueKind};
pub use identifier::{IdTag, PersonId};
pub use ledger::{AliasLedger, AliasRecord, AliasStatus, PersonIdentity, PersonStatus};
pub use normalize::{match_key, normalize};
pub use observation::RawNameObservation;
pub use pipeline::{apply, generate, init_ledger, status, ArtifactKind, GenerateSummary, LedgerStatus};
pub use review::QuarantineEntry;
