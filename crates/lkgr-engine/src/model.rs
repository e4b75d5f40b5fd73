//! Core data model for LKGR resolution.
//!
//! Everything here is immutable after construction: the whole pipeline is a
//! single-pass, read-only-after-build dataflow per run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single build as reported by a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// The build passed.
    Success,
    /// The build failed.
    Failure,
    /// The builder reported something unrecognized (in progress, cancelled,
    /// exception). Carries no evidence either way.
    Unknown,
}

impl BuildStatus {
    /// Normalize a raw result string from a build-status API.
    ///
    /// Unrecognized values map to [`BuildStatus::Unknown`] rather than being
    /// rejected, so a new status kind on the wire cannot abort a run.
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "SUCCESS" | "PASSED" | "OK" => Self::Success,
            "FAILURE" | "FAILED" => Self::Failure,
            _ => Self::Unknown,
        }
    }
}

/// One normalized build result: a builder's verdict on one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Name of the builder that produced this result.
    pub builder: String,
    /// VCS revision identifier the build ran against.
    pub revision: String,
    /// Pass/fail verdict.
    pub status: BuildStatus,
    /// When the build completed.
    pub completed_at: DateTime<Utc>,
}

/// Integer total-order surrogate for a revision identifier.
///
/// Monotonically increasing with commit recency: `position(a) < position(b)`
/// implies `a` is an ancestor of `b` on the tracked branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RevisionPosition(pub u64);

impl fmt::Display for RevisionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One configured builder to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderSpec {
    /// Builder name, unique within a deployment.
    pub name: String,
    /// Base URL of the builder's build-status endpoint.
    pub url: String,
}

impl BuilderSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Per-builder, position-sorted build history.
///
/// Strictly ascending by position and deduplicated: inserting a report at an
/// already-present position replaces the earlier entry (last-fetched wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderTimeline {
    entries: Vec<(RevisionPosition, BuildStatus)>,
}

impl BuilderTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an observation, keeping entries sorted and deduplicated.
    pub fn insert(&mut self, position: RevisionPosition, status: BuildStatus) {
        match self.entries.binary_search_by_key(&position, |(p, _)| *p) {
            Ok(idx) => self.entries[idx].1 = status,
            Err(idx) => self.entries.insert(idx, (position, status)),
        }
    }

    /// Status observed at `position`, if any.
    pub fn status_at(&self, position: RevisionPosition) -> Option<BuildStatus> {
        self.entries
            .binary_search_by_key(&position, |(p, _)| *p)
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    /// Ascending `(position, status)` entries.
    pub fn entries(&self) -> &[(RevisionPosition, BuildStatus)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A provisional LKGR: the newest position satisfying the double-green
/// invariant for every reporting builder, plus its VCS identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Commit position of the candidate revision.
    pub position: RevisionPosition,
    /// Original VCS revision identifier.
    pub revision: String,
}
