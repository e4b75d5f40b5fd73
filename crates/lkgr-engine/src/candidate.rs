//! The backward candidate scan.
//!
//! A position is an acceptable LKGR candidate only when every builder with
//! usable evidence is proven green across a window that brackets it: a
//! success observation at or above the position and one at or below it,
//! with no failure observation between the pair. A builder that has ever
//! failed is never trusted on a single green alone; it must produce two
//! bracketing successes uninterrupted by another failure.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collate::Collation;
use crate::model::{BuildStatus, BuilderTimeline, Candidate, RevisionPosition};

/// How much green evidence satisfies a builder at a scan position.
///
/// The historical tool's exact rule for a builder whose only datum is a
/// single green at the candidate position itself could not be confirmed,
/// so the rule is a policy knob rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreenPolicy {
    /// Two bracketing successes required; a single success exactly at the
    /// scan position stands in for both, but only for a builder with no
    /// failure on record. The default.
    DoubleGreen,
    /// Two distinct bracketing successes always required.
    StrictDoubleGreen,
    /// The nearest observation at or above the scan position being a
    /// success suffices; no lower bracket needed.
    SingleGreen,
}

impl Default for GreenPolicy {
    fn default() -> Self {
        Self::DoubleGreen
    }
}

/// One builder's usable evidence, split by verdict and sorted by position.
/// `Unknown` observations carry no evidence and are excluded up front.
#[derive(Debug, Clone)]
struct BuilderEvidence {
    successes: Vec<RevisionPosition>,
    failures: Vec<RevisionPosition>,
}

impl BuilderEvidence {
    fn from_timeline(timeline: &BuilderTimeline) -> Self {
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for &(position, status) in timeline.entries() {
            match status {
                BuildStatus::Success => successes.push(position),
                BuildStatus::Failure => failures.push(position),
                BuildStatus::Unknown => {}
            }
        }
        Self {
            successes,
            failures,
        }
    }

    fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }

    /// Smallest success at or above `at`, if any.
    fn success_at_or_above(&self, at: RevisionPosition) -> Option<RevisionPosition> {
        let idx = self.successes.partition_point(|&p| p < at);
        self.successes.get(idx).copied()
    }

    /// Largest success at or below `at`, if any.
    fn success_at_or_below(&self, at: RevisionPosition) -> Option<RevisionPosition> {
        let idx = self.successes.partition_point(|&p| p <= at);
        idx.checked_sub(1).and_then(|i| self.successes.get(i)).copied()
    }

    /// Whether a failure lies strictly between `lo` and `hi`.
    fn failure_between(&self, lo: RevisionPosition, hi: RevisionPosition) -> bool {
        let idx = self.failures.partition_point(|&p| p <= lo);
        self.failures.get(idx).is_some_and(|&f| f < hi)
    }

    /// Nearest non-unknown observation at or above `at` is a success.
    fn carried_green(&self, at: RevisionPosition) -> bool {
        match (
            self.success_at_or_above(at),
            self.failures
                .get(self.failures.partition_point(|&p| p < at))
                .copied(),
        ) {
            (Some(s), Some(f)) => s < f,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Whether the evidence proves this builder green at `at` under `policy`.
    fn satisfied_at(&self, at: RevisionPosition, policy: GreenPolicy) -> bool {
        if policy == GreenPolicy::SingleGreen {
            return self.carried_green(at);
        }

        let Some(up) = self.success_at_or_above(at) else {
            return false;
        };
        let Some(down) = self.success_at_or_below(at) else {
            return false;
        };

        if up != down {
            return !self.failure_between(down, up);
        }

        // Single success exactly at `at`. Look for a distinct partner on
        // either side to complete the bracket.
        let above_idx = self.successes.partition_point(|&p| p <= at);
        if let Some(&partner) = self.successes.get(above_idx) {
            if !self.failure_between(at, partner) {
                return true;
            }
        }
        let below_idx = self.successes.partition_point(|&p| p < at);
        if let Some(&partner) = below_idx
            .checked_sub(1)
            .and_then(|i| self.successes.get(i))
        {
            if !self.failure_between(partner, at) {
                return true;
            }
        }

        // No partner. A lone green at the position is accepted only under
        // the default policy, and only for a builder that has never failed.
        policy == GreenPolicy::DoubleGreen && self.failures.is_empty()
    }
}

/// Scan the collated evidence for the newest acceptable candidate.
///
/// Walks `positions_desc` newest to oldest and returns the first position
/// every evidence-bearing builder is satisfied at. Builders with zero
/// non-unknown observations never block a candidate. Returns `None` when
/// the scan exhausts all positions; the caller must leave the published
/// LKGR untouched in that case.
pub fn find_candidate(collation: &Collation, policy: GreenPolicy) -> Option<Candidate> {
    let evidence: Vec<(&str, BuilderEvidence)> = collation
        .timelines
        .iter()
        .map(|(name, timeline)| (name.as_str(), BuilderEvidence::from_timeline(timeline)))
        .filter(|(_, e)| !e.is_empty())
        .collect();

    if evidence.is_empty() {
        return None;
    }

    for &position in &collation.positions_desc {
        let all_satisfied = evidence
            .iter()
            .all(|(_, e)| e.satisfied_at(position, policy));
        if all_satisfied {
            let revision = collation.revisions.get(&position)?.clone();
            debug!(position = %position, revision = %revision, "candidate found");
            return Some(Candidate { position, revision });
        }
    }

    debug!("scan exhausted without a candidate");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, HashMap};

    use BuildStatus::{Failure, Success, Unknown};

    /// Build a Collation directly from (builder, position, status) triples,
    /// with revision ids synthesized as `r<position>`.
    fn collation(entries: &[(&str, u64, BuildStatus)]) -> Collation {
        let mut timelines: BTreeMap<String, BuilderTimeline> = BTreeMap::new();
        let mut positions: BTreeSet<RevisionPosition> = BTreeSet::new();
        let mut revisions = HashMap::new();
        for (builder, position, status) in entries {
            let position = RevisionPosition(*position);
            timelines
                .entry(builder.to_string())
                .or_default()
                .insert(position, *status);
            positions.insert(position);
            revisions.insert(position, format!("r{}", position.0));
        }
        Collation {
            timelines,
            positions_desc: positions.into_iter().rev().collect(),
            revisions,
        }
    }

    fn find(entries: &[(&str, u64, BuildStatus)], policy: GreenPolicy) -> Option<Candidate> {
        find_candidate(&collation(entries), policy)
    }

    #[test]
    fn test_textbook_example_returns_12352() {
        // builder1 green at 12345 and 12357, builder2 green only at 12352,
        // builder3 green at 12349 and 12355, no failures in the window.
        let candidate = find(
            &[
                ("builder1", 12345, Success),
                ("builder1", 12357, Success),
                ("builder2", 12352, Success),
                ("builder3", 12349, Success),
                ("builder3", 12355, Success),
            ],
            GreenPolicy::DoubleGreen,
        )
        .expect("candidate expected");

        assert_eq!(candidate.position, RevisionPosition(12352));
        assert_eq!(candidate.revision, "r12352");
    }

    #[test]
    fn test_single_green_above_the_scan_boundary_is_insufficient() {
        // "lonely" has exactly one success and it sits above every position
        // the other builders could corroborate; once the scan boundary moves
        // below it, a second reported run is mandatory.
        let result = find(
            &[
                ("b1", 10, Success),
                ("b1", 20, Success),
                ("lonely", 25, Success),
            ],
            GreenPolicy::DoubleGreen,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn test_strict_policy_rejects_lone_green_at_candidate() {
        // The textbook layout, but under the tightened rule builder2's
        // single green at 12352 no longer stands in for both brackets.
        let result = find(
            &[
                ("builder1", 12345, Success),
                ("builder1", 12357, Success),
                ("builder2", 12352, Success),
                ("builder3", 12349, Success),
                ("builder3", 12355, Success),
            ],
            GreenPolicy::StrictDoubleGreen,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn test_failed_builder_is_never_trusted_on_one_green() {
        // b1 failed at 20 and has a single green below it. One fresh green
        // under a failure is not enough, anywhere.
        let result = find(
            &[
                ("b1", 20, Failure),
                ("b1", 10, Success),
                ("b2", 15, Success),
                ("b2", 5, Success),
            ],
            GreenPolicy::DoubleGreen,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn test_two_fresh_greens_below_a_failure_recover() {
        let candidate = find(
            &[
                ("b1", 20, Failure),
                ("b1", 10, Success),
                ("b1", 5, Success),
                ("b2", 15, Success),
                ("b2", 3, Success),
            ],
            GreenPolicy::DoubleGreen,
        )
        .expect("candidate expected");

        // b1 is trusted only on [5, 10], well below its failure.
        assert_eq!(candidate.position, RevisionPosition(10));
    }

    #[test]
    fn test_interior_failure_is_never_forgotten() {
        // b1 fails at 25 with only one success above it; no candidate at or
        // above 25 may be returned. Its clean pair (15, 20) sits below.
        let candidate = find(
            &[
                ("b1", 30, Success),
                ("b1", 25, Failure),
                ("b1", 20, Success),
                ("b1", 15, Success),
                ("b2", 30, Success),
                ("b2", 14, Success),
            ],
            GreenPolicy::DoubleGreen,
        )
        .expect("candidate expected");

        assert!(
            candidate.position < RevisionPosition(25),
            "candidate {} must sit below the failure at #25",
            candidate.position
        );
        assert_eq!(candidate.position, RevisionPosition(20));
    }

    #[test]
    fn test_unknown_observations_carry_no_evidence() {
        // The unknown at 30 neither breaks b1's bracket nor counts as green.
        let candidate = find(
            &[
                ("b1", 40, Success),
                ("b1", 30, Unknown),
                ("b1", 20, Success),
                ("b2", 35, Success),
                ("b2", 25, Success),
            ],
            GreenPolicy::DoubleGreen,
        )
        .expect("candidate expected");

        assert_eq!(candidate.position, RevisionPosition(35));
    }

    #[test]
    fn test_builder_with_no_reports_does_not_block() {
        let mut collation = collation(&[("b1", 20, Success), ("b1", 10, Success)]);
        collation
            .timelines
            .insert("silent".to_string(), BuilderTimeline::new());

        let candidate = find_candidate(&collation, GreenPolicy::DoubleGreen)
            .expect("candidate expected");
        assert_eq!(candidate.position, RevisionPosition(20));
    }

    #[test]
    fn test_builder_with_only_unknown_reports_does_not_block() {
        let candidate = find(
            &[
                ("b1", 20, Success),
                ("b1", 10, Success),
                ("flaky", 15, Unknown),
            ],
            GreenPolicy::DoubleGreen,
        )
        .expect("candidate expected");
        assert_eq!(candidate.position, RevisionPosition(20));
    }

    #[test]
    fn test_empty_evidence_yields_no_candidate() {
        assert_eq!(find(&[], GreenPolicy::DoubleGreen), None);
    }

    #[test]
    fn test_find_candidate_is_idempotent() {
        let collation = collation(&[
            ("b1", 12, Success),
            ("b1", 8, Success),
            ("b2", 10, Success),
            ("b2", 6, Success),
        ]);

        let first = find_candidate(&collation, GreenPolicy::DoubleGreen);
        let second = find_candidate(&collation, GreenPolicy::DoubleGreen);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().position, RevisionPosition(10));
    }

    #[test]
    fn test_single_green_policy_needs_no_lower_bracket() {
        let candidate = find(
            &[("b1", 40, Success), ("b2", 38, Success)],
            GreenPolicy::SingleGreen,
        )
        .expect("candidate expected");
        assert_eq!(candidate.position, RevisionPosition(38));

        // The default policy has nothing bracketing 38 from below for b1.
        assert_eq!(
            find(
                &[("b1", 40, Success), ("b2", 38, Success)],
                GreenPolicy::DoubleGreen,
            ),
            None
        );
    }

    #[test]
    fn test_single_green_policy_still_blocks_on_carried_failure() {
        // Nearest observation above 35 is b1's failure at 40; the green at
        // 30 only starts covering from 30 down.
        let candidate = find(
            &[
                ("b1", 40, Failure),
                ("b1", 30, Success),
                ("b2", 35, Success),
                ("b2", 30, Success),
            ],
            GreenPolicy::SingleGreen,
        )
        .expect("candidate expected");
        assert_eq!(candidate.position, RevisionPosition(30));
    }

    #[test]
    fn test_positions_above_every_bracket_are_rejected() {
        // 12357 and 12355 have no builder2 evidence at or above them from
        // one side; only 12352 is bracketed by all three builders.
        let collation = collation(&[
            ("builder1", 12345, Success),
            ("builder1", 12357, Success),
            ("builder2", 12352, Success),
            ("builder3", 12349, Success),
            ("builder3", 12355, Success),
        ]);
        let candidate = find_candidate(&collation, GreenPolicy::DoubleGreen).unwrap();
        assert_ne!(candidate.position, RevisionPosition(12357));
        assert_ne!(candidate.position, RevisionPosition(12355));
    }
}
