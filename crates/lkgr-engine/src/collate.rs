//! Joining raw build reports with resolved positions.
//!
//! Produces per-builder, position-sorted timelines plus the single global
//! list of distinct positions, sorted newest-first — the scan order the
//! candidate finder consumes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::error::Result;
use crate::model::{BuildReport, BuilderTimeline, RevisionPosition};
use crate::oracle::RevisionOracle;

/// Collated view of one run's evidence.
#[derive(Debug, Clone, Default)]
pub struct Collation {
    /// Ascending, deduplicated timeline per builder.
    pub timelines: BTreeMap<String, BuilderTimeline>,
    /// Union of all observed positions, newest first.
    pub positions_desc: Vec<RevisionPosition>,
    /// Position back to its original revision identifier.
    pub revisions: HashMap<RevisionPosition, String>,
}

impl Collation {
    /// Total number of observations across all timelines.
    pub fn report_count(&self) -> usize {
        self.timelines.values().map(BuilderTimeline::len).sum()
    }
}

/// Resolve and group build reports into a [`Collation`].
///
/// A report whose revision the oracle cannot resolve is dropped with a
/// warning. It is never promoted to an `Unknown` observation: dropping is
/// equivalent to "this builder never reported at this point", which is the
/// conservative choice and cannot corrupt the candidate scan.
pub fn collate(
    builds: &BTreeMap<String, Vec<BuildReport>>,
    oracle: &mut RevisionOracle,
) -> Result<Collation> {
    let mut timelines: BTreeMap<String, BuilderTimeline> = BTreeMap::new();
    let mut positions: BTreeSet<RevisionPosition> = BTreeSet::new();
    let mut revisions: HashMap<RevisionPosition, String> = HashMap::new();

    for (builder, reports) in builds {
        let timeline = timelines.entry(builder.clone()).or_default();
        // Fetch order is preserved, so a duplicate position later in the
        // list overwrites the earlier one (last-fetched wins).
        for report in reports {
            let position = match oracle.resolve(&report.revision) {
                Ok(position) => position,
                Err(e) => {
                    warn!(
                        builder = %builder,
                        revision = %report.revision,
                        error = %e,
                        "dropping report with unresolvable revision"
                    );
                    continue;
                }
            };
            timeline.insert(position, report.status);
            positions.insert(position);
            revisions.insert(position, report.revision.clone());
        }
    }

    let positions_desc: Vec<RevisionPosition> = positions.into_iter().rev().collect();

    Ok(Collation {
        timelines,
        positions_desc,
        revisions,
    })
}
