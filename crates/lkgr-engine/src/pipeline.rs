//! End-to-end LKGR resolution runs.
//!
//! One run fetches evidence from every builder, collates it against the
//! revision oracle, scans for the newest trusted candidate, classifies it
//! against the published LKGR, and acts on the decision through the
//! configured [`Publisher`].

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::candidate::{find_candidate, GreenPolicy};
use crate::collate::collate;
use crate::error::Result;
use crate::health::{evaluate, Decision, StalenessThresholds};
use crate::model::BuilderSpec;
use crate::oracle::RevisionOracle;
use crate::publish::Publisher;
use crate::source::BuildDataSource;

/// Result of one complete resolution run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Unique ID for this run, for log correlation.
    pub run_id: String,

    /// What the run decided.
    pub decision: Decision,

    /// Number of build observations that survived collation.
    pub report_count: usize,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunOutcome {
    /// Whether the run published a new LKGR.
    pub fn published(&self) -> bool {
        matches!(self.decision, Decision::Publish { .. })
    }
}

/// LKGR resolution orchestrator.
pub struct LkgrPipeline {
    source: BuildDataSource,
    publisher: Arc<dyn Publisher>,
    builders: Vec<BuilderSpec>,
    policy: GreenPolicy,
    thresholds: StalenessThresholds,
    dry_run: bool,
}

impl LkgrPipeline {
    pub fn new(
        source: BuildDataSource,
        publisher: Arc<dyn Publisher>,
        builders: Vec<BuilderSpec>,
        policy: GreenPolicy,
        thresholds: StalenessThresholds,
    ) -> Self {
        Self {
            source,
            publisher,
            builders,
            policy,
            thresholds,
            dry_run: false,
        }
    }

    /// Report decisions without writing the LKGR file or raising alerts.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute one resolution run.
    ///
    /// Aborts with no side effects if any builder fetch fails: a decision
    /// made on partial evidence is worse than no decision. `force`
    /// republishes the found candidate even when it does not advance the
    /// current LKGR.
    pub async fn run(
        &self,
        oracle: &mut RevisionOracle,
        current_lkgr: &str,
        head: &str,
        force: bool,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            builders = self.builders.len(),
            current_lkgr = %current_lkgr,
            "starting LKGR resolution run"
        );

        let builds = self.source.fetch_all(&self.builders).await?;
        let collation = collate(&builds, oracle)?;
        let report_count = collation.report_count();
        info!(run_id = %run_id, report_count, "collated build evidence");

        let candidate = find_candidate(&collation, self.policy);
        let decision = evaluate(
            candidate.as_ref(),
            current_lkgr,
            head,
            oracle,
            &self.thresholds,
            force,
        )?;

        if self.dry_run {
            info!(run_id = %run_id, ?decision, "dry run, skipping side effects");
        } else {
            match &decision {
                Decision::Publish { candidate } => self.publisher.publish(candidate).await?,
                Decision::Alert { reason } => self.publisher.alert(reason).await?,
                Decision::Hold => {
                    info!(run_id = %run_id, "holding: published LKGR remains valid");
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(run_id = %run_id, duration_ms, "resolution run finished");

        Ok(RunOutcome {
            run_id,
            decision,
            report_count,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::AlertReason;
    use crate::model::{Candidate, RevisionPosition};

    #[test]
    fn test_outcome_published_flag() {
        let published = RunOutcome {
            run_id: "r1".to_string(),
            decision: Decision::Publish {
                candidate: Candidate {
                    position: RevisionPosition(10),
                    revision: "abc".to_string(),
                },
            },
            report_count: 4,
            duration_ms: 12,
        };
        assert!(published.published());

        let held = RunOutcome {
            run_id: "r2".to_string(),
            decision: Decision::Hold,
            report_count: 4,
            duration_ms: 12,
        };
        assert!(!held.published());
    }

    #[test]
    fn test_outcome_serializes_decision_tag() {
        let outcome = RunOutcome {
            run_id: "r1".to_string(),
            decision: Decision::Alert {
                reason: AlertReason::GapExceeded {
                    gap: 51,
                    allowed: 50,
                },
            },
            report_count: 0,
            duration_ms: 3,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["decision"]["decision"], "alert");
        assert_eq!(json["report_count"], 0);
    }
}
