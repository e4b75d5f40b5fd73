//! Staleness classification for the published LKGR.
//!
//! Pure comparison of a freshly found candidate against the currently
//! published revision: either the candidate advances the LKGR, or the gap
//! (revision count) and lag (wall-clock age) of the published one are
//! checked against the deployment's thresholds.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LkgrError, Result};
use crate::model::Candidate;
use crate::oracle::RevisionOracle;

/// Per-deployment staleness thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct StalenessThresholds {
    /// Maximum tolerated revision count between the published LKGR and head.
    pub allowed_gap: u64,
    /// Baseline tolerated age of the published LKGR.
    pub allowed_lag: Duration,
    /// Scale factor for the velocity-adjusted lag allowance.
    pub lag_rate_scale: f64,
}

impl StalenessThresholds {
    pub fn new(allowed_gap: u64, allowed_lag: Duration) -> Self {
        Self {
            allowed_gap,
            allowed_lag,
            lag_rate_scale: 2.0,
        }
    }
}

/// Why an alert was raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertReason {
    /// More revisions have landed since the published LKGR than allowed.
    GapExceeded { gap: u64, allowed: u64 },
    /// The published LKGR is older than the velocity-adjusted allowance.
    LagExceeded {
        lag_hours: f64,
        allowed_hours: f64,
    },
}

/// Outcome of one health evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// A newer trusted revision was found; publish it.
    Publish { candidate: Candidate },
    /// Nothing to do; the published LKGR remains valid.
    Hold,
    /// The published LKGR has fallen dangerously out of date.
    Alert { reason: AlertReason },
}

/// Classify a run's outcome against the published LKGR.
///
/// `current_lkgr` is the persisted published revision, `head` the tip of the
/// tracked branch. A candidate strictly newer than the current LKGR (or any
/// candidate under `force`) yields `Publish`; otherwise the gap and lag of
/// the current LKGR decide between `Hold` and `Alert`. The gap boundary is
/// inclusive: `gap == allowed_gap` still holds.
pub fn evaluate(
    candidate: Option<&Candidate>,
    current_lkgr: &str,
    head: &str,
    oracle: &mut RevisionOracle,
    thresholds: &StalenessThresholds,
    force: bool,
) -> Result<Decision> {
    if !oracle.check_valid(current_lkgr) {
        return Err(LkgrError::InvalidBaseline {
            revision: current_lkgr.to_string(),
        });
    }
    let current_position = oracle.resolve(current_lkgr)?;

    if let Some(candidate) = candidate {
        if force || candidate.position > current_position {
            return Ok(Decision::Publish {
                candidate: candidate.clone(),
            });
        }
        debug!(
            candidate = %candidate.position,
            current = %current_position,
            "candidate does not advance the published LKGR"
        );
    }

    let gap = oracle.gap(head, current_lkgr)?;
    if gap > thresholds.allowed_gap {
        return Ok(Decision::Alert {
            reason: AlertReason::GapExceeded {
                gap,
                allowed: thresholds.allowed_gap,
            },
        });
    }

    // The allowed lag grows when commit velocity is low: with few commits
    // landed, an old LKGR is not evidence of breakage. rate is revisions
    // per hour since the published LKGR. A zero gap holds without the lag
    // query at all, which also keeps override-pinned baselines usable.
    if gap > 0 {
        let lag = oracle.lag(current_lkgr)?;
        let lag_hours = lag.num_minutes() as f64 / 60.0;
        let allowed_hours = thresholds.allowed_lag.num_minutes() as f64 / 60.0;

        if lag_hours <= 0.0 {
            return Ok(Decision::Hold);
        }
        let rate = gap as f64 / lag_hours;
        let effective = allowed_hours.max(allowed_hours * thresholds.lag_rate_scale / rate);
        if lag_hours > effective {
            return Ok(Decision::Alert {
                reason: AlertReason::LagExceeded {
                    lag_hours,
                    allowed_hours: effective,
                },
            });
        }
    }

    Ok(Decision::Hold)
}
