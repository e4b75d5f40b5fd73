//! Publishing the resolved LKGR and raising staleness alerts.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{error, info};

use crate::error::Result;
use crate::health::AlertReason;
use crate::model::Candidate;

/// Sink for run outcomes.
///
/// Implement this to route publishes and alerts somewhere real — a ref
/// update, a dashboard, a pager. The engine calls at most one of the two
/// methods per run.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Persist `candidate` as the new LKGR.
    async fn publish(&self, candidate: &Candidate) -> Result<()>;

    /// Raise a staleness alert for the currently published LKGR.
    async fn alert(&self, reason: &AlertReason) -> Result<()>;
}

/// [`Publisher`] that writes the LKGR revision to a flat file.
///
/// The file holds exactly the revision identifier plus a trailing newline,
/// so shell consumers can `$(cat ...)` it. Alerts are surfaced through the
/// log stream only.
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    async fn publish(&self, candidate: &Candidate) -> Result<()> {
        let contents = format!("{}\n", candidate.revision);
        tokio::fs::write(&self.path, contents).await?;
        info!(
            revision = %candidate.revision,
            position = %candidate.position,
            path = %self.path.display(),
            "published new LKGR"
        );
        Ok(())
    }

    async fn alert(&self, reason: &AlertReason) -> Result<()> {
        match reason {
            AlertReason::GapExceeded { gap, allowed } => {
                error!(gap, allowed, "LKGR is stale: revision gap over threshold");
            }
            AlertReason::LagExceeded {
                lag_hours,
                allowed_hours,
            } => {
                error!(
                    lag_hours,
                    allowed_hours, "LKGR is stale: age over velocity-adjusted allowance"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RevisionPosition;

    #[tokio::test]
    async fn test_file_publisher_writes_revision_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LKGR");
        let publisher = FilePublisher::new(&path);

        publisher
            .publish(&Candidate {
                position: RevisionPosition(42),
                revision: "abc123".to_string(),
            })
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "abc123\n");
    }

    #[tokio::test]
    async fn test_file_publisher_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LKGR");
        let publisher = FilePublisher::new(&path);

        for revision in ["aaa", "bbb"] {
            publisher
                .publish(&Candidate {
                    position: RevisionPosition(1),
                    revision: revision.to_string(),
                })
                .await
                .unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "bbb\n");
    }

    #[tokio::test]
    async fn test_alert_does_not_touch_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LKGR");
        let publisher = FilePublisher::new(&path);

        publisher
            .alert(&AlertReason::GapExceeded {
                gap: 60,
                allowed: 50,
            })
            .await
            .unwrap();

        assert!(!path.exists());
    }
}
