//! Revision-to-position resolution over a read-only VCS log.
//!
//! [`RevisionOracle`] maps revision identifiers to their monotonic commit
//! positions, caching every lookup for the process lifetime. The underlying
//! log query lives behind the [`RevisionLog`] trait so tests can inject a
//! fixed-map stub and deployments can swap the VCS backend.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Command;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use crate::error::{LkgrError, Result};
use crate::model::RevisionPosition;

/// Position and commit time of one revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    pub position: RevisionPosition,
    pub committed_at: DateTime<Utc>,
}

/// Read-only VCS log query.
pub trait RevisionLog: Send {
    /// Position and commit time for `revision`, or `None` when the revision
    /// exists but carries no resolvable position counter.
    fn lookup(&self, revision: &str) -> Result<Option<CommitInfo>>;

    /// Count of revisions between `from` (exclusive) and `head` (inclusive)
    /// on the tracked branch.
    fn count_between(&self, from: &str, head: &str) -> Result<u64>;

    /// Whether `revision` exists in the tracked history.
    fn exists(&self, revision: &str) -> Result<bool>;
}

/// Caching resolver over a [`RevisionLog`].
///
/// Constructed once per run and passed by reference to collaborators; the
/// cache is plain interior state, not a process-wide global.
pub struct RevisionOracle {
    log: Box<dyn RevisionLog>,
    cache: HashMap<String, CommitInfo>,
    overridden: HashSet<String>,
}

impl RevisionOracle {
    pub fn new(log: Box<dyn RevisionLog>) -> Self {
        Self {
            log,
            cache: HashMap::new(),
            overridden: HashSet::new(),
        }
    }

    /// Pre-seed the cache with static revision → position overrides.
    ///
    /// Used to patch known-bad or synthetic history, e.g. branch points
    /// where the position counter resets. Override entries carry no real
    /// commit time, so [`RevisionOracle::lag`] rejects them rather than
    /// reporting a fictitious age.
    pub fn with_overrides(mut self, overrides: HashMap<String, u64>) -> Self {
        for (revision, position) in overrides {
            self.cache.insert(
                revision.clone(),
                CommitInfo {
                    position: RevisionPosition(position),
                    committed_at: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
                },
            );
            self.overridden.insert(revision);
        }
        self
    }

    /// Resolve a revision to its commit position, caching the result.
    pub fn resolve(&mut self, revision: &str) -> Result<RevisionPosition> {
        Ok(self.resolve_info(revision)?.position)
    }

    /// True when the revision exists in the tracked history.
    pub fn check_valid(&self, revision: &str) -> bool {
        if self.cache.contains_key(revision) {
            return true;
        }
        self.log.exists(revision).unwrap_or(false)
    }

    /// Number of distinct revisions between `from` (exclusive) and `head`
    /// (inclusive).
    pub fn gap(&mut self, head: &str, from: &str) -> Result<u64> {
        self.log.count_between(from, head)
    }

    /// Wall-clock time since `from`'s commit timestamp.
    ///
    /// Fails for override-seeded revisions: a pinned position has no commit
    /// timestamp to measure against.
    pub fn lag(&mut self, from: &str) -> Result<Duration> {
        if self.overridden.contains(from) {
            return Err(LkgrError::UnresolvedRevision {
                revision: from.to_string(),
                detail: "position pinned by override, commit time unknown".to_string(),
            });
        }
        let info = self.resolve_info(from)?;
        Ok(Utc::now() - info.committed_at)
    }

    fn resolve_info(&mut self, revision: &str) -> Result<CommitInfo> {
        if let Some(info) = self.cache.get(revision) {
            return Ok(*info);
        }
        let info = self
            .log
            .lookup(revision)?
            .ok_or_else(|| LkgrError::UnresolvedRevision {
                revision: revision.to_string(),
                detail: "no commit position found".to_string(),
            })?;
        debug!(revision = %revision, position = %info.position, "resolved revision");
        self.cache.insert(revision.to_string(), info);
        Ok(info)
    }
}

/// Git-backed [`RevisionLog`].
///
/// Positions come from the `Cr-Commit-Position: refs/heads/main@{#N}`
/// trailer embedded in commit messages by the commit queue.
pub struct GitRevisionLog {
    repo_dir: PathBuf,
}

impl GitRevisionLog {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| LkgrError::VcsQuery(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LkgrError::VcsQuery(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Extract the position counter from a commit message body.
///
/// Accepts the last `Cr-Commit-Position: <ref>@{#N}` trailer in the message
/// (the last one wins for cherry-picks that carry the original trailer too).
pub(crate) fn parse_commit_position(message: &str) -> Option<u64> {
    message
        .lines()
        .rev()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Cr-Commit-Position:")?;
            let start = rest.find("@{#")? + 3;
            let end = rest[start..].find('}')? + start;
            rest[start..end].parse().ok()
        })
        .next()
}

impl RevisionLog for GitRevisionLog {
    fn lookup(&self, revision: &str) -> Result<Option<CommitInfo>> {
        if !self.exists(revision)? {
            return Ok(None);
        }
        let message = self.git(&["log", "-1", "--format=%B", revision])?;
        let Some(position) = parse_commit_position(&message) else {
            return Ok(None);
        };
        let epoch: i64 = self
            .git(&["log", "-1", "--format=%ct", revision])?
            .parse()
            .map_err(|e| LkgrError::VcsQuery(format!("bad commit timestamp: {e}")))?;
        let committed_at = Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| LkgrError::VcsQuery(format!("out-of-range timestamp: {epoch}")))?;
        Ok(Some(CommitInfo {
            position: RevisionPosition(position),
            committed_at,
        }))
    }

    fn count_between(&self, from: &str, head: &str) -> Result<u64> {
        let count = self.git(&["rev-list", "--count", &format!("{from}..{head}")])?;
        count
            .parse()
            .map_err(|e| LkgrError::VcsQuery(format!("bad rev-list count: {e}")))
    }

    fn exists(&self, revision: &str) -> Result<bool> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("{revision}^{{commit}}")])
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| LkgrError::VcsQuery(format!("failed to run git: {e}")))?;
        Ok(output.status.success())
    }
}
