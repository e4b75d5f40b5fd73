//! Build report fetching across the builder fleet.
//!
//! [`BuildDataSource`] fans out one fetch task per configured builder,
//! bounded by a worker-pool limit, and fails the whole operation if any
//! single fetch failed. Partial evidence is never returned: an artificially
//! small report set could understate a builder's true failure state.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{LkgrError, Result};
use crate::model::{BuildReport, BuildStatus, BuilderSpec};

/// Injectable transport for builder fetches.
///
/// Implement this to plug in a real build-status API or a test stub.
#[async_trait]
pub trait BuildFetcher: Send + Sync {
    /// Fetch all recent build reports for one builder.
    async fn fetch_builds(&self, builder: &BuilderSpec) -> Result<Vec<BuildReport>>;
}

/// Concurrent build-report source over a [`BuildFetcher`].
pub struct BuildDataSource {
    fetcher: Arc<dyn BuildFetcher>,
    max_parallelism: usize,
}

impl BuildDataSource {
    /// `max_parallelism` bounds concurrent fetches; 0 means unbounded
    /// (one in-flight task per builder).
    pub fn new(fetcher: Arc<dyn BuildFetcher>, max_parallelism: usize) -> Self {
        Self {
            fetcher,
            max_parallelism,
        }
    }

    /// Fetch reports for every builder.
    ///
    /// All fetches run to completion; there is no cancel-on-first-error.
    /// Failures are collected per builder and, if any occurred, the whole
    /// call returns [`LkgrError::FetchFailed`] naming every unreachable
    /// builder, so operators get a complete picture in one run.
    pub async fn fetch_all(
        &self,
        builders: &[BuilderSpec],
    ) -> Result<BTreeMap<String, Vec<BuildReport>>> {
        let permits = if self.max_parallelism == 0 {
            builders.len().max(1)
        } else {
            self.max_parallelism
        };
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut join_set = JoinSet::new();
        for builder in builders.iter().cloned() {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = fetcher.fetch_builds(&builder).await;
                (builder.name, result)
            });
        }

        let mut reports = BTreeMap::new();
        let mut failed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (name, result) =
                joined.map_err(|e| LkgrError::FetchTask(e.to_string()))?;
            match result {
                Ok(builds) => {
                    debug!(builder = %name, count = builds.len(), "fetched builds");
                    reports.insert(name, builds);
                }
                Err(e) => {
                    warn!(builder = %name, error = %e, "builder fetch failed");
                    failed.push(name);
                }
            }
        }

        if failed.is_empty() {
            Ok(reports)
        } else {
            failed.sort();
            Err(LkgrError::FetchFailed {
                failed,
                total: builders.len(),
            })
        }
    }
}

/// Raw build row as served by the build-status endpoint.
#[derive(Debug, Deserialize)]
struct WireBuild {
    revision: String,
    result: String,
    completed_at: chrono::DateTime<chrono::Utc>,
}

/// HTTP-backed [`BuildFetcher`] for a JSON build-status API.
///
/// Expects `GET {builder.url}/builds?limit=N` to return an array of
/// `{ revision, result, completed_at }` rows, newest first.
pub struct HttpBuildFetcher {
    client: reqwest::Client,
    fetch_limit: usize,
}

impl HttpBuildFetcher {
    pub fn new(fetch_limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lkgr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LkgrError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            fetch_limit,
        })
    }
}

#[async_trait]
impl BuildFetcher for HttpBuildFetcher {
    async fn fetch_builds(&self, builder: &BuilderSpec) -> Result<Vec<BuildReport>> {
        let url = format!("{}/builds", builder.url.trim_end_matches('/'));
        let rows: Vec<WireBuild> = self
            .client
            .get(&url)
            .query(&[("limit", self.fetch_limit)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| LkgrError::Http(format!("builder {}: {e}", builder.name)))?
            .json()
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| BuildReport {
                builder: builder.name.clone(),
                revision: row.revision,
                status: BuildStatus::from_wire(&row.result),
                completed_at: row.completed_at,
            })
            .collect())
    }
}
