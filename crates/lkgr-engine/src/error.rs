//! Error taxonomy for the LKGR engine.

use thiserror::Error;

/// Errors produced by the resolution engine.
#[derive(Debug, Error)]
pub enum LkgrError {
    /// One or more builder fetches failed after every builder was attempted.
    /// The run must not compute an LKGR from partial evidence.
    #[error("{} of {total} builder fetches failed: {}", failed.len(), failed.join(", "))]
    FetchFailed {
        /// Names of the builders whose fetch failed.
        failed: Vec<String>,
        /// Total number of builders attempted.
        total: usize,
    },

    /// A revision could not be mapped to a commit position.
    #[error("cannot resolve revision {revision}: {detail}")]
    UnresolvedRevision { revision: String, detail: String },

    /// The persisted current LKGR is unknown to the oracle; no gap/lag can be
    /// computed against it.
    #[error("current LKGR {revision} is not a valid revision")]
    InvalidBaseline { revision: String },

    /// A fetch task aborted before producing a result (panic or runtime
    /// cancellation), as opposed to the fetch itself failing.
    #[error("fetch task aborted: {0}")]
    FetchTask(String),

    /// An underlying VCS log query failed.
    #[error("vcs query failed: {0}")]
    VcsQuery(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LkgrError {
    fn from(err: reqwest::Error) -> Self {
        LkgrError::Http(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, LkgrError>;
