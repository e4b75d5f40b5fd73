//! LKGR engine - last-known-good-revision resolution
//!
//! Resolves the newest revision of a tracked branch that every configured
//! CI builder has proven green:
//! - Fetches recent build reports from the builder fleet concurrently
//! - Maps revisions to linear positions through a cached oracle
//! - Scans backward for the newest position trusted by every builder
//! - Classifies the result against the published LKGR and its staleness
//!   thresholds, then publishes or alerts

pub mod candidate;
pub mod collate;
pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod oracle;
pub mod pipeline;
pub mod publish;
pub mod source;
pub mod telemetry;

// Re-export key types
pub use candidate::{find_candidate, GreenPolicy};
pub use collate::{collate, Collation};
pub use config::{BuilderConfig, LkgrConfig};
pub use error::{LkgrError, Result};
pub use health::{evaluate, AlertReason, Decision, StalenessThresholds};
pub use model::{BuildReport, BuildStatus, BuilderSpec, BuilderTimeline, Candidate, RevisionPosition};
pub use oracle::{CommitInfo, GitRevisionLog, RevisionLog, RevisionOracle};
pub use pipeline::{LkgrPipeline, RunOutcome};
pub use publish::{FilePublisher, Publisher};
pub use source::{BuildDataSource, BuildFetcher, HttpBuildFetcher};
pub use telemetry::init_tracing;
