//! Deployment configuration.
//!
//! One JSON file describes everything a deployment needs: the builder
//! fleet, the tracked repository, staleness thresholds, and the candidate
//! policy. Loaded once at startup and validated before any network work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::candidate::GreenPolicy;
use crate::error::{LkgrError, Result};
use crate::health::StalenessThresholds;
use crate::model::BuilderSpec;

fn default_head_ref() -> String {
    "main".to_string()
}

fn default_fetch_limit() -> usize {
    100
}

fn default_lag_rate_scale() -> f64 {
    2.0
}

/// One builder in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Display name, unique within the fleet.
    pub name: String,
    /// Base URL of the builder's build-status endpoint.
    pub url: String,
}

/// Full deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LkgrConfig {
    /// Builders whose evidence gates the LKGR.
    pub builders: Vec<BuilderConfig>,

    /// Local clone of the tracked repository.
    pub repo_dir: PathBuf,

    /// Branch ref whose tip counts as head.
    #[serde(default = "default_head_ref")]
    pub head_ref: String,

    /// File holding the currently published LKGR revision.
    pub lkgr_file: PathBuf,

    /// Maximum tolerated revision gap between the LKGR and head.
    pub allowed_gap: u64,

    /// Baseline tolerated age of the LKGR, in hours.
    pub allowed_lag_hours: i64,

    /// Scale factor for the velocity-adjusted lag allowance.
    #[serde(default = "default_lag_rate_scale")]
    pub lag_rate_scale: f64,

    /// Concurrent builder fetches; 0 means one task per builder.
    #[serde(default)]
    pub max_parallelism: usize,

    /// Build reports requested per builder.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// How much green evidence a builder must show at a candidate.
    #[serde(default)]
    pub green_policy: GreenPolicy,

    /// Manual revision → position pins for commits the log cannot place.
    #[serde(default)]
    pub position_overrides: HashMap<String, u64>,
}

impl LkgrConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LkgrError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| LkgrError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.builders.is_empty() {
            return Err(LkgrError::Config(
                "at least one builder is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for builder in &self.builders {
            if builder.name.is_empty() || builder.url.is_empty() {
                return Err(LkgrError::Config(
                    "builder name and url must be non-empty".to_string(),
                ));
            }
            if !seen.insert(builder.name.as_str()) {
                return Err(LkgrError::Config(format!(
                    "duplicate builder name: {}",
                    builder.name
                )));
            }
        }
        if self.allowed_gap == 0 {
            return Err(LkgrError::Config(
                "allowed_gap must be positive".to_string(),
            ));
        }
        if self.allowed_lag_hours <= 0 {
            return Err(LkgrError::Config(
                "allowed_lag_hours must be positive".to_string(),
            ));
        }
        if self.lag_rate_scale < 1.0 {
            return Err(LkgrError::Config(
                "lag_rate_scale must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder fleet as fetch targets.
    pub fn builder_specs(&self) -> Vec<BuilderSpec> {
        self.builders
            .iter()
            .map(|b| BuilderSpec::new(&b.name, &b.url))
            .collect()
    }

    pub fn thresholds(&self) -> StalenessThresholds {
        StalenessThresholds {
            allowed_gap: self.allowed_gap,
            allowed_lag: Duration::hours(self.allowed_lag_hours),
            lag_rate_scale: self.lag_rate_scale,
        }
    }
}
