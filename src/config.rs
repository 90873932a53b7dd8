//! Group configuration
//!
//! Similarity threshold, distance metric, and the set of auto-computed kinds
//! are host decisions, never hard-coded. Configuration arrives either
//! programmatically or as a TOML document from the embedding SDK.

use crate::error::{Error, Result};
use crate::types::{AdjustKind, AdjustmentField, DistanceMetric};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

fn default_event_capacity() -> usize {
    256
}

/// Configuration for one adjustment group
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Auto-compute kinds requested per entry
    #[serde(default)]
    pub kinds: Vec<AdjustKind>,

    /// Cluster similarity threshold τ: entries merge when their feature
    /// distance is ≤ τ
    pub similarity_threshold: f64,

    /// Distance metric over feature vectors
    #[serde(default)]
    pub metric: DistanceMetric,

    /// Event bus buffer size per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl GroupConfig {
    pub fn new(kinds: Vec<AdjustKind>, similarity_threshold: f64) -> Self {
        Self {
            kinds,
            similarity_threshold,
            metric: DistanceMetric::default(),
            event_capacity: default_event_capacity(),
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GroupConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "group configuration loaded");
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite() || self.similarity_threshold < 0.0 {
            return Err(Error::Config(format!(
                "similarity_threshold must be finite and >= 0, got {}",
                self.similarity_threshold
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be > 0".to_string()));
        }
        let mut seen = HashSet::new();
        for kind in &self.kinds {
            if !seen.insert(*kind) {
                return Err(Error::Config(format!("duplicate kind: {}", kind)));
            }
        }
        Ok(())
    }

    /// Fields covered by the configured computed kinds.
    ///
    /// These are always taken from an entry's own compute result, never
    /// copied from a reference or style.
    pub fn computed_fields(&self) -> HashSet<AdjustmentField> {
        self.kinds
            .iter()
            .flat_map(|k| k.fields().iter().copied())
            .collect()
    }
}
