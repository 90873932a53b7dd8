//! Portable adjustment styles
//!
//! A style distills one processed group into feature-centroid → delta rules
//! that can be re-applied to an unrelated group. Styles are immutable,
//! versioned, and serialize to a self-describing JSON blob so a consumer can
//! reject unsupported versions before use.

use crate::error::{Error, Result};
use crate::types::{Adjustments, FeatureVector};
use serde::{Deserialize, Serialize};

/// Current style blob format version.
pub const STYLE_FORMAT_VERSION: u32 = 1;

/// One rule: photos near `centroid` receive `delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    /// Arithmetic mean of the source cluster's feature vectors
    pub centroid: FeatureVector,
    /// Non-computed-kind adjustment fields to apply
    pub delta: Adjustments,
    /// Source cluster member count
    pub weight: u32,
}

/// Portable, versioned rule set distilled from a processed group.
///
/// A style belongs to no single group; the same value may be loaded into
/// arbitrarily many groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Format version, checked on load
    pub version: u32,
    /// Ordered rule list
    pub rules: Vec<StyleRule>,
}

impl Style {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self {
            version: STYLE_FORMAT_VERSION,
            rules,
        }
    }

    /// True when this build can interpret the blob.
    pub fn is_supported(&self) -> bool {
        self.version == STYLE_FORMAT_VERSION
    }

    /// Serialize to the persistence blob.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Config(format!("style serialization failed: {}", e)))
    }

    /// Deserialize a persistence blob, rejecting unsupported versions.
    pub fn from_json(blob: &str) -> Result<Self> {
        let style: Style = serde_json::from_str(blob)
            .map_err(|e| Error::Config(format!("style parse failed: {}", e)))?;
        if !style.is_supported() {
            return Err(Error::VersionMismatch {
                found: style.version,
                supported: STYLE_FORMAT_VERSION,
            });
        }
        Ok(style)
    }
}
