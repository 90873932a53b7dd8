//! Core value types for the adjustment coordinator
//!
//! Defines the partial adjustment record, the field/kind taxonomy used by
//! precedence resolution, feature vectors with their distance metrics, and
//! the opaque handle to externally owned image data.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Similarity feature vector produced by auto-compute.
///
/// Dimensionality and semantics are defined by the external pipeline; the
/// coordinator only measures distances between vectors.
pub type FeatureVector = Vec<f64>;

/// Distance metric used for clustering and style-rule lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Straight-line distance over the feature vector.
    #[default]
    Euclidean,
    /// 1 - cosine similarity; useful for direction-normalized embeddings.
    Cosine,
}

impl DistanceMetric {
    /// Distance between two feature vectors.
    ///
    /// Vectors of mismatched dimension compare as infinitely distant, so
    /// they can never merge into one cluster.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return f64::INFINITY;
        }
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return f64::INFINITY;
                }
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

/// One adjustment field in the record.
///
/// Every field is listed in [`AdjustmentField::ALL`]; field-wise operations
/// on [`Adjustments`] iterate that slice and match exhaustively, so adding a
/// field is a compile-time checklist rather than a runtime surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentField {
    Exposure,
    Contrast,
    Highlights,
    Shadows,
    Temperature,
    Tint,
    Saturation,
    Vibrance,
    StraightenAngle,
    LuminanceNoise,
    ColorNoise,
}

impl AdjustmentField {
    /// All fields, in record order.
    pub const ALL: [AdjustmentField; 11] = [
        AdjustmentField::Exposure,
        AdjustmentField::Contrast,
        AdjustmentField::Highlights,
        AdjustmentField::Shadows,
        AdjustmentField::Temperature,
        AdjustmentField::Tint,
        AdjustmentField::Saturation,
        AdjustmentField::Vibrance,
        AdjustmentField::StraightenAngle,
        AdjustmentField::LuminanceNoise,
        AdjustmentField::ColorNoise,
    ];
}

/// A category of adjustment fields the external pipeline computes per photo.
///
/// Fields belonging to a kind the group is configured to auto-compute are
/// intrinsically photo-specific: they are always taken from the entry's own
/// compute result and never copied from a reference or style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustKind {
    /// Tonal balance estimation.
    Lighting,
    /// White balance and color response.
    Color,
    /// Horizon straightening.
    Straighten,
    /// Noise reduction strength.
    Denoise,
}

impl AdjustKind {
    /// Fields owned by this kind.
    pub fn fields(&self) -> &'static [AdjustmentField] {
        match self {
            AdjustKind::Lighting => &[
                AdjustmentField::Exposure,
                AdjustmentField::Contrast,
                AdjustmentField::Highlights,
                AdjustmentField::Shadows,
            ],
            AdjustKind::Color => &[
                AdjustmentField::Temperature,
                AdjustmentField::Tint,
                AdjustmentField::Saturation,
                AdjustmentField::Vibrance,
            ],
            AdjustKind::Straighten => &[AdjustmentField::StraightenAngle],
            AdjustKind::Denoise => &[
                AdjustmentField::LuminanceNoise,
                AdjustmentField::ColorNoise,
            ],
        }
    }
}

impl std::fmt::Display for AdjustKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustKind::Lighting => write!(f, "lighting"),
            AdjustKind::Color => write!(f, "color"),
            AdjustKind::Straighten => write!(f, "straighten"),
            AdjustKind::Denoise => write!(f, "denoise"),
        }
    }
}

/// Partial adjustment record.
///
/// Every field is optional - a record carries only the fields that some
/// resolution source actually set. Merging is field-wise with documented
/// precedence: manual override > computed kind > reference/style > existing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    pub exposure: Option<f64>,
    pub contrast: Option<f64>,
    pub highlights: Option<f64>,
    pub shadows: Option<f64>,
    pub temperature: Option<f64>,
    pub tint: Option<f64>,
    pub saturation: Option<f64>,
    pub vibrance: Option<f64>,
    pub straighten_angle: Option<f64>,
    pub luminance_noise: Option<f64>,
    pub color_noise: Option<f64>,
}

impl Adjustments {
    /// Read one field.
    pub fn get(&self, field: AdjustmentField) -> Option<f64> {
        match field {
            AdjustmentField::Exposure => self.exposure,
            AdjustmentField::Contrast => self.contrast,
            AdjustmentField::Highlights => self.highlights,
            AdjustmentField::Shadows => self.shadows,
            AdjustmentField::Temperature => self.temperature,
            AdjustmentField::Tint => self.tint,
            AdjustmentField::Saturation => self.saturation,
            AdjustmentField::Vibrance => self.vibrance,
            AdjustmentField::StraightenAngle => self.straighten_angle,
            AdjustmentField::LuminanceNoise => self.luminance_noise,
            AdjustmentField::ColorNoise => self.color_noise,
        }
    }

    /// Write one field.
    pub fn set(&mut self, field: AdjustmentField, value: Option<f64>) {
        let slot = match field {
            AdjustmentField::Exposure => &mut self.exposure,
            AdjustmentField::Contrast => &mut self.contrast,
            AdjustmentField::Highlights => &mut self.highlights,
            AdjustmentField::Shadows => &mut self.shadows,
            AdjustmentField::Temperature => &mut self.temperature,
            AdjustmentField::Tint => &mut self.tint,
            AdjustmentField::Saturation => &mut self.saturation,
            AdjustmentField::Vibrance => &mut self.vibrance,
            AdjustmentField::StraightenAngle => &mut self.straighten_angle,
            AdjustmentField::LuminanceNoise => &mut self.luminance_noise,
            AdjustmentField::ColorNoise => &mut self.color_noise,
        };
        *slot = value;
    }

    /// Merge `other` into `self`: fields present in `other` overwrite,
    /// absent fields leave `self` untouched. Later merges win.
    pub fn merge_from(&mut self, other: &Adjustments) {
        for field in AdjustmentField::ALL {
            if let Some(v) = other.get(field) {
                self.set(field, Some(v));
            }
        }
    }

    /// Copy of `self` with `over`'s present fields layered on top.
    pub fn overlaid_with(&self, over: &Adjustments) -> Adjustments {
        let mut merged = self.clone();
        merged.merge_from(over);
        merged
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        AdjustmentField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Fields currently present in this record.
    pub fn present_fields(&self) -> Vec<AdjustmentField> {
        AdjustmentField::ALL
            .iter()
            .copied()
            .filter(|f| self.get(*f).is_some())
            .collect()
    }
}

/// Opaque handle to externally owned image data.
///
/// The coordinator never inspects or copies the underlying data; it only
/// hands the same handle back to the gateways. Cloning is cheap (Arc).
#[derive(Clone)]
pub struct SourceHandle(Arc<dyn Any + Send + Sync>);

impl SourceHandle {
    /// Wrap a caller-owned value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        SourceHandle(Arc::new(value))
    }

    /// Borrow the wrapped value, if it is a `T`.
    ///
    /// Gateways that know their own source type use this to get it back.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SourceHandle(..)")
    }
}
