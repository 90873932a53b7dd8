//! # autoadjust
//!
//! Batch auto-adjustment transfer coordinator for photo groups.
//!
//! A group schedules per-photo auto-adjustment computation through an
//! external gateway, clusters photos by feature-vector similarity,
//! propagates a user-chosen reference photo's edits to similar photos, and
//! distills a processed group into a portable, versioned style applicable
//! to an unrelated photo set.
//!
//! The coordinator never touches pixels: decode, render, and the adjustment
//! math itself live behind the gateway traits.
//!
//! ```no_run
//! use autoadjust::{
//!     AdjustKind, AdjustmentGroup, GroupConfig, NewEntry, SourceHandle,
//! };
//! # use std::sync::Arc;
//! # async fn example(gateway: Arc<dyn autoadjust::AutoComputeGateway>) -> autoadjust::Result<()> {
//! let config = GroupConfig::new(vec![AdjustKind::Straighten], 0.75);
//! let group = AdjustmentGroup::new(
//!     config,
//!     gateway,
//!     vec![NewEntry::new("IMG_0001", SourceHandle::new(()))],
//! )?;
//!
//! group.resume()?;
//! group.wait_until_completed().await?;
//! let adjustments = group.get_adjustments("IMG_0001").await?;
//! # let _ = adjustments;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod group;
pub mod models;
pub mod services;
pub mod types;

pub use crate::config::GroupConfig;
pub use crate::error::{Error, Result};
pub use crate::events::{EventBus, GroupEvent};
pub use crate::gateway::{AutoComputeGateway, ComputeOutput, RenderGateway};
pub use crate::group::{AdjustmentGroup, GroupSnapshot, NewEntry};
pub use crate::models::{EntryStatus, PhotoEntry, Style, StyleRule, STYLE_FORMAT_VERSION};
pub use crate::types::{
    AdjustKind, Adjustments, AdjustmentField, DistanceMetric, FeatureVector, SourceHandle,
};
