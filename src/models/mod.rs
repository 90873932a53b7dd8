//! Data models for the adjustment coordinator

mod entry;
mod style;

pub use entry::{EntryStatus, PhotoEntry};
pub use style::{Style, StyleRule, STYLE_FORMAT_VERSION};
