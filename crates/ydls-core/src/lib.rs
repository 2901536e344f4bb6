//! ydls-core: shared error type, configuration, media-domain types, the
//! format catalog and time-range tokens.
//!
//! This crate is the foundational dependency for the other ydls-* crates.

pub mod catalog;
pub mod config;
pub mod error;
pub mod media;
pub mod timerange;

// Re-export the most commonly used items at the crate root.
pub use catalog::FormatCatalog;
pub use error::{Error, ResolveErrorKind, Result};
pub use media::*;
pub use timerange::TimeRange;
