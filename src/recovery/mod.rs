//! Mapping of aggregation and selection failures to recovery strategies for the UI layer.

/// Pure classification of failures into recovery tags
pub mod classifier;

pub use classifier::*;
