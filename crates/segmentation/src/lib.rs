//! Segmentation of the enriched dataset: composable filters and performance
//! banding relative to the filtered population.

pub mod bands;
pub mod filter;

pub use bands::{BandAssignment, BandClassifier, BandThresholds, PerformanceBand};
pub use filter::{FilterEngine, FilterSpec, FilteredView, Selection};
