//! Metric engineering: derives engagement, order, ROAS and payout metrics
//! from validated records and holds the enriched base table.

pub mod dataset;
pub mod engine;

pub use dataset::{Dataset, EnrichedRecord};
pub use engine::{measures_of, MetricEngine};
