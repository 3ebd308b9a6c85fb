//! Shared domain types for the influencer campaign ROI pipeline: the record
//! schema, metric vocabulary, configuration and error taxonomy.

pub mod config;
pub mod error;
pub mod metric;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, SchemaError};
pub use metric::{DerivedMetrics, MetricKey, RawMeasures};
pub use types::{
    Dimension, FilterWarning, PayoutBasis, RawTable, Record, RowRejection, REQUIRED_COLUMNS,
};
