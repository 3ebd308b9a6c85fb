//! The enriched, read-only base table held for the lifetime of a session.

use chrono::NaiveDate;
use influencer_core::{DerivedMetrics, Dimension, MetricKey, RawMeasures, Record};
use serde::Serialize;
use std::collections::BTreeSet;

/// A validated record with its derived metrics attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    /// Position in the ingested table; stable identity for record-level banding
    /// and tie-breaks.
    pub position: usize,
    pub record: Record,
    pub raw: RawMeasures,
    pub metrics: DerivedMetrics,
}

impl EnrichedRecord {
    /// Value of a raw or derived metric. `None` is the undefined sentinel.
    pub fn value(&self, key: MetricKey) -> Option<f64> {
        key.of(&self.raw, &self.metrics)
    }
}

/// Immutable base table. Filtering and aggregation only ever borrow from it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    records: Vec<EnrichedRecord>,
}

impl Dataset {
    pub(crate) fn new(records: Vec<EnrichedRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    /// All records as a borrowed population, in ingest order.
    pub fn population(&self) -> Vec<&EnrichedRecord> {
        self.records.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct values of a categorical dimension.
    pub fn distinct(&self, dimension: Dimension) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.record.dimension_str(dimension))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Earliest and latest record dates.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.record.date).min()?;
        let max = self.records.iter().map(|r| r.record.date).max()?;
        Some((min, max))
    }
}
