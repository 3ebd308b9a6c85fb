//! Cohort trends: a metric's mean per period, one series per cohort value.

use crate::aggregate::{AggregateRequest, Aggregator, GroupDimension, GroupOrder, KeyPart, Period};
use influencer_core::config::DateGranularity;
use influencer_core::MetricKey;
use influencer_segmentation::{BandAssignment, FilteredView};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: Period,
    pub mean: Option<f64>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSeries {
    pub cohort: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortTrend {
    pub cohort_dimension: GroupDimension,
    pub metric: MetricKey,
    pub granularity: DateGranularity,
    /// Every period present in the view, oldest first.
    pub periods: Vec<Period>,
    pub series: Vec<CohortSeries>,
}

impl CohortTrend {
    /// Points within a series are chronological. A series only has points
    /// for periods in which the cohort has records.
    pub fn compute(
        view: &FilteredView<'_>,
        aggregator: &Aggregator,
        cohort_dimension: GroupDimension,
        metric: MetricKey,
        granularity: DateGranularity,
        bands: &BandAssignment,
    ) -> Self {
        let request = AggregateRequest::new(
            vec![cohort_dimension, GroupDimension::Date(granularity)],
            vec![metric],
        )
        .with_order(GroupOrder::Natural);
        let result = aggregator.aggregate(view, &request, bands);

        let mut periods = BTreeSet::new();
        let mut series: BTreeMap<String, Vec<TrendPoint>> = BTreeMap::new();
        for group in &result.groups {
            let (Some(cohort), Some(KeyPart::Period(period))) = (group.key.first(), group.key.get(1))
            else {
                continue;
            };
            periods.insert(*period);
            series.entry(cohort.to_string()).or_default().push(TrendPoint {
                period: *period,
                mean: group.stat(metric).and_then(|s| s.mean),
                record_count: group.record_count,
            });
        }

        Self {
            cohort_dimension,
            metric,
            granularity,
            periods: periods.into_iter().collect(),
            series: series
                .into_iter()
                .map(|(cohort, points)| CohortSeries { cohort, points })
                .collect(),
        }
    }

    pub fn series(&self, cohort: &str) -> Option<&CohortSeries> {
        self.series.iter().find(|s| s.cohort == cohort)
    }
}
