//! Top/bottom performers and statistical outliers over a filtered view.

use chrono::NaiveDate;
use influencer_analytics::EnrichedRecord;
use influencer_core::MetricKey;
use influencer_segmentation::FilteredView;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecord {
    pub rank: usize,
    /// Ingest position of the record.
    pub position: usize,
    pub name: String,
    pub platform: String,
    pub campaign: String,
    pub date: NaiveDate,
    pub value: f64,
}

impl RankedRecord {
    fn new(rank: usize, record: &EnrichedRecord, value: f64) -> Self {
        Self {
            rank,
            position: record.position,
            name: record.record.name.clone(),
            platform: record.record.platform.clone(),
            campaign: record.record.campaign.clone(),
            date: record.record.date,
            value,
        }
    }
}

fn ranked<'a>(
    view: &FilteredView<'a>,
    metric: MetricKey,
    descending: bool,
) -> Vec<(&'a EnrichedRecord, f64)> {
    let mut defined: Vec<(&EnrichedRecord, f64)> = view
        .iter()
        .filter_map(|r| r.value(metric).map(|v| (r, v)))
        .collect();
    defined.sort_by(|(ra, a), (rb, b)| {
        let by_value = if descending { b.total_cmp(a) } else { a.total_cmp(b) };
        by_value.then(ra.position.cmp(&rb.position))
    });
    defined
}

/// The `n` records with the highest defined value of `metric`.
pub fn top_n(view: &FilteredView<'_>, metric: MetricKey, n: usize) -> Vec<RankedRecord> {
    ranked(view, metric, true)
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (record, value))| RankedRecord::new(i + 1, record, value))
        .collect()
}

/// The `n` records with the lowest defined value of `metric`.
pub fn bottom_n(view: &FilteredView<'_>, metric: MetricKey, n: usize) -> Vec<RankedRecord> {
    ranked(view, metric, false)
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (record, value))| RankedRecord::new(i + 1, record, value))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub metric: MetricKey,
    pub sigma: f64,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    /// Records outside `mean ± sigma * std_dev`, most extreme first.
    pub outliers: Vec<RankedRecord>,
}

/// Records whose value lies strictly beyond `sigma` sample standard
/// deviations from the mean. Needs at least two defined values.
pub fn outliers(view: &FilteredView<'_>, metric: MetricKey, sigma: f64) -> OutlierReport {
    let values: Vec<(&EnrichedRecord, f64)> = view
        .iter()
        .filter_map(|r| r.value(metric).map(|v| (r, v)))
        .collect();

    let empty = OutlierReport {
        metric,
        sigma,
        mean: None,
        std_dev: None,
        lower: None,
        upper: None,
        outliers: Vec::new(),
    };
    if values.len() < 2 {
        return empty;
    }

    let n = values.len() as f64;
    let mean = values.iter().map(|(_, v)| v).sum::<f64>() / n;
    let variance = values.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    let (lower, upper) = (mean - sigma * std_dev, mean + sigma * std_dev);

    let mut flagged: Vec<(&EnrichedRecord, f64)> = values
        .into_iter()
        .filter(|(_, v)| *v < lower || *v > upper)
        .collect();
    // Most extreme first.
    flagged.sort_by(|(ra, a), (rb, b)| {
        (b - mean)
            .abs()
            .total_cmp(&(a - mean).abs())
            .then(ra.position.cmp(&rb.position))
    });

    OutlierReport {
        mean: Some(mean),
        std_dev: Some(std_dev),
        lower: Some(lower),
        upper: Some(upper),
        outliers: flagged
            .into_iter()
            .enumerate()
            .map(|(i, (record, value))| RankedRecord::new(i + 1, record, value))
            .collect(),
        ..empty
    }
}
