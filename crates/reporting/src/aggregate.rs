//! Multi-dimension group-by over a filtered view.

use chrono::{Datelike, Duration, NaiveDate};
use influencer_analytics::{EnrichedRecord, MetricEngine};
use influencer_core::config::DateGranularity;
use influencer_core::{DerivedMetrics, Dimension, MetricKey, RawMeasures};
use influencer_segmentation::{BandAssignment, FilteredView, PerformanceBand};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

// ─── Request ────────────────────────────────────────────────────────────────

/// Dimensions to group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    Date(DateGranularity),
    Platform,
    Campaign,
    Category,
    Gender,
    Influencer,
    Basis,
    Band,
}

impl GroupDimension {
    fn categorical(&self) -> Option<Dimension> {
        match self {
            GroupDimension::Platform => Some(Dimension::Platform),
            GroupDimension::Campaign => Some(Dimension::Campaign),
            GroupDimension::Category => Some(Dimension::Category),
            GroupDimension::Gender => Some(Dimension::Gender),
            GroupDimension::Influencer => Some(Dimension::Influencer),
            GroupDimension::Basis => Some(Dimension::Basis),
            GroupDimension::Date(_) | GroupDimension::Band => None,
        }
    }
}

impl From<Dimension> for GroupDimension {
    fn from(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Platform => GroupDimension::Platform,
            Dimension::Campaign => GroupDimension::Campaign,
            Dimension::Category => GroupDimension::Category,
            Dimension::Gender => GroupDimension::Gender,
            Dimension::Influencer => GroupDimension::Influencer,
            Dimension::Basis => GroupDimension::Basis,
        }
    }
}

impl std::str::FromStr for GroupDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        match wanted.as_str() {
            "band" | "performance_band" => Ok(GroupDimension::Band),
            "date" => Ok(GroupDimension::Date(DateGranularity::Day)),
            other => other
                .parse::<DateGranularity>()
                .map(GroupDimension::Date)
                .or_else(|_| other.parse::<Dimension>().map(GroupDimension::from))
                .map_err(|_| format!("unknown group dimension '{s}'")),
        }
    }
}

/// Group ordering of an aggregate result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    /// Same as `Descending`.
    #[default]
    Auto,
    /// By key: chronological, alphabetical, band rank.
    Natural,
    /// Key parts compare in dimension order. Time parts stay chronological
    /// and band parts keep band rank. Categorical parts rank by the
    /// marginal aggregate of the first metric within their parent group,
    /// or by record count when no metric is requested.
    Descending,
    Ascending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub dimensions: Vec<GroupDimension>,
    pub metrics: Vec<MetricKey>,
    #[serde(default)]
    pub order: GroupOrder,
}

impl AggregateRequest {
    pub fn new(dimensions: Vec<GroupDimension>, metrics: Vec<MetricKey>) -> Self {
        Self {
            dimensions,
            metrics,
            order: GroupOrder::Auto,
        }
    }

    pub fn with_order(mut self, order: GroupOrder) -> Self {
        self.order = order;
        self
    }
}

// ─── Keys ───────────────────────────────────────────────────────────────────

/// A time bucket identified by its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub start: NaiveDate,
    pub granularity: DateGranularity,
}

impl Period {
    pub fn containing(date: NaiveDate, granularity: DateGranularity) -> Self {
        let start = match granularity {
            DateGranularity::Day => date,
            DateGranularity::Week => date
                .checked_sub_signed(Duration::days(
                    date.weekday().num_days_from_monday() as i64,
                ))
                .unwrap_or(date),
            DateGranularity::Month => date.with_day(1).unwrap_or(date),
        };
        Self { start, granularity }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            DateGranularity::Day => write!(f, "{}", self.start.format("%Y-%m-%d")),
            DateGranularity::Week => {
                let week = self.start.iso_week();
                write!(f, "{}-W{:02}", week.year(), week.week())
            }
            DateGranularity::Month => write!(f, "{}", self.start.format("%Y-%m")),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One component of a group key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    Period(Period),
    Text(String),
    Band(PerformanceBand),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Period(p) => p.fmt(f),
            KeyPart::Text(t) => f.write_str(t),
            KeyPart::Band(b) => b.fmt(f),
        }
    }
}

fn key_part(dimension: GroupDimension, record: &EnrichedRecord, bands: &BandAssignment) -> KeyPart {
    match dimension {
        GroupDimension::Date(granularity) => {
            KeyPart::Period(Period::containing(record.record.date, granularity))
        }
        GroupDimension::Band => KeyPart::Band(bands.band_of(record)),
        other => match other.categorical() {
            Some(d) => KeyPart::Text(record.record.dimension_str(d).to_string()),
            None => KeyPart::Text(String::new()),
        },
    }
}

// ─── Result ─────────────────────────────────────────────────────────────────

/// Summary of one metric within a group. Undefined values are excluded from
/// `sum` and `mean` but included in `count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricStats {
    pub sum: f64,
    pub mean: Option<f64>,
    pub count: usize,
    pub undefined_count: usize,
}

impl MetricStats {
    fn push(&mut self, value: Option<f64>) {
        self.count += 1;
        match value {
            Some(v) => self.sum += v,
            None => self.undefined_count += 1,
        }
    }

    fn finish(&mut self) {
        let defined = self.count - self.undefined_count;
        self.mean = (defined > 0).then(|| self.sum / defined as f64);
    }

    pub fn defined_count(&self) -> usize {
        self.count - self.undefined_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateGroup {
    pub key: Vec<KeyPart>,
    pub label: String,
    pub record_count: usize,
    pub stats: BTreeMap<MetricKey, MetricStats>,
    /// Column sums of the group's raw measures.
    pub totals: RawMeasures,
    /// Metrics recomputed on `totals`, e.g. blended ROAS.
    pub blended: DerivedMetrics,
}

impl AggregateGroup {
    pub fn stat(&self, metric: MetricKey) -> Option<&MetricStats> {
        self.stats.get(&metric)
    }

    /// Value a group is ranked by: the sum for additive metrics, the mean otherwise.
    pub fn rank_value(&self, metric: MetricKey) -> Option<f64> {
        rank_stats(metric, self.stats.get(&metric)?)
    }
}

fn rank_stats(metric: MetricKey, stats: &MetricStats) -> Option<f64> {
    if metric.is_additive() {
        (stats.defined_count() > 0).then_some(stats.sum)
    } else {
        stats.mean
    }
}

/// Running totals for one key prefix.
#[derive(Debug, Default)]
struct Marginal {
    records: usize,
    stats: MetricStats,
}

impl Marginal {
    fn rank_value(&self, ranking: Option<MetricKey>) -> Option<f64> {
        match ranking {
            Some(metric) => rank_stats(metric, &self.stats),
            None => Some(self.records as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub dimensions: Vec<GroupDimension>,
    pub metrics: Vec<MetricKey>,
    pub total_records: usize,
    pub groups: Vec<AggregateGroup>,
}

impl AggregateResult {
    pub fn labels(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.label.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// ─── Aggregator ─────────────────────────────────────────────────────────────

/// Groups filtered records and computes per-group summary statistics.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    engine: MetricEngine,
}

impl Aggregator {
    pub fn new(engine: MetricEngine) -> Self {
        Self { engine }
    }

    pub fn aggregate(
        &self,
        view: &FilteredView<'_>,
        request: &AggregateRequest,
        bands: &BandAssignment,
    ) -> AggregateResult {
        let order = match request.order {
            GroupOrder::Auto => GroupOrder::Descending,
            other => other,
        };
        let ranking = request.metrics.first().copied();
        let mut groups: BTreeMap<Vec<KeyPart>, AggregateGroup> = BTreeMap::new();
        let mut marginals: BTreeMap<Vec<KeyPart>, Marginal> = BTreeMap::new();

        for record in view.iter() {
            let key: Vec<KeyPart> = request
                .dimensions
                .iter()
                .map(|d| key_part(*d, record, bands))
                .collect();

            if order != GroupOrder::Natural {
                for (i, dimension) in request.dimensions.iter().enumerate() {
                    if dimension.categorical().is_none() {
                        continue;
                    }
                    let marginal = marginals.entry(key[..=i].to_vec()).or_default();
                    marginal.records += 1;
                    if let Some(metric) = ranking {
                        marginal.stats.push(record.value(metric));
                    }
                }
            }

            let group = groups.entry(key).or_insert_with_key(|key| AggregateGroup {
                key: key.clone(),
                label: key
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" / "),
                record_count: 0,
                stats: request
                    .metrics
                    .iter()
                    .map(|m| (*m, MetricStats::default()))
                    .collect(),
                totals: RawMeasures::default(),
                blended: DerivedMetrics::default(),
            });

            group.record_count += 1;
            group.totals.add(&record.raw);
            for metric in &request.metrics {
                if let Some(stats) = group.stats.get_mut(metric) {
                    stats.push(record.value(*metric));
                }
            }
        }

        // BTreeMap iteration is already natural key order.
        let mut groups: Vec<AggregateGroup> = groups
            .into_values()
            .map(|mut group| {
                group.stats.values_mut().for_each(MetricStats::finish);
                group.blended = self.engine.derive(&group.totals);
                group
            })
            .collect();

        if order != GroupOrder::Natural {
            marginals.values_mut().for_each(|m| m.stats.finish());
            let descending = order == GroupOrder::Descending;
            let rank = |prefix: &[KeyPart]| {
                marginals.get(prefix).and_then(|m| m.rank_value(ranking))
            };
            // Earlier parts are equal when part i is compared, so each
            // categorical part ranks against its siblings only.
            groups.sort_by(|a, b| {
                for (i, dimension) in request.dimensions.iter().enumerate() {
                    let natural = a.key[i].cmp(&b.key[i]);
                    let ordering = if dimension.categorical().is_some() {
                        compare_ranked(rank(&a.key[..=i]), rank(&b.key[..=i]), descending)
                            .then(natural)
                    } else {
                        natural
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        debug!(
            dimensions = ?request.dimensions,
            records = view.len(),
            groups = groups.len(),
            "Aggregate computed"
        );

        AggregateResult {
            dimensions: request.dimensions.clone(),
            metrics: request.metrics.clone(),
            total_records: view.len(),
            groups,
        }
    }
}

/// Undefined values always sort last.
fn compare_ranked(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if descending => y.total_cmp(&x),
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{mixed_dataset, record};
    use influencer_analytics::MetricEngine;
    use influencer_core::config::{BandingConfig, BandingKey};
    use influencer_segmentation::{BandClassifier, FilterEngine, FilterSpec};

    fn no_bands() -> BandAssignment {
        BandAssignment::empty(BandingKey::Influencer, MetricKey::Roas)
    }

    #[test]
    fn test_group_counts_sum_to_population() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let aggregator = Aggregator::default();
        let dims = [
            vec![GroupDimension::Platform],
            vec![GroupDimension::Campaign, GroupDimension::Gender],
            vec![GroupDimension::Date(DateGranularity::Month)],
            vec![GroupDimension::Date(DateGranularity::Week), GroupDimension::Category],
            vec![GroupDimension::Influencer],
        ];
        for dimensions in dims {
            let request = AggregateRequest::new(dimensions, vec![MetricKey::Revenue]);
            let result = aggregator.aggregate(&view, &request, &no_bands());
            let total: usize = result.groups.iter().map(|g| g.record_count).sum();
            assert_eq!(total, view.len());
            assert_eq!(result.total_records, view.len());
        }
    }

    #[test]
    fn test_mean_excludes_undefined_but_count_includes_it() {
        let engine = MetricEngine::default();
        let data = engine
            .enrich(vec![
                record("a", "Instagram", "Spring", 2024, 1, 5, 1000, 500.0, 100.0),
                record("b", "Instagram", "Spring", 2024, 1, 6, 1000, 300.0, 0.0),
                record("c", "Instagram", "Spring", 2024, 1, 7, 1000, 100.0, 100.0),
            ])
            .unwrap();
        let view = FilteredView::of(data.population());
        let request = AggregateRequest::new(vec![GroupDimension::Platform], vec![MetricKey::Roas]);
        let result = Aggregator::new(engine).aggregate(&view, &request, &no_bands());

        let stats = result.groups[0].stat(MetricKey::Roas).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.undefined_count, 1);
        assert!((stats.sum - 6.0).abs() < 1e-9);
        assert!((stats.mean.unwrap() - 3.0).abs() < 1e-9);

        // Blended ROAS is 900 / 200.
        assert!((result.groups[0].blended.roas.unwrap() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_all_undefined_mean_is_none() {
        let data = MetricEngine::default()
            .enrich(vec![record("a", "YouTube", "Spring", 2024, 1, 5, 0, 10.0, 0.0)])
            .unwrap();
        let view = FilteredView::of(data.population());
        let request = AggregateRequest::new(
            vec![GroupDimension::Platform],
            vec![MetricKey::EngagementRate, MetricKey::Roas],
        );
        let result = Aggregator::default().aggregate(&view, &request, &no_bands());
        let group = &result.groups[0];
        assert_eq!(group.stat(MetricKey::EngagementRate).unwrap().mean, None);
        assert_eq!(group.stat(MetricKey::Roas).unwrap().sum, 0.0);
        assert_eq!(group.rank_value(MetricKey::Roas), None);
    }

    #[test]
    fn test_time_groups_sort_chronologically() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let request = AggregateRequest::new(
            vec![GroupDimension::Date(DateGranularity::Month)],
            vec![MetricKey::Revenue],
        );
        let result = Aggregator::default().aggregate(&view, &request, &no_bands());
        assert_eq!(result.labels(), vec!["2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn test_day_and_week_buckets() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let days = Aggregator::default().aggregate(
            &view,
            &AggregateRequest::new(vec![GroupDimension::Date(DateGranularity::Day)], vec![]),
            &no_bands(),
        );
        let labels = days.labels();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);

        let weeks = Aggregator::default().aggregate(
            &view,
            &AggregateRequest::new(vec![GroupDimension::Date(DateGranularity::Week)], vec![]),
            &no_bands(),
        );
        // 2023-12-31 is a Sunday and belongs to ISO week 52 of 2023.
        assert_eq!(weeks.labels()[0], "2023-W52");
    }

    #[test]
    fn test_categorical_groups_sort_descending_by_default() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let request = AggregateRequest::new(vec![GroupDimension::Platform], vec![MetricKey::Revenue]);
        let result = Aggregator::default().aggregate(&view, &request, &no_bands());
        let sums: Vec<f64> = result
            .groups
            .iter()
            .map(|g| g.stat(MetricKey::Revenue).unwrap().sum)
            .collect();
        assert!(sums.windows(2).all(|w| w[0] >= w[1]));

        let natural = Aggregator::default().aggregate(
            &view,
            &request.clone().with_order(GroupOrder::Natural),
            &no_bands(),
        );
        assert_eq!(natural.labels(), vec!["Instagram", "TikTok", "YouTube"]);

        let ascending = Aggregator::default().aggregate(
            &view,
            &request.with_order(GroupOrder::Ascending),
            &no_bands(),
        );
        let mut reversed = result.labels();
        reversed.reverse();
        assert_eq!(ascending.labels(), reversed);
    }

    #[test]
    fn test_mixed_dimensions_keep_time_chronological_within_category() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let request = AggregateRequest::new(
            vec![GroupDimension::Platform, GroupDimension::Date(DateGranularity::Month)],
            vec![MetricKey::Revenue],
        );
        let result = Aggregator::default().aggregate(&view, &request, &no_bands());
        assert_eq!(
            result.labels(),
            vec![
                "Instagram / 2023-12",
                "Instagram / 2024-01",
                "Instagram / 2024-02",
                "YouTube / 2024-01",
                "YouTube / 2024-02",
                "TikTok / 2024-01",
                "TikTok / 2024-02",
            ]
        );

        let ascending = Aggregator::default().aggregate(
            &view,
            &request.with_order(GroupOrder::Ascending),
            &no_bands(),
        );
        assert_eq!(ascending.labels()[0], "TikTok / 2024-01");
        assert_eq!(ascending.labels()[6], "Instagram / 2024-02");
    }

    #[test]
    fn test_categories_rank_within_each_period() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let request = AggregateRequest::new(
            vec![GroupDimension::Date(DateGranularity::Month), GroupDimension::Platform],
            vec![MetricKey::Revenue],
        );
        let result = Aggregator::default().aggregate(&view, &request, &no_bands());
        assert_eq!(
            result.labels(),
            vec![
                "2023-12 / Instagram",
                "2024-01 / Instagram",
                "2024-01 / YouTube",
                "2024-01 / TikTok",
                "2024-02 / Instagram",
                "2024-02 / TikTok",
                "2024-02 / YouTube",
            ]
        );
    }

    #[test]
    fn test_week_bucket_at_earliest_date() {
        let period = Period::containing(NaiveDate::MIN, DateGranularity::Week);
        assert_eq!(period.start, NaiveDate::MIN);
        let month = Period::containing(NaiveDate::MIN, DateGranularity::Month);
        assert_eq!(month.start, NaiveDate::MIN);
    }

    #[test]
    fn test_group_by_band() {
        let data = mixed_dataset();
        let classifier = BandClassifier::new(&BandingConfig::default(), MetricEngine::default());
        let selection = FilterEngine::new().select(&data, &FilterSpec::new(), &classifier);
        let request = AggregateRequest::new(vec![GroupDimension::Band], vec![])
            .with_order(GroupOrder::Natural);
        let result = Aggregator::default().aggregate(&selection.view, &request, &selection.bands);

        assert_eq!(result.groups[0].key, vec![KeyPart::Band(PerformanceBand::High)]);
        let total: usize = result.groups.iter().map(|g| g.record_count).sum();
        assert_eq!(total, data.len());
    }

    #[test]
    fn test_empty_view_gives_empty_result() {
        let request = AggregateRequest::new(vec![GroupDimension::Campaign], vec![MetricKey::Roas]);
        let result = Aggregator::default().aggregate(&FilteredView::default(), &request, &no_bands());
        assert!(result.is_empty());
        assert_eq!(result.total_records, 0);
    }

    #[test]
    fn test_group_dimension_from_str() {
        assert_eq!(
            "month".parse::<GroupDimension>(),
            Ok(GroupDimension::Date(DateGranularity::Month))
        );
        assert_eq!("Platform".parse::<GroupDimension>(), Ok(GroupDimension::Platform));
        assert_eq!("band".parse::<GroupDimension>(), Ok(GroupDimension::Band));
        assert!("region".parse::<GroupDimension>().is_err());
    }
}
