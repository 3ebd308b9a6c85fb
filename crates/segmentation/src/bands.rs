//! Performance banding relative to the current filtered population.

use influencer_analytics::{EnrichedRecord, MetricEngine};
use influencer_core::config::{BandingConfig, BandingKey, BandingStrategy};
use influencer_core::{MetricKey, RawMeasures};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceBand {
    High,
    Good,
    Average,
    Poor,
    /// Metric undefined for this member; excluded from the cut points.
    Unrated,
}

impl PerformanceBand {
    pub const ALL: [PerformanceBand; 5] = [
        PerformanceBand::High,
        PerformanceBand::Good,
        PerformanceBand::Average,
        PerformanceBand::Poor,
        PerformanceBand::Unrated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceBand::High => "High",
            PerformanceBand::Good => "Good",
            PerformanceBand::Average => "Average",
            PerformanceBand::Poor => "Poor",
            PerformanceBand::Unrated => "Unrated",
        }
    }
}

impl fmt::Display for PerformanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PerformanceBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = wanted.strip_suffix(" performer").unwrap_or(wanted.as_str());
        PerformanceBand::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown performance band '{s}'"))
    }
}

/// Lower bounds (inclusive) of the High, Good and Average bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandThresholds {
    pub high: f64,
    pub good: f64,
    pub average: f64,
}

impl BandThresholds {
    fn band(&self, value: f64) -> PerformanceBand {
        if value >= self.high {
            PerformanceBand::High
        } else if value >= self.good {
            PerformanceBand::Good
        } else if value >= self.average {
            PerformanceBand::Average
        } else {
            PerformanceBand::Poor
        }
    }
}

/// Snapshot of band membership for one population. Replaced wholesale when
/// the population or ranking metric changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandAssignment {
    pub key: BandingKey,
    pub metric: MetricKey,
    /// `None` when no cut points apply (collapsed or empty population).
    pub thresholds: Option<BandThresholds>,
    pub bands: BTreeMap<String, PerformanceBand>,
}

impl BandAssignment {
    pub fn empty(key: BandingKey, metric: MetricKey) -> Self {
        Self {
            key,
            metric,
            thresholds: None,
            bands: BTreeMap::new(),
        }
    }

    /// Band of the entity this record belongs to. Entities outside the
    /// classified population are unrated.
    pub fn band_of(&self, record: &EnrichedRecord) -> PerformanceBand {
        self.bands
            .get(&*entity_id(self.key, record))
            .copied()
            .unwrap_or(PerformanceBand::Unrated)
    }

    pub fn get(&self, entity: &str) -> Option<PerformanceBand> {
        self.bands.get(entity).copied()
    }

    /// Members per band, every band present.
    pub fn counts(&self) -> BTreeMap<PerformanceBand, usize> {
        let mut counts: BTreeMap<PerformanceBand, usize> =
            PerformanceBand::ALL.iter().map(|b| (*b, 0)).collect();
        for band in self.bands.values() {
            *counts.entry(*band).or_default() += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

/// Identity of the entity a record is banded under.
pub fn entity_id(key: BandingKey, record: &EnrichedRecord) -> std::borrow::Cow<'_, str> {
    match key {
        BandingKey::Influencer => record.record.name.as_str().into(),
        BandingKey::Campaign => record.record.campaign.as_str().into(),
        BandingKey::Record => record.position.to_string().into(),
    }
}

/// Assigns performance bands from the distribution of a ranking metric.
#[derive(Debug, Clone)]
pub struct BandClassifier {
    config: BandingConfig,
    engine: MetricEngine,
}

impl BandClassifier {
    pub fn new(config: &BandingConfig, engine: MetricEngine) -> Self {
        Self {
            config: config.clone(),
            engine,
        }
    }

    /// Same classifier ranking by a different metric.
    pub fn with_metric(&self, metric: MetricKey) -> Self {
        let mut config = self.config.clone();
        config.metric = metric;
        Self {
            config,
            engine: self.engine.clone(),
        }
    }

    pub fn with_key(&self, key: BandingKey) -> Self {
        let mut config = self.config.clone();
        config.key = key;
        Self {
            config,
            engine: self.engine.clone(),
        }
    }

    pub fn config(&self) -> &BandingConfig {
        &self.config
    }

    /// Classify every entity of the population. Each entity is scored on its
    /// summed raw measures, so multi-row influencers get one blended value.
    pub fn classify(&self, population: &[&EnrichedRecord]) -> BandAssignment {
        let key = self.config.key;
        let metric = self.config.metric;

        let mut totals: BTreeMap<String, RawMeasures> = BTreeMap::new();
        for record in population {
            totals
                .entry(entity_id(key, record).into_owned())
                .or_default()
                .add(&record.raw);
        }

        let scores: Vec<(String, Option<f64>)> = totals
            .into_iter()
            .map(|(entity, raw)| {
                let derived = self.engine.derive(&raw);
                (entity, metric.of(&raw, &derived))
            })
            .collect();

        let mut rated: Vec<f64> = scores.iter().filter_map(|(_, v)| *v).collect();
        rated.sort_by(f64::total_cmp);

        let thresholds = match &self.config.strategy {
            BandingStrategy::Quantile if rated.len() < self.config.min_population => None,
            BandingStrategy::Quantile => Some(BandThresholds {
                high: percentile(&rated, 0.75),
                good: percentile(&rated, 0.50),
                average: percentile(&rated, 0.25),
            }),
            BandingStrategy::Fixed {
                high,
                good,
                average,
            } => Some(BandThresholds {
                high: *high,
                good: *good,
                average: *average,
            }),
        };

        let bands = scores
            .into_iter()
            .map(|(entity, value)| {
                let band = match (value, thresholds) {
                    (None, _) => PerformanceBand::Unrated,
                    (Some(v), Some(t)) => t.band(v),
                    (Some(_), None) => PerformanceBand::Average,
                };
                (entity, band)
            })
            .collect();

        let assignment = BandAssignment {
            key,
            metric,
            thresholds,
            bands,
        };

        debug!(
            key = ?key,
            metric = %metric,
            entities = assignment.len(),
            rated = rated.len(),
            thresholds = ?assignment.thresholds,
            "Performance bands classified"
        );

        assignment
    }
}

/// Linear interpolation between closest ranks of an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p;
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use influencer_analytics::Dataset;
    use influencer_core::{PayoutBasis, Record};

    fn record(name: &str, campaign: &str, revenue: f64, payout: f64) -> Record {
        Record {
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            name: name.to_string(),
            platform: "Instagram".to_string(),
            campaign: campaign.to_string(),
            category: "Beauty".to_string(),
            gender: "Female".to_string(),
            reach: 1000,
            followers: 1000,
            likes: 10,
            comments: 1,
            orders: 5,
            revenue,
            total_payout: payout,
            basis: PayoutBasis::PerPost,
        }
    }

    fn dataset(records: Vec<Record>) -> Dataset {
        MetricEngine::default().enrich(records).unwrap()
    }

    fn classifier() -> BandClassifier {
        BandClassifier::new(&BandingConfig::default(), MetricEngine::default())
    }

    #[test]
    fn test_quartiles_partition_population() {
        let data = dataset(
            (1..=8)
                .map(|i| record(&format!("inf-{i}"), "Spring", i as f64 * 100.0, 100.0))
                .collect(),
        );
        let assignment = classifier().classify(&data.population());

        let t = assignment.thresholds.unwrap();
        assert!((t.average - 2.75).abs() < 1e-9);
        assert!((t.good - 4.5).abs() < 1e-9);
        assert!((t.high - 6.25).abs() < 1e-9);

        assert_eq!(assignment.get("inf-8"), Some(PerformanceBand::High));
        assert_eq!(assignment.get("inf-7"), Some(PerformanceBand::High));
        assert_eq!(assignment.get("inf-6"), Some(PerformanceBand::Good));
        assert_eq!(assignment.get("inf-4"), Some(PerformanceBand::Average));
        assert_eq!(assignment.get("inf-1"), Some(PerformanceBand::Poor));

        let counts = assignment.counts();
        assert_eq!(counts.values().sum::<usize>(), 8);
        assert_eq!(counts[&PerformanceBand::High], 2);
        assert_eq!(counts[&PerformanceBand::Poor], 2);
        assert_eq!(counts[&PerformanceBand::Unrated], 0);
    }

    #[test]
    fn test_ties_at_boundary_go_to_higher_band() {
        let data = dataset(vec![
            record("a", "Spring", 100.0, 100.0),
            record("b", "Spring", 200.0, 100.0),
            record("c", "Spring", 200.0, 100.0),
            record("d", "Spring", 200.0, 100.0),
        ]);
        let assignment = classifier().classify(&data.population());
        assert_eq!(assignment.get("a"), Some(PerformanceBand::Poor));
        for name in ["b", "c", "d"] {
            assert_eq!(assignment.get(name), Some(PerformanceBand::High));
        }
    }

    #[test]
    fn test_undefined_metric_is_unrated() {
        let mut records: Vec<Record> = (1..=4)
            .map(|i| record(&format!("inf-{i}"), "Spring", i as f64 * 100.0, 100.0))
            .collect();
        records.push(record("free", "Spring", 500.0, 0.0));
        let data = dataset(records);
        let assignment = classifier().classify(&data.population());

        assert_eq!(assignment.get("free"), Some(PerformanceBand::Unrated));
        let counts = assignment.counts();
        assert_eq!(counts.values().sum::<usize>(), 5);
        assert_eq!(counts[&PerformanceBand::Unrated], 1);
        assert_eq!(assignment.get("inf-4"), Some(PerformanceBand::High));
    }

    #[test]
    fn test_small_population_collapses_to_average() {
        let data = dataset(vec![
            record("a", "Spring", 100.0, 100.0),
            record("b", "Spring", 900.0, 100.0),
        ]);
        let assignment = classifier().classify(&data.population());
        assert!(assignment.thresholds.is_none());
        assert_eq!(assignment.get("a"), Some(PerformanceBand::Average));
        assert_eq!(assignment.get("b"), Some(PerformanceBand::Average));
    }

    #[test]
    fn test_empty_population() {
        let assignment = classifier().classify(&[]);
        assert!(assignment.is_empty());
        assert!(assignment.thresholds.is_none());
        assert_eq!(assignment.counts().values().sum::<usize>(), 0);
    }

    #[test]
    fn test_influencer_scored_on_blended_totals() {
        // 50/100 and 1000/100 blend to 1050/200 = 5.25
        let data = dataset(vec![
            record("multi", "Spring", 50.0, 100.0),
            record("multi", "Summer", 1000.0, 100.0),
            record("x", "Spring", 100.0, 100.0),
            record("y", "Spring", 200.0, 100.0),
            record("z", "Spring", 300.0, 100.0),
        ]);
        let assignment = classifier().classify(&data.population());
        assert_eq!(assignment.len(), 4);
        assert_eq!(assignment.get("multi"), Some(PerformanceBand::High));
        let rec = &data.records()[0];
        assert_eq!(assignment.band_of(rec), PerformanceBand::High);
    }

    #[test]
    fn test_campaign_and_record_keys() {
        let data = dataset(vec![
            record("a", "Spring", 100.0, 100.0),
            record("b", "Spring", 300.0, 100.0),
            record("c", "Winter", 900.0, 100.0),
        ]);
        let by_campaign = classifier()
            .with_key(BandingKey::Campaign)
            .classify(&data.population());
        assert_eq!(by_campaign.len(), 2);

        let by_record = classifier()
            .with_key(BandingKey::Record)
            .classify(&data.population());
        assert_eq!(by_record.len(), 3);
        assert_eq!(by_record.band_of(&data.records()[2]), PerformanceBand::Average);
    }

    #[test]
    fn test_fixed_roi_thresholds() {
        let config = BandingConfig {
            metric: MetricKey::RoiPercentage,
            strategy: BandingStrategy::roi_percentage_defaults(),
            ..BandingConfig::default()
        };
        let data = dataset(vec![
            record("high", "Spring", 300.0, 100.0),
            record("good", "Spring", 200.0, 100.0),
            record("avg", "Spring", 100.0, 100.0),
            record("poor", "Spring", 50.0, 100.0),
        ]);
        let assignment =
            BandClassifier::new(&config, MetricEngine::default()).classify(&data.population());
        assert_eq!(assignment.get("high"), Some(PerformanceBand::High));
        assert_eq!(assignment.get("good"), Some(PerformanceBand::Good));
        assert_eq!(assignment.get("avg"), Some(PerformanceBand::Average));
        assert_eq!(assignment.get("poor"), Some(PerformanceBand::Poor));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let data = dataset(
            (1..=12)
                .map(|i| record(&format!("inf-{i}"), "Spring", (i * 37 % 11) as f64 * 10.0, 7.0))
                .collect(),
        );
        let classifier = classifier();
        let first = classifier.classify(&data.population());
        let second = classifier.classify(&data.population());
        assert_eq!(first, second);
    }

    #[test]
    fn test_band_from_str() {
        assert_eq!("high".parse::<PerformanceBand>(), Ok(PerformanceBand::High));
        assert_eq!(
            "Good Performer".parse::<PerformanceBand>(),
            Ok(PerformanceBand::Good)
        );
        assert!("stellar".parse::<PerformanceBand>().is_err());
    }
}
