//! Derived-metric computation. Every metric is a pure function of one
//! record's raw fields and the zero-denominator policy.

use crate::dataset::{Dataset, EnrichedRecord};
use influencer_core::config::{MetricsConfig, ZeroDenominatorPolicy};
use influencer_core::{DerivedMetrics, PipelineError, PipelineResult, RawMeasures, Record};
use tracing::info;

/// Computes [`DerivedMetrics`] for records and for summed groups of records.
#[derive(Debug, Clone, Default)]
pub struct MetricEngine {
    zero_denominator: ZeroDenominatorPolicy,
}

impl MetricEngine {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            zero_denominator: config.zero_denominator,
        }
    }

    /// Attach derived metrics to every record, producing the immutable base table.
    pub fn enrich(&self, records: Vec<Record>) -> PipelineResult<Dataset> {
        let enriched = records
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                check_invariants(position, &record)?;
                let raw = measures_of(&record);
                let metrics = self.derive(&raw);
                Ok(EnrichedRecord {
                    position,
                    record,
                    raw,
                    metrics,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        metrics::counter!("analytics.records_enriched").increment(enriched.len() as u64);
        info!(
            records = enriched.len(),
            policy = ?self.zero_denominator,
            "Derived metrics computed"
        );

        Ok(Dataset::new(enriched))
    }

    /// Derive metrics from raw measures, either a single row or a group total.
    pub fn derive(&self, raw: &RawMeasures) -> DerivedMetrics {
        let engagement = raw.likes + raw.comments;
        let net = raw.revenue - raw.total_payout;
        DerivedMetrics {
            engagement,
            engagement_rate: self.ratio(engagement, raw.reach),
            order_rate: self.ratio(raw.orders, raw.reach),
            revenue_per_order: self.ratio(raw.revenue, raw.orders),
            cost_per_order: self.ratio(raw.total_payout, raw.orders),
            roas: self.ratio(raw.revenue, raw.total_payout),
            roi_percentage: self.ratio(net, raw.total_payout).map(|r| r * 100.0),
            payout_efficiency: net,
        }
    }

    fn ratio(&self, numerator: f64, denominator: f64) -> Option<f64> {
        if denominator == 0.0 {
            match self.zero_denominator {
                ZeroDenominatorPolicy::Undefined => None,
                ZeroDenominatorPolicy::Zero => Some(0.0),
            }
        } else {
            Some(numerator / denominator)
        }
    }
}

/// Raw additive measures of one record.
pub fn measures_of(record: &Record) -> RawMeasures {
    RawMeasures {
        reach: record.reach as f64,
        followers: record.followers as f64,
        likes: record.likes as f64,
        comments: record.comments as f64,
        orders: record.orders as f64,
        revenue: record.revenue,
        total_payout: record.total_payout,
    }
}

fn check_invariants(position: usize, record: &Record) -> PipelineResult<()> {
    for (field, value) in [
        ("revenue", record.revenue),
        ("total_payout", record.total_payout),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(PipelineError::ComputationInvariant {
                row: position,
                field,
                reason: format!("expected a finite non-negative amount, got {value}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use influencer_core::{MetricKey, PayoutBasis};

    fn record(reach: u64, likes: u64, comments: u64, revenue: f64, payout: f64) -> Record {
        Record {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            name: "Influencer".to_string(),
            platform: "Instagram".to_string(),
            campaign: "Spring".to_string(),
            category: "Beauty".to_string(),
            gender: "Female".to_string(),
            reach,
            followers: reach,
            likes,
            comments,
            orders: 10,
            revenue,
            total_payout: payout,
            basis: PayoutBasis::PerPost,
        }
    }

    fn approx(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|v| (v - expected).abs() < 1e-9)
    }

    #[test]
    fn test_three_record_scenario() {
        let engine = MetricEngine::default();
        let dataset = engine
            .enrich(vec![
                record(1000, 50, 10, 500.0, 100.0),
                record(0, 0, 0, 0.0, 50.0),
                record(2000, 300, 100, 1000.0, 0.0),
            ])
            .unwrap();
        let rows = dataset.records();

        assert!(approx(rows[0].metrics.engagement_rate, 0.06));
        assert_eq!(rows[1].metrics.engagement_rate, None);
        assert!(approx(rows[2].metrics.engagement_rate, 0.20));

        assert!(approx(rows[0].metrics.roas, 5.0));
        assert!(approx(rows[1].metrics.roas, 0.0));
        assert_eq!(rows[2].metrics.roas, None);

        assert!(approx(rows[0].metrics.roi_percentage, 400.0));
        assert_eq!(rows[2].metrics.payout_efficiency, 1000.0);
    }

    #[test]
    fn test_zero_reach_is_undefined_not_nan() {
        let engine = MetricEngine::default();
        let derived = engine.derive(&measures_of(&record(0, 5, 5, 10.0, 10.0)));
        assert_eq!(derived.engagement_rate, None);
        assert_eq!(derived.order_rate, None);
        assert_eq!(derived.engagement, 10.0);
    }

    #[test]
    fn test_zero_policy_yields_zero() {
        let engine = MetricEngine::new(&MetricsConfig {
            zero_denominator: ZeroDenominatorPolicy::Zero,
        });
        let derived = engine.derive(&measures_of(&record(0, 5, 5, 10.0, 0.0)));
        assert_eq!(derived.engagement_rate, Some(0.0));
        assert_eq!(derived.roas, Some(0.0));
        assert_eq!(derived.roi_percentage, Some(0.0));
    }

    #[test]
    fn test_order_ratios() {
        let engine = MetricEngine::default();
        let derived = engine.derive(&measures_of(&record(1000, 0, 0, 500.0, 100.0)));
        assert!(approx(derived.order_rate, 0.01));
        assert!(approx(derived.revenue_per_order, 50.0));
        assert!(approx(derived.cost_per_order, 10.0));
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        let engine = MetricEngine::default();
        let raw = measures_of(&record(1234, 56, 7, 890.0, 123.0));
        assert_eq!(engine.derive(&raw), engine.derive(&raw));
    }

    #[test]
    fn test_blended_group_metrics_use_sums() {
        let engine = MetricEngine::default();
        let a = measures_of(&record(1000, 0, 0, 500.0, 100.0));
        let b = measures_of(&record(1000, 0, 0, 100.0, 100.0));
        let total = RawMeasures::total([&a, &b]);
        let derived = engine.derive(&total);
        assert_eq!(MetricKey::Roas.of(&total, &derived), Some(3.0));
    }

    #[test]
    fn test_negative_amount_is_invariant_violation() {
        let engine = MetricEngine::default();
        let err = engine
            .enrich(vec![record(10, 1, 1, 10.0, 1.0), record(10, 1, 1, -1.0, 1.0)])
            .unwrap_err();
        match err {
            PipelineError::ComputationInvariant { row, field, .. } => {
                assert_eq!(row, 1);
                assert_eq!(field, "revenue");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nan_payout_is_invariant_violation() {
        let engine = MetricEngine::default();
        let result = engine.enrich(vec![record(10, 1, 1, 10.0, f64::NAN)]);
        assert!(matches!(
            result,
            Err(PipelineError::ComputationInvariant {
                field: "total_payout",
                ..
            })
        ));
    }
}
