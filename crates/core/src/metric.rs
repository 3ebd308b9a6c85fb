//! Metric vocabulary shared by banding, aggregation and ranking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw additive measures of a record, or the column sums of a group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMeasures {
    pub reach: f64,
    pub followers: f64,
    pub likes: f64,
    pub comments: f64,
    pub orders: f64,
    pub revenue: f64,
    pub total_payout: f64,
}

impl RawMeasures {
    pub fn add(&mut self, other: &RawMeasures) {
        self.reach += other.reach;
        self.followers += other.followers;
        self.likes += other.likes;
        self.comments += other.comments;
        self.orders += other.orders;
        self.revenue += other.revenue;
        self.total_payout += other.total_payout;
    }

    /// Column-wise sum.
    pub fn total<'a, I>(measures: I) -> RawMeasures
    where
        I: IntoIterator<Item = &'a RawMeasures>,
    {
        measures.into_iter().fold(RawMeasures::default(), |mut acc, m| {
            acc.add(m);
            acc
        })
    }
}

/// Metrics derived from [`RawMeasures`]. `None` marks a ratio whose
/// denominator was zero; it is never folded into means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub engagement: f64,
    pub engagement_rate: Option<f64>,
    pub order_rate: Option<f64>,
    pub revenue_per_order: Option<f64>,
    pub cost_per_order: Option<f64>,
    pub roas: Option<f64>,
    pub roi_percentage: Option<f64>,
    pub payout_efficiency: f64,
}

/// Every numeric value addressable on an enriched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Reach,
    Followers,
    Likes,
    Comments,
    Orders,
    Revenue,
    TotalPayout,
    Engagement,
    EngagementRate,
    OrderRate,
    RevenuePerOrder,
    CostPerOrder,
    Roas,
    RoiPercentage,
    PayoutEfficiency,
}

impl MetricKey {
    pub const ALL: [MetricKey; 15] = [
        MetricKey::Reach,
        MetricKey::Followers,
        MetricKey::Likes,
        MetricKey::Comments,
        MetricKey::Orders,
        MetricKey::Revenue,
        MetricKey::TotalPayout,
        MetricKey::Engagement,
        MetricKey::EngagementRate,
        MetricKey::OrderRate,
        MetricKey::RevenuePerOrder,
        MetricKey::CostPerOrder,
        MetricKey::Roas,
        MetricKey::RoiPercentage,
        MetricKey::PayoutEfficiency,
    ];

    /// Derived columns appended to exports, in output order.
    pub const DERIVED: [MetricKey; 8] = [
        MetricKey::Engagement,
        MetricKey::EngagementRate,
        MetricKey::OrderRate,
        MetricKey::RevenuePerOrder,
        MetricKey::CostPerOrder,
        MetricKey::Roas,
        MetricKey::RoiPercentage,
        MetricKey::PayoutEfficiency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Reach => "reach",
            MetricKey::Followers => "followers",
            MetricKey::Likes => "likes",
            MetricKey::Comments => "comments",
            MetricKey::Orders => "orders",
            MetricKey::Revenue => "revenue",
            MetricKey::TotalPayout => "total_payout",
            MetricKey::Engagement => "engagement",
            MetricKey::EngagementRate => "engagement_rate",
            MetricKey::OrderRate => "order_rate",
            MetricKey::RevenuePerOrder => "revenue_per_order",
            MetricKey::CostPerOrder => "cost_per_order",
            MetricKey::Roas => "roas",
            MetricKey::RoiPercentage => "roi_percentage",
            MetricKey::PayoutEfficiency => "payout_efficiency",
        }
    }

    /// Whether summing the metric across records is meaningful.
    pub fn is_additive(&self) -> bool {
        !matches!(
            self,
            MetricKey::EngagementRate
                | MetricKey::OrderRate
                | MetricKey::RevenuePerOrder
                | MetricKey::CostPerOrder
                | MetricKey::Roas
                | MetricKey::RoiPercentage
        )
    }

    /// Reads the metric from raw measures and the metrics derived from them.
    pub fn of(&self, raw: &RawMeasures, derived: &DerivedMetrics) -> Option<f64> {
        match self {
            MetricKey::Reach => Some(raw.reach),
            MetricKey::Followers => Some(raw.followers),
            MetricKey::Likes => Some(raw.likes),
            MetricKey::Comments => Some(raw.comments),
            MetricKey::Orders => Some(raw.orders),
            MetricKey::Revenue => Some(raw.revenue),
            MetricKey::TotalPayout => Some(raw.total_payout),
            MetricKey::Engagement => Some(derived.engagement),
            MetricKey::EngagementRate => derived.engagement_rate,
            MetricKey::OrderRate => derived.order_rate,
            MetricKey::RevenuePerOrder => derived.revenue_per_order,
            MetricKey::CostPerOrder => derived.cost_per_order,
            MetricKey::Roas => derived.roas,
            MetricKey::RoiPercentage => derived.roi_percentage,
            MetricKey::PayoutEfficiency => Some(derived.payout_efficiency),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        MetricKey::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_sums_columns() {
        let a = RawMeasures {
            reach: 100.0,
            revenue: 50.0,
            ..Default::default()
        };
        let b = RawMeasures {
            reach: 20.0,
            total_payout: 10.0,
            ..Default::default()
        };
        let total = RawMeasures::total([&a, &b]);
        assert_eq!(total.reach, 120.0);
        assert_eq!(total.revenue, 50.0);
        assert_eq!(total.total_payout, 10.0);
    }

    #[test]
    fn test_metric_key_parse_round_trip() {
        for key in MetricKey::ALL {
            assert_eq!(key.as_str().parse::<MetricKey>(), Ok(key));
        }
        assert_eq!("ROI-Percentage".parse::<MetricKey>(), Ok(MetricKey::RoiPercentage));
        assert!("ctr".parse::<MetricKey>().is_err());
    }

    #[test]
    fn test_ratios_are_not_additive() {
        assert!(MetricKey::Revenue.is_additive());
        assert!(MetricKey::PayoutEfficiency.is_additive());
        assert!(!MetricKey::Roas.is_additive());
        assert!(!MetricKey::EngagementRate.is_additive());
    }

    #[test]
    fn test_of_reads_undefined_ratio() {
        let raw = RawMeasures::default();
        let derived = DerivedMetrics::default();
        assert_eq!(MetricKey::Roas.of(&raw, &derived), None);
        assert_eq!(MetricKey::Revenue.of(&raw, &derived), Some(0.0));
    }
}
