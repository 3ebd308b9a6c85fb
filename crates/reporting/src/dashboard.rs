//! Headline KPI cards and the analytical summary shown above the charts.

use crate::aggregate::{AggregateRequest, Aggregator, GroupDimension, GroupOrder};
use chrono::NaiveDate;
use influencer_analytics::MetricEngine;
use influencer_core::config::BandingKey;
use influencer_core::{Dimension, MetricKey, RawMeasures};
use influencer_segmentation::{BandAssignment, FilteredView};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Scalar summaries of a filtered view. Ratios follow the same undefined
/// rule as per-record metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub record_count: usize,
    pub total_revenue: f64,
    pub total_payout: f64,
    pub net_return: f64,
    pub total_orders: f64,
    pub total_reach: f64,
    pub total_engagement: f64,
    pub blended_roas: Option<f64>,
    pub overall_roi_percentage: Option<f64>,
    pub blended_cost_per_order: Option<f64>,
    pub active_influencers: usize,
    pub platforms: usize,
    pub campaigns: usize,
    pub avg_engagement_rate: Option<f64>,
    pub avg_roas: Option<f64>,
    pub avg_order_value: Option<f64>,
}

impl KpiSummary {
    pub fn compute(view: &FilteredView<'_>, engine: &MetricEngine) -> Self {
        let totals = RawMeasures::total(view.iter().map(|r| &r.raw));
        let blended = engine.derive(&totals);

        let distinct = |dimension: Dimension| {
            view.iter()
                .map(|r| r.record.dimension_str(dimension))
                .collect::<HashSet<_>>()
                .len()
        };
        let mean = |metric: MetricKey| {
            let values: Vec<f64> = view.iter().filter_map(|r| r.value(metric)).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };

        Self {
            record_count: view.len(),
            total_revenue: totals.revenue,
            total_payout: totals.total_payout,
            net_return: blended.payout_efficiency,
            total_orders: totals.orders,
            total_reach: totals.reach,
            total_engagement: blended.engagement,
            blended_roas: blended.roas,
            overall_roi_percentage: blended.roi_percentage,
            blended_cost_per_order: blended.cost_per_order,
            active_influencers: distinct(Dimension::Influencer),
            platforms: distinct(Dimension::Platform),
            campaigns: distinct(Dimension::Campaign),
            avg_engagement_rate: mean(MetricKey::EngagementRate),
            avg_roas: mean(MetricKey::Roas),
            avg_order_value: mean(MetricKey::RevenuePerOrder),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignHighlight {
    pub campaign: String,
    pub mean_roi_percentage: f64,
}

/// Narrative highlights: best and worst campaign, busiest day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub top_campaign: Option<CampaignHighlight>,
    pub lowest_campaign: Option<CampaignHighlight>,
    pub most_active_day: Option<NaiveDate>,
}

impl Insights {
    pub fn compute(view: &FilteredView<'_>, aggregator: &Aggregator) -> Self {
        let request = AggregateRequest::new(
            vec![GroupDimension::Campaign],
            vec![MetricKey::RoiPercentage],
        )
        .with_order(GroupOrder::Descending);
        let unbanded = BandAssignment::empty(BandingKey::Campaign, MetricKey::RoiPercentage);
        let by_campaign = aggregator.aggregate(view, &request, &unbanded);

        let highlight = |group: &crate::aggregate::AggregateGroup| {
            group
                .stat(MetricKey::RoiPercentage)
                .and_then(|s| s.mean)
                .map(|mean| CampaignHighlight {
                    campaign: group.label.clone(),
                    mean_roi_percentage: mean,
                })
        };
        let rated: Vec<CampaignHighlight> =
            by_campaign.groups.iter().filter_map(highlight).collect();

        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for record in view.iter() {
            *per_day.entry(record.record.date).or_default() += 1;
        }
        // Earliest day wins a tie: max_by keeps the last maximum, so scan in reverse.
        let most_active_day = per_day
            .iter()
            .rev()
            .max_by_key(|(_, count)| **count)
            .map(|(day, _)| *day);

        Self {
            top_campaign: rated.first().cloned(),
            lowest_campaign: rated.last().cloned(),
            most_active_day,
        }
    }
}
