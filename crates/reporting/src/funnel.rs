//! Marketing funnel: reach through engagement and orders to revenue and spend.

use influencer_analytics::MetricEngine;
use influencer_core::RawMeasures;
use influencer_segmentation::FilteredView;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStage {
    pub name: String,
    pub value: f64,
    /// Share of the first stage; undefined when the first stage is zero.
    pub share_of_initial: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelSummary {
    pub stages: Vec<FunnelStage>,
    pub reach_to_engagement: Option<f64>,
    pub engagement_to_order: Option<f64>,
    pub reach_to_order: Option<f64>,
    pub average_order_value: Option<f64>,
    pub roas: Option<f64>,
}

impl FunnelSummary {
    pub fn compute(view: &FilteredView<'_>, engine: &MetricEngine) -> Self {
        let totals = RawMeasures::total(view.iter().map(|r| &r.raw));
        let derived = engine.derive(&totals);

        let values = [
            ("Reach", totals.reach),
            ("Engagements", derived.engagement),
            ("Orders", totals.orders),
            ("Revenue", totals.revenue),
            ("Investment", totals.total_payout),
        ];
        let initial = totals.reach;
        let stages = values
            .into_iter()
            .map(|(name, value)| FunnelStage {
                name: name.to_string(),
                value,
                share_of_initial: (initial > 0.0).then(|| value / initial),
            })
            .collect();

        Self {
            stages,
            reach_to_engagement: derived.engagement_rate,
            engagement_to_order: (derived.engagement > 0.0)
                .then(|| totals.orders / derived.engagement),
            reach_to_order: derived.order_rate,
            average_order_value: derived.revenue_per_order,
            roas: derived.roas,
        }
    }
}
