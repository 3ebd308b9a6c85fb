//! Influencer campaign reporting: group-by aggregates, KPI cards, funnel,
//! cohort trends, rankings, and CSV/report export.

pub mod aggregate;
pub mod cohort;
pub mod dashboard;
pub mod export;
pub mod funnel;
pub mod rankings;

pub use aggregate::{
    AggregateGroup, AggregateRequest, AggregateResult, Aggregator, GroupDimension, GroupOrder,
    KeyPart, MetricStats, Period,
};
pub use cohort::{CohortSeries, CohortTrend, TrendPoint};
pub use dashboard::{CampaignHighlight, Insights, KpiSummary};
pub use export::{
    export_columns, write_csv, AnalyticsReport, JsonReportRenderer, ReportBuilder, ReportRenderer,
};
pub use funnel::{FunnelStage, FunnelSummary};
pub use rankings::{bottom_n, outliers, top_n, OutlierReport, RankedRecord};
