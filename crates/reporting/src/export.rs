//! Hand-off to external collaborators: CSV export of a filtered view and a
//! serializable report bundle for renderers.

use crate::aggregate::{AggregateRequest, AggregateResult, Aggregator, GroupDimension, GroupOrder};
use crate::dashboard::{Insights, KpiSummary};
use crate::funnel::FunnelSummary;
use crate::rankings::{outliers, top_n, OutlierReport, RankedRecord};
use chrono::{DateTime, Utc};
use influencer_analytics::MetricEngine;
use influencer_core::config::ReportingConfig;
use influencer_core::{
    FilterWarning, MetricKey, PipelineError, PipelineResult, Record, REQUIRED_COLUMNS,
};
use influencer_segmentation::{BandAssignment, BandThresholds, FilterSpec, FilteredView, Selection};
use serde::Serialize;
use std::io::Write;
use tracing::info;
use uuid::Uuid;

pub const BAND_COLUMN: &str = "performance_band";

// ─── CSV ────────────────────────────────────────────────────────────────────

/// Header of an exported table: input columns, derived metrics, band.
pub fn export_columns() -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .chain(MetricKey::DERIVED.iter().map(|m| m.as_str()))
        .chain(std::iter::once(BAND_COLUMN))
        .collect()
}

fn input_cells(record: &Record) -> [String; 14] {
    [
        record.date.format("%Y-%m-%d").to_string(),
        record.name.clone(),
        record.platform.clone(),
        record.campaign.clone(),
        record.category.clone(),
        record.gender.clone(),
        record.reach.to_string(),
        record.followers.to_string(),
        record.likes.to_string(),
        record.comments.to_string(),
        record.orders.to_string(),
        record.revenue.to_string(),
        record.total_payout.to_string(),
        record.basis.as_str().to_string(),
    ]
}

/// Write the view as CSV. Undefined metric values become empty cells.
/// Returns the number of data rows written.
pub fn write_csv<W: Write>(
    view: &FilteredView<'_>,
    bands: &BandAssignment,
    writer: W,
) -> PipelineResult<usize> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(export_columns()).map_err(csv_error)?;

    for record in view.iter() {
        let derived = MetricKey::DERIVED
            .iter()
            .map(|m| record.value(*m).map(|v| v.to_string()).unwrap_or_default());
        let row: Vec<String> = input_cells(&record.record)
            .into_iter()
            .chain(derived)
            .chain(std::iter::once(bands.band_of(record).to_string()))
            .collect();
        out.write_record(&row).map_err(csv_error)?;
    }
    out.flush()?;

    info!(rows = view.len(), "CSV export written");
    Ok(view.len())
}

fn csv_error(err: csv::Error) -> PipelineError {
    PipelineError::Csv(err.to_string())
}

// ─── Report bundle ──────────────────────────────────────────────────────────

/// Everything the report-generation collaborator renders for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub filter: FilterSpec,
    pub band_metric: MetricKey,
    pub band_thresholds: Option<BandThresholds>,
    pub kpis: KpiSummary,
    pub insights: Insights,
    pub funnel: FunnelSummary,
    pub trend: AggregateResult,
    pub roi_by_campaign: AggregateResult,
    pub engagement_by_platform: AggregateResult,
    pub band_distribution: AggregateResult,
    pub roi_outliers: OutlierReport,
    pub top_records: Vec<RankedRecord>,
    pub warnings: Vec<FilterWarning>,
}

pub struct ReportBuilder {
    engine: MetricEngine,
    aggregator: Aggregator,
    config: ReportingConfig,
}

impl ReportBuilder {
    pub fn new(engine: MetricEngine, config: ReportingConfig) -> Self {
        Self {
            aggregator: Aggregator::new(engine.clone()),
            engine,
            config,
        }
    }

    pub fn build(&self, filter: &FilterSpec, selection: &Selection<'_>) -> AnalyticsReport {
        let view = &selection.view;
        let bands = &selection.bands;
        let chart = |dimensions: Vec<GroupDimension>, metrics: Vec<MetricKey>, order| {
            let request = AggregateRequest::new(dimensions, metrics).with_order(order);
            self.aggregator.aggregate(view, &request, bands)
        };

        let report = AnalyticsReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            filter: filter.clone(),
            band_metric: bands.metric,
            band_thresholds: bands.thresholds,
            kpis: KpiSummary::compute(view, &self.engine),
            insights: Insights::compute(view, &self.aggregator),
            funnel: FunnelSummary::compute(view, &self.engine),
            trend: chart(
                vec![GroupDimension::Date(self.config.trend_granularity)],
                vec![MetricKey::Revenue, MetricKey::TotalPayout, MetricKey::Roas],
                GroupOrder::Natural,
            ),
            roi_by_campaign: chart(
                vec![GroupDimension::Campaign],
                vec![MetricKey::RoiPercentage],
                GroupOrder::Descending,
            ),
            engagement_by_platform: chart(
                vec![GroupDimension::Platform],
                vec![MetricKey::EngagementRate, MetricKey::Engagement],
                GroupOrder::Descending,
            ),
            band_distribution: chart(
                vec![GroupDimension::Category, GroupDimension::Band],
                vec![],
                GroupOrder::Natural,
            ),
            roi_outliers: outliers(view, MetricKey::RoiPercentage, self.config.outlier_sigma),
            top_records: top_n(view, MetricKey::RoiPercentage, self.config.top_n),
            warnings: view.warnings().to_vec(),
        };

        info!(
            report_id = %report.id,
            records = report.kpis.record_count,
            warnings = report.warnings.len(),
            "Analytics report built"
        );
        report
    }
}

/// Renders an [`AnalyticsReport`] into some output format.
pub trait ReportRenderer {
    fn content_type(&self) -> &'static str;
    fn render(&self, report: &AnalyticsReport, out: &mut dyn Write) -> PipelineResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportRenderer {
    pub pretty: bool,
}

impl ReportRenderer for JsonReportRenderer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn render(&self, report: &AnalyticsReport, out: &mut dyn Write) -> PipelineResult<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, report)?;
        } else {
            serde_json::to_writer(&mut *out, report)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::mixed_dataset;
    use influencer_core::config::BandingConfig;
    use influencer_segmentation::{BandClassifier, FilterEngine};

    #[test]
    fn test_export_header_order() {
        let columns = export_columns();
        assert_eq!(&columns[..14], &REQUIRED_COLUMNS[..]);
        assert_eq!(columns[14], "engagement");
        assert_eq!(columns.last(), Some(&BAND_COLUMN));
        assert_eq!(columns.len(), 14 + MetricKey::DERIVED.len() + 1);
    }

    #[test]
    fn test_write_csv_with_undefined_cells() {
        let data = mixed_dataset();
        let view = FilteredView::of(data.population());
        let bands = BandAssignment::empty(
            influencer_core::config::BandingKey::Influencer,
            MetricKey::Roas,
        );
        let mut buffer = Vec::new();
        let rows = write_csv(&view, &bands, &mut buffer).unwrap();
        assert_eq!(rows, 10);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[1].starts_with("2023-12-31,Ava,Instagram,Spring,Beauty,Female,10000,"));

        // Eve (row 6) has no payout: ROAS and ROI% cells are empty.
        let columns = export_columns();
        let roas = columns.iter().position(|c| *c == "roas").unwrap();
        let cells: Vec<&str> = lines[6].split(',').collect();
        assert_eq!(cells[1], "Eve");
        assert_eq!(cells[roas], "");
        assert_eq!(cells.last(), Some(&"Unrated"));
    }

    #[test]
    fn test_report_bundle_and_json_rendering() {
        let data = mixed_dataset();
        let classifier = BandClassifier::new(&BandingConfig::default(), MetricEngine::default());
        let filter = FilterSpec::new().with_platforms(["Instagram", "Pinterest"]);
        let selection = FilterEngine::new().select(&data, &filter, &classifier);

        let builder = ReportBuilder::new(MetricEngine::default(), ReportingConfig::default());
        let report = builder.build(&filter, &selection);
        assert_eq!(report.kpis.record_count, 4);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.roi_by_campaign.total_records, 4);

        let renderer = JsonReportRenderer { pretty: true };
        assert_eq!(renderer.content_type(), "application/json");
        let mut out = Vec::new();
        renderer.render(&report, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["kpis"]["record_count"], 4);
        assert_eq!(json["trend"]["groups"][0]["label"], "2023-12");
        assert_eq!(json["id"], report.id.to_string());
    }
}
